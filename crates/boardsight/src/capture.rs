//! Capture source: grabs the selected screen region on a fixed cadence and
//! hands the newest frame to the processing side through a one-frame slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use boardsight_core::{Frame, RgbImage, ScreenRect};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use nalgebra::Point2;

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("region {region:?} is not available on a {}x{} screen", .screen.0, .screen.1)]
    RegionUnavailable {
        region: ScreenRect,
        screen: (usize, usize),
    },
    #[error("screen capture not permitted: {0}")]
    PermissionDenied(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("cannot decode captured image: {0}")]
    Decode(String),
}

/// Produces the pixels of a screen rectangle.
pub trait FrameGrabber: Send + Sync {
    /// Pixels of `rect`, exactly `rect.width x rect.height`.
    fn grab(&self, rect: ScreenRect) -> Result<RgbImage, CaptureError>;
}

/// Cut `rect` out of a full-screen image whose top-left is screen `(0, 0)`.
pub fn crop_region(screen: &RgbImage, rect: ScreenRect) -> Result<RgbImage, CaptureError> {
    let unavailable = || CaptureError::RegionUnavailable {
        region: rect,
        screen: (screen.width, screen.height),
    };
    if rect.x < 0 || rect.y < 0 || rect.is_empty() {
        return Err(unavailable());
    }
    screen
        .crop(
            rect.x as usize,
            rect.y as usize,
            rect.width as usize,
            rect.height as usize,
        )
        .ok_or_else(unavailable)
}

/// An in-memory screen; tests and demos replace its contents between grabs.
#[derive(Debug)]
pub struct VirtualScreen {
    screen: Mutex<RgbImage>,
    grabs: AtomicU64,
}

impl VirtualScreen {
    pub fn new(screen: RgbImage) -> Self {
        Self {
            screen: Mutex::new(screen),
            grabs: AtomicU64::new(0),
        }
    }

    pub fn set(&self, screen: RgbImage) {
        *self.screen.lock().unwrap_or_else(PoisonError::into_inner) = screen;
    }

    pub fn grabs(&self) -> u64 {
        self.grabs.load(Ordering::Relaxed)
    }
}

impl FrameGrabber for VirtualScreen {
    fn grab(&self, rect: ScreenRect) -> Result<RgbImage, CaptureError> {
        self.grabs.fetch_add(1, Ordering::Relaxed);
        let screen = self.screen.lock().unwrap_or_else(PoisonError::into_inner);
        crop_region(&screen, rect)
    }
}

/// Capacity-one frame hand-off. Pushing into a full slot replaces the
/// unconsumed frame, so the consumer always sees the freshest capture.
///
/// The slot also numbers frames and carries capture status notices, so it
/// outlives individual [`CaptureSource`]s across region changes.
#[derive(Clone, Debug)]
pub struct FrameSlot {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    notice_tx: Sender<CaptureNotice>,
    notice_rx: Receiver<CaptureNotice>,
    next_seq: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

/// Capture health changes, reported once per transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureNotice {
    Failed(String),
    Recovered,
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSlot {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let (notice_tx, notice_rx) = crossbeam_channel::bounded(16);
        Self {
            tx,
            rx,
            notice_tx,
            notice_rx,
            next_seq: Arc::new(AtomicU64::new(1)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Store `frame`, evicting an unconsumed older one.
    pub fn push(&self, mut frame: Frame) {
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    if let Ok(old) = self.rx.try_recv() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        log::trace!("frame #{} dropped unprocessed", old.seq);
                    }
                    frame = back;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub fn try_take(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    pub fn take_timeout(&self, timeout: Duration) -> Option<Frame> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn frames(&self) -> &Receiver<Frame> {
        &self.rx
    }

    pub fn report(&self, notice: CaptureNotice) {
        let _ = self.notice_tx.try_send(notice);
    }

    pub fn notices(&self) -> &Receiver<CaptureNotice> {
        &self.notice_rx
    }

    /// Frames replaced before anyone took them.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// A capture thread bound to one region. Stops on [`CaptureSource::stop`]
/// or drop.
pub struct CaptureSource {
    rect: ScreenRect,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureSource {
    pub fn spawn(
        grabber: Arc<dyn FrameGrabber>,
        rect: ScreenRect,
        interval: Duration,
        slot: FrameSlot,
    ) -> Result<Self, CaptureError> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || capture_loop(grabber.as_ref(), rect, interval, &slot, &stop_rx))?;
        log::debug!("capture started for {rect:?} every {interval:?}");
        Ok(Self {
            rect,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn rect(&self) -> ScreenRect {
        self.rect
    }

    pub fn stop(&mut self) {
        // disconnecting the stop channel wakes the loop
        self.stop_tx.take();
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                log::error!("capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    grabber: &dyn FrameGrabber,
    rect: ScreenRect,
    interval: Duration,
    slot: &FrameSlot,
    stop: &Receiver<()>,
) {
    let origin = Point2::new(rect.x, rect.y);
    let mut failing = false;
    loop {
        let started = Instant::now();
        match grabber.grab(rect) {
            Ok(img) => {
                if failing {
                    log::info!("capture recovered");
                    slot.report(CaptureNotice::Recovered);
                    failing = false;
                }
                slot.push(Frame::new(slot.next_seq(), origin, img));
            }
            Err(e) => {
                if !failing {
                    log::warn!("capture failed: {e}");
                    slot.report(CaptureNotice::Failed(e.to_string()));
                    failing = true;
                }
            }
        }
        let wait = interval.saturating_sub(started.elapsed());
        match stop.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => return,
        }
    }
}

#[cfg(feature = "image")]
mod files {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use boardsight_core::{RgbImage, ScreenRect};

    use super::{crop_region, CaptureError, FrameGrabber};

    fn map_image_error(e: image::ImageError) -> CaptureError {
        match e {
            image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                CaptureError::PermissionDenied(io.to_string())
            }
            image::ImageError::IoError(io) => CaptureError::Io(io),
            other => CaptureError::Decode(other.to_string()),
        }
    }

    /// Decode an image file into the core RGB buffer.
    pub fn load_rgb(path: impl AsRef<Path>) -> Result<RgbImage, CaptureError> {
        let img = image::open(path).map_err(map_image_error)?.to_rgb8();
        let (w, h) = img.dimensions();
        RgbImage::from_raw(w as usize, h as usize, img.into_raw())
            .ok_or_else(|| CaptureError::Decode("buffer size mismatch".into()))
    }

    /// Encode an RGB buffer; the format follows the file extension.
    pub fn save_rgb(img: &RgbImage, path: impl AsRef<Path>) -> Result<(), CaptureError> {
        let buf = image::RgbImage::from_raw(img.width as u32, img.height as u32, img.data.clone())
            .ok_or_else(|| CaptureError::Decode("buffer size mismatch".into()))?;
        buf.save(path).map_err(map_image_error)
    }

    /// Treats an image file as the screen, re-reading it on every grab so an
    /// external tool can keep overwriting it with fresh screenshots.
    #[derive(Clone, Debug)]
    pub struct ImageFileGrabber {
        path: PathBuf,
    }

    impl ImageFileGrabber {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }
    }

    impl FrameGrabber for ImageFileGrabber {
        fn grab(&self, rect: ScreenRect) -> Result<RgbImage, CaptureError> {
            crop_region(&load_rgb(&self.path)?, rect)
        }
    }

    /// Replays a recorded sequence of screenshots; the last one repeats.
    #[derive(Debug)]
    pub struct ImageSequenceGrabber {
        paths: Vec<PathBuf>,
        next: AtomicUsize,
    }

    impl ImageSequenceGrabber {
        pub fn new(paths: Vec<PathBuf>) -> Self {
            Self {
                paths,
                next: AtomicUsize::new(0),
            }
        }

        /// Every `.png`/`.jpg`/`.jpeg`/`.bmp` file in `dir`, sorted by name.
        pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, CaptureError> {
            let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| {
                    p.extension()
                        .and_then(|x| x.to_str())
                        .map(|x| {
                            matches!(x.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg" | "bmp")
                        })
                        .unwrap_or(false)
                })
                .collect();
            paths.sort();
            Ok(Self::new(paths))
        }

        pub fn len(&self) -> usize {
            self.paths.len()
        }

        pub fn is_empty(&self) -> bool {
            self.paths.is_empty()
        }
    }

    impl FrameGrabber for ImageSequenceGrabber {
        fn grab(&self, rect: ScreenRect) -> Result<RgbImage, CaptureError> {
            let last = self.paths.len().checked_sub(1).ok_or_else(|| {
                CaptureError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "empty screenshot sequence",
                ))
            })?;
            let i = self.next.fetch_add(1, Ordering::Relaxed).min(last);
            crop_region(&load_rgb(&self.paths[i])?, rect)
        }
    }
}

#[cfg(feature = "image")]
pub use files::{load_rgb, save_rgb, ImageFileGrabber, ImageSequenceGrabber};
