//! Analysis session: the explicit context that wires capture, extraction,
//! tracking and the engine together and owns their lifecycle.
//!
//! ```text
//!  capture thread ──FrameSlot──▶ pipeline worker ──submit──▶ engine worker
//!  (cadence)        (newest)      extract → policy → track     (orchestrator)
//!                                         │                          │
//!                                         └──────SessionEvent◀───────┘
//! ```
//!
//! Calibration and strength changes happen while stopped; `recalibrate` is
//! the one region change allowed mid-run. The grid is published as a whole
//! `Arc`, so the worker always extracts against one consistent grid.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use boardsight_core::{BoardState, Frame, Move, ScreenRect};
use boardsight_engine::{
    EngineError, EngineEvent, EngineHealth, EngineLauncher, EngineOrchestrator,
    RecommendationEvent, StrengthError, StrengthProfile,
};
use boardsight_tracker::{
    InitialPosition, Outcome, PositionTracker, RulesOracle, ShakmatyOracle, TrackerError,
    TrackerState,
};
use boardsight_vision::{
    calibrate, regrid, CalibratedGrid, CalibrationError, ConfidencePolicy, ConfigIoError,
    Extractor, Orientation, StoredCalibration,
};
use crossbeam_channel::{select, Receiver, Sender};
use nalgebra::Point2;
use serde::Serialize;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::capture::{CaptureError, CaptureNotice, CaptureSource, FrameGrabber, FrameSlot};
use crate::config::SessionConfig;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("no calibrated region; select one first")]
    NotCalibrated,
    #[error("analysis is already running")]
    AlreadyRunning,
    #[error("not allowed while analysis is running")]
    Running,
    #[error("calibration failed: {0}")]
    Calibration(#[from] CalibrationError),
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error("failed to start engine: {0}")]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Strength(#[from] StrengthError),
    #[error(transparent)]
    Config(#[from] ConfigIoError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything a session reports to its caller.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Calibrated {
        region: ScreenRect,
        orientation: Orientation,
    },
    CalibrationFailed(CalibrationError),
    /// A new position entered the committed stream; `mv` is `None` for the
    /// initial position of a calibration.
    PositionCommitted {
        position_seq: u64,
        fen: String,
        mv: Option<Move>,
    },
    TrackerStateChanged {
        from: TrackerState,
        to: TrackerState,
    },
    /// The tracker lost the game; select the region again.
    RecalibrationRecommended,
    CaptureFailed(String),
    CaptureRecovered,
    Recommendation(RecommendationEvent),
    EngineHealth {
        health: EngineHealth,
        detail: Option<String>,
    },
    /// The committed position has no legal move.
    GameOver { position_seq: u64 },
    Started,
    Stopped,
}

/// Snapshot returned by [`Session::status`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionStatus {
    pub running: bool,
    pub region: Option<ScreenRect>,
    pub orientation: Option<Orientation>,
    pub tracker_state: TrackerState,
    pub position_seq: u64,
    pub fen: Option<String>,
    pub desync_count: u32,
    /// `None` while no engine is running.
    pub engine_health: Option<EngineHealth>,
    pub last_recommendation: Option<RecommendationEvent>,
    pub frames_processed: u64,
    pub frames_dropped: u64,
}

/// Current grid, replaced wholesale on (re)calibration.
#[derive(Default)]
struct GridHandle(RwLock<Option<Arc<CalibratedGrid>>>);

impl GridHandle {
    fn current(&self) -> Option<Arc<CalibratedGrid>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn publish(&self, grid: Arc<CalibratedGrid>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(grid);
    }
}

/// Tracker-side state, shared by the session and its pipeline worker.
struct Context {
    tracker: PositionTracker,
    policy: ConfidencePolicy,
}

fn lock(context: &Mutex<Context>) -> MutexGuard<'_, Context> {
    context.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Running {
    capture: CaptureSource,
    engine: Arc<EngineOrchestrator>,
    stop_tx: Sender<()>,
    worker: JoinHandle<()>,
}

pub struct Session {
    config: SessionConfig,
    grabber: Arc<dyn FrameGrabber>,
    launcher: Arc<dyn EngineLauncher>,
    extractor: Extractor,
    context: Arc<Mutex<Context>>,
    grid: Arc<GridHandle>,
    slot: FrameSlot,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
    processed: Arc<AtomicU64>,
    last_recommendation: Option<RecommendationEvent>,
    running: Option<Running>,
}

impl Session {
    /// Validate the configuration. Nothing is captured or launched yet.
    pub fn new(
        config: SessionConfig,
        grabber: Arc<dyn FrameGrabber>,
        launcher: Arc<dyn EngineLauncher>,
    ) -> Result<Self, SessionError> {
        Self::with_oracle(config, grabber, launcher, Arc::new(ShakmatyOracle))
    }

    pub fn with_oracle(
        config: SessionConfig,
        grabber: Arc<dyn FrameGrabber>,
        launcher: Arc<dyn EngineLauncher>,
        oracle: Arc<dyn RulesOracle>,
    ) -> Result<Self, SessionError> {
        config.engine.validate().map_err(EngineError::from)?;
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let context = Context {
            tracker: PositionTracker::new(config.tracker.clone(), oracle),
            policy: ConfidencePolicy::new(&config.extractor),
        };
        Ok(Self {
            extractor: Extractor::new(config.extractor.clone()),
            config,
            grabber,
            launcher,
            context: Arc::new(Mutex::new(context)),
            grid: Arc::new(GridHandle::default()),
            slot: FrameSlot::new(),
            events_tx,
            events_rx,
            processed: Arc::new(AtomicU64::new(0)),
            last_recommendation: None,
            running: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn events(&self) -> Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn grid(&self) -> Option<Arc<CalibratedGrid>> {
        self.grid.current()
    }

    /// The current grid packaged for reuse in a later session.
    pub fn stored_calibration(&self) -> Option<StoredCalibration> {
        self.grid.current().map(|grid| StoredCalibration {
            grid: grid.as_ref().clone(),
            calibration: self.config.calibration.clone(),
            extractor: self.config.extractor.clone(),
        })
    }

    /// Calibrate `rect` from freshly grabbed frames of the starting position
    /// and commit the initial position. Only while stopped.
    pub fn select_region(&mut self, rect: ScreenRect) -> Result<(), SessionError> {
        if self.running.is_some() {
            return Err(SessionError::Running);
        }
        lock(&self.context).tracker.begin_calibration(rect);
        let frames = match self.sample(rect) {
            Ok(frames) => frames,
            Err(e) => {
                lock(&self.context).tracker.calibration_failed();
                return Err(e.into());
            }
        };
        let grid = match calibrate(rect, &frames, &self.config.calibration) {
            Ok(grid) => grid,
            Err(e) => return Err(self.calibration_failed(e)),
        };
        self.install(grid, &frames)
    }

    /// Reuse a grid from an earlier session for the same screen layout.
    /// The initial position is established the same way as for
    /// [`Session::select_region`].
    pub fn restore_calibration(&mut self, grid: CalibratedGrid) -> Result<(), SessionError> {
        if self.running.is_some() {
            return Err(SessionError::Running);
        }
        if let Err(e) = grid.validate() {
            log::warn!("stored calibration rejected: {e}");
            self.emit(SessionEvent::CalibrationFailed(e.clone()));
            return Err(e.into());
        }
        let rect = grid.region;
        lock(&self.context).tracker.begin_calibration(rect);
        let frames = match self.sample(rect) {
            Ok(frames) => frames,
            Err(e) => {
                lock(&self.context).tracker.calibration_failed();
                return Err(e.into());
            }
        };
        self.install(grid, &frames)
    }

    /// Replace the grid geometry for a moved or resized board, keeping the
    /// learned references and the committed game. Allowed while running.
    pub fn recalibrate(&mut self, rect: ScreenRect) -> Result<(), SessionError> {
        let previous = self.grid.current().ok_or(SessionError::NotCalibrated)?;
        let frames = self.sample(rect)?;
        let grid = match regrid(rect, &frames, &previous, &self.config.calibration) {
            Ok(grid) => grid,
            Err(e) => {
                log::warn!("recalibration of {rect:?} failed: {e}");
                self.emit(SessionEvent::CalibrationFailed(e.clone()));
                return Err(e.into());
            }
        };
        let orientation = grid.orientation;
        self.grid.publish(Arc::new(grid));
        {
            let mut ctx = lock(&self.context);
            let before = ctx.tracker.state();
            ctx.tracker.recalibrated();
            ctx.policy.reset();
            let after = ctx.tracker.state();
            if before != after {
                self.emit(SessionEvent::TrackerStateChanged {
                    from: before,
                    to: after,
                });
            }
        }
        log::info!("region recalibrated to {rect:?}");
        self.emit(SessionEvent::Calibrated {
            region: rect,
            orientation,
        });

        if let Some(run) = self.running.as_mut() {
            run.capture.stop();
            run.capture = CaptureSource::spawn(
                Arc::clone(&self.grabber),
                rect,
                self.config.capture.interval(),
                self.slot.clone(),
            )?;
        }
        Ok(())
    }

    /// Replace the strength profile for the next run. Only while stopped.
    pub fn set_strength(&mut self, profile: StrengthProfile) -> Result<(), SessionError> {
        if self.running.is_some() {
            return Err(SessionError::Running);
        }
        log::info!(
            "strength set to skill {} / {:?}",
            profile.skill(),
            profile.think_time()
        );
        self.config.strength = profile;
        Ok(())
    }

    /// Launch the engine, start capturing and begin tracking. The current
    /// committed position is searched right away.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.running.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        let grid = self.grid.current().ok_or(SessionError::NotCalibrated)?;
        let (board, position_seq) = {
            let ctx = lock(&self.context);
            if ctx.tracker.state() == TrackerState::Calibrating {
                return Err(SessionError::NotCalibrated);
            }
            let board = ctx
                .tracker
                .committed()
                .cloned()
                .ok_or(SessionError::NotCalibrated)?;
            (board, ctx.tracker.position_seq())
        };

        let engine = Arc::new(EngineOrchestrator::start(
            self.config.engine.clone(),
            self.config.strength.clone(),
            Arc::clone(&self.launcher),
        )?);
        while self.slot.try_take().is_some() {}
        let capture = CaptureSource::spawn(
            Arc::clone(&self.grabber),
            grid.region,
            self.config.capture.interval(),
            self.slot.clone(),
        )?;

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let worker = PipelineWorker {
            context: Arc::clone(&self.context),
            grid: Arc::clone(&self.grid),
            extractor: self.extractor.clone(),
            slot: self.slot.clone(),
            engine: Arc::clone(&engine),
            engine_events: engine.events(),
            events: self.events_tx.clone(),
            stop: stop_rx,
            processed: Arc::clone(&self.processed),
        };
        let worker = thread::Builder::new()
            .name("boardsight-pipeline".to_string())
            .spawn(move || worker.run())?;

        if let Err(e) = engine.submit(&board, position_seq) {
            log::warn!("initial search not queued: {e}");
        }
        self.running = Some(Running {
            capture,
            engine,
            stop_tx,
            worker,
        });
        log::info!("analysis started on {:?}", grid.region);
        self.emit(SessionEvent::Started);
        Ok(())
    }

    /// Halt capture and tracking, cancel outstanding searches and release
    /// the engine. Safe to call repeatedly.
    pub fn stop(&mut self) {
        let Some(run) = self.running.take() else {
            return;
        };
        let Running {
            mut capture,
            engine,
            stop_tx,
            worker,
        } = run;
        capture.stop();
        drop(stop_tx);
        if worker.join().is_err() {
            log::error!("pipeline worker panicked");
        }
        engine.cancel_all();
        self.last_recommendation = engine.last_recommendation();
        match Arc::try_unwrap(engine) {
            Ok(mut engine) => engine.stop(),
            Err(_) => log::warn!("engine still shared; it stops with its last handle"),
        }
        log::info!("analysis stopped");
        self.emit(SessionEvent::Stopped);
    }

    pub fn status(&self) -> SessionStatus {
        let grid = self.grid.current();
        let ctx = lock(&self.context);
        let (engine_health, last_recommendation) = match &self.running {
            Some(run) => (Some(run.engine.health()), run.engine.last_recommendation()),
            None => (None, self.last_recommendation.clone()),
        };
        SessionStatus {
            running: self.running.is_some(),
            region: grid.as_ref().map(|g| g.region),
            orientation: grid.as_ref().map(|g| g.orientation),
            tracker_state: ctx.tracker.state(),
            position_seq: ctx.tracker.position_seq(),
            fen: ctx.tracker.committed().map(BoardState::to_fen),
            desync_count: ctx.tracker.desync_count(),
            engine_health,
            last_recommendation,
            frames_processed: self.processed.load(Ordering::Relaxed),
            frames_dropped: self.slot.dropped(),
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    fn calibration_failed(&self, e: CalibrationError) -> SessionError {
        log::warn!("calibration failed: {e}");
        lock(&self.context).tracker.calibration_failed();
        self.emit(SessionEvent::CalibrationFailed(e.clone()));
        e.into()
    }

    fn sample(&self, rect: ScreenRect) -> Result<Vec<Frame>, CaptureError> {
        let n = self.config.capture.sample_frames.max(1);
        let origin = Point2::new(rect.x, rect.y);
        let mut frames = Vec::with_capacity(n);
        for i in 0..n {
            if i > 0 {
                thread::sleep(self.config.capture.sample_gap());
            }
            let image = self.grabber.grab(rect)?;
            frames.push(Frame::new(self.slot.next_seq(), origin, image));
        }
        Ok(frames)
    }

    /// Establish the initial position for `grid` and publish it.
    fn install(&mut self, grid: CalibratedGrid, frames: &[Frame]) -> Result<(), SessionError> {
        let position_seq = {
            let mut ctx = lock(&self.context);
            let initial = match (self.config.tracker.initial_position, frames.last()) {
                (InitialPosition::BoardRead, Some(frame)) => {
                    let readings = self.extractor.extract(frame, &grid);
                    ctx.tracker.complete_calibration_from_read(&readings)
                }
                _ => ctx
                    .tracker
                    .complete_calibration(BoardState::starting_position()),
            };
            match initial {
                Ok(seq) => {
                    ctx.policy.reset();
                    seq
                }
                Err(e) => {
                    ctx.tracker.calibration_failed();
                    log::warn!("initial position rejected: {e}");
                    return Err(e.into());
                }
            }
        };
        let fen = lock(&self.context)
            .tracker
            .committed()
            .map(BoardState::to_fen)
            .unwrap_or_default();

        let (region, orientation) = (grid.region, grid.orientation);
        self.grid.publish(Arc::new(grid));
        log::info!("calibrated {region:?} ({orientation:?}), position #{position_seq}: {fen}");
        self.emit(SessionEvent::Calibrated {
            region,
            orientation,
        });
        self.emit(SessionEvent::PositionCommitted {
            position_seq,
            fen,
            mv: None,
        });
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PipelineWorker {
    context: Arc<Mutex<Context>>,
    grid: Arc<GridHandle>,
    extractor: Extractor,
    slot: FrameSlot,
    engine: Arc<EngineOrchestrator>,
    engine_events: Receiver<EngineEvent>,
    events: Sender<SessionEvent>,
    stop: Receiver<()>,
    processed: Arc<AtomicU64>,
}

impl PipelineWorker {
    fn run(self) {
        let mut engine_events = self.engine_events.clone();
        loop {
            select! {
                recv(self.stop) -> _ => return,
                recv(self.slot.frames()) -> frame => {
                    if let Ok(frame) = frame {
                        self.process(&frame);
                    }
                }
                recv(self.slot.notices()) -> notice => match notice {
                    Ok(CaptureNotice::Failed(reason)) => self.emit(SessionEvent::CaptureFailed(reason)),
                    Ok(CaptureNotice::Recovered) => self.emit(SessionEvent::CaptureRecovered),
                    Err(_) => {}
                },
                recv(engine_events) -> event => match event {
                    Ok(event) => self.forward(event),
                    // engine worker gone; keep tracking without it
                    Err(_) => engine_events = crossbeam_channel::never(),
                },
            }
        }
    }

    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(seq = frame.seq)))]
    fn process(&self, frame: &Frame) {
        let Some(grid) = self.grid.current() else {
            return;
        };
        if !frame.bounds().contains(&grid.region) {
            log::trace!("frame #{} predates the current region", frame.seq);
            return;
        }
        let readings = self.extractor.extract(frame, &grid);
        self.processed.fetch_add(1, Ordering::Relaxed);

        let observation = {
            let mut ctx = lock(&self.context);
            let Context { tracker, policy } = &mut *ctx;
            let filtered = policy.apply(&readings, tracker.committed());
            tracker.observe(&filtered)
        };

        if let Some((from, to)) = observation.transition {
            self.emit(SessionEvent::TrackerStateChanged { from, to });
        }
        if observation.recalibration_recommended {
            self.emit(SessionEvent::RecalibrationRecommended);
        }
        if let Outcome::Committed(t) = observation.outcome {
            self.emit(SessionEvent::PositionCommitted {
                position_seq: t.position_seq,
                fen: t.new.to_fen(),
                mv: Some(t.mv),
            });
            if let Err(e) = self.engine.submit(&t.new, t.position_seq) {
                log::debug!("position #{} not searched: {e}", t.position_seq);
            }
        }
    }

    fn forward(&self, event: EngineEvent) {
        let event = match event {
            EngineEvent::Recommendation(r) => SessionEvent::Recommendation(r),
            EngineEvent::Health { health, detail } => SessionEvent::EngineHealth { health, detail },
            EngineEvent::NoLegalMove { position_seq, .. } => SessionEvent::GameOver { position_seq },
        };
        self.emit(event);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
