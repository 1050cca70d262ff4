//! Synthetic screen and scripted UCI engine for session tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use boardsight::core::{BoardState, RgbImage};
use boardsight::engine::{EngineConnection, EngineError, EngineLauncher};
use boardsight::vision::BoardRenderer;
use boardsight::{Orientation, ScreenRect, SessionEvent};
use crossbeam_channel::Receiver;
use nalgebra::Point2;

pub const SCREEN_PX: usize = 520;

/// A `SCREEN_PX` square screen with `board` drawn at `offset`.
pub fn screen_with(board: &BoardState, offset: Point2<i32>) -> RgbImage {
    let renderer = BoardRenderer::default();
    let art = renderer.render(board, Orientation::WhiteAtBottom);
    let mut screen = RgbImage::filled(SCREEN_PX, SCREEN_PX, [90, 90, 120]);
    for y in 0..art.height {
        for x in 0..art.width {
            let (sx, sy) = (x + offset.x as usize, y + offset.y as usize);
            if sx < SCREEN_PX && sy < SCREEN_PX {
                screen.put_pixel(sx, sy, art.pixel(x, y));
            }
        }
    }
    screen
}

/// Screen rectangle of the 8x8 squares when the board is drawn at `offset`.
pub fn board_rect(offset: Point2<i32>) -> ScreenRect {
    BoardRenderer::default().board_rect(offset)
}

pub fn wait_for(
    events: &Receiver<SessionEvent>,
    timeout: Duration,
    mut pred: impl FnMut(&SessionEvent) -> bool,
) -> Option<SessionEvent> {
    let deadline = Instant::now() + timeout;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(left) {
            Ok(ev) if pred(&ev) => return Some(ev),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

type Responder = dyn Fn(&str) -> Vec<String> + Send + Sync;

/// Answers every `go` after a short delay with the lines `respond(fen)` returns.
pub struct ScriptedEngine {
    respond: Arc<Responder>,
    launches: AtomicUsize,
    live: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn new(respond: impl Fn(&str) -> Vec<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            respond: Arc::new(respond),
            launches: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl EngineLauncher for ScriptedEngine {
    fn launch(&self) -> Result<Box<dyn EngineConnection>, EngineError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            respond: Arc::clone(&self.respond),
            live: Arc::clone(&self.live),
            queue: VecDeque::new(),
            due: None,
            fen: String::new(),
        }))
    }
}

struct ScriptedConnection {
    respond: Arc<Responder>,
    live: Arc<AtomicUsize>,
    queue: VecDeque<String>,
    due: Option<(Instant, Vec<String>)>,
    fen: String,
}

impl ScriptedConnection {
    fn release(&mut self) {
        if self.due.as_ref().is_some_and(|(at, _)| *at <= Instant::now()) {
            if let Some((_, lines)) = self.due.take() {
                self.queue.extend(lines);
            }
        }
    }
}

impl EngineConnection for ScriptedConnection {
    fn send_line(&mut self, line: &str) -> Result<(), EngineError> {
        match line {
            "uci" => self.queue.push_back("uciok".into()),
            "isready" => self.queue.push_back("readyok".into()),
            "stop" => {
                if let Some((at, _)) = self.due.as_mut() {
                    *at = Instant::now();
                }
            }
            _ if line.starts_with("position fen ") => {
                self.fen = line["position fen ".len()..].to_string();
            }
            _ if line.starts_with("go") => {
                let lines = (self.respond)(&self.fen);
                self.due = Some((Instant::now() + Duration::from_millis(5), lines));
            }
            _ => {}
        }
        Ok(())
    }

    fn recv_line(&mut self, timeout: Duration) -> Result<Option<String>, EngineError> {
        self.release();
        if let Some(line) = self.queue.pop_front() {
            return Ok(Some(line));
        }
        thread::sleep(timeout.min(Duration::from_millis(2)));
        self.release();
        Ok(self.queue.pop_front())
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// `info` + `bestmove` lines for a single-line answer; `None` means no legal move.
pub fn best(mv: Option<&str>, cp: i32) -> Vec<String> {
    match mv {
        Some(mv) => vec![
            format!("info depth 10 multipv 1 score cp {cp} pv {mv}"),
            format!("bestmove {mv}"),
        ],
        None => vec!["bestmove (none)".into()],
    }
}
