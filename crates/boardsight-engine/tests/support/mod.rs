//! In-process scripted UCI engine for orchestrator tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use boardsight_engine::{
    EngineConnection, EngineError, EngineEvent, EngineLauncher, RecommendationEvent,
};

/// What the scripted engine does with a `go`.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Emit `lines` after `delay`; a `stop` releases them at once.
    After(Duration, Vec<String>),
    /// Never answer.
    Hang,
    /// Close the connection.
    Crash,
}

type Responder = dyn Fn(usize, &str) -> Reply + Send + Sync;

pub struct ScriptedLauncher {
    respond: Arc<Responder>,
    launches: AtomicUsize,
    live: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLauncher {
    /// `respond(launch_index, fen)` decides the answer to every search.
    pub fn new(respond: impl Fn(usize, &str) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            respond: Arc::new(respond),
            launches: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Connections launched and not yet dropped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("sent log").clone()
    }
}

impl EngineLauncher for ScriptedLauncher {
    fn launch(&self) -> Result<Box<dyn EngineConnection>, EngineError> {
        let index = self.launches.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            index,
            respond: Arc::clone(&self.respond),
            live: Arc::clone(&self.live),
            sent: Arc::clone(&self.sent),
            queue: VecDeque::new(),
            delayed: None,
            fen: String::new(),
            dead: false,
        }))
    }
}

struct ScriptedConnection {
    index: usize,
    respond: Arc<Responder>,
    live: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<String>>>,
    queue: VecDeque<String>,
    delayed: Option<(Instant, Vec<String>)>,
    fen: String,
    dead: bool,
}

impl ScriptedConnection {
    fn release_due(&mut self, now: Instant) {
        if let Some((at, _)) = &self.delayed {
            if *at <= now {
                if let Some((_, lines)) = self.delayed.take() {
                    self.queue.extend(lines);
                }
            }
        }
    }
}

impl EngineConnection for ScriptedConnection {
    fn send_line(&mut self, line: &str) -> Result<(), EngineError> {
        if self.dead {
            return Err(EngineError::Disconnected);
        }
        self.sent.lock().expect("sent log").push(line.to_string());
        match line {
            "uci" => {
                self.queue.push_back("id name scripted".into());
                self.queue.push_back("uciok".into());
            }
            "isready" => self.queue.push_back("readyok".into()),
            "stop" => {
                if let Some((at, _)) = self.delayed.as_mut() {
                    *at = Instant::now();
                }
            }
            _ if line.starts_with("position fen ") => {
                self.fen = line["position fen ".len()..].to_string();
            }
            _ if line.starts_with("go") => match (self.respond)(self.index, &self.fen) {
                Reply::After(delay, lines) => self.delayed = Some((Instant::now() + delay, lines)),
                Reply::Hang => {}
                Reply::Crash => self.dead = true,
            },
            _ => {}
        }
        Ok(())
    }

    fn recv_line(&mut self, timeout: Duration) -> Result<Option<String>, EngineError> {
        if self.dead {
            return Err(EngineError::Disconnected);
        }
        let now = Instant::now();
        self.release_due(now);
        if let Some(line) = self.queue.pop_front() {
            return Ok(Some(line));
        }
        let wait = match &self.delayed {
            Some((at, _)) => at.saturating_duration_since(now).min(timeout),
            None => timeout,
        };
        thread::sleep(wait);
        self.release_due(Instant::now());
        Ok(self.queue.pop_front())
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// `info` lines for `(move, centipawns)` in MultiPV order, then `bestmove`.
pub fn answer(lines: &[(&str, i32)]) -> Vec<String> {
    let mut out: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(i, (mv, cp))| format!("info depth 12 multipv {} score cp {cp} pv {mv}", i + 1))
        .collect();
    if let Some((best, _)) = lines.first() {
        out.push(format!("bestmove {best}"));
    } else {
        out.push("bestmove (none)".into());
    }
    out
}

pub fn next_recommendation(
    events: &crossbeam_channel::Receiver<EngineEvent>,
    timeout: Duration,
) -> Option<RecommendationEvent> {
    let deadline = Instant::now() + timeout;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(left) {
            Ok(EngineEvent::Recommendation(r)) => return Some(r),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

pub fn wait_for_event(
    events: &crossbeam_channel::Receiver<EngineEvent>,
    timeout: Duration,
    mut pred: impl FnMut(&EngineEvent) -> bool,
) -> Option<EngineEvent> {
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
