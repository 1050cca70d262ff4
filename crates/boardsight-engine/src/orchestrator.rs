//! Engine orchestrator.
//!
//! Owns one supervised engine on a worker thread. Callers hand over
//! committed positions with [`EngineOrchestrator::submit`], which never
//! blocks: each call issues a fresh request number and the worker only ever
//! searches the newest one. A response is published only if its request is
//! still the latest when it arrives; anything older is dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use boardsight_core::{BoardState, Move, PieceKind, Square};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::connection::EngineLauncher;
use crate::error::EngineError;
use crate::params::EngineParams;
use crate::strength::{Candidate, MoveSelector, StrengthProfile, MAX_SKILL};
use crate::supervisor::{EngineRequest, EngineSession, SearchOutcome};
use crate::uci::Score;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineHealth {
    Healthy,
    /// Restarting after a timeout or crash; recommendations are stale.
    Degraded,
    /// Restart budget exhausted; no further searches.
    Unavailable,
}

/// A move suggestion for one committed position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationEvent {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
    /// From the side to move; `None` if the engine gave no score.
    pub evaluation: Option<Score>,
    pub pv: Vec<Move>,
    pub depth: Option<u32>,
    /// Set once a newer position has been submitted.
    pub stale: bool,
    pub position_seq: u64,
    pub request_seq: u64,
}

impl RecommendationEvent {
    pub fn mv(&self) -> Move {
        Move {
            from: self.from,
            to: self.to,
            promotion: self.promotion,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    Recommendation(RecommendationEvent),
    Health {
        health: EngineHealth,
        detail: Option<String>,
    },
    /// The searched position is mate or stalemate.
    NoLegalMove { position_seq: u64, request_seq: u64 },
}

/// Issues request numbers and tells whether a number is still the newest.
#[derive(Debug, Default)]
pub struct SequenceGate {
    latest: AtomicU64,
}

impl SequenceGate {
    pub fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, seq: u64) -> bool {
        self.latest() == seq
    }

    /// Make every issued number stale.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }
}

struct Shared {
    health: EngineHealth,
    last: Option<RecommendationEvent>,
}

enum Command {
    Search(EngineRequest),
    CancelAll,
    Stop,
}

pub struct EngineOrchestrator {
    commands: Sender<Command>,
    events: Receiver<EngineEvent>,
    gate: Arc<SequenceGate>,
    shared: Arc<Mutex<Shared>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    profile: StrengthProfile,
    params: EngineParams,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EngineOrchestrator {
    /// Validate the configuration, start the engine and complete the
    /// handshake. A missing executable fails here with `EngineError::Spawn`.
    pub fn start(
        params: EngineParams,
        profile: StrengthProfile,
        launcher: Arc<dyn EngineLauncher>,
    ) -> Result<Self, EngineError> {
        params.validate()?;
        let session = EngineSession::open(launcher, params.clone(), profile.clone())?;

        let (commands, command_rx) = crossbeam_channel::unbounded();
        let (event_tx, events) = crossbeam_channel::unbounded();
        let gate = Arc::new(SequenceGate::default());
        let shared = Arc::new(Mutex::new(Shared {
            health: EngineHealth::Healthy,
            last: None,
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            session,
            commands: command_rx,
            events: event_tx,
            gate: Arc::clone(&gate),
            shared: Arc::clone(&shared),
            shutdown: Arc::clone(&shutdown),
            selector: MoveSelector::new(&profile),
        };
        let handle = thread::Builder::new()
            .name("engine-orchestrator".to_string())
            .spawn(move || worker.run())?;

        log::info!(
            "engine orchestrator started (skill {}, {:?} per move)",
            profile.skill(),
            profile.think_time()
        );
        Ok(Self {
            commands,
            events,
            gate,
            shared,
            shutdown,
            worker: Some(handle),
            profile,
            params,
        })
    }

    /// Queue a search of `snapshot`, superseding any outstanding one.
    /// Returns the request number that a matching recommendation will carry.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, snapshot)))]
    pub fn submit(&self, snapshot: &BoardState, position_seq: u64) -> Result<u64, EngineError> {
        if self.health() == EngineHealth::Unavailable {
            return Err(EngineError::Unavailable {
                restarts: self.params.max_restarts,
            });
        }
        let request_seq = self.gate.issue();
        self.mark_stale();
        let req = EngineRequest {
            snapshot: snapshot.clone(),
            position_seq,
            request_seq,
            think_time: self.profile.think_time(),
            max_depth: self.profile.max_depth(),
            skill: self.profile.skill(),
        };
        self.commands
            .send(Command::Search(req))
            .map_err(|_| EngineError::Disconnected)?;
        log::debug!("request #{request_seq} for position #{position_seq}");
        Ok(request_seq)
    }

    /// Abandon every outstanding request; late answers are discarded.
    pub fn cancel_all(&self) {
        self.gate.invalidate();
        self.mark_stale();
        let _ = self.commands.send(Command::CancelAll);
    }

    pub fn health(&self) -> EngineHealth {
        lock(&self.shared).health
    }

    /// Most recent published recommendation; `stale` once superseded.
    pub fn last_recommendation(&self) -> Option<RecommendationEvent> {
        lock(&self.shared).last.clone()
    }

    pub fn events(&self) -> Receiver<EngineEvent> {
        self.events.clone()
    }

    pub fn profile(&self) -> &StrengthProfile {
        &self.profile
    }

    /// Cancel outstanding work, stop the worker and release the engine.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        self.gate.invalidate();
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.commands.send(Command::Stop);
        if handle.join().is_err() {
            log::error!("engine worker panicked");
        }
        self.mark_stale();
        log::info!("engine orchestrator stopped");
    }

    fn mark_stale(&self) {
        if let Some(last) = lock(&self.shared).last.as_mut() {
            last.stale = true;
        }
    }
}

impl Drop for EngineOrchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    session: EngineSession,
    commands: Receiver<Command>,
    events: Sender<EngineEvent>,
    gate: Arc<SequenceGate>,
    shared: Arc<Mutex<Shared>>,
    shutdown: Arc<AtomicBool>,
    selector: MoveSelector,
}

impl Worker {
    fn run(mut self) {
        let mut pending: Option<EngineRequest> = None;
        loop {
            let first = if pending.is_some() {
                self.commands.try_recv().ok()
            } else {
                match self.commands.recv() {
                    Ok(cmd) => Some(cmd),
                    Err(_) => return,
                }
            };
            // newest search wins
            for cmd in first.into_iter().chain(self.commands.try_iter()) {
                match cmd {
                    Command::Search(req) => pending = Some(req),
                    Command::CancelAll => pending = None,
                    Command::Stop => return,
                }
            }

            let Some(req) = pending.take() else { continue };
            if !self.gate.is_current(req.request_seq) {
                continue;
            }

            let gate = Arc::clone(&self.gate);
            let shutdown = Arc::clone(&self.shutdown);
            let seq = req.request_seq;
            let result = self.session.search(&req, || {
                !gate.is_current(seq) || shutdown.load(Ordering::SeqCst)
            });

            match result {
                Ok(SearchOutcome::Completed { best, candidates }) => {
                    self.set_health(EngineHealth::Healthy, None);
                    self.publish(&req, best, candidates);
                }
                Ok(SearchOutcome::Superseded) => {
                    log::debug!("request #{seq} superseded");
                }
                Err(_) if self.shutdown.load(Ordering::SeqCst) => return,
                Err(e) => {
                    log::warn!("engine failed on request #{seq}: {e}");
                    self.set_health(EngineHealth::Degraded, Some(e.to_string()));
                    let events = self.events.clone();
                    let recovered = self.session.recover(&self.shutdown, |attempt, delay| {
                        log::warn!("restarting engine (attempt {attempt}) in {delay:?}");
                        let _ = events.send(EngineEvent::Health {
                            health: EngineHealth::Degraded,
                            detail: Some(format!("restart attempt {attempt}")),
                        });
                    });
                    match recovered {
                        Ok(()) => pending = Some(req),
                        Err(e @ EngineError::Unavailable { .. }) => {
                            log::error!("{e}");
                            self.set_health(EngineHealth::Unavailable, Some(e.to_string()));
                            return;
                        }
                        Err(_) => return,
                    }
                }
            }
        }
    }

    fn publish(&mut self, req: &EngineRequest, best: Option<Move>, candidates: Vec<Candidate>) {
        let Some(best) = best else {
            let _shared = lock(&self.shared);
            if !self.gate.is_current(req.request_seq) {
                log::debug!("discarding stale game-over answer to request #{}", req.request_seq);
                return;
            }
            log::info!("no legal move in position #{}", req.position_seq);
            let _ = self.events.send(EngineEvent::NoLegalMove {
                position_seq: req.position_seq,
                request_seq: req.request_seq,
            });
            return;
        };

        let chosen = if req.skill >= MAX_SKILL {
            candidates
                .iter()
                .find(|c| c.mv == best)
                .or_else(|| candidates.first())
                .cloned()
                .map(|c| Candidate { mv: best, ..c })
        } else {
            self.selector
                .choose(&candidates)
                .and_then(|i| candidates.get(i).cloned())
        };
        let (mv, evaluation, pv, depth) = match chosen {
            Some(c) => (c.mv, Some(c.score), c.pv, c.depth),
            None => (best, None, vec![best], None),
        };

        let mut shared = lock(&self.shared);
        if !self.gate.is_current(req.request_seq) {
            log::debug!("discarding stale response to request #{}", req.request_seq);
            return;
        }
        let event = RecommendationEvent {
            from: mv.from,
            to: mv.to,
            promotion: mv.promotion,
            evaluation,
            pv,
            depth,
            stale: false,
            position_seq: req.position_seq,
            request_seq: req.request_seq,
        };
        log::info!(
            "position #{}: {} ({})",
            req.position_seq,
            mv,
            evaluation.map(|s| s.to_string()).unwrap_or_else(|| "?".into())
        );
        shared.last = Some(event.clone());
        let _ = self.events.send(EngineEvent::Recommendation(event));
    }

    fn set_health(&self, health: EngineHealth, detail: Option<String>) {
        let mut shared = lock(&self.shared);
        if shared.health == health {
            return;
        }
        shared.health = health;
        if health != EngineHealth::Healthy {
            if let Some(last) = shared.last.as_mut() {
                last.stale = true;
            }
        }
        drop(shared);
        log::info!("engine health: {health:?}");
        let _ = self.events.send(EngineEvent::Health { health, detail });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_tracks_only_the_newest_number() {
        let gate = SequenceGate::default();
        let a = gate.issue();
        let b = gate.issue();
        assert!(b > a);
        assert!(!gate.is_current(a));
        assert!(gate.is_current(b));
        gate.invalidate();
        assert!(!gate.is_current(b));
        assert!(gate.issue() > b);
    }
}
