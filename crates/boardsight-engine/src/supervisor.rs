//! A supervised UCI session: handshake, one search at a time, restart with
//! capped exponential backoff.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use boardsight_core::{BoardState, Move};

use crate::connection::{EngineConnection, EngineLauncher};
use crate::error::EngineError;
use crate::params::EngineParams;
use crate::strength::{Candidate, StrengthProfile};
use crate::uci::{self, InfoLine, UciMessage};

const POLL: Duration = Duration::from_millis(10);

/// One search order: a position snapshot plus its limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineRequest {
    pub snapshot: BoardState,
    /// Sequence number of the committed position being searched.
    pub position_seq: u64,
    /// Monotonic per orchestrator; responses to older numbers are stale.
    pub request_seq: u64,
    pub think_time: Duration,
    pub max_depth: Option<u32>,
    pub skill: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SearchOutcome {
    Completed {
        best: Option<Move>,
        candidates: Vec<Candidate>,
    },
    /// A newer request arrived; the engine was stopped and its answer dropped.
    Superseded,
}

pub(crate) struct EngineSession {
    launcher: Arc<dyn EngineLauncher>,
    params: EngineParams,
    profile: StrengthProfile,
    conn: Option<Box<dyn EngineConnection>>,
    restarts: u32,
}

impl EngineSession {
    /// Launch and handshake; errors here reach the caller of `start`.
    pub(crate) fn open(
        launcher: Arc<dyn EngineLauncher>,
        params: EngineParams,
        profile: StrengthProfile,
    ) -> Result<Self, EngineError> {
        let mut session = Self {
            launcher,
            params,
            profile,
            conn: None,
            restarts: 0,
        };
        session.connect()?;
        Ok(session)
    }

    fn multipv(&self) -> usize {
        if self.profile.is_full_strength() {
            1
        } else {
            self.params.candidates
        }
    }

    fn connect(&mut self) -> Result<(), EngineError> {
        self.conn = None;
        let mut conn = self.launcher.launch()?;

        conn.send_line("uci")?;
        wait_for(
            conn.as_mut(),
            UciMessage::UciOk,
            self.params.handshake_timeout(),
            "uci",
        )?;
        conn.send_line(&uci::setoption_command("Skill Level", self.profile.skill()))?;
        let multipv = self.multipv();
        if multipv > 1 {
            conn.send_line(&uci::setoption_command("MultiPV", multipv))?;
        }
        conn.send_line("ucinewgame")?;
        conn.send_line("isready")?;
        wait_for(
            conn.as_mut(),
            UciMessage::ReadyOk,
            self.params.handshake_timeout(),
            "isready",
        )?;

        log::debug!("engine handshake done (multipv {multipv})");
        self.conn = Some(conn);
        Ok(())
    }

    /// Run one search. `superseded` is polled while the engine thinks.
    pub(crate) fn search(
        &mut self,
        req: &EngineRequest,
        superseded: impl Fn() -> bool,
    ) -> Result<SearchOutcome, EngineError> {
        let multipv = self.multipv();
        let conn = self.conn.as_mut().ok_or(EngineError::Disconnected)?;

        conn.send_line(&uci::position_command(&req.snapshot))?;
        conn.send_line(&uci::go_command(req.think_time, req.max_depth))?;

        let mut deadline = Instant::now() + req.think_time + self.params.search_slack();
        let mut stopping = false;
        let mut lines: BTreeMap<usize, InfoLine> = BTreeMap::new();

        loop {
            if !stopping && superseded() {
                conn.send_line("stop")?;
                stopping = true;
                deadline = Instant::now() + self.params.stop_timeout();
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(EngineError::Timeout(if stopping { "stop" } else { "go" }));
            }
            let Some(line) = conn.recv_line(POLL.min(deadline - now))? else {
                continue;
            };
            match UciMessage::parse(&line).map_err(EngineError::Protocol)? {
                UciMessage::Info(info) if info.multipv <= multipv => {
                    lines.insert(info.multipv, info);
                }
                UciMessage::BestMove(_) if stopping => return Ok(SearchOutcome::Superseded),
                UciMessage::BestMove(best) => {
                    self.restarts = 0;
                    let candidates = lines
                        .into_values()
                        .filter_map(|info| {
                            let mv = *info.pv.first()?;
                            Some(Candidate {
                                mv,
                                score: info.score,
                                depth: info.depth,
                                pv: info.pv,
                            })
                        })
                        .collect();
                    return Ok(SearchOutcome::Completed { best, candidates });
                }
                _ => {}
            }
        }
    }

    /// Drop the current engine and start a new one, backing off between
    /// attempts. Fails with `Unavailable` once `max_restarts` consecutive
    /// restarts have been spent, or `Disconnected` if `cancelled` is raised.
    pub(crate) fn recover(
        &mut self,
        cancelled: &AtomicBool,
        mut on_attempt: impl FnMut(u32, Duration),
    ) -> Result<(), EngineError> {
        self.conn = None;
        loop {
            if self.restarts >= self.params.max_restarts {
                return Err(EngineError::Unavailable {
                    restarts: self.restarts,
                });
            }
            self.restarts += 1;
            let delay = self.params.backoff(self.restarts);
            on_attempt(self.restarts, delay);
            if !sleep_unless(cancelled, delay) {
                return Err(EngineError::Disconnected);
            }
            match self.connect() {
                Ok(()) => return Ok(()),
                Err(e) => log::warn!("engine restart {} failed: {e}", self.restarts),
            }
        }
    }
}

fn wait_for(
    conn: &mut dyn EngineConnection,
    want: UciMessage,
    timeout: Duration,
    command: &'static str,
) -> Result<(), EngineError> {
    let deadline = Instant::now() + timeout;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(EngineError::Timeout(command));
        }
        if let Some(line) = conn.recv_line(deadline - now)? {
            if UciMessage::parse(&line).ok().as_ref() == Some(&want) {
                return Ok(());
            }
        }
    }
}

/// Sleep for `total`, waking early when `cancelled` is raised. Returns
/// `false` if cancelled.
fn sleep_unless(cancelled: &AtomicBool, total: Duration) -> bool {
    let until = Instant::now() + total;
    loop {
        if cancelled.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= until {
            return true;
        }
        thread::sleep(POLL.min(until - now));
    }
}
