use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineConfigError;

/// Engine process and supervision settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    /// UCI engine executable; looked up on `PATH` when not absolute.
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Budget for `uci`/`uciok` and `isready`/`readyok`.
    pub handshake_timeout_ms: u64,
    /// Grace beyond the think time before a search counts as hung.
    pub search_slack_ms: u64,
    /// Budget for the `bestmove` that follows a `stop`.
    pub stop_timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Consecutive restarts tolerated before the engine is declared unavailable.
    pub max_restarts: u32,
    /// MultiPV lines requested when strength shaping is active.
    pub candidates: usize,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            program: PathBuf::from("stockfish"),
            args: Vec::new(),
            handshake_timeout_ms: 5_000,
            search_slack_ms: 2_000,
            stop_timeout_ms: 1_000,
            backoff_base_ms: 250,
            backoff_cap_ms: 8_000,
            max_restarts: 5,
            candidates: 4,
        }
    }
}

impl EngineParams {
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        if self.program.as_os_str().is_empty() {
            return Err(EngineConfigError::EmptyProgram);
        }
        if self.candidates == 0 {
            return Err(EngineConfigError::ZeroCandidates);
        }
        for (name, v) in [
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("stop_timeout_ms", self.stop_timeout_ms),
            ("backoff_base_ms", self.backoff_base_ms),
        ] {
            if v == 0 {
                return Err(EngineConfigError::ZeroTimeout(name));
            }
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn search_slack(&self) -> Duration {
        Duration::from_millis(self.search_slack_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Delay before restart number `attempt` (1-based): doubles from the base, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << shift)
            .min(self.backoff_cap_ms.max(self.backoff_base_ms));
        Duration::from_millis(ms)
    }
}
