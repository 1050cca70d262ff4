use std::io;
use std::time::Duration;

/// Rejected [`crate::StrengthProfile`] values. Nothing is clamped.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StrengthError {
    #[error("skill level {0} outside 0..={max}", max = crate::strength::MAX_SKILL)]
    SkillOutOfRange(u8),
    #[error("think time must be positive")]
    ZeroThinkTime,
    #[error("think time {0:?} exceeds {max:?}", max = crate::strength::MAX_THINK_TIME)]
    ThinkTimeTooLong(Duration),
    #[error("search depth must be positive")]
    ZeroDepth,
}

/// Rejected [`crate::EngineParams`] values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineConfigError {
    #[error("engine program path is empty")]
    EmptyProgram,
    #[error("candidate count must be positive")]
    ZeroCandidates,
    #[error("{0} must be positive")]
    ZeroTimeout(&'static str),
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("failed to start engine `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("engine io: {0}")]
    Io(#[from] io::Error),
    #[error("engine did not answer `{0}` in time")]
    Timeout(&'static str),
    #[error("unexpected engine output: {0}")]
    Protocol(String),
    #[error("engine connection closed")]
    Disconnected,
    #[error("engine unavailable after {restarts} restarts")]
    Unavailable { restarts: u32 },
    #[error(transparent)]
    Config(#[from] EngineConfigError),
    #[error(transparent)]
    Strength(#[from] StrengthError),
}
