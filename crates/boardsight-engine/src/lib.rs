//! UCI engine orchestration for boardsight.
//!
//! - [`EngineOrchestrator`] turns committed positions into searches on a
//!   supervised engine and publishes [`RecommendationEvent`]s, discarding
//!   answers to superseded requests.
//! - [`StrengthProfile`] limits the search and, below full skill, lets
//!   [`MoveSelector`] pick among the engine's top lines with a seeded RNG.
//! - [`EngineLauncher`] / [`EngineConnection`] abstract the transport;
//!   [`ProcessLauncher`] runs a real UCI executable.

mod connection;
mod error;
mod orchestrator;
mod params;
mod strength;
mod supervisor;
pub mod uci;

pub use connection::{EngineConnection, EngineLauncher, ProcessLauncher, UciProcess};
pub use error::{EngineConfigError, EngineError, StrengthError};
pub use orchestrator::{
    EngineEvent, EngineHealth, EngineOrchestrator, RecommendationEvent, SequenceGate,
};
pub use params::EngineParams;
pub use strength::{Candidate, MoveSelector, StrengthProfile, MAX_SKILL, MAX_THINK_TIME};
pub use supervisor::EngineRequest;
pub use uci::Score;
