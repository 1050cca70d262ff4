//! Strength shaping: search limits plus seeded sub-optimal move choice.

use std::time::Duration;

use boardsight_core::Move;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::StrengthError;
use crate::uci::Score;

pub const MAX_SKILL: u8 = 20;
pub const MAX_THINK_TIME: Duration = Duration::from_secs(60);

/// Softmax temperature added per skill level below the maximum, in centipawns.
const TEMPERATURE_PER_LEVEL: f64 = 12.0;

/// Validated strength configuration; immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStrengthProfile", into = "RawStrengthProfile")]
pub struct StrengthProfile {
    skill: u8,
    think_time: Duration,
    seed: u64,
    max_depth: Option<u32>,
}

impl StrengthProfile {
    pub fn new(skill: u8, think_time: Duration, seed: u64) -> Result<Self, StrengthError> {
        if skill > MAX_SKILL {
            return Err(StrengthError::SkillOutOfRange(skill));
        }
        if think_time.is_zero() {
            return Err(StrengthError::ZeroThinkTime);
        }
        if think_time > MAX_THINK_TIME {
            return Err(StrengthError::ThinkTimeTooLong(think_time));
        }
        Ok(Self {
            skill,
            think_time,
            seed,
            max_depth: None,
        })
    }

    pub fn with_max_depth(mut self, depth: u32) -> Result<Self, StrengthError> {
        if depth == 0 {
            return Err(StrengthError::ZeroDepth);
        }
        self.max_depth = Some(depth);
        Ok(self)
    }

    /// Full strength: always the engine's first choice.
    pub fn full(think_time: Duration) -> Result<Self, StrengthError> {
        Self::new(MAX_SKILL, think_time, 0)
    }

    pub fn skill(&self) -> u8 {
        self.skill
    }

    pub fn think_time(&self) -> Duration {
        self.think_time
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn max_depth(&self) -> Option<u32> {
        self.max_depth
    }

    pub fn is_full_strength(&self) -> bool {
        self.skill == MAX_SKILL
    }
}

impl Default for StrengthProfile {
    fn default() -> Self {
        Self {
            skill: MAX_SKILL,
            think_time: Duration::from_millis(500),
            seed: 0,
            max_depth: None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawStrengthProfile {
    skill: u8,
    think_time_ms: u64,
    #[serde(default)]
    seed: u64,
    #[serde(default)]
    max_depth: Option<u32>,
}

impl TryFrom<RawStrengthProfile> for StrengthProfile {
    type Error = StrengthError;

    fn try_from(raw: RawStrengthProfile) -> Result<Self, Self::Error> {
        let profile = Self::new(raw.skill, Duration::from_millis(raw.think_time_ms), raw.seed)?;
        match raw.max_depth {
            Some(d) => profile.with_max_depth(d),
            None => Ok(profile),
        }
    }
}

impl From<StrengthProfile> for RawStrengthProfile {
    fn from(p: StrengthProfile) -> Self {
        Self {
            skill: p.skill,
            think_time_ms: p.think_time.as_millis() as u64,
            seed: p.seed,
            max_depth: p.max_depth,
        }
    }
}

/// One line of a MultiPV search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub mv: Move,
    pub score: Score,
    pub depth: Option<u32>,
    pub pv: Vec<Move>,
}

/// Picks among engine candidates with a seeded softmax over centipawn loss.
///
/// The temperature grows linearly as skill drops; at full strength the best
/// candidate is always returned. A selector replays the same choices for the
/// same seed and candidate lists.
#[derive(Clone, Debug)]
pub struct MoveSelector {
    skill: u8,
    rng: StdRng,
}

impl MoveSelector {
    pub fn new(profile: &StrengthProfile) -> Self {
        Self {
            skill: profile.skill,
            rng: StdRng::seed_from_u64(profile.seed),
        }
    }

    pub fn temperature_cp(&self) -> f64 {
        f64::from(MAX_SKILL + 1 - self.skill) * TEMPERATURE_PER_LEVEL
    }

    /// Index of the chosen candidate; `candidates` is ordered best first.
    pub fn choose(&mut self, candidates: &[Candidate]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        if self.skill >= MAX_SKILL || candidates.len() == 1 {
            return Some(0);
        }

        let best = candidates
            .iter()
            .map(|c| c.score.to_centipawns())
            .max()
            .unwrap_or(0);
        let t = self.temperature_cp();
        let weights: Vec<f64> = candidates
            .iter()
            .map(|c| (f64::from(c.score.to_centipawns() - best) / t).exp())
            .collect();
        let total: f64 = weights.iter().sum();

        let mut r = self.rng.random::<f64>() * total;
        for (i, w) in weights.iter().enumerate() {
            if r < *w {
                return Some(i);
            }
            r -= w;
        }
        Some(candidates.len() - 1)
    }
}
