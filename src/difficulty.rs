//! Difficulty adaptation
//!
//! Recommends raising, holding or lowering the exercise difficulty from a
//! performance sample. Samples are aggregated from completed exercises every K
//! completions, never per interaction.

use serde::{Deserialize, Serialize};

/// Success rate (percent) below which difficulty is lowered
pub const LOWER_BELOW_SUCCESS_RATE: f64 = 40.0;

/// Success rate (percent) above which difficulty may be raised
pub const RAISE_ABOVE_SUCCESS_RATE: f64 = 85.0;

/// Raising also requires fewer attempts than this on average
pub const RAISE_BELOW_MEAN_ATTEMPTS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyRecommendation {
    Raise,
    Hold,
    Lower,
}

/// Aggregated performance over a batch of completed exercises
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultySample {
    /// Percentage of successful completions (0-100)
    pub success_rate: f64,
    pub mean_time_seconds: f64,
    pub mean_attempts: f64,
}

/// Recommend a difficulty change.
///
/// - `lower` if `success_rate < 40`
/// - `raise` if `success_rate > 85` and `mean_attempts < 2`
/// - `hold` otherwise, including for non-finite samples
pub fn recommend(sample: &DifficultySample) -> DifficultyRecommendation {
    if sample.success_rate < LOWER_BELOW_SUCCESS_RATE {
        DifficultyRecommendation::Lower
    } else if sample.success_rate > RAISE_ABOVE_SUCCESS_RATE
        && sample.mean_attempts < RAISE_BELOW_MEAN_ATTEMPTS
    {
        DifficultyRecommendation::Raise
    } else {
        DifficultyRecommendation::Hold
    }
}

/// One finished exercise
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub success: bool,
    pub time_seconds: f64,
    pub attempts: u32,
}

/// Collects completions and yields a sample every `every` completions
#[derive(Debug, Clone)]
pub struct CompletionLog {
    every: usize,
    pending: Vec<Completion>,
}

impl CompletionLog {
    pub fn new(every: usize) -> Self {
        let every = every.max(1);
        Self {
            every,
            pending: Vec::with_capacity(every),
        }
    }

    /// Add a completion. Returns the batch sample when the batch is full.
    pub fn push(&mut self, completion: Completion) -> Option<DifficultySample> {
        self.pending.push(completion);
        if self.pending.len() < self.every {
            return None;
        }

        let sample = summarize(&self.pending);
        self.pending.clear();
        sample
    }

    /// Completions waiting for the batch to fill
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Summarize a batch of completions. Returns `None` for an empty batch.
pub fn summarize(completions: &[Completion]) -> Option<DifficultySample> {
    if completions.is_empty() {
        return None;
    }

    let n = completions.len() as f64;
    let successes = completions.iter().filter(|c| c.success).count() as f64;
    let times: Vec<f64> = completions
        .iter()
        .map(|c| c.time_seconds)
        .filter(|t| t.is_finite() && *t >= 0.0)
        .collect();
    let mean_time_seconds = if times.is_empty() {
        0.0
    } else {
        times.iter().sum::<f64>() / times.len() as f64
    };

    Some(DifficultySample {
        success_rate: successes / n * 100.0,
        mean_time_seconds,
        mean_attempts: completions.iter().map(|c| c.attempts as f64).sum::<f64>() / n,
    })
}

/// Current difficulty of the activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLevel {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl DifficultyLevel {
    /// Step one level in the recommended direction, saturating at both ends
    pub fn apply(self, recommendation: DifficultyRecommendation) -> Self {
        match (self, recommendation) {
            (level, DifficultyRecommendation::Hold) => level,
            (DifficultyLevel::Easy, DifficultyRecommendation::Raise) => DifficultyLevel::Medium,
            (DifficultyLevel::Medium, DifficultyRecommendation::Raise) => DifficultyLevel::Hard,
            (DifficultyLevel::Hard, DifficultyRecommendation::Raise) => DifficultyLevel::Hard,
            (DifficultyLevel::Hard, DifficultyRecommendation::Lower) => DifficultyLevel::Medium,
            (DifficultyLevel::Medium, DifficultyRecommendation::Lower) => DifficultyLevel::Easy,
            (DifficultyLevel::Easy, DifficultyRecommendation::Lower) => DifficultyLevel::Easy,
        }
    }
}
