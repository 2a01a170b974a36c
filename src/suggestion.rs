//! Suggestion engine
//!
//! Turns a metrics outcome into at most one proactive suggestion per cycle.
//!
//! Conditions are checked in a fixed priority order and the first match wins:
//!
//! 1. Sustained overstimulation: `rest`, high priority
//! 2. Frustration in the high band (`help`, high) or medium band (`help`, medium)
//! 3. Precision streak: `celebration`, medium priority
//! 4. Low engagement: `change_activity`, low priority
//! 5. A kind recommended by the remote analysis: low priority. A remote
//!    "help" only counts once frustration reaches the low band.
//!
//! A match inside the cooldown window is suppressed. The cooldown is a hard
//! floor measured from the last emitted suggestion of any kind; suppressed
//! matches are neither queued nor merged.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{EngineConfig, Thresholds};
use crate::metrics::MetricsOutcome;
use crate::types::{BehaviorMetrics, Priority, Suggestion, SuggestionKind};

/// Engine state after the most recent cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Evaluating,
    Suppressed,
    Emitted,
}

/// A matched condition, before the cooldown is applied
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub kind: SuggestionKind,
    pub priority: Priority,
    pub reasoning: String,
}

impl Candidate {
    fn new(kind: SuggestionKind, priority: Priority, reasoning: String) -> Self {
        Self {
            kind,
            priority,
            reasoning,
        }
    }
}

/// Result of one evaluation cycle
#[derive(Debug, Clone, PartialEq)]
pub enum SuggestionDecision {
    /// Insufficient data, or no condition matched
    Idle,
    /// A condition matched inside the cooldown window
    Suppressed {
        candidate: Candidate,
        remaining_ms: i64,
    },
    Emitted(Suggestion),
}

impl SuggestionDecision {
    pub fn suggestion(&self) -> Option<&Suggestion> {
        match self {
            SuggestionDecision::Emitted(suggestion) => Some(suggestion),
            _ => None,
        }
    }
}

/// Check the conditions in priority order.
///
/// Pure: returns the first matching condition, if any.
pub fn select_candidate(
    metrics: &BehaviorMetrics,
    thresholds: &Thresholds,
    remote_kinds: &[SuggestionKind],
) -> Option<Candidate> {
    if metrics.overstimulated {
        return Some(Candidate::new(
            SuggestionKind::Rest,
            Priority::High,
            format!(
                "interactions_per_second {:.2} sustained for {}s",
                metrics.interactions_per_second,
                metrics.sustained_high_rate_ms / 1000
            ),
        ));
    }

    let frustration = metrics.frustration_score;
    if frustration >= thresholds.frustration_high {
        return Some(Candidate::new(
            SuggestionKind::Help,
            Priority::High,
            format!(
                "frustration_score {:.1} >= high threshold {}",
                frustration, thresholds.frustration_high
            ),
        ));
    }
    if frustration >= thresholds.frustration_medium {
        return Some(Candidate::new(
            SuggestionKind::Help,
            Priority::Medium,
            format!(
                "frustration_score {:.1} >= medium threshold {}",
                frustration, thresholds.frustration_medium
            ),
        ));
    }

    if metrics.celebration_streak {
        return Some(Candidate::new(
            SuggestionKind::Celebration,
            Priority::Medium,
            format!(
                "precise_streak {} with mean_precision {:.2}",
                metrics.precise_streak, metrics.mean_precision
            ),
        ));
    }

    if metrics.engagement_score < thresholds.disengagement_threshold {
        return Some(Candidate::new(
            SuggestionKind::ChangeActivity,
            Priority::Low,
            format!(
                "engagement_score {:.1} < disengagement threshold {}",
                metrics.engagement_score, thresholds.disengagement_threshold
            ),
        ));
    }

    // A remote "help" needs at least low-band frustration behind it
    remote_kinds
        .iter()
        .find(|kind| **kind != SuggestionKind::Help || frustration >= thresholds.frustration_low)
        .map(|kind| {
            Candidate::new(
                *kind,
                Priority::Low,
                format!("remote analysis recommended {}", kind.as_str()),
            )
        })
}

/// Applies the priority order and the cooldown across cycles
#[derive(Debug, Clone)]
pub struct SuggestionEngine {
    thresholds: Thresholds,
    cooldown: Duration,
    last_emitted_at: Option<DateTime<Utc>>,
    state: EngineState,
}

impl SuggestionEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            cooldown: config.timing.cooldown(),
            last_emitted_at: None,
            state: EngineState::Idle,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn last_emitted_at(&self) -> Option<DateTime<Utc>> {
        self.last_emitted_at
    }

    /// Run one cycle over a metrics outcome
    pub fn evaluate(
        &mut self,
        outcome: &MetricsOutcome,
        remote_kinds: &[SuggestionKind],
        now: DateTime<Utc>,
    ) -> SuggestionDecision {
        let metrics = match outcome {
            MetricsOutcome::Ready(metrics) => metrics,
            MetricsOutcome::InsufficientData { sample_size } => {
                debug!(sample_size, "insufficient data, skipping suggestion cycle");
                self.state = EngineState::Idle;
                return SuggestionDecision::Idle;
            }
        };

        self.state = EngineState::Evaluating;
        let Some(candidate) = select_candidate(metrics, &self.thresholds, remote_kinds) else {
            self.state = EngineState::Idle;
            return SuggestionDecision::Idle;
        };

        if let Some(last) = self.last_emitted_at {
            let elapsed = now - last;
            if elapsed < self.cooldown {
                let remaining_ms = (self.cooldown - elapsed).num_milliseconds();
                debug!(
                    kind = candidate.kind.as_str(),
                    remaining_ms, "suggestion suppressed by cooldown"
                );
                self.state = EngineState::Suppressed;
                return SuggestionDecision::Suppressed {
                    candidate,
                    remaining_ms,
                };
            }
        }

        let suggestion = Suggestion {
            id: Uuid::new_v4(),
            kind: candidate.kind,
            priority: candidate.priority,
            reasoning: candidate.reasoning,
            created_at: now,
        };
        info!(
            kind = suggestion.kind.as_str(),
            priority = ?suggestion.priority,
            reasoning = %suggestion.reasoning,
            "suggestion emitted"
        );

        self.last_emitted_at = Some(now);
        self.state = EngineState::Emitted;
        SuggestionDecision::Emitted(suggestion)
    }

    /// Forget the cooldown and return to idle
    pub fn reset(&mut self) {
        self.last_emitted_at = None;
        self.state = EngineState::Idle;
    }
}
