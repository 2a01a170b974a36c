//! Behavior metrics
//!
//! Derives aggregate metrics (mean precision, interaction rate, frustration and
//! engagement scores) from a snapshot of the interaction window. The scoring
//! functions are pure; [`BehaviorMetricsCalculator`] only carries the two pieces
//! of cross-cycle state the heuristics need: when the interaction rate first
//! went over the overstimulation rate, and when the last celebration happened.

use chrono::{DateTime, Duration, Utc};

use crate::config::EngineConfig;
use crate::types::{BehaviorMetrics, InteractionRecord, MetricsSource};

/// Weight of `(1 - mean_precision)` in the frustration score
const FRUSTRATION_IMPRECISION_WEIGHT: f64 = 0.55;

/// Weight of the saturating low-precision count in the frustration score
const FRUSTRATION_MISS_WEIGHT: f64 = 0.45;

/// Shortest window duration used for rate computation (seconds)
const MIN_WINDOW_DURATION_SEC: f64 = 1.0;

/// Outcome of a compute pass
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsOutcome {
    /// Fewer records than the minimum sample size; nothing may act on this
    InsufficientData { sample_size: usize },
    Ready(BehaviorMetrics),
}

impl MetricsOutcome {
    pub fn metrics(&self) -> Option<&BehaviorMetrics> {
        match self {
            MetricsOutcome::Ready(metrics) => Some(metrics),
            MetricsOutcome::InsufficientData { .. } => None,
        }
    }
}

/// Decides when an evaluation cycle is due: after every Nth accepted
/// interaction, or once the periodic interval has elapsed.
#[derive(Debug, Clone)]
pub struct EvaluationTrigger {
    every_n: usize,
    interval: Duration,
    since_last: usize,
    last_evaluated_at: DateTime<Utc>,
}

impl EvaluationTrigger {
    pub fn new(config: &EngineConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            every_n: config.timing.evaluate_every_n,
            interval: config.timing.evaluation_interval(),
            since_last: 0,
            last_evaluated_at: started_at,
        }
    }

    /// Count an accepted interaction. Returns true when the count trigger fires.
    pub fn on_accepted(&mut self) -> bool {
        self.since_last += 1;
        self.since_last >= self.every_n
    }

    /// Whether the periodic interval has elapsed
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now - self.last_evaluated_at >= self.interval
    }

    pub fn mark_evaluated(&mut self, now: DateTime<Utc>) {
        self.since_last = 0;
        self.last_evaluated_at = now;
    }

    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.mark_evaluated(now);
    }
}

/// Scoring parameters extracted from the engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsParams {
    pub minimum_sample_size: usize,
    pub low_precision_threshold: f64,
    pub frustration_run_length: usize,
    pub frustration_high: f64,
    pub celebration_precision: f64,
    pub celebration_run_length: usize,
    pub overstimulation_rate_per_sec: f64,
    pub overstimulation_sustain: Duration,
    pub engagement_reference_rate: f64,
}

impl MetricsParams {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            minimum_sample_size: config.window.minimum_sample_size,
            low_precision_threshold: config.scoring.low_precision_threshold,
            frustration_run_length: config.scoring.frustration_run_length,
            frustration_high: config.thresholds.frustration_high,
            celebration_precision: config.scoring.celebration_precision,
            celebration_run_length: config.scoring.celebration_run_length,
            overstimulation_rate_per_sec: config.scoring.overstimulation_rate_per_sec,
            overstimulation_sustain: config.timing.overstimulation_sustain(),
            engagement_reference_rate: config.scoring.engagement_reference_rate,
        }
    }
}

/// State carried from one cycle to the next
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarriedState {
    /// Start of the current uninterrupted high-rate stretch
    pub high_rate_since: Option<DateTime<Utc>>,
    /// Records at or before this instant no longer count toward a celebration
    pub streak_floor: Option<DateTime<Utc>>,
}

/// Compute metrics over a window snapshot.
///
/// Pure: the result depends only on the arguments.
pub fn compute_metrics(
    window: &[InteractionRecord],
    now: DateTime<Utc>,
    params: &MetricsParams,
    carried: &CarriedState,
) -> MetricsOutcome {
    let sample_size = window.len();
    if sample_size < params.minimum_sample_size || sample_size == 0 {
        return MetricsOutcome::InsufficientData { sample_size };
    }

    let mean_precision = compute_mean_precision(window);
    let interactions_per_second = compute_interaction_rate(window, now);

    let low_precision_count = window
        .iter()
        .filter(|r| r.precision < params.low_precision_threshold)
        .count();
    let frustration_score = compute_frustration_score(
        mean_precision,
        low_precision_count,
        params.frustration_run_length,
        params.frustration_high,
    );
    let engagement_score = compute_engagement_score(
        interactions_per_second,
        mean_precision,
        params.engagement_reference_rate,
    );

    let precise_streak = trailing_precise_streak(
        window,
        params.celebration_precision,
        carried.streak_floor,
    );

    let sustained_high_rate_ms = if interactions_per_second >= params.overstimulation_rate_per_sec {
        let since = carried.high_rate_since.unwrap_or(now);
        (now - since).num_milliseconds().max(0)
    } else {
        0
    };
    let overstimulated = interactions_per_second >= params.overstimulation_rate_per_sec
        && sustained_high_rate_ms >= params.overstimulation_sustain.num_milliseconds();

    MetricsOutcome::Ready(BehaviorMetrics {
        mean_precision,
        interactions_per_second,
        frustration_score,
        engagement_score,
        sample_size,
        low_precision_count,
        precise_streak,
        sustained_high_rate_ms,
        overstimulated,
        celebration_streak: precise_streak >= params.celebration_run_length,
        computed_at: now,
        source: MetricsSource::Local,
    })
}

/// Arithmetic mean of record precision
fn compute_mean_precision(window: &[InteractionRecord]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    window.iter().map(|r| r.precision).sum::<f64>() / window.len() as f64
}

/// Interactions per second
///
/// Formula: `window_size / window_duration`, where the duration runs from the
/// oldest record to the evaluation instant (at least one second)
fn compute_interaction_rate(window: &[InteractionRecord], now: DateTime<Utc>) -> f64 {
    let Some(oldest) = window.first() else {
        return 0.0;
    };
    let span_sec = (now - oldest.timestamp).num_milliseconds() as f64 / 1000.0;
    window.len() as f64 / span_sec.max(MIN_WINDOW_DURATION_SEC)
}

/// Compute frustration score (0-100)
///
/// Formula:
/// ```text
/// frustration = 100 * (0.55 * (1 - mean_precision)
///                    + 0.45 * min(low_precision_count / run_length, 1))
/// ```
/// Once the low-precision count reaches the run length the score is raised to
/// at least the high band.
fn compute_frustration_score(
    mean_precision: f64,
    low_precision_count: usize,
    run_length: usize,
    high_band: f64,
) -> f64 {
    let miss_ratio = (low_precision_count as f64 / run_length.max(1) as f64).min(1.0);
    let base = FRUSTRATION_IMPRECISION_WEIGHT * (1.0 - mean_precision)
        + FRUSTRATION_MISS_WEIGHT * miss_ratio;
    let score = (base * 100.0).clamp(0.0, 100.0);

    if low_precision_count >= run_length {
        score.max(high_band)
    } else {
        score
    }
}

/// Compute engagement score (0-100)
///
/// Formula: `100 * (0.5 * min(rate / reference_rate, 1) + 0.5 * mean_precision)`
fn compute_engagement_score(rate: f64, mean_precision: f64, reference_rate: f64) -> f64 {
    let pace = if reference_rate > 0.0 {
        (rate / reference_rate).min(1.0)
    } else {
        0.0
    };
    ((0.5 * pace + 0.5 * mean_precision) * 100.0).clamp(0.0, 100.0)
}

/// Length of the trailing run of records above `threshold`, ignoring records at
/// or before `floor`
fn trailing_precise_streak(
    window: &[InteractionRecord],
    threshold: f64,
    floor: Option<DateTime<Utc>>,
) -> usize {
    window
        .iter()
        .rev()
        .take_while(|r| floor.map_or(true, |f| r.timestamp > f))
        .take_while(|r| r.precision > threshold)
        .count()
}

/// Stateful wrapper around [`compute_metrics`]
#[derive(Debug, Clone)]
pub struct BehaviorMetricsCalculator {
    params: MetricsParams,
    carried: CarriedState,
}

impl BehaviorMetricsCalculator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            params: MetricsParams::from_config(config),
            carried: CarriedState::default(),
        }
    }

    pub fn params(&self) -> &MetricsParams {
        &self.params
    }

    pub fn carried(&self) -> &CarriedState {
        &self.carried
    }

    /// Compute metrics and advance the high-rate tracker
    pub fn compute(&mut self, window: &[InteractionRecord], now: DateTime<Utc>) -> MetricsOutcome {
        let outcome = compute_metrics(window, now, &self.params, &self.carried);
        self.observe(&outcome, now);
        outcome
    }

    /// Advance the high-rate tracker from a computed outcome
    pub fn observe(&mut self, outcome: &MetricsOutcome, now: DateTime<Utc>) {
        let high_rate = outcome
            .metrics()
            .map(|m| m.interactions_per_second >= self.params.overstimulation_rate_per_sec)
            .unwrap_or(false);

        self.carried.high_rate_since = if high_rate {
            Some(self.carried.high_rate_since.unwrap_or(now))
        } else {
            None
        };
    }

    /// Consume the current precision streak after a celebration
    pub fn mark_celebrated(&mut self, through: DateTime<Utc>) {
        self.carried.streak_floor = Some(through);
    }

    pub fn reset(&mut self) {
        self.carried = CarriedState::default();
    }
}
