//! Interaction recording
//!
//! Materializes accepted touches into [`InteractionRecord`]s and keeps them in a
//! rolling window bounded by count and age. Rapid-fire duplicates are dropped by
//! a hard debounce: nothing is queued or merged.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use tracing::debug;

use crate::config::EngineConfig;
use crate::types::{GestureType, InteractionRecord, Point};

/// A finalized touch waiting to be recorded
#[derive(Debug, Clone, PartialEq)]
pub struct RecordInput {
    pub position: Point,
    pub gesture_type: GestureType,
    pub target_element_id: Option<String>,
    /// Where a perfect touch would have landed (center of the focal element)
    pub ideal_point: Option<Point>,
    pub at: DateTime<Utc>,
}

/// Why an input was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NonFinitePosition,
    /// Timestamp earlier than the last accepted interaction
    OutOfOrder,
}

/// Result of [`InteractionRecorder::record`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Accepted(InteractionRecord),
    /// Arrived within the debounce interval of the previous accepted interaction
    Debounced,
    Rejected(RejectReason),
}

impl RecordOutcome {
    pub fn accepted(&self) -> Option<&InteractionRecord> {
        match self {
            RecordOutcome::Accepted(record) => Some(record),
            _ => None,
        }
    }
}

/// Precision of a touch relative to its ideal point.
///
/// Formula: `clamp(1 - distance / max_relevant_distance, 0, 1)`.
/// Without an ideal point there is nothing to miss and precision is 1.0.
pub fn compute_precision(position: Point, ideal: Option<Point>, max_relevant_distance: f64) -> f64 {
    match ideal.filter(|p| p.is_finite()) {
        Some(ideal) if max_relevant_distance > 0.0 => {
            (1.0 - position.distance_to(ideal) / max_relevant_distance).clamp(0.0, 1.0)
        }
        Some(_) => 0.0,
        None => 1.0,
    }
}

/// Owns the rolling interaction window of one activity session
#[derive(Debug, Clone)]
pub struct InteractionRecorder {
    window: VecDeque<InteractionRecord>,
    capacity: usize,
    max_age: Duration,
    debounce: Duration,
    max_relevant_distance: f64,
    activity_started_at: DateTime<Utc>,
    last_accepted_at: Option<DateTime<Utc>>,
    accepted_total: u64,
}

impl InteractionRecorder {
    pub fn new(config: &EngineConfig, activity_started_at: DateTime<Utc>) -> Self {
        Self {
            window: VecDeque::with_capacity(config.window.capacity),
            capacity: config.window.capacity,
            max_age: Duration::milliseconds(config.window.max_age_ms as i64),
            debounce: config.timing.debounce(),
            max_relevant_distance: config.scoring.max_relevant_distance_px,
            activity_started_at,
            last_accepted_at: None,
            accepted_total: 0,
        }
    }

    /// Record an interaction unless it is malformed or debounced
    pub fn record(&mut self, input: RecordInput) -> RecordOutcome {
        if !input.position.is_finite() {
            debug!("rejecting interaction with non-finite position");
            return RecordOutcome::Rejected(RejectReason::NonFinitePosition);
        }

        let previous = self.last_accepted_at.unwrap_or(self.activity_started_at);
        if let Some(last) = self.last_accepted_at {
            if input.at < last {
                debug!(at = %input.at, last = %last, "rejecting out-of-order interaction");
                return RecordOutcome::Rejected(RejectReason::OutOfOrder);
            }
            if input.at - last < self.debounce {
                debug!(
                    gap_ms = (input.at - last).num_milliseconds(),
                    "debounced interaction"
                );
                return RecordOutcome::Debounced;
            }
        }

        let precision = compute_precision(input.position, input.ideal_point, self.max_relevant_distance);
        let response_time_ms = (input.at - previous).num_milliseconds().max(0) as u64;

        let record = InteractionRecord {
            timestamp: input.at,
            position: input.position,
            target_element_id: input.target_element_id,
            gesture_type: input.gesture_type,
            precision,
            response_time_ms,
        };

        self.window.push_back(record.clone());
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
        self.evict_expired(input.at);

        self.last_accepted_at = Some(input.at);
        self.accepted_total += 1;
        RecordOutcome::Accepted(record)
    }

    /// Drop records older than the window's maximum age relative to `now`
    pub fn evict_expired(&mut self, now: DateTime<Utc>) {
        while let Some(front) = self.window.front() {
            if now - front.timestamp > self.max_age {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Owned copy of the window for a compute pass
    pub fn snapshot(&self) -> Vec<InteractionRecord> {
        self.window.iter().cloned().collect()
    }

    pub fn window(&self) -> &VecDeque<InteractionRecord> {
        &self.window
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Interactions accepted since the activity started
    pub fn accepted_total(&self) -> u64 {
        self.accepted_total
    }

    pub fn activity_started_at(&self) -> DateTime<Utc> {
        self.activity_started_at
    }

    /// Clear the window and restart the activity clock
    pub fn clear(&mut self, activity_started_at: DateTime<Utc>) {
        self.window.clear();
        self.activity_started_at = activity_started_at;
        self.last_accepted_at = None;
        self.accepted_total = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn tap_at(ms: i64, x: f64) -> RecordInput {
        RecordInput {
            position: Point::new(x, 0.0),
            gesture_type: GestureType::Tap,
            target_element_id: Some("target".to_string()),
            ideal_point: Some(Point::new(0.0, 0.0)),
            at: t0() + Duration::milliseconds(ms),
        }
    }

    #[test]
    fn test_precision_formula() {
        let ideal = Some(Point::new(0.0, 0.0));
        assert_eq!(compute_precision(Point::new(0.0, 0.0), ideal, 100.0), 1.0);
        assert!((compute_precision(Point::new(30.0, 40.0), ideal, 100.0) - 0.5).abs() < 1e-9);
        assert_eq!(compute_precision(Point::new(300.0, 0.0), ideal, 100.0), 0.0);
        assert_eq!(compute_precision(Point::new(300.0, 0.0), None, 100.0), 1.0);
    }

    #[test]
    fn test_debounce_drops_rapid_duplicate() {
        let mut recorder = InteractionRecorder::new(&EngineConfig::default(), t0());

        assert!(recorder.record(tap_at(1_000, 0.0)).accepted().is_some());
        assert_eq!(recorder.record(tap_at(1_049, 0.0)), RecordOutcome::Debounced);
        assert_eq!(recorder.len(), 1);

        // Exactly at the interval is accepted
        assert!(recorder.record(tap_at(1_050, 0.0)).accepted().is_some());
        assert_eq!(recorder.len(), 2);
    }

    #[test]
    fn test_debounce_measured_from_accepted_not_dropped() {
        let mut recorder = InteractionRecorder::new(&EngineConfig::default(), t0());
        recorder.record(tap_at(0, 0.0));
        assert_eq!(recorder.record(tap_at(30, 0.0)), RecordOutcome::Debounced);
        // 60ms after the accepted one, 30ms after the dropped one
        assert!(recorder.record(tap_at(60, 0.0)).accepted().is_some());
    }

    #[test]
    fn test_response_time() {
        let mut recorder = InteractionRecorder::new(&EngineConfig::default(), t0());

        let first = recorder.record(tap_at(2_500, 0.0));
        assert_eq!(first.accepted().unwrap().response_time_ms, 2_500);

        let second = recorder.record(tap_at(3_700, 0.0));
        assert_eq!(second.accepted().unwrap().response_time_ms, 1_200);
    }

    #[test]
    fn test_nan_rejected_without_touching_state() {
        let mut recorder = InteractionRecorder::new(&EngineConfig::default(), t0());
        recorder.record(tap_at(1_000, 0.0));

        let outcome = recorder.record(tap_at(2_000, f64::NAN));
        assert_eq!(outcome, RecordOutcome::Rejected(RejectReason::NonFinitePosition));
        assert_eq!(recorder.len(), 1);

        // Debounce reference is still the first record
        let next = recorder.record(tap_at(1_040, 0.0));
        assert_eq!(next, RecordOutcome::Debounced);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut recorder = InteractionRecorder::new(&EngineConfig::default(), t0());
        recorder.record(tap_at(5_000, 0.0));
        assert_eq!(
            recorder.record(tap_at(4_000, 0.0)),
            RecordOutcome::Rejected(RejectReason::OutOfOrder)
        );
    }

    #[test]
    fn test_capacity_eviction_keeps_arrival_order() {
        let mut config = EngineConfig::default();
        config.window.capacity = 3;
        let mut recorder = InteractionRecorder::new(&config, t0());

        for i in 0..5 {
            recorder.record(tap_at(i * 1_000, i as f64));
        }

        let xs: Vec<f64> = recorder.window().iter().map(|r| r.position.x).collect();
        assert_eq!(xs, vec![2.0, 3.0, 4.0]);
        assert_eq!(recorder.accepted_total(), 5);
    }

    #[test]
    fn test_age_eviction() {
        let mut config = EngineConfig::default();
        config.window.max_age_ms = 10_000;
        let mut recorder = InteractionRecorder::new(&config, t0());

        recorder.record(tap_at(0, 0.0));
        recorder.record(tap_at(5_000, 0.0));
        recorder.record(tap_at(12_000, 0.0));
        assert_eq!(recorder.len(), 2);

        recorder.evict_expired(t0() + Duration::milliseconds(30_000));
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_clear_restarts_activity() {
        let mut recorder = InteractionRecorder::new(&EngineConfig::default(), t0());
        recorder.record(tap_at(1_000, 0.0));

        let restart = t0() + Duration::milliseconds(10_000);
        recorder.clear(restart);
        assert!(recorder.is_empty());
        assert_eq!(recorder.accepted_total(), 0);

        let first = recorder.record(tap_at(10_500, 0.0));
        assert_eq!(first.accepted().unwrap().response_time_ms, 500);
    }
}
