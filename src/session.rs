//! Play session
//!
//! One [`PlaySession`] per activity. It owns the interaction window, the
//! evaluation trigger, the cooldown and the in-progress gesture, and wires
//! gesture classification, hit-testing, recording, scoring and suggestions
//! together. Sessions are plain state driven through `&mut self`; nothing is
//! shared between sessions.
//!
//! Evaluation is split in two so input keeps flowing while a remote analysis
//! is in flight: [`PlaySession::begin_cycle`] computes metrics over a snapshot
//! of the window, and [`PlaySession::complete_cycle`] applies the (optional)
//! remote result and runs the suggestion engine. A cycle begun before
//! [`PlaySession::teardown`] is discarded when it completes.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::difficulty::{recommend, Completion, CompletionLog, DifficultyLevel, DifficultyRecommendation};
use crate::error::EngineError;
use crate::gesture::{GestureTracker, GrantOutcome};
use crate::hit_test::{hit_test, nearest_focal_point};
use crate::metrics::{BehaviorMetricsCalculator, EvaluationTrigger, MetricsOutcome};
use crate::recorder::{InteractionRecorder, RecordInput, RecordOutcome};
use crate::remote::{bounded_analysis, AnalysisFuture, AnalysisRequest, RemoteAnalysis, RemoteAnalyzer, RemoteError, SampleFeatures};
use crate::suggestion::{EngineState, SuggestionDecision, SuggestionEngine};
use crate::telemetry::{forward, NoopTelemetry, TelemetryEvent, TelemetryPayload, TelemetrySink};
use crate::types::{EngineEvent, InteractionRecord, InteractiveElement, Point, SessionInput, SuggestionKind};

/// Presentation collaborator (rendering, particles, haptics)
pub trait PresentationSink: Send + Sync {
    fn present(&self, event: EngineEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPresentation;

impl PresentationSink for NoopPresentation {
    fn present(&self, _event: EngineEvent) {}
}

/// Buffers events until the host drains them
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every buffered event
    pub fn drain(&self) -> Vec<EngineEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl PresentationSink for EventBuffer {
    fn present(&self, event: EngineEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// An evaluation cycle waiting for its (optional) remote result
#[derive(Debug, Clone)]
pub struct PendingCycle {
    generation: u64,
    started_at: DateTime<Utc>,
    outcome: MetricsOutcome,
    newest_record_at: Option<DateTime<Utc>>,
    request: Option<AnalysisRequest>,
}

impl PendingCycle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Local metrics computed over the snapshot
    pub fn outcome(&self) -> &MetricsOutcome {
        &self.outcome
    }

    /// Request for the remote analysis. `None` when there is not enough data.
    pub fn request(&self) -> Option<&AnalysisRequest> {
        self.request.as_ref()
    }
}

/// Engine instance for one activity session
pub struct PlaySession {
    id: Uuid,
    config: EngineConfig,
    tracker: GestureTracker,
    recorder: InteractionRecorder,
    trigger: EvaluationTrigger,
    calculator: BehaviorMetricsCalculator,
    suggestions: SuggestionEngine,
    completions: CompletionLog,
    level: DifficultyLevel,
    elements: Vec<InteractiveElement>,
    presentation: Box<dyn PresentationSink>,
    telemetry: Box<dyn TelemetrySink>,
    remote: Option<Arc<dyn RemoteAnalyzer>>,
    generation: u64,
    clock: DateTime<Utc>,
    cycle_due: bool,
    active: bool,
    last_outcome: Option<MetricsOutcome>,
}

impl PlaySession {
    /// Start a session. Fails only on an invalid configuration.
    pub fn new(config: EngineConfig, started_at: DateTime<Utc>) -> Result<Self, EngineError> {
        config.validate()?;

        Ok(Self {
            id: Uuid::new_v4(),
            tracker: GestureTracker::new(config.profile()),
            recorder: InteractionRecorder::new(&config, started_at),
            trigger: EvaluationTrigger::new(&config, started_at),
            calculator: BehaviorMetricsCalculator::new(&config),
            suggestions: SuggestionEngine::new(&config),
            completions: CompletionLog::new(config.difficulty_every_completions),
            level: DifficultyLevel::default(),
            elements: Vec::new(),
            presentation: Box::new(NoopPresentation),
            telemetry: Box::new(NoopTelemetry),
            remote: None,
            generation: 0,
            clock: started_at,
            cycle_due: false,
            active: true,
            last_outcome: None,
            config,
        })
    }

    pub fn with_presentation(mut self, presentation: Box<dyn PresentationSink>) -> Self {
        self.presentation = presentation;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Box<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteAnalyzer>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_level(mut self, level: DifficultyLevel) -> Self {
        self.level = level;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Latest timestamp observed by the session
    pub fn clock(&self) -> DateTime<Utc> {
        self.clock
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn level(&self) -> DifficultyLevel {
        self.level
    }

    pub fn state(&self) -> EngineState {
        self.suggestions.state()
    }

    pub fn window(&self) -> Vec<InteractionRecord> {
        self.recorder.snapshot()
    }

    /// Metrics of the most recent completed cycle
    pub fn last_outcome(&self) -> Option<&MetricsOutcome> {
        self.last_outcome.as_ref()
    }

    /// Whether an evaluation cycle should be started
    pub fn cycle_due(&self) -> bool {
        self.cycle_due
    }

    /// Apply one host input. Returns whether an evaluation cycle is due.
    pub fn handle(&mut self, input: SessionInput) -> bool {
        match input {
            SessionInput::Down { x, y, touches, at } => {
                self.pointer_down(Point::new(x, y), touches, at);
            }
            SessionInput::Move { dx, dy, touches } => {
                self.pointer_move(dx, dy, touches);
            }
            SessionInput::Up { at } => {
                self.pointer_up(at);
            }
            SessionInput::Elements { elements } => self.set_elements(elements),
            SessionInput::Completion {
                success,
                time_seconds,
                attempts,
            } => {
                self.record_completion(Completion {
                    success,
                    time_seconds,
                    attempts,
                });
            }
            SessionInput::Tick { at } => {
                self.tick(at);
            }
        }
        self.cycle_due
    }

    /// Apply one input and run a local-only cycle if one is due
    pub fn process(&mut self, input: SessionInput) -> Option<SuggestionDecision> {
        if self.handle(input) {
            self.evaluate_local(self.clock)
        } else {
            None
        }
    }

    pub fn set_elements(&mut self, elements: Vec<InteractiveElement>) {
        self.elements = elements;
    }

    pub fn pointer_down(&mut self, at: Point, touches: u32, now: DateTime<Utc>) -> GrantOutcome {
        if !self.active {
            debug!("session torn down, ignoring touch-down");
            return GrantOutcome::Rejected;
        }
        self.advance_clock(now);
        self.tracker.grant(at, touches, now)
    }

    pub fn pointer_move(&mut self, dx: f64, dy: f64, touches: u32) {
        if self.active {
            self.tracker.move_to(dx, dy, touches);
        }
    }

    /// Finalize the current gesture and record it
    pub fn pointer_up(&mut self, now: DateTime<Utc>) -> Option<InteractionRecord> {
        if !self.active {
            debug!("session torn down, ignoring release");
            return None;
        }
        self.advance_clock(now);

        let Some(gesture) = self.tracker.release(now) else {
            debug!("release without an active gesture");
            return None;
        };

        let point = gesture.end;
        let tolerance = self.config.profile().touch_tolerance_outer_px;
        let (target_element_id, ideal_point) = match hit_test(point, &self.elements, tolerance) {
            Some(element) => (Some(element.id.clone()), Some(element.center())),
            None => (None, nearest_focal_point(point, &self.elements)),
        };

        let outcome = self.recorder.record(RecordInput {
            position: point,
            gesture_type: gesture.gesture_type,
            target_element_id,
            ideal_point,
            at: now,
        });

        let RecordOutcome::Accepted(record) = outcome else {
            return None;
        };

        self.presentation.present(EngineEvent::Feedback {
            record: record.clone(),
        });
        self.send_telemetry(TelemetryPayload::Interaction {
            record: record.clone(),
        });

        if self.trigger.on_accepted() {
            self.cycle_due = true;
        }
        Some(record)
    }

    /// Periodic timer. Returns whether an evaluation cycle is due.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        self.advance_clock(now);
        self.recorder.evict_expired(now);
        if self.trigger.is_due(now) {
            self.cycle_due = true;
        }
        self.cycle_due
    }

    /// Log a finished exercise. Every K completions the difficulty is re-evaluated.
    pub fn record_completion(&mut self, completion: Completion) -> Option<DifficultyRecommendation> {
        if !self.active {
            return None;
        }

        let sample = self.completions.push(completion)?;
        let recommendation = recommend(&sample);
        self.level = self.level.apply(recommendation);
        info!(
            ?recommendation,
            level = ?self.level,
            success_rate = sample.success_rate,
            "difficulty re-evaluated"
        );

        self.presentation.present(EngineEvent::Difficulty {
            recommendation,
            level: self.level,
            sample,
        });
        self.send_telemetry(TelemetryPayload::Difficulty {
            recommendation,
            sample,
        });
        Some(recommendation)
    }

    /// Compute metrics over a snapshot of the window
    pub fn begin_cycle(&mut self, now: DateTime<Utc>) -> PendingCycle {
        self.advance_clock(now);
        self.cycle_due = false;
        self.trigger.mark_evaluated(now);
        self.recorder.evict_expired(now);

        let snapshot = self.recorder.snapshot();
        let outcome = self.calculator.compute(&snapshot, now);
        let request = outcome.metrics().map(|metrics| AnalysisRequest {
            gesture_type: snapshot.last().map(|r| r.gesture_type),
            raw_sample_features: SampleFeatures::from_window(metrics, &snapshot),
            confidence_threshold: self.config.thresholds.min_remote_confidence,
        });

        PendingCycle {
            generation: self.generation,
            started_at: now,
            outcome,
            newest_record_at: snapshot.last().map(|r| r.timestamp),
            request,
        }
    }

    /// Bounded remote analysis for a pending cycle, if an analyzer is configured
    pub fn start_remote(&self, pending: &PendingCycle) -> Option<AnalysisFuture> {
        let analyzer = self.remote.as_ref()?;
        let request = pending.request()?.clone();
        let future = analyzer.analyze(request);
        Some(Box::pin(bounded_analysis(
            future,
            self.config.timing.remote_timeout(),
        )))
    }

    /// Finish a cycle. Returns `None` when the cycle predates a teardown.
    pub fn complete_cycle(
        &mut self,
        pending: PendingCycle,
        remote: Option<Result<RemoteAnalysis, RemoteError>>,
    ) -> Option<SuggestionDecision> {
        if pending.generation != self.generation {
            debug!(
                cycle_generation = pending.generation,
                generation = self.generation,
                "discarding cycle from a torn-down session"
            );
            return None;
        }

        let min_confidence = self.config.thresholds.min_remote_confidence;
        let analysis = match remote {
            Some(Ok(analysis)) => match analysis.validate(min_confidence) {
                Ok(()) => Some(analysis),
                Err(e) => {
                    warn!(error = %e, "remote analysis rejected, using local metrics");
                    None
                }
            },
            Some(Err(e)) => {
                warn!(error = %e, "remote analysis unavailable, using local metrics");
                None
            }
            None => None,
        };

        let (outcome, remote_kinds) = match (pending.outcome, analysis) {
            (MetricsOutcome::Ready(metrics), Some(analysis)) => (
                MetricsOutcome::Ready(analysis.enrich(&metrics)),
                analysis.recommended_kinds(),
            ),
            (outcome, _) => (outcome, Vec::new()),
        };

        let decision = self
            .suggestions
            .evaluate(&outcome, &remote_kinds, pending.started_at);

        if let SuggestionDecision::Emitted(suggestion) = &decision {
            if suggestion.kind == SuggestionKind::Celebration {
                if let Some(through) = pending.newest_record_at {
                    self.calculator.mark_celebrated(through);
                }
            }
            self.presentation.present(EngineEvent::Suggestion {
                suggestion: suggestion.clone(),
            });
            self.send_telemetry(TelemetryPayload::Suggestion {
                suggestion: suggestion.clone(),
            });
        }

        self.last_outcome = Some(outcome);
        Some(decision)
    }

    /// Run a full cycle from local metrics only
    pub fn evaluate_local(&mut self, now: DateTime<Utc>) -> Option<SuggestionDecision> {
        let pending = self.begin_cycle(now);
        self.complete_cycle(pending, None)
    }

    /// Run a full cycle, consulting the remote analyzer when one is configured.
    ///
    /// The remote call is bounded by the configured timeout; on any failure
    /// the local metrics decide.
    pub async fn evaluate_with_remote(&mut self, now: DateTime<Utc>) -> Option<SuggestionDecision> {
        let pending = self.begin_cycle(now);
        let remote = match self.start_remote(&pending) {
            Some(future) => Some(future.await),
            None => None,
        };
        self.complete_cycle(pending, remote)
    }

    /// Stop the activity: drop the window, gesture and any in-flight cycle
    pub fn teardown(&mut self) {
        self.generation += 1;
        self.active = false;
        self.cycle_due = false;
        self.tracker.cancel();
        self.recorder.clear(self.clock);
        self.calculator.reset();
        self.suggestions.reset();
        self.completions.clear();
        self.last_outcome = None;
        info!(session_id = %self.id, generation = self.generation, "session torn down");
    }

    /// Restart a torn-down session with a fresh activity clock
    pub fn resume(&mut self, at: DateTime<Utc>) {
        self.clock = at;
        self.recorder.clear(at);
        self.trigger.reset(at);
        self.active = true;
    }

    fn advance_clock(&mut self, now: DateTime<Utc>) {
        if now > self.clock {
            self.clock = now;
        }
    }

    fn send_telemetry(&self, payload: TelemetryPayload) {
        forward(
            self.telemetry.as_ref(),
            TelemetryEvent {
                session_id: self.id,
                emitted_at: self.clock,
                payload,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::{analysis, ScriptedAnalyzer};
    use crate::telemetry::testing::{BrokenTelemetry, RecordingTelemetry};
    use crate::types::{GestureType, Priority, Size, Suggestion};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    /// One 50x50 target centered at (125, 125)
    fn target() -> Vec<InteractiveElement> {
        vec![InteractiveElement::new(
            "target",
            Point::new(100.0, 100.0),
            Size::new(50.0, 50.0),
        )]
    }

    struct Harness {
        session: PlaySession,
        events: EventBuffer,
    }

    impl Harness {
        fn new(config: EngineConfig) -> Self {
            let events = EventBuffer::new();
            let mut session = PlaySession::new(config, t0())
                .unwrap()
                .with_presentation(Box::new(events.clone()));
            session.set_elements(target());
            Self { session, events }
        }

        fn with_remote(mut self, analyzer: ScriptedAnalyzer) -> Self {
            self.session = self.session.with_remote(Arc::new(analyzer));
            self
        }

        /// Tap at `point`, `ms` after session start. Runs a local cycle when due.
        fn tap(&mut self, point: Point, ms: i64) -> Option<SuggestionDecision> {
            let at = t0() + Duration::milliseconds(ms);
            self.session.process(SessionInput::Down {
                x: point.x,
                y: point.y,
                touches: 1,
                at,
            });
            self.session.process(SessionInput::Up { at })
        }

        fn suggestions(&self) -> Vec<Suggestion> {
            self.events
                .drain()
                .into_iter()
                .filter_map(|e| match e {
                    EngineEvent::Suggestion { suggestion } => Some(suggestion),
                    _ => None,
                })
                .collect()
        }
    }

    /// 75px from the target center: precision 0.25
    fn miss() -> Point {
        Point::new(200.0, 125.0)
    }

    fn center() -> Point {
        Point::new(125.0, 125.0)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.window.capacity = 0;
        assert!(PlaySession::new(config, t0()).is_err());
    }

    #[test]
    fn test_tap_records_feedback_and_target() {
        let mut h = Harness::new(EngineConfig::default());
        h.tap(Point::new(128.0, 121.0), 1_000);

        let events = h.events.drain();
        assert_eq!(events.len(), 1);
        match &events[0] {
            EngineEvent::Feedback { record } => {
                assert_eq!(record.target_element_id.as_deref(), Some("target"));
                assert_eq!(record.gesture_type, GestureType::Tap);
                assert_eq!(record.response_time_ms, 1_000);
                assert!(record.precision > 0.9);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_tolerance_hit_outside_box() {
        let mut h = Harness::new(EngineConfig::default());
        // 10px left of the box, inside the media tolerance
        let record = {
            h.session.pointer_down(Point::new(90.0, 125.0), 1, t0());
            h.session.pointer_up(t0()).unwrap()
        };
        assert_eq!(record.target_element_id.as_deref(), Some("target"));
    }

    #[test]
    fn test_drag_recorded_at_release_point() {
        let mut h = Harness::new(EngineConfig::default());
        h.session.pointer_down(Point::new(20.0, 125.0), 1, t0());
        h.session.pointer_move(105.0, 0.0, 1);
        let record = h.session.pointer_up(t0() + Duration::milliseconds(600)).unwrap();

        assert_eq!(record.gesture_type, GestureType::Drag);
        assert_eq!(record.position, Point::new(125.0, 125.0));
        assert_eq!(record.precision, 1.0);
    }

    #[test]
    fn test_debounced_duplicate_records_once() {
        let mut h = Harness::new(EngineConfig::default());
        h.tap(center(), 1_000);
        h.tap(center(), 1_030);
        assert_eq!(h.session.window().len(), 1);
    }

    #[test]
    fn test_nan_touch_does_not_touch_window() {
        let mut h = Harness::new(EngineConfig::default());
        h.tap(Point::new(f64::NAN, 10.0), 1_000);
        assert!(h.session.window().is_empty());
        assert!(h.events.drain().is_empty());
    }

    #[test]
    fn test_insufficient_data_never_emits() {
        let mut h = Harness::new(EngineConfig::default());
        for i in 0..4 {
            h.tap(miss(), i * 1_000);
        }
        let decision = h.session.evaluate_local(t0() + Duration::seconds(5)).unwrap();
        assert_eq!(decision, SuggestionDecision::Idle);
        assert!(matches!(
            h.session.last_outcome(),
            Some(MetricsOutcome::InsufficientData { sample_size: 4 })
        ));
    }

    #[test]
    fn test_scenario_sustained_misses_ask_for_help() {
        let mut h = Harness::new(EngineConfig::default());
        for i in 0..15 {
            h.tap(miss(), i * 1_000);
        }

        let suggestions = h.suggestions();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].kind, SuggestionKind::Help);

        let metrics = h.session.last_outcome().and_then(|o| o.metrics()).unwrap();
        assert_eq!(metrics.low_precision_count, 15);
        assert!(metrics.frustration_score >= 80.0);
    }

    #[test]
    fn test_scenario_precise_streak_celebrated_once() {
        let mut h = Harness::new(EngineConfig::default());
        for i in 0..40 {
            h.tap(center(), i * 1_000);
        }

        let suggestions = h.suggestions();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].kind, SuggestionKind::Celebration);
        assert_eq!(suggestions[0].priority, Priority::Medium);
        // Emitted on the 25th interaction
        assert_eq!(suggestions[0].created_at, t0() + Duration::seconds(24));
    }

    #[test]
    fn test_scenario_overstimulation_takes_priority() {
        let mut h = Harness::new(EngineConfig::default());
        // Two precise taps per second for six minutes
        let mut first_overstimulated: Option<DateTime<Utc>> = None;
        for i in 0..720 {
            h.tap(center(), i * 500);
            if first_overstimulated.is_none() {
                let overstimulated = h
                    .session
                    .last_outcome()
                    .and_then(|o| o.metrics())
                    .map(|m| m.overstimulated)
                    .unwrap_or(false);
                if overstimulated {
                    first_overstimulated = Some(h.session.clock());
                }
            }
        }

        let start = first_overstimulated.unwrap();
        assert!(start - t0() >= Duration::minutes(5));

        let suggestions = h.suggestions();
        let after: Vec<&Suggestion> = suggestions.iter().filter(|s| s.created_at >= start).collect();
        assert!(!after.is_empty());
        assert!(after.iter().all(|s| s.kind == SuggestionKind::Rest));
        assert_eq!(after[0].priority, Priority::High);

        // Celebrations happened before the rate was sustained long enough
        assert!(suggestions
            .iter()
            .any(|s| s.kind == SuggestionKind::Celebration && s.created_at < start));
    }

    #[test]
    fn test_difficulty_every_five_completions() {
        let mut h = Harness::new(EngineConfig::default());
        let mut recommendation = None;
        for _ in 0..5 {
            recommendation = h.session.record_completion(Completion {
                success: true,
                time_seconds: 8.0,
                attempts: 1,
            });
        }
        assert_eq!(recommendation, Some(DifficultyRecommendation::Raise));
        assert_eq!(h.session.level(), DifficultyLevel::Hard);

        let events = h.events.drain();
        assert!(matches!(
            events.last(),
            Some(EngineEvent::Difficulty {
                recommendation: DifficultyRecommendation::Raise,
                level: DifficultyLevel::Hard,
                ..
            })
        ));
    }

    #[test]
    fn test_periodic_tick_triggers_cycle() {
        let mut config = EngineConfig::default();
        config.timing.evaluate_every_n = 100;
        let mut h = Harness::new(config);
        for i in 0..12 {
            h.tap(miss(), i * 1_000);
        }
        assert!(h.suggestions().is_empty());

        let decision = h.session.process(SessionInput::Tick {
            at: t0() + Duration::seconds(30),
        });
        let suggestion = decision.as_ref().and_then(|d| d.suggestion()).unwrap();
        assert_eq!(suggestion.kind, SuggestionKind::Help);
    }

    #[test]
    fn test_records_during_cycle_land_in_next_snapshot() {
        let mut h = Harness::new(EngineConfig::default());
        for i in 0..5 {
            h.session.pointer_down(miss(), 1, t0() + Duration::seconds(i));
            h.session.pointer_up(t0() + Duration::seconds(i));
        }

        let pending = h.session.begin_cycle(t0() + Duration::seconds(5));
        h.session.pointer_down(center(), 1, t0() + Duration::seconds(6));
        h.session.pointer_up(t0() + Duration::seconds(6));

        assert_eq!(pending.outcome().metrics().unwrap().sample_size, 5);
        assert_eq!(h.session.window().len(), 6);
        assert!(h.session.complete_cycle(pending, None).is_some());
    }

    #[test]
    fn test_teardown_discards_in_flight_cycle() {
        let mut h = Harness::new(EngineConfig::default());
        for i in 0..15 {
            h.session.pointer_down(miss(), 1, t0() + Duration::seconds(i));
            h.session.pointer_up(t0() + Duration::seconds(i));
        }
        h.events.drain();

        let pending = h.session.begin_cycle(t0() + Duration::seconds(15));
        h.session.teardown();

        assert!(h.session.complete_cycle(pending, None).is_none());
        assert!(h.events.drain().is_empty());
        assert!(h.session.window().is_empty());

        // Input after teardown is ignored until resumed
        assert!(h.tap(center(), 20_000).is_none());
        assert!(h.session.window().is_empty());

        h.session.resume(t0() + Duration::seconds(30));
        h.tap(center(), 31_000);
        assert_eq!(h.session.window().len(), 1);
    }

    #[test]
    fn test_remote_enrichment_and_recommendation() {
        let mut h = Harness::new(EngineConfig::default())
            .with_remote(ScriptedAnalyzer::ok(analysis(85.0, 60.0, &[])));
        for i in 0..5 {
            h.session.pointer_down(center(), 1, t0() + Duration::seconds(i));
            h.session.pointer_up(t0() + Duration::seconds(i));
        }

        let pending = h.session.begin_cycle(t0() + Duration::seconds(5));
        assert!(pending.request().is_some());
        let decision = h
            .session
            .complete_cycle(pending, Some(Ok(analysis(85.0, 60.0, &[]))))
            .unwrap();

        // Local precision is perfect; the remote score drives the suggestion
        assert_eq!(decision.suggestion().unwrap().kind, SuggestionKind::Help);
        let metrics = h.session.last_outcome().and_then(|o| o.metrics()).unwrap();
        assert_eq!(metrics.source, crate::types::MetricsSource::RemoteEnriched);
    }

    #[test]
    fn test_low_confidence_remote_ignored() {
        let mut h = Harness::new(EngineConfig::default());
        for i in 0..5 {
            h.session.pointer_down(center(), 1, t0() + Duration::seconds(i));
            h.session.pointer_up(t0() + Duration::seconds(i));
        }

        let mut unsure = analysis(95.0, 10.0, &["rest"]);
        unsure.confidence = Some(0.4);
        let pending = h.session.begin_cycle(t0() + Duration::seconds(5));
        let decision = h.session.complete_cycle(pending, Some(Ok(unsure))).unwrap();

        assert_eq!(decision, SuggestionDecision::Idle);
        let metrics = h.session.last_outcome().and_then(|o| o.metrics()).unwrap();
        assert_eq!(metrics.source, crate::types::MetricsSource::Local);
    }

    #[test]
    fn test_remote_only_recommendation_is_low_priority() {
        let mut h = Harness::new(EngineConfig::default());
        for i in 0..5 {
            h.session.pointer_down(center(), 1, t0() + Duration::seconds(i));
            h.session.pointer_up(t0() + Duration::seconds(i));
        }

        let pending = h.session.begin_cycle(t0() + Duration::seconds(5));
        let decision = h
            .session
            .complete_cycle(pending, Some(Ok(analysis(10.0, 70.0, &["descanso"]))))
            .unwrap();
        let suggestion = decision.suggestion().unwrap();
        assert_eq!(suggestion.kind, SuggestionKind::Rest);
        assert_eq!(suggestion.priority, Priority::Low);
    }

    #[test]
    fn test_calm_remote_reply_keeps_local_miss_floor() {
        let mut h = Harness::new(EngineConfig::default());
        for i in 0..15 {
            h.session.pointer_down(miss(), 1, t0() + Duration::seconds(i));
            h.session.pointer_up(t0() + Duration::seconds(i));
        }

        let pending = h.session.begin_cycle(t0() + Duration::seconds(15));
        let local = pending.outcome().metrics().unwrap().frustration_score;
        let decision = h
            .session
            .complete_cycle(pending, Some(Ok(analysis(10.0, 90.0, &[]))))
            .unwrap();

        let suggestion = decision.suggestion().unwrap();
        assert_eq!(suggestion.kind, SuggestionKind::Help);
        assert_eq!(suggestion.priority, Priority::High);
        let metrics = h.session.last_outcome().and_then(|o| o.metrics()).unwrap();
        assert_eq!(metrics.frustration_score, local);
        assert_eq!(metrics.source, crate::types::MetricsSource::RemoteEnriched);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_remote_timeout_falls_back_to_local() {
        let slow = ScriptedAnalyzer::slow(
            analysis(10.0, 90.0, &["celebration"]),
            std::time::Duration::from_secs(30),
        );
        let mut h = Harness::new(EngineConfig::default()).with_remote(slow);
        for i in 0..15 {
            h.session.pointer_down(miss(), 1, t0() + Duration::seconds(i));
            h.session.pointer_up(t0() + Duration::seconds(i));
        }

        let decision = h
            .session
            .evaluate_with_remote(t0() + Duration::seconds(15))
            .await
            .unwrap();

        let suggestion = decision.suggestion().unwrap();
        assert_eq!(suggestion.kind, SuggestionKind::Help);
        assert_eq!(suggestion.priority, Priority::High);
    }

    #[tokio::test]
    async fn test_remote_error_falls_back_to_local() {
        let failing = ScriptedAnalyzer::failing(RemoteError::Status(502));
        let mut h = Harness::new(EngineConfig::default()).with_remote(failing);
        for i in 0..15 {
            h.session.pointer_down(miss(), 1, t0() + Duration::seconds(i));
            h.session.pointer_up(t0() + Duration::seconds(i));
        }

        let decision = h
            .session
            .evaluate_with_remote(t0() + Duration::seconds(15))
            .await
            .unwrap();
        assert_eq!(decision.suggestion().unwrap().kind, SuggestionKind::Help);
    }

    #[test]
    fn test_telemetry_forwarded_and_failures_ignored() {
        let telemetry = RecordingTelemetry::default();
        let mut session = PlaySession::new(EngineConfig::default(), t0())
            .unwrap()
            .with_telemetry(Box::new(telemetry.clone()));
        session.set_elements(target());
        for i in 0..15 {
            session.process(SessionInput::Down {
                x: 200.0,
                y: 125.0,
                touches: 1,
                at: t0() + Duration::seconds(i),
            });
            session.process(SessionInput::Up {
                at: t0() + Duration::seconds(i),
            });
        }

        let events = telemetry.events();
        let interactions = events
            .iter()
            .filter(|e| matches!(e.payload, TelemetryPayload::Interaction { .. }))
            .count();
        let suggestions = events
            .iter()
            .filter(|e| matches!(e.payload, TelemetryPayload::Suggestion { .. }))
            .count();
        assert_eq!(interactions, 15);
        assert_eq!(suggestions, 1);
        assert!(events.iter().all(|e| e.session_id == session.id()));

        let mut broken = PlaySession::new(EngineConfig::default(), t0())
            .unwrap()
            .with_telemetry(Box::new(BrokenTelemetry));
        broken.pointer_down(center(), 1, t0());
        assert!(broken.pointer_up(t0()).is_some());
    }

    #[test]
    fn test_trailing_finger_after_pinch_not_recorded() {
        let mut h = Harness::new(EngineConfig::default());
        h.session.pointer_down(center(), 2, t0());
        let pinch = h.session.pointer_up(t0() + Duration::milliseconds(400)).unwrap();
        assert_eq!(pinch.gesture_type, GestureType::Multitouch);

        let trailing = t0() + Duration::milliseconds(450);
        assert_eq!(
            h.session.pointer_down(center(), 1, trailing),
            GrantOutcome::Debounced
        );
        assert!(h.session.pointer_up(trailing).is_none());
        assert_eq!(h.session.window().len(), 1);
    }
}
