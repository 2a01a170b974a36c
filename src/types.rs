//! Core data types
//!
//! Interaction records, interactive elements, behavior metrics and suggestions
//! that flow between the analysis components and the host application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::difficulty::{DifficultyLevel, DifficultyRecommendation, DifficultySample};

/// A screen coordinate in logical pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Both coordinates are finite (not NaN, not infinite)
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Point shifted by a displacement
    pub fn offset(&self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

/// Width and height of an element in logical pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

fn default_true() -> bool {
    true
}

/// An on-screen element the child can touch.
///
/// Supplied by the host on every layout update. The engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveElement {
    /// Element identifier
    pub id: String,
    /// Top-left corner
    pub position: Point,
    /// Bounding box size
    pub size: Size,
    /// Whether the element currently accepts input
    #[serde(default = "default_true")]
    pub active: bool,
    /// Whether the element is currently rendered
    #[serde(default = "default_true")]
    pub visible: bool,
}

impl InteractiveElement {
    /// Create an active, visible element
    pub fn new(id: impl Into<String>, position: Point, size: Size) -> Self {
        Self {
            id: id.into(),
            position,
            size,
            active: true,
            visible: true,
        }
    }

    /// Only active and visible elements take part in hit-testing
    pub fn is_eligible(&self) -> bool {
        self.active && self.visible
    }

    /// Geometric center of the bounding box
    pub fn center(&self) -> Point {
        Point::new(
            self.position.x + self.size.width / 2.0,
            self.position.y + self.size.height / 2.0,
        )
    }
}

/// Classified gesture type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureType {
    Tap,
    Drag,
    Multitouch,
}

impl GestureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GestureType::Tap => "tap",
            GestureType::Drag => "drag",
            GestureType::Multitouch => "multitouch",
        }
    }
}

/// One accepted interaction in the rolling window.
///
/// Created by the recorder, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// When the interaction was accepted
    pub timestamp: DateTime<Utc>,
    /// Where the gesture ended
    pub position: Point,
    /// Element resolved by the hit tester, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_element_id: Option<String>,
    /// Classification at release time
    pub gesture_type: GestureType,
    /// Normalized closeness to the ideal target point (0-1)
    pub precision: f64,
    /// Time since the previous accepted interaction (or activity start)
    pub response_time_ms: u64,
}

/// Where the scores in a metrics snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsSource {
    /// Local heuristic only
    Local,
    /// Frustration/engagement replaced by the remote analysis
    RemoteEnriched,
}

/// Aggregate metrics over the rolling interaction window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorMetrics {
    /// Arithmetic mean of record precision (0-1)
    pub mean_precision: f64,
    /// Window size divided by window duration
    pub interactions_per_second: f64,
    /// Frustration score (0-100)
    pub frustration_score: f64,
    /// Engagement score (0-100)
    pub engagement_score: f64,
    /// Number of records the metrics were computed from
    pub sample_size: usize,

    /// Records below the low-precision threshold
    pub low_precision_count: usize,
    /// Trailing run of high-precision records since the last celebration
    pub precise_streak: usize,
    /// How long the interaction rate has stayed above the overstimulation rate
    pub sustained_high_rate_ms: i64,
    /// Sustained overstimulation detected
    pub overstimulated: bool,
    /// Celebration-worthy precision streak detected
    pub celebration_streak: bool,

    /// Evaluation instant
    pub computed_at: DateTime<Utc>,
    /// Origin of the scores
    pub source: MetricsSource,
}

/// Kind of proactive suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Rest,
    Help,
    Celebration,
    ChangeActivity,
}

impl SuggestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionKind::Rest => "rest",
            SuggestionKind::Help => "help",
            SuggestionKind::Celebration => "celebration",
            SuggestionKind::ChangeActivity => "change_activity",
        }
    }

    /// Parse a free-form label as returned by the remote analysis service
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "rest" | "break" | "descanso" => Some(SuggestionKind::Rest),
            "help" | "hint" | "ayuda" => Some(SuggestionKind::Help),
            "celebration" | "celebrate" | "celebracion" => Some(SuggestionKind::Celebration),
            "changeactivity" | "cambiaractividad" => Some(SuggestionKind::ChangeActivity),
            _ => None,
        }
    }
}

/// Suggestion priority; ordered low < medium < high
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// A proactive suggestion for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Unique suggestion identifier
    pub id: Uuid,
    /// What the host should offer
    pub kind: SuggestionKind,
    /// How urgently
    pub priority: Priority,
    /// Which metric crossed which threshold
    pub reasoning: String,
    /// Emission time
    pub created_at: DateTime<Utc>,
}

/// Events delivered to the presentation collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Show touch feedback (particles, haptics) for an accepted interaction
    Feedback { record: InteractionRecord },
    /// Offer a proactive suggestion
    Suggestion { suggestion: Suggestion },
    /// Difficulty recommendation after a batch of completions
    Difficulty {
        recommendation: DifficultyRecommendation,
        level: DifficultyLevel,
        sample: DifficultySample,
    },
}

/// Host input accepted by the session driver, the CLI replay and the C ABI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionInput {
    /// Finger(s) down
    Down {
        x: f64,
        y: f64,
        #[serde(default = "default_touches")]
        touches: u32,
        at: DateTime<Utc>,
    },
    /// Displacement since the gesture started
    Move {
        dx: f64,
        dy: f64,
        #[serde(default = "default_touches")]
        touches: u32,
    },
    /// All fingers lifted
    Up { at: DateTime<Utc> },
    /// Replace the set of interactive elements
    Elements { elements: Vec<InteractiveElement> },
    /// One exercise finished
    Completion {
        success: bool,
        time_seconds: f64,
        attempts: u32,
    },
    /// Clock tick for the periodic evaluation
    Tick { at: DateTime<Utc> },
}

fn default_touches() -> u32 {
    1
}

impl SessionInput {
    /// Host timestamp carried by the input, if any
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionInput::Down { at, .. } | SessionInput::Up { at } | SessionInput::Tick { at } => {
                Some(*at)
            }
            _ => None,
        }
    }
}
