//! Playsense - Interaction analysis engine for therapeutic play activities
//!
//! Playsense turns raw pointer events from a child's play session into
//! interaction records, windowed behavior metrics and rate-limited adaptive
//! suggestions: gesture classification → hit testing → precision scoring →
//! rolling-window metrics → suggestion selection.
//!
//! ## Modules
//!
//! - **Session**: Synchronous per-activity engine ([`PlaySession`])
//! - **Driver**: Async event loop with periodic evaluation and remote analysis
//! - **Difficulty**: Completion-based difficulty recommendations

pub mod config;
pub mod difficulty;
pub mod driver;
pub mod error;
pub mod gesture;
pub mod metrics;
pub mod recorder;
pub mod remote;
pub mod session;
pub mod suggestion;
pub mod telemetry;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{EngineConfig, SensitivityProfile};
pub use difficulty::{recommend, DifficultyRecommendation, DifficultySample};
pub use driver::{DriverHandle, SessionDriver};
pub use error::EngineError;
pub use remote::{RemoteAnalysis, RemoteAnalyzer, RemoteError};
pub use session::{EventBuffer, PlaySession, PresentationSink};
pub use telemetry::{TelemetryEvent, TelemetrySink};
pub use types::{
    BehaviorMetrics, EngineEvent, GestureType, InteractionRecord, InteractiveElement, Point,
    SessionInput, Suggestion, SuggestionKind,
};

/// Engine version reported by the CLI and FFI
pub const PLAYSENSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name stamped on replay reports
pub const PRODUCER_NAME: &str = "playsense";
