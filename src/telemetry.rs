//! Telemetry forwarding
//!
//! Accepted interactions and emitted suggestions are forwarded to an external
//! analytics sink. Delivery is fire-and-forget: a failing sink is logged at
//! debug level and never affects engine state or timing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::difficulty::{DifficultyRecommendation, DifficultySample};
use crate::types::{InteractionRecord, Suggestion};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry sink unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode telemetry event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write telemetry event: {0}")]
    Io(#[from] std::io::Error),
}

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryPayload {
    Interaction { record: InteractionRecord },
    Suggestion { suggestion: Suggestion },
    Difficulty {
        recommendation: DifficultyRecommendation,
        sample: DifficultySample,
    },
}

/// Envelope sent to the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Activity session the event belongs to
    pub session_id: Uuid,
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: TelemetryPayload,
}

/// External analytics collaborator
pub trait TelemetrySink: Send + Sync {
    fn send(&self, event: &TelemetryEvent) -> Result<(), TelemetryError>;
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn send(&self, _event: &TelemetryEvent) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Writes one JSON object per line
pub struct JsonLinesTelemetry<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesTelemetry<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> TelemetrySink for JsonLinesTelemetry<W> {
    fn send(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        let line = serde_json::to_string(event)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| TelemetryError::Unavailable("writer lock poisoned".to_string()))?;
        writeln!(writer, "{line}")?;
        Ok(())
    }
}

/// Send an event and swallow any failure
pub fn forward(sink: &dyn TelemetrySink, event: TelemetryEvent) {
    if let Err(e) = sink.send(&event) {
        debug!(error = %e, session_id = %event.session_id, "telemetry delivery failed");
    }
}
