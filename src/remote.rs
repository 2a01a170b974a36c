//! Remote behavior analysis
//!
//! Optional enrichment from a remote multimodal analysis service. Every call is
//! bounded by a timeout, and any failure (timeout, transport error, non-2xx,
//! malformed or low-confidence response) makes the result "unavailable". The
//! caller then falls back to the local metrics; errors never reach the host.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

use crate::types::{BehaviorMetrics, GestureType, InteractionRecord, MetricsSource, SuggestionKind};

/// Why a remote analysis is unavailable
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    #[error("remote analysis timed out after {0} ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote analysis returned status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Features of the current window sent for analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleFeatures {
    pub sample_size: usize,
    pub mean_precision: f64,
    pub interactions_per_second: f64,
    pub low_precision_count: usize,
    pub precise_streak: usize,
    pub mean_response_time_ms: f64,
    pub tap_count: usize,
    pub drag_count: usize,
    pub multitouch_count: usize,
}

impl SampleFeatures {
    pub fn from_window(metrics: &BehaviorMetrics, window: &[InteractionRecord]) -> Self {
        let count = |kind: GestureType| window.iter().filter(|r| r.gesture_type == kind).count();
        let mean_response_time_ms = if window.is_empty() {
            0.0
        } else {
            window.iter().map(|r| r.response_time_ms as f64).sum::<f64>() / window.len() as f64
        };

        Self {
            sample_size: metrics.sample_size,
            mean_precision: metrics.mean_precision,
            interactions_per_second: metrics.interactions_per_second,
            low_precision_count: metrics.low_precision_count,
            precise_streak: metrics.precise_streak,
            mean_response_time_ms,
            tap_count: count(GestureType::Tap),
            drag_count: count(GestureType::Drag),
            multitouch_count: count(GestureType::Multitouch),
        }
    }
}

/// Request body for the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Type of the most recent gesture in the window
    pub gesture_type: Option<GestureType>,
    pub raw_sample_features: SampleFeatures,
    pub confidence_threshold: f64,
}

/// Response from the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAnalysis {
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(alias = "frustrationScore")]
    pub frustration_score: f64,
    #[serde(alias = "engagementScore")]
    pub engagement_score: f64,
    /// Service confidence (0-1); absent means the service does not report one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl RemoteAnalysis {
    /// Suggestion kinds the service recommended, in its order. Unknown labels are skipped.
    pub fn recommended_kinds(&self) -> Vec<SuggestionKind> {
        let mut kinds = Vec::new();
        for kind in self.suggestions.iter().filter_map(|s| SuggestionKind::from_label(s)) {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }

    /// Check the scores are in range and the confidence clears `min_confidence`
    pub fn validate(&self, min_confidence: f64) -> Result<(), RemoteError> {
        for (name, score) in [
            ("frustration_score", self.frustration_score),
            ("engagement_score", self.engagement_score),
        ] {
            if !score.is_finite() || !(0.0..=100.0).contains(&score) {
                return Err(RemoteError::Malformed(format!(
                    "{name} {score} outside 0..=100"
                )));
            }
        }

        if let Some(confidence) = self.confidence {
            if !confidence.is_finite() || confidence < min_confidence {
                return Err(RemoteError::Malformed(format!(
                    "confidence {confidence} below minimum {min_confidence}"
                )));
            }
        }
        Ok(())
    }

    /// Merge the remote scores into the local metrics.
    ///
    /// Frustration keeps the higher of the two so the local miss-run floor
    /// still holds. Engagement takes the remote value.
    pub fn enrich(&self, metrics: &BehaviorMetrics) -> BehaviorMetrics {
        BehaviorMetrics {
            frustration_score: metrics.frustration_score.max(self.frustration_score),
            engagement_score: self.engagement_score,
            source: MetricsSource::RemoteEnriched,
            ..metrics.clone()
        }
    }
}

/// Boxed future returned by [`RemoteAnalyzer::analyze`]
pub type AnalysisFuture =
    Pin<Box<dyn Future<Output = Result<RemoteAnalysis, RemoteError>> + Send + 'static>>;

/// Remote analysis collaborator.
///
/// The returned future must own everything it needs so it can outlive the
/// borrow of `self` while the session keeps recording input.
pub trait RemoteAnalyzer: Send + Sync {
    fn analyze(&self, request: AnalysisRequest) -> AnalysisFuture;
}

/// Await a remote analysis with a hard timeout.
///
/// The result still has to pass [`RemoteAnalysis::validate`] before use.
pub async fn bounded_analysis(
    future: AnalysisFuture,
    timeout: Duration,
) -> Result<RemoteAnalysis, RemoteError> {
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| RemoteError::Timeout(timeout.as_millis() as u64))?
}

#[cfg(feature = "http")]
pub use http::HttpRemoteAnalyzer;

#[cfg(feature = "http")]
mod http {
    use super::{AnalysisFuture, AnalysisRequest, RemoteAnalysis, RemoteAnalyzer, RemoteError};
    use reqwest::Client;
    use std::time::Duration;

    /// JSON-over-HTTP analyzer. POSTs the request to a single endpoint.
    #[derive(Debug, Clone)]
    pub struct HttpRemoteAnalyzer {
        client: Client,
        endpoint: String,
    }

    impl HttpRemoteAnalyzer {
        pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| RemoteError::Transport(e.to_string()))?;
            Ok(Self {
                client,
                endpoint: endpoint.into(),
            })
        }
    }

    impl RemoteAnalyzer for HttpRemoteAnalyzer {
        fn analyze(&self, request: AnalysisRequest) -> AnalysisFuture {
            let client = self.client.clone();
            let endpoint = self.endpoint.clone();

            Box::pin(async move {
                let response = client
                    .post(&endpoint)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| RemoteError::Transport(e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(RemoteError::Status(status.as_u16()));
                }

                response
                    .json::<RemoteAnalysis>()
                    .await
                    .map_err(|e| RemoteError::Malformed(e.to_string()))
            })
        }
    }

}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Responds with a fixed result after an optional delay
    pub(crate) struct ScriptedAnalyzer {
        pub(crate) result: Result<RemoteAnalysis, RemoteError>,
        pub(crate) delay: Duration,
    }

    impl ScriptedAnalyzer {
        pub(crate) fn ok(analysis: RemoteAnalysis) -> Self {
            Self {
                result: Ok(analysis),
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn failing(error: RemoteError) -> Self {
            Self {
                result: Err(error),
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn slow(analysis: RemoteAnalysis, delay: Duration) -> Self {
            Self {
                result: Ok(analysis),
                delay,
            }
        }
    }

    impl RemoteAnalyzer for ScriptedAnalyzer {
        fn analyze(&self, _request: AnalysisRequest) -> AnalysisFuture {
            let result = self.result.clone();
            let delay = self.delay;
            Box::pin(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            })
        }
    }

    pub(crate) fn analysis(frustration: f64, engagement: f64, suggestions: &[&str]) -> RemoteAnalysis {
        RemoteAnalysis {
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
            frustration_score: frustration,
            engagement_score: engagement,
            confidence: Some(0.9),
        }
    }
}
