//! Typed adapters over the evacuation backend's HTTP surface.
//!
//! Each operation performs exactly one network call and maps transport
//! failure into a typed [`BackendError`]. No retry logic lives here; the
//! poller supervisor's next tick is the only retry there is.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use incident_core::{CrowdEstimate, NodeId};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BackendError, OrchestratorError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Live world state as reported by the camera scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldStateReport {
    pub has_fire: bool,
    #[serde(default)]
    pub danger_nodes: Vec<NodeId>,
    #[serde(default)]
    pub crowd_data: Vec<CrowdEstimate>,
}

/// A computed evacuation route plus the danger nodes the server saw while
/// computing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathResponse {
    pub path: Vec<NodeId>,
    pub cost: f64,
    #[serde(default)]
    pub live_danger_nodes: Vec<NodeId>,
}

/// Handle returned when a voice agent is triggered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceTrigger {
    pub session_id: String,
}

/// One voice-session poll result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceReport {
    pub is_active: bool,
    #[serde(default)]
    pub location: Option<NodeId>,
}

/// Request body for the alert-audio synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertAudioRequest {
    pub danger_nodes: Vec<NodeId>,
    pub escape_path: Vec<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_node: Option<NodeId>,
}

/// The remote operations the orchestration core consumes.
///
/// Implemented over HTTP by [`BackendClient`]; tests substitute scripted
/// mocks.
#[async_trait]
pub trait EvacuationBackend: Send + Sync {
    async fn fetch_world_state(&self) -> std::result::Result<WorldStateReport, BackendError>;

    async fn fetch_evacuation_path(
        &self,
        start: &NodeId,
        affected: &BTreeSet<NodeId>,
    ) -> std::result::Result<PathResponse, BackendError>;

    async fn trigger_voice_agent(&self) -> std::result::Result<VoiceTrigger, BackendError>;

    async fn poll_voice_session(
        &self,
        session_id: &str,
    ) -> std::result::Result<VoiceReport, BackendError>;

    /// Synthesize an audio alert. Consumed only by the notification sink;
    /// failures never reach the state machine.
    async fn generate_alert_audio(
        &self,
        request: &AlertAudioRequest,
    ) -> std::result::Result<Bytes, BackendError>;
}

/// HTTP implementation of [`EvacuationBackend`].
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> crate::error::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OrchestratorError::ClientSetup(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn path_url(&self, start: &NodeId, affected: &BTreeSet<NodeId>) -> String {
        let mut url = format!(
            "{}/get_path?start_node={}",
            self.base_url,
            urlencoding::encode(start.as_str())
        );
        // FastAPI list convention: the query key repeats per element.
        for node in affected {
            url.push_str("&affected_nodes=");
            url.push_str(&urlencoding::encode(node.as_str()));
        }
        url
    }
}

#[async_trait]
impl EvacuationBackend for BackendClient {
    async fn fetch_world_state(&self) -> std::result::Result<WorldStateReport, BackendError> {
        let url = format!("{}/get_world_state", self.base_url);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        let report: WorldStateReport = response.json().await?;
        debug!(
            has_fire = report.has_fire,
            danger_nodes = report.danger_nodes.len(),
            "World state fetched"
        );
        Ok(report)
    }

    async fn fetch_evacuation_path(
        &self,
        start: &NodeId,
        affected: &BTreeSet<NodeId>,
    ) -> std::result::Result<PathResponse, BackendError> {
        let url = self.path_url(start, affected);
        let response = self.http.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound);
        }
        let response = response.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn trigger_voice_agent(&self) -> std::result::Result<VoiceTrigger, BackendError> {
        let url = format!("{}/trigger_fire_agent", self.base_url);
        let response = self.http.post(&url).send().await?.error_for_status()?;

        // The endpoint also reports status/message fields; only the session
        // handle matters here, and its absence is a protocol error.
        let body: serde_json::Value = response.json().await?;
        match body.get("session_id").and_then(|v| v.as_str()) {
            Some(session_id) if !session_id.is_empty() => Ok(VoiceTrigger {
                session_id: session_id.to_string(),
            }),
            _ => Err(BackendError::Protocol(
                "trigger_fire_agent response missing session_id".to_string(),
            )),
        }
    }

    async fn poll_voice_session(
        &self,
        session_id: &str,
    ) -> std::result::Result<VoiceReport, BackendError> {
        let url = format!(
            "{}/get_voice_location/{}",
            self.base_url,
            urlencoding::encode(session_id)
        );
        let response = self.http.get(&url).send().await?;

        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::GONE
        ) {
            return Err(BackendError::SessionExpired);
        }
        let response = response.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn generate_alert_audio(
        &self,
        request: &AlertAudioRequest,
    ) -> std::result::Result<Bytes, BackendError> {
        let url = format!("{}/generate_alert_audio", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?)
    }
}
