//! Event types emitted by the incident state machine.

use chrono::{DateTime, Utc};
use incident_core::{IncidentPhase, NodeId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: IncidentEvent,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(event: IncidentEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// All events the orchestration core can emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncidentEvent {
    /// The world-state poller reported fire while the console was idle.
    #[serde(rename = "incident.fire_detected")]
    FireDetected {
        incident_id: Uuid,
        danger_nodes: Vec<NodeId>,
    },

    /// The incident moved to a new lifecycle phase.
    #[serde(rename = "incident.phase_changed")]
    PhaseChanged {
        incident_id: Uuid,
        from: IncidentPhase,
        to: IncidentPhase,
    },

    /// New danger nodes were absorbed into the incident's danger set.
    #[serde(rename = "incident.danger_expanded")]
    DangerExpanded {
        incident_id: Uuid,
        added: Vec<NodeId>,
        total: usize,
    },

    /// A voice-agent session was created and location polling started.
    #[serde(rename = "voice.session_started")]
    VoiceSessionStarted {
        incident_id: Uuid,
        session_id: String,
    },

    /// The voice agent confirmed the caller's location.
    #[serde(rename = "voice.location_confirmed")]
    VoiceLocationConfirmed {
        incident_id: Uuid,
        session_id: String,
        location: NodeId,
    },

    /// The voice session expired before confirming a location.
    #[serde(rename = "voice.session_expired")]
    VoiceSessionExpired {
        incident_id: Uuid,
        session_id: String,
    },

    /// An evacuation route was applied to the view. The audio alert sink
    /// listens for this.
    #[serde(rename = "route.applied")]
    RouteApplied {
        incident_id: Uuid,
        seq: u64,
        source_node: NodeId,
        path: Vec<NodeId>,
        cost: f64,
        danger_nodes: Vec<NodeId>,
    },

    /// No reachable exit from the requested start node.
    #[serde(rename = "route.unreachable")]
    RouteUnreachable {
        incident_id: Uuid,
        source_node: NodeId,
    },

    /// The incident was cleared (operator action or automatic all-clear).
    #[serde(rename = "incident.cleared")]
    AlertCleared { incident_id: Uuid },

    /// A remote adapter call failed. Non-fatal; the next poller tick or
    /// operator action retries naturally.
    #[serde(rename = "adapter.failure")]
    AdapterFailure {
        operation: String,
        message: String,
    },
}
