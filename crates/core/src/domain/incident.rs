use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::node::NodeId;

/// Lifecycle phase of the single active incident.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IncidentPhase {
    #[default]
    Idle,
    Detected,
    AwaitingVoice,
    RouteReady,
    Cleared,
}

impl IncidentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Detected => "detected",
            Self::AwaitingVoice => "awaiting_voice",
            Self::RouteReady => "route_ready",
            Self::Cleared => "cleared",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "detected" => Some(Self::Detected),
            "awaiting_voice" => Some(Self::AwaitingVoice),
            "route_ready" => Some(Self::RouteReady),
            "cleared" => Some(Self::Cleared),
            _ => None,
        }
    }
}

/// Lifecycle phase of a voice-agent session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VoicePhase {
    #[default]
    Requested,
    Listening,
    LocationConfirmed,
    Closed,
}

impl VoicePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Listening => "listening",
            Self::LocationConfirmed => "location_confirmed",
            Self::Closed => "closed",
        }
    }
}

/// A voice-agent session owned by the incident state machine.
///
/// The poller supervisor only ever holds a cancellation handle for the
/// session poller, never this data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSession {
    pub session_id: String,
    pub phase: VoicePhase,
    pub confirmed_location: Option<NodeId>,
    pub started_at: DateTime<Utc>,
}

impl VoiceSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            phase: VoicePhase::Requested,
            confirmed_location: None,
            started_at: Utc::now(),
        }
    }

    pub fn listening(&mut self) {
        self.phase = VoicePhase::Listening;
    }

    pub fn confirm(&mut self, location: NodeId) {
        self.confirmed_location = Some(location);
        self.phase = VoicePhase::LocationConfirmed;
    }

    pub fn close(&mut self) {
        self.phase = VoicePhase::Closed;
    }
}

/// An evacuation route as applied to the view. Replaced wholesale on every
/// accepted path response, never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvacuationPath {
    pub source_node: NodeId,
    pub sequence: Vec<NodeId>,
    pub cost: f64,
    pub computed_at: DateTime<Utc>,
}

/// Crowd sighting reported by the world-state scanner. Pass-through data
/// for the view; never feeds a transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrowdEstimate {
    pub node_id: NodeId,
    pub people_count: u32,
}

/// One row of the operator-facing timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEvent {
    pub time: String,
    pub label: String,
    pub is_current: bool,
}

/// Append-only event log with one contiguous "current" suffix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    events: Vec<TimelineEvent>,
}

impl Timeline {
    /// A fresh timeline with "Normal monitoring" as its sole current event.
    pub fn normal_monitoring(now: DateTime<Utc>) -> Self {
        let mut timeline = Self { events: Vec::new() };
        timeline.append("Normal monitoring", now);
        timeline
    }

    /// Append a new current event. Previously current events stay current;
    /// call [`Timeline::seal`] first to start a new suffix.
    pub fn append(&mut self, label: impl Into<String>, now: DateTime<Utc>) {
        self.events.push(TimelineEvent {
            time: now.format("%H:%M").to_string(),
            label: label.into(),
            is_current: true,
        });
    }

    /// Demote every event to history, so the next append starts a new
    /// current suffix.
    pub fn seal(&mut self) {
        for event in &mut self.events {
            event.is_current = false;
        }
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Length of the trailing run of current events. Everything before it
    /// must be history for the timeline to be well formed.
    pub fn current_suffix_len(&self) -> usize {
        self.events
            .iter()
            .rev()
            .take_while(|e| e.is_current)
            .count()
    }

    /// True when all current events form one contiguous suffix.
    pub fn is_well_formed(&self) -> bool {
        let suffix = self.current_suffix_len();
        self.events[..self.events.len() - suffix]
            .iter()
            .all(|e| !e.is_current)
    }
}

/// The single source of truth for the active incident.
///
/// Exactly one instance exists at a time. It is mutated exclusively by the
/// incident state machine's transition function; adapters and pollers only
/// deliver inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentState {
    pub id: Uuid,
    pub phase: IncidentPhase,
    pub danger_set: BTreeSet<NodeId>,
    pub active_path: Option<EvacuationPath>,
    pub voice_session: Option<VoiceSession>,
    pub crowd_data: Vec<CrowdEstimate>,
    pub timeline: Timeline,
}

impl IncidentState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: IncidentPhase::Idle,
            danger_set: BTreeSet::new(),
            active_path: None,
            voice_session: None,
            crowd_data: Vec::new(),
            timeline: Timeline::normal_monitoring(now),
        }
    }

    /// Reset to normal monitoring: a new incident id, empty danger set,
    /// no path, no voice session, sole timeline event.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.id = Uuid::new_v4();
        self.phase = IncidentPhase::Idle;
        self.danger_set.clear();
        self.active_path = None;
        self.voice_session = None;
        self.crowd_data.clear();
        self.timeline = Timeline::normal_monitoring(now);
    }

    /// Union new danger nodes into the set. Returns how many were new.
    /// Nodes are never removed except through [`IncidentState::reset`].
    pub fn absorb_danger(&mut self, nodes: impl IntoIterator<Item = NodeId>) -> usize {
        let before = self.danger_set.len();
        self.danger_set.extend(nodes);
        self.danger_set.len() - before
    }
}

impl Default for IncidentState {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}
