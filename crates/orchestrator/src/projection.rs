//! Pure projection of the incident aggregate into an operator-facing view.
//!
//! Presentation state is always derived, never stored: every applied input
//! produces a fresh [`ConsoleView`] from the authoritative
//! [`IncidentState`].

use serde::Serialize;

use incident_core::{
    CrowdEstimate, GraphRegistry, IncidentPhase, IncidentState, NodeId, TimelineEvent, VoicePhase,
};

/// Coarse console mode driving the alert banner.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SystemMode {
    Normal,
    Alert,
}

/// The active route, rendered for display.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteView {
    pub source: NodeId,
    pub source_name: String,
    pub nodes: Vec<NodeId>,
    /// Route as a single line, e.g. `P9 -> P11 -> P10`.
    pub display: String,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VoiceView {
    pub session_id: String,
    pub phase: VoicePhase,
    pub confirmed_location: Option<NodeId>,
}

/// Everything the console renders.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConsoleView {
    pub mode: SystemMode,
    pub phase: IncidentPhase,
    pub danger_nodes: Vec<NodeId>,
    pub route: Option<RouteView>,
    pub voice: Option<VoiceView>,
    pub crowd: Vec<CrowdEstimate>,
    pub timeline: Vec<TimelineEvent>,
}

pub fn project(state: &IncidentState, registry: &GraphRegistry) -> ConsoleView {
    let route = state.active_path.as_ref().map(|path| RouteView {
        source: path.source_node.clone(),
        source_name: registry.display_name(&path.source_node).to_string(),
        nodes: path.sequence.clone(),
        display: path
            .sequence
            .iter()
            .map(NodeId::as_str)
            .collect::<Vec<_>>()
            .join(" -> "),
        cost: path.cost,
    });

    let voice = state.voice_session.as_ref().map(|session| VoiceView {
        session_id: session.session_id.clone(),
        phase: session.phase,
        confirmed_location: session.confirmed_location.clone(),
    });

    ConsoleView {
        mode: if state.phase == IncidentPhase::Idle {
            SystemMode::Normal
        } else {
            SystemMode::Alert
        },
        phase: state.phase,
        danger_nodes: state.danger_set.iter().cloned().collect(),
        route,
        voice,
        crowd: state.crowd_data.clone(),
        timeline: state.timeline.events().to_vec(),
    }
}
