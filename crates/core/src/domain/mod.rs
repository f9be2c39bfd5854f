mod graph;
mod incident;
mod node;

pub use graph::GraphRegistry;
pub use incident::{
    CrowdEstimate, EvacuationPath, IncidentPhase, IncidentState, Timeline, TimelineEvent,
    VoicePhase, VoiceSession,
};
pub use node::{Node, NodeId, NodeRecord};
