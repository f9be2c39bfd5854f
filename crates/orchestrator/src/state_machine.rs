//! The incident state machine.
//!
//! Owns the single [`IncidentState`] aggregate and is its only writer. The
//! transition function is pure and synchronous: it consumes one
//! [`MachineInput`], mutates the aggregate atomically, and returns the
//! [`Effect`]s the executor must run (adapter calls, poller lifecycle,
//! event publication). No transition awaits anything, so no transition can
//! be observed half-applied.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use events::IncidentEvent;
use incident_core::{
    EvacuationPath, GraphRegistry, IncidentPhase, IncidentState, NodeId, VoiceSession,
};

use crate::error::BackendError;
use crate::services::{PathResponse, VoiceReport, WorldStateReport};

/// Everything that can be fed into the transition function: poller results,
/// adapter completions, and the two operator inputs.
#[derive(Debug, Clone)]
pub enum MachineInput {
    WorldState(WorldStateReport),
    WorldStateFailed { error: BackendError },
    VoiceAgentStarted { session_id: String },
    VoiceAgentFailed { error: BackendError },
    VoiceReport { session_id: String, report: VoiceReport },
    VoicePollFailed { session_id: String, error: BackendError },
    PathResolved { seq: u64, start: NodeId, response: PathResponse },
    PathFailed { seq: u64, start: NodeId, error: BackendError },
    SelectNode(NodeId),
    ClearAlert,
    /// Handled by the executor loop; a no-op for the machine itself.
    Shutdown,
}

/// Side effects a transition requests. Executed by the executor, never
/// inside the transition function.
#[derive(Debug, Clone)]
pub enum Effect {
    TriggerVoiceAgent,
    FetchPath {
        seq: u64,
        start: NodeId,
        affected: BTreeSet<NodeId>,
    },
    StartSessionPoller { session_id: String },
    StopSessionPoller,
    StopAllPollers,
    Publish(IncidentEvent),
}

/// The state machine. One instance per process, owned by the executor.
pub struct IncidentMachine {
    registry: Arc<GraphRegistry>,
    state: IncidentState,
    /// Sequence number for the next path fetch to issue.
    next_seq: u64,
    /// Highest sequence number whose response was applied.
    applied_seq: u64,
    /// A voice agent has been requested within this incident. Not reset on
    /// session expiry: no duplicate agent sessions within one incident.
    voice_requested: bool,
}

impl IncidentMachine {
    pub fn new(registry: Arc<GraphRegistry>, now: DateTime<Utc>) -> Self {
        Self {
            registry,
            state: IncidentState::new(now),
            next_seq: 1,
            applied_seq: 0,
            voice_requested: false,
        }
    }

    pub fn state(&self) -> &IncidentState {
        &self.state
    }

    pub fn snapshot(&self) -> IncidentState {
        self.state.clone()
    }

    pub fn applied_seq(&self) -> u64 {
        self.applied_seq
    }

    /// Whether `from -> to` is a legal phase transition.
    pub fn can_transition(from: IncidentPhase, to: IncidentPhase) -> bool {
        use IncidentPhase::*;
        match from {
            Idle => matches!(to, Detected),
            // RouteReady from Detected covers a manual override before the
            // voice agent comes up.
            Detected => matches!(to, AwaitingVoice | RouteReady | Cleared),
            AwaitingVoice => matches!(to, RouteReady | Detected | Cleared),
            RouteReady => matches!(to, Cleared),
            Cleared => matches!(to, Idle),
        }
    }

    /// Apply one input, returning the effects to run. `now` stamps timeline
    /// entries and applied paths.
    pub fn apply(&mut self, input: MachineInput, now: DateTime<Utc>) -> Vec<Effect> {
        match input {
            MachineInput::WorldState(report) => self.on_world_state(report, now),
            MachineInput::WorldStateFailed { error } => {
                self.on_adapter_failure("fetch_world_state", &error, now)
            }
            MachineInput::VoiceAgentStarted { session_id } => {
                self.on_voice_agent_started(session_id, now)
            }
            MachineInput::VoiceAgentFailed { error } => self.on_voice_agent_failed(&error, now),
            MachineInput::VoiceReport { session_id, report } => {
                self.on_voice_report(&session_id, report, now)
            }
            MachineInput::VoicePollFailed { session_id, error } => {
                self.on_voice_poll_failed(&session_id, &error, now)
            }
            MachineInput::PathResolved { seq, start, response } => {
                self.on_path_resolved(seq, start, response, now)
            }
            MachineInput::PathFailed { seq, start, error } => {
                self.on_path_failed(seq, &start, &error, now)
            }
            MachineInput::SelectNode(node) => self.on_select_node(node, now),
            MachineInput::ClearAlert => self.clear(now),
            MachineInput::Shutdown => Vec::new(),
        }
    }

    fn transition(&mut self, to: IncidentPhase, effects: &mut Vec<Effect>) {
        let from = self.state.phase;
        debug_assert!(Self::can_transition(from, to), "{:?} -> {:?}", from, to);
        debug!(from = from.as_str(), to = to.as_str(), "Phase transition");
        self.state.phase = to;
        effects.push(Effect::Publish(IncidentEvent::PhaseChanged {
            incident_id: self.state.id,
            from,
            to,
        }));
    }

    /// Start a new current-suffix on the timeline.
    fn milestone(&mut self, label: impl Into<String>, now: DateTime<Utc>) {
        self.state.timeline.seal();
        self.state.timeline.append(label, now);
    }

    /// Append to the running current-suffix.
    fn note(&mut self, label: impl Into<String>, now: DateTime<Utc>) {
        self.state.timeline.append(label, now);
    }

    fn absorb_danger(
        &mut self,
        nodes: &[NodeId],
        now: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) {
        let added: Vec<NodeId> = nodes
            .iter()
            .filter(|n| !self.state.danger_set.contains(*n))
            .cloned()
            .collect();
        if added.is_empty() {
            return;
        }
        self.state.absorb_danger(added.iter().cloned());
        if self.state.phase != IncidentPhase::Idle {
            self.note("Danger zone expanded", now);
        }
        effects.push(Effect::Publish(IncidentEvent::DangerExpanded {
            incident_id: self.state.id,
            added,
            total: self.state.danger_set.len(),
        }));
    }

    fn issue_path_fetch(&mut self, start: NodeId, effects: &mut Vec<Effect>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(seq, start = %start, "Issuing path fetch");
        effects.push(Effect::FetchPath {
            seq,
            start,
            affected: self.state.danger_set.clone(),
        });
    }

    fn on_world_state(&mut self, report: WorldStateReport, now: DateTime<Utc>) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.state.crowd_data = report.crowd_data;

        let fire = report.has_fire || !report.danger_nodes.is_empty();

        if fire && !report.danger_nodes.is_empty() {
            if self.state.phase == IncidentPhase::Idle {
                self.milestone("Fire detected automatically", now);
                self.state
                    .absorb_danger(report.danger_nodes.iter().cloned());
                self.transition(IncidentPhase::Detected, &mut effects);
                effects.push(Effect::Publish(IncidentEvent::FireDetected {
                    incident_id: self.state.id,
                    danger_nodes: report.danger_nodes,
                }));
                self.voice_requested = true;
                effects.push(Effect::TriggerVoiceAgent);
            } else {
                self.absorb_danger(&report.danger_nodes, now, &mut effects);
                // An earlier trigger failed outright; the detection tick is
                // allowed to request the agent again.
                if self.state.phase == IncidentPhase::Detected && !self.voice_requested {
                    self.voice_requested = true;
                    effects.push(Effect::TriggerVoiceAgent);
                }
            }
        } else if !fire && self.state.phase != IncidentPhase::Idle {
            debug!("World state reports all clear, closing incident");
            return self.clear(now);
        }

        effects
    }

    fn on_adapter_failure(
        &mut self,
        operation: &str,
        error: &BackendError,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        warn!(operation, error = %error, "Adapter call failed");
        if self.state.phase != IncidentPhase::Idle {
            self.note(format!("{} failed ({})", operation, error), now);
        }
        vec![Effect::Publish(IncidentEvent::AdapterFailure {
            operation: operation.to_string(),
            message: error.to_string(),
        })]
    }

    fn on_voice_agent_started(&mut self, session_id: String, now: DateTime<Utc>) -> Vec<Effect> {
        if self.state.phase != IncidentPhase::Detected {
            debug!(
                session_id = %session_id,
                phase = self.state.phase.as_str(),
                "Voice agent session arrived outside Detected, discarding"
            );
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.state.voice_session = Some(VoiceSession::new(session_id.clone()));
        self.milestone("Voice agent engaged, awaiting location", now);
        self.transition(IncidentPhase::AwaitingVoice, &mut effects);
        effects.push(Effect::Publish(IncidentEvent::VoiceSessionStarted {
            incident_id: self.state.id,
            session_id: session_id.clone(),
        }));
        effects.push(Effect::StartSessionPoller { session_id });
        effects
    }

    fn on_voice_agent_failed(&mut self, error: &BackendError, now: DateTime<Utc>) -> Vec<Effect> {
        if self.state.phase == IncidentPhase::Detected {
            // No session was created, so a later detection tick may retry.
            self.voice_requested = false;
        }
        self.on_adapter_failure("trigger_voice_agent", error, now)
    }

    fn current_session_matches(&self, session_id: &str) -> bool {
        self.state.phase == IncidentPhase::AwaitingVoice
            && self
                .state
                .voice_session
                .as_ref()
                .is_some_and(|s| s.session_id == session_id)
    }

    fn on_voice_report(
        &mut self,
        session_id: &str,
        report: VoiceReport,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        if !self.current_session_matches(session_id) {
            debug!(session_id, "Stale voice report, discarding");
            return Vec::new();
        }

        if report.is_active {
            if let Some(session) = self.state.voice_session.as_mut() {
                session.listening();
            }
            return Vec::new();
        }

        let mut effects = vec![Effect::StopSessionPoller];

        match report.location {
            Some(location) if self.registry.contains(&location) => {
                if let Some(session) = self.state.voice_session.as_mut() {
                    session.confirm(location.clone());
                    session.close();
                }
                self.milestone(
                    format!(
                        "Location confirmed: {}",
                        self.registry.display_name(&location)
                    ),
                    now,
                );
                self.transition(IncidentPhase::RouteReady, &mut effects);
                effects.push(Effect::Publish(IncidentEvent::VoiceLocationConfirmed {
                    incident_id: self.state.id,
                    session_id: session_id.to_string(),
                    location: location.clone(),
                }));
                self.issue_path_fetch(location, &mut effects);
            }
            Some(location) => {
                warn!(%location, "Voice agent confirmed an unknown node");
                self.state.voice_session = None;
                self.milestone("Voice location unrecognized", now);
                self.transition(IncidentPhase::Detected, &mut effects);
                effects.push(Effect::Publish(IncidentEvent::AdapterFailure {
                    operation: "poll_voice_session".to_string(),
                    message: format!("unknown node {}", location),
                }));
            }
            None => {
                self.state.voice_session = None;
                self.milestone("Voice session ended without a location", now);
                self.transition(IncidentPhase::Detected, &mut effects);
            }
        }

        effects
    }

    fn on_voice_poll_failed(
        &mut self,
        session_id: &str,
        error: &BackendError,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        if !self.current_session_matches(session_id) {
            debug!(session_id, "Failure from a stale voice poller, discarding");
            return Vec::new();
        }

        if *error == BackendError::SessionExpired {
            // Terminal for this session: drop it and fall back to Detected.
            // voice_requested stays set, so the incident will not spawn a
            // duplicate agent session.
            self.state.voice_session = None;
            let mut effects = vec![Effect::StopSessionPoller];
            self.milestone("Voice session expired", now);
            self.transition(IncidentPhase::Detected, &mut effects);
            effects.push(Effect::Publish(IncidentEvent::VoiceSessionExpired {
                incident_id: self.state.id,
                session_id: session_id.to_string(),
            }));
            return effects;
        }

        // Transport failure: the session poller retries on its next tick.
        self.on_adapter_failure("poll_voice_session", error, now)
    }

    fn on_select_node(&mut self, node: NodeId, now: DateTime<Utc>) -> Vec<Effect> {
        if !self.registry.contains(&node) {
            warn!(%node, "Ignoring selection of unknown node");
            return Vec::new();
        }

        match self.state.phase {
            IncidentPhase::Idle | IncidentPhase::Cleared => {
                debug!(%node, "Node selected with no active incident, ignoring");
                Vec::new()
            }
            IncidentPhase::Detected | IncidentPhase::AwaitingVoice | IncidentPhase::RouteReady => {
                let mut effects = Vec::new();
                if self.state.phase == IncidentPhase::AwaitingVoice {
                    // Operator override preempts the voice flow.
                    self.state.voice_session = None;
                    effects.push(Effect::StopSessionPoller);
                }
                self.milestone(format!("Manual location override: {}", node), now);
                if self.state.phase != IncidentPhase::RouteReady {
                    self.transition(IncidentPhase::RouteReady, &mut effects);
                }
                self.issue_path_fetch(node, &mut effects);
                effects
            }
        }
    }

    fn on_path_resolved(
        &mut self,
        seq: u64,
        start: NodeId,
        response: PathResponse,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        if self.state.phase != IncidentPhase::RouteReady || seq <= self.applied_seq {
            debug!(seq, applied_seq = self.applied_seq, "Stale path response, discarding");
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.applied_seq = seq;
        self.absorb_danger(&response.live_danger_nodes, now, &mut effects);

        let label = if self.state.active_path.is_some() {
            "Evacuation route updated"
        } else {
            "Evacuation route activated"
        };
        self.note(label, now);

        self.state.active_path = Some(EvacuationPath {
            source_node: start.clone(),
            sequence: response.path.clone(),
            cost: response.cost,
            computed_at: now,
        });

        effects.push(Effect::Publish(IncidentEvent::RouteApplied {
            incident_id: self.state.id,
            seq,
            source_node: start,
            path: response.path,
            cost: response.cost,
            danger_nodes: self.state.danger_set.iter().cloned().collect(),
        }));
        effects
    }

    fn on_path_failed(
        &mut self,
        seq: u64,
        start: &NodeId,
        error: &BackendError,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        if self.state.phase != IncidentPhase::RouteReady || seq <= self.applied_seq {
            debug!(seq, "Failure from a superseded path request, discarding");
            return Vec::new();
        }

        if *error == BackendError::NotFound {
            self.note(format!("No safe path from {}", start), now);
            return vec![Effect::Publish(IncidentEvent::RouteUnreachable {
                incident_id: self.state.id,
                source_node: start.clone(),
            })];
        }

        self.on_adapter_failure("fetch_evacuation_path", error, now)
    }

    /// Reset to normal monitoring. Idempotent: a second call while already
    /// idle changes nothing.
    fn clear(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        if self.state.phase == IncidentPhase::Idle {
            return Vec::new();
        }

        let incident_id = self.state.id;
        let mut effects = vec![Effect::StopSessionPoller];
        self.transition(IncidentPhase::Cleared, &mut effects);
        effects.push(Effect::Publish(IncidentEvent::AlertCleared { incident_id }));

        self.state.reset(now);
        self.voice_requested = false;
        // Any path request still in flight belongs to the closed incident.
        self.applied_seq = self.next_seq - 1;
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> IncidentMachine {
        let registry = Arc::new(GraphRegistry::campus().unwrap());
        IncidentMachine::new(registry, Utc::now())
    }

    fn fire_report(nodes: &[&str]) -> MachineInput {
        MachineInput::WorldState(WorldStateReport {
            has_fire: !nodes.is_empty(),
            danger_nodes: nodes.iter().map(|n| NodeId::from(*n)).collect(),
            crowd_data: Vec::new(),
        })
    }

    fn all_clear() -> MachineInput {
        MachineInput::WorldState(WorldStateReport {
            has_fire: false,
            danger_nodes: Vec::new(),
            crowd_data: Vec::new(),
        })
    }

    fn path_response(nodes: &[&str], cost: f64) -> PathResponse {
        PathResponse {
            path: nodes.iter().map(|n| NodeId::from(*n)).collect(),
            cost,
            live_danger_nodes: Vec::new(),
        }
    }

    /// Drive a fresh machine to AwaitingVoice with danger {P5, P6}.
    fn awaiting_voice() -> IncidentMachine {
        let mut m = machine();
        let effects = m.apply(fire_report(&["P5", "P6"]), Utc::now());
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::TriggerVoiceAgent)));
        m.apply(
            MachineInput::VoiceAgentStarted {
                session_id: "sess-1".to_string(),
            },
            Utc::now(),
        );
        assert_eq!(m.state().phase, IncidentPhase::AwaitingVoice);
        m
    }

    fn confirmed(session_id: &str, location: &str) -> MachineInput {
        MachineInput::VoiceReport {
            session_id: session_id.to_string(),
            report: VoiceReport {
                is_active: false,
                location: Some(NodeId::from(location)),
            },
        }
    }

    #[test]
    fn test_fire_in_idle_moves_to_detected_and_triggers_voice() {
        let mut m = machine();
        let effects = m.apply(fire_report(&["P5", "P6"]), Utc::now());

        assert_eq!(m.state().phase, IncidentPhase::Detected);
        assert_eq!(
            m.state().danger_set,
            ["P5".into(), "P6".into()].into_iter().collect()
        );
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::TriggerVoiceAgent)));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Publish(IncidentEvent::FireDetected { .. })
        )));
        assert_eq!(
            m.state().timeline.events().last().unwrap().label,
            "Fire detected automatically"
        );
    }

    #[test]
    fn test_voice_confirmation_issues_path_fetch_with_danger_set() {
        let mut m = awaiting_voice();
        let effects = m.apply(confirmed("sess-1", "P9"), Utc::now());

        assert_eq!(m.state().phase, IncidentPhase::RouteReady);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StopSessionPoller)));

        let fetch = effects
            .iter()
            .find_map(|e| match e {
                Effect::FetchPath { seq, start, affected } => Some((*seq, start, affected)),
                _ => None,
            })
            .expect("path fetch issued");
        assert_eq!(fetch.0, 1);
        assert_eq!(fetch.1, &NodeId::from("P9"));
        assert_eq!(
            fetch.2,
            &["P5".into(), "P6".into()].into_iter().collect::<BTreeSet<NodeId>>()
        );
    }

    #[test]
    fn test_manual_override_preempts_voice() {
        let mut m = awaiting_voice();
        let effects = m.apply(MachineInput::SelectNode("P3".into()), Utc::now());

        assert_eq!(m.state().phase, IncidentPhase::RouteReady);
        assert!(m.state().voice_session.is_none());
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StopSessionPoller)));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::FetchPath { .. })));
    }

    #[test]
    fn test_stale_path_response_never_overwrites_newer() {
        let mut m = awaiting_voice();
        // Voice confirmation issues request #1.
        m.apply(confirmed("sess-1", "P9"), Utc::now());
        // Operator override issues request #2 before #1 resolves.
        m.apply(MachineInput::SelectNode("P3".into()), Utc::now());

        // #2 resolves first and is applied.
        m.apply(
            MachineInput::PathResolved {
                seq: 2,
                start: "P3".into(),
                response: path_response(&["P3", "P13"], 81.0),
            },
            Utc::now(),
        );
        assert_eq!(m.applied_seq(), 2);

        // #1 resolves afterward and must be silently dropped.
        let effects = m.apply(
            MachineInput::PathResolved {
                seq: 1,
                start: "P9".into(),
                response: path_response(&["P9", "P11", "P10"], 300.0),
            },
            Utc::now(),
        );
        assert!(effects.is_empty());
        assert_eq!(m.applied_seq(), 2);

        let path = m.state().active_path.as_ref().unwrap();
        assert_eq!(path.source_node, NodeId::from("P3"));
        assert_eq!(path.sequence, vec![NodeId::from("P3"), NodeId::from("P13")]);
    }

    #[test]
    fn test_route_replacement_merges_live_danger() {
        let mut m = awaiting_voice();
        m.apply(confirmed("sess-1", "P9"), Utc::now());
        m.apply(
            MachineInput::PathResolved {
                seq: 1,
                start: "P9".into(),
                response: PathResponse {
                    path: vec!["P9".into(), "P11".into(), "P10".into()],
                    cost: 200.0,
                    live_danger_nodes: vec!["P5".into(), "P8".into()],
                },
            },
            Utc::now(),
        );

        // P8 is new, P5 was already known; the set only ever grows.
        assert_eq!(m.state().danger_set.len(), 3);
        assert!(m.state().danger_set.contains(&"P8".into()));
    }

    #[test]
    fn test_danger_set_is_monotone_across_reports() {
        let mut m = machine();
        m.apply(fire_report(&["P5", "P6"]), Utc::now());
        // A later report naming fewer nodes must not shrink the set.
        m.apply(fire_report(&["P6"]), Utc::now());
        assert_eq!(m.state().danger_set.len(), 2);

        m.apply(fire_report(&["P7"]), Utc::now());
        assert_eq!(m.state().danger_set.len(), 3);
    }

    #[test]
    fn test_all_clear_report_resets_to_idle() {
        let mut m = awaiting_voice();
        let effects = m.apply(all_clear(), Utc::now());

        assert_eq!(m.state().phase, IncidentPhase::Idle);
        assert!(m.state().danger_set.is_empty());
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StopSessionPoller)));
        assert_eq!(m.state().timeline.len(), 1);
        assert_eq!(m.state().timeline.events()[0].label, "Normal monitoring");
    }

    #[test]
    fn test_clear_alert_is_idempotent() {
        let mut m = awaiting_voice();
        let first = m.apply(MachineInput::ClearAlert, Utc::now());
        assert!(!first.is_empty());
        let after_first = m.snapshot();

        let second = m.apply(MachineInput::ClearAlert, Utc::now());
        assert!(second.is_empty());
        let after_second = m.snapshot();

        assert_eq!(after_first.id, after_second.id);
        assert_eq!(after_first.phase, after_second.phase);
        assert_eq!(after_first.timeline.events(), after_second.timeline.events());
    }

    #[test]
    fn test_path_response_from_cleared_incident_is_dropped() {
        let mut m = awaiting_voice();
        m.apply(confirmed("sess-1", "P9"), Utc::now());
        m.apply(MachineInput::ClearAlert, Utc::now());

        // The in-flight request #1 resolves after the incident closed.
        let effects = m.apply(
            MachineInput::PathResolved {
                seq: 1,
                start: "P9".into(),
                response: path_response(&["P9", "P11", "P10"], 120.0),
            },
            Utc::now(),
        );
        assert!(effects.is_empty());
        assert!(m.state().active_path.is_none());
        assert_eq!(m.state().phase, IncidentPhase::Idle);
    }

    #[test]
    fn test_stale_voice_report_is_discarded() {
        let mut m = awaiting_voice();
        let effects = m.apply(confirmed("sess-OLD", "P9"), Utc::now());
        assert!(effects.is_empty());
        assert_eq!(m.state().phase, IncidentPhase::AwaitingVoice);
    }

    #[test]
    fn test_session_expiry_falls_back_to_detected_without_retrigger() {
        let mut m = awaiting_voice();
        let effects = m.apply(
            MachineInput::VoicePollFailed {
                session_id: "sess-1".to_string(),
                error: BackendError::SessionExpired,
            },
            Utc::now(),
        );

        assert_eq!(m.state().phase, IncidentPhase::Detected);
        assert!(m.state().voice_session.is_none());
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StopSessionPoller)));

        // The next detection tick must not spawn a duplicate agent session.
        let effects = m.apply(fire_report(&["P5", "P6"]), Utc::now());
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::TriggerVoiceAgent)));
    }

    #[test]
    fn test_trigger_failure_allows_retry_on_next_tick() {
        let mut m = machine();
        m.apply(fire_report(&["P5"]), Utc::now());
        m.apply(
            MachineInput::VoiceAgentFailed {
                error: BackendError::Transport("connection refused".into()),
            },
            Utc::now(),
        );

        let effects = m.apply(fire_report(&["P5"]), Utc::now());
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::TriggerVoiceAgent)));
    }

    #[test]
    fn test_transport_failure_does_not_revert_phase() {
        let mut m = awaiting_voice();
        let effects = m.apply(
            MachineInput::VoicePollFailed {
                session_id: "sess-1".to_string(),
                error: BackendError::Transport("timeout".into()),
            },
            Utc::now(),
        );

        assert_eq!(m.state().phase, IncidentPhase::AwaitingVoice);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Publish(IncidentEvent::AdapterFailure { .. })
        )));
    }

    #[test]
    fn test_unreachable_path_is_visible_but_non_blocking() {
        let mut m = awaiting_voice();
        m.apply(confirmed("sess-1", "P9"), Utc::now());
        let effects = m.apply(
            MachineInput::PathFailed {
                seq: 1,
                start: "P9".into(),
                error: BackendError::NotFound,
            },
            Utc::now(),
        );

        assert_eq!(m.state().phase, IncidentPhase::RouteReady);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Publish(IncidentEvent::RouteUnreachable { .. })
        )));
        assert!(m
            .state()
            .timeline
            .events()
            .iter()
            .any(|e| e.label.contains("No safe path")));
    }

    #[test]
    fn test_select_node_ignored_while_idle() {
        let mut m = machine();
        assert!(m
            .apply(MachineInput::SelectNode("P3".into()), Utc::now())
            .is_empty());
        assert!(m
            .apply(MachineInput::SelectNode("P99".into()), Utc::now())
            .is_empty());
        assert_eq!(m.state().phase, IncidentPhase::Idle);
    }

    #[test]
    fn test_voice_confirming_unknown_node_falls_back_to_detected() {
        let mut m = awaiting_voice();
        let effects = m.apply(confirmed("sess-1", "NOWHERE"), Utc::now());

        assert_eq!(m.state().phase, IncidentPhase::Detected);
        assert!(m.state().voice_session.is_none());
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StopSessionPoller)));
    }

    #[test]
    fn test_timeline_stays_well_formed_through_full_flow() {
        let mut m = awaiting_voice();
        assert!(m.state().timeline.is_well_formed());

        m.apply(confirmed("sess-1", "P9"), Utc::now());
        m.apply(
            MachineInput::PathResolved {
                seq: 1,
                start: "P9".into(),
                response: path_response(&["P9", "P11", "P10"], 150.0),
            },
            Utc::now(),
        );
        assert!(m.state().timeline.is_well_formed());

        m.apply(MachineInput::ClearAlert, Utc::now());
        assert!(m.state().timeline.is_well_formed());
        assert_eq!(m.state().timeline.len(), 1);
    }

    #[test]
    fn test_transition_table() {
        use IncidentPhase::*;
        assert!(IncidentMachine::can_transition(Idle, Detected));
        assert!(IncidentMachine::can_transition(Detected, AwaitingVoice));
        assert!(IncidentMachine::can_transition(AwaitingVoice, RouteReady));
        assert!(IncidentMachine::can_transition(AwaitingVoice, Detected));
        assert!(IncidentMachine::can_transition(RouteReady, Cleared));
        assert!(IncidentMachine::can_transition(Cleared, Idle));

        assert!(!IncidentMachine::can_transition(Idle, RouteReady));
        assert!(!IncidentMachine::can_transition(RouteReady, AwaitingVoice));
        assert!(!IncidentMachine::can_transition(Cleared, Detected));
    }
}
