//! Plain-text rendering of the console view.

use incident_core::IncidentPhase;
use orchestrator::{ConsoleView, SystemMode};

/// Render one view as a multi-line block for the terminal.
pub fn render(view: &ConsoleView) -> String {
    let mut out = String::new();

    match view.mode {
        SystemMode::Normal => out.push_str("[ NORMAL ] "),
        SystemMode::Alert => out.push_str("[ ALERT! ] "),
    }
    out.push_str(phase_label(view.phase));
    out.push('\n');

    if !view.danger_nodes.is_empty() {
        out.push_str("  danger: ");
        out.push_str(
            &view
                .danger_nodes
                .iter()
                .map(|n| n.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        );
        out.push('\n');
    }

    if let Some(route) = &view.route {
        out.push_str(&format!(
            "  route:  {} (from {}, cost {:.0})\n",
            route.display, route.source_name, route.cost
        ));
    }

    if let Some(voice) = &view.voice {
        out.push_str(&format!(
            "  voice:  session {} [{}]\n",
            voice.session_id,
            voice.phase.as_str()
        ));
    }

    for crowd in &view.crowd {
        out.push_str(&format!(
            "  crowd:  {} people near {}\n",
            crowd.people_count, crowd.node_id
        ));
    }

    for event in &view.timeline {
        let marker = if event.is_current { '>' } else { ' ' };
        out.push_str(&format!("  {} {}  {}\n", marker, event.time, event.label));
    }

    out
}

fn phase_label(phase: IncidentPhase) -> &'static str {
    match phase {
        IncidentPhase::Idle => "Monitoring",
        IncidentPhase::Detected => "Fire detected",
        IncidentPhase::AwaitingVoice => "Awaiting voice location",
        IncidentPhase::RouteReady => "Evacuation route active",
        IncidentPhase::Cleared => "Clearing",
    }
}
