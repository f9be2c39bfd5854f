//! Single-writer executor around the incident state machine.
//!
//! All inputs, whatever their origin, funnel through one mpsc channel into
//! one task that owns the machine. The task applies inputs strictly one at
//! a time, runs the returned effects, and publishes a fresh projection
//! after every application. Adapter calls requested by effects run on
//! spawned tasks and feed their results back through the same channel, so
//! nothing ever blocks the loop.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use events::EventBus;
use incident_core::{GraphRegistry, NodeId};

use crate::error::OrchestratorError;
use crate::projection::{project, ConsoleView};
use crate::services::EvacuationBackend;
use crate::state_machine::{Effect, IncidentMachine, MachineInput};
use crate::supervisor::{PollerConfig, PollerSupervisor};

#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    pub poller: PollerConfig,
}

/// Cloneable handle the console uses to drive the executor and observe its
/// state.
#[derive(Clone)]
pub struct ConsoleHandle {
    inputs: mpsc::Sender<MachineInput>,
    view: watch::Receiver<ConsoleView>,
}

impl ConsoleHandle {
    /// Operator picked a node on the map as the evacuation start.
    pub async fn select_node(&self, node: NodeId) -> crate::error::Result<()> {
        self.send(MachineInput::SelectNode(node)).await
    }

    /// Operator dismissed the alert.
    pub async fn clear_alert(&self) -> crate::error::Result<()> {
        self.send(MachineInput::ClearAlert).await
    }

    pub async fn shutdown(&self) -> crate::error::Result<()> {
        self.send(MachineInput::Shutdown).await
    }

    /// Latest projection.
    pub fn view(&self) -> ConsoleView {
        self.view.borrow().clone()
    }

    /// Subscribe to projection updates.
    pub fn watch_view(&self) -> watch::Receiver<ConsoleView> {
        self.view.clone()
    }

    async fn send(&self, input: MachineInput) -> crate::error::Result<()> {
        self.inputs
            .send(input)
            .await
            .map_err(|_| OrchestratorError::Shutdown)
    }
}

/// Spawns the executor task and its pollers.
pub struct IncidentExecutor;

impl IncidentExecutor {
    const INPUT_CAPACITY: usize = 64;

    pub fn spawn(
        backend: Arc<dyn EvacuationBackend>,
        registry: Arc<GraphRegistry>,
        bus: EventBus,
        config: ExecutorConfig,
    ) -> (ConsoleHandle, JoinHandle<()>) {
        let (input_tx, input_rx) = mpsc::channel(Self::INPUT_CAPACITY);

        let machine = IncidentMachine::new(Arc::clone(&registry), Utc::now());
        let (view_tx, view_rx) = watch::channel(project(machine.state(), &registry));

        let mut supervisor =
            PollerSupervisor::new(Arc::clone(&backend), input_tx.clone(), config.poller);
        supervisor.start_world_poller();

        let handle = ConsoleHandle {
            inputs: input_tx.clone(),
            view: view_rx,
        };

        let task = tokio::spawn(run_loop(
            machine, input_rx, input_tx, view_tx, supervisor, backend, registry, bus,
        ));

        (handle, task)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    mut machine: IncidentMachine,
    mut inputs: mpsc::Receiver<MachineInput>,
    input_tx: mpsc::Sender<MachineInput>,
    view_tx: watch::Sender<ConsoleView>,
    mut supervisor: PollerSupervisor,
    backend: Arc<dyn EvacuationBackend>,
    registry: Arc<GraphRegistry>,
    bus: EventBus,
) {
    info!("Incident executor started");

    while let Some(input) = inputs.recv().await {
        if matches!(input, MachineInput::Shutdown) {
            info!("Incident executor shutting down");
            supervisor.stop_all();
            break;
        }

        let effects = machine.apply(input, Utc::now());
        for effect in effects {
            run_effect(effect, &input_tx, &mut supervisor, &backend, &bus);
        }

        if view_tx.send(project(machine.state(), &registry)).is_err() {
            debug!("All view receivers dropped");
        }
    }
}

fn run_effect(
    effect: Effect,
    input_tx: &mpsc::Sender<MachineInput>,
    supervisor: &mut PollerSupervisor,
    backend: &Arc<dyn EvacuationBackend>,
    bus: &EventBus,
) {
    match effect {
        Effect::TriggerVoiceAgent => {
            let backend = Arc::clone(backend);
            let inputs = input_tx.clone();
            tokio::spawn(async move {
                let input = match backend.trigger_voice_agent().await {
                    Ok(trigger) => MachineInput::VoiceAgentStarted {
                        session_id: trigger.session_id,
                    },
                    Err(error) => MachineInput::VoiceAgentFailed { error },
                };
                if inputs.send(input).await.is_err() {
                    error!("Executor gone before voice trigger completed");
                }
            });
        }
        Effect::FetchPath { seq, start, affected } => {
            let backend = Arc::clone(backend);
            let inputs = input_tx.clone();
            tokio::spawn(async move {
                let input = match backend.fetch_evacuation_path(&start, &affected).await {
                    Ok(response) => MachineInput::PathResolved { seq, start, response },
                    Err(error) => MachineInput::PathFailed { seq, start, error },
                };
                let _ = inputs.send(input).await;
            });
        }
        Effect::StartSessionPoller { session_id } => {
            supervisor.start_session_poller(session_id);
        }
        Effect::StopSessionPoller => {
            supervisor.stop_session_poller();
        }
        Effect::StopAllPollers => {
            supervisor.stop_all();
        }
        Effect::Publish(event) => {
            bus.publish(event);
        }
    }
}
