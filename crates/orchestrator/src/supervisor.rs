//! Poller lifecycle management.
//!
//! Two recurring pollers feed the state machine: a world-state poller that
//! runs for the lifetime of the process, and at most one voice-session
//! poller tied to the active session. Each poller is single-flight: the
//! request is awaited inline on the tick, and a tick that lands while a
//! request is still in flight is skipped, never queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::services::EvacuationBackend;
use crate::state_machine::MachineInput;

/// Polling cadence.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub world_interval: Duration,
    pub session_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            world_interval: Duration::from_secs(2),
            session_interval: Duration::from_secs(1),
        }
    }
}

/// Cancellation handle for one spawned poll loop.
struct PollerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    fn stop(&self) {
        let _ = self.stop.send(true);
    }

    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns the poll loops and their cancellation handles. Voice-session data
/// lives in the state machine; the supervisor only knows which session id
/// its poller is bound to.
pub struct PollerSupervisor {
    backend: Arc<dyn EvacuationBackend>,
    inputs: mpsc::Sender<MachineInput>,
    config: PollerConfig,
    world: Option<PollerHandle>,
    session: Option<PollerHandle>,
}

impl PollerSupervisor {
    pub fn new(
        backend: Arc<dyn EvacuationBackend>,
        inputs: mpsc::Sender<MachineInput>,
        config: PollerConfig,
    ) -> Self {
        Self {
            backend,
            inputs,
            config,
            world: None,
            session: None,
        }
    }

    /// Start the world-state poller. Runs until [`PollerSupervisor::stop_all`].
    pub fn start_world_poller(&mut self) {
        if self.world.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        info!(
            interval_ms = self.config.world_interval.as_millis() as u64,
            "Starting world-state poller"
        );
        self.world = Some(spawn_poll_loop(
            self.config.world_interval,
            self.inputs.clone(),
            {
                let backend = Arc::clone(&self.backend);
                move || {
                    let backend = Arc::clone(&backend);
                    async move {
                        match backend.fetch_world_state().await {
                            Ok(report) => MachineInput::WorldState(report),
                            Err(error) => MachineInput::WorldStateFailed { error },
                        }
                    }
                }
            },
        ));
    }

    /// Start polling a voice session, replacing any previous session poller.
    pub fn start_session_poller(&mut self, session_id: String) {
        if let Some(old) = self.session.take() {
            warn!("Replacing a live session poller");
            old.stop();
        }
        info!(session_id = %session_id, "Starting voice-session poller");
        self.session = Some(spawn_poll_loop(
            self.config.session_interval,
            self.inputs.clone(),
            {
                let backend = Arc::clone(&self.backend);
                move || {
                    let backend = Arc::clone(&backend);
                    let session_id = session_id.clone();
                    async move {
                        match backend.poll_voice_session(&session_id).await {
                            Ok(report) => MachineInput::VoiceReport { session_id, report },
                            Err(error) => MachineInput::VoicePollFailed { session_id, error },
                        }
                    }
                }
            },
        ));
    }

    pub fn stop_session_poller(&mut self) {
        if let Some(handle) = self.session.take() {
            debug!("Stopping voice-session poller");
            handle.stop();
        }
    }

    /// Stop every poller. Used at process shutdown.
    pub fn stop_all(&mut self) {
        self.stop_session_poller();
        if let Some(handle) = self.world.take() {
            debug!("Stopping world-state poller");
            handle.stop();
        }
    }
}

/// Spawn a single-flight poll loop. The stop flag is re-checked after each
/// request completes, so a poller cancelled mid-request never delivers its
/// result.
fn spawn_poll_loop<F, Fut>(
    period: Duration,
    inputs: mpsc::Sender<MachineInput>,
    mut poll: F,
) -> PollerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = MachineInput> + Send,
{
    let (stop, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let input = poll().await;
                    if *stop_rx.borrow() {
                        break;
                    }
                    if inputs.send(input).await.is_err() {
                        // Executor is gone; nothing left to feed.
                        break;
                    }
                }
            }
        }
    });

    PollerHandle { stop, task }
}
