//! Audio alert sink.
//!
//! Listens on the event bus and asks the backend to synthesize a spoken
//! alert whenever a route is applied. Purely a notification concern: a
//! failed synthesis is logged and dropped, and never feeds back into the
//! incident state.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use events::{EventEnvelope, IncidentEvent};
use orchestrator::services::{AlertAudioRequest, EvacuationBackend};

pub fn spawn_alert_sink(
    mut events: tokio::sync::broadcast::Receiver<EventEnvelope>,
    backend: Arc<dyn EvacuationBackend>,
    audio_dir: PathBuf,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let envelope = match events.recv().await {
                Ok(envelope) => envelope,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Alert sink fell behind the event bus");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let IncidentEvent::RouteApplied {
                seq,
                source_node,
                path,
                danger_nodes,
                ..
            } = envelope.event
            else {
                continue;
            };

            let request = AlertAudioRequest {
                danger_nodes,
                escape_path: path,
                start_node: Some(source_node),
            };

            match backend.generate_alert_audio(&request).await {
                Ok(bytes) if bytes.is_empty() => {
                    debug!(seq, "Backend returned no alert audio");
                }
                Ok(bytes) => {
                    if let Err(e) = write_audio(&audio_dir, seq, &bytes).await {
                        warn!(seq, error = %e, "Failed to write alert audio");
                    } else {
                        info!(seq, bytes = bytes.len(), "Alert audio written");
                    }
                }
                Err(e) => {
                    warn!(seq, error = %e, "Alert audio synthesis failed");
                }
            }
        }
    })
}

async fn write_audio(dir: &PathBuf, seq: u64, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(format!("alert-{seq}.mp3")), bytes).await
}
