//! Remote service adapters.

mod backend;

pub use backend::{
    AlertAudioRequest, BackendClient, EvacuationBackend, PathResponse, VoiceReport, VoiceTrigger,
    WorldStateReport,
};
