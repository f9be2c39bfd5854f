//! Event system for the incident console.
//!
//! The state machine publishes [`IncidentEvent`]s into the bus; decoupled
//! consumers (the audio alert sink, UI surfaces) drain them without ever
//! feeding back into state transitions.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
