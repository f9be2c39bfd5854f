//! Domain types for the incident-response console.
//!
//! This crate holds the campus graph registry and the incident aggregate.
//! It is pure data plus validation: no IO, no timers, no network.

pub mod domain;
pub mod error;

pub use domain::*;
pub use error::CoreError;
