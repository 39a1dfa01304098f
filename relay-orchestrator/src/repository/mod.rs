//! Repository Module
//!
//! In-memory state owned by the orchestrator process.
//! Runs live in the run store; events live in the Event Recorder.

pub mod event;
pub mod run;

pub use event::EventRecorder;
pub use run::{RunStore, StoreError};
