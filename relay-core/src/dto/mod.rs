//! Data Transfer Objects
//!
//! Request and response bodies of the orchestrator API, plus the envelopes
//! exchanged with executor services and the ticket system.

pub mod event;
pub mod executor;
pub mod run;
pub mod webhook;
