//! Relay Orchestrator
//!
//! Task Orchestration Engine: turns free-form DevOps requests into typed
//! tasks, dispatches them to per-kind executor services, aggregates what
//! comes back and reports the outcome.
//!
//! The binary wires [`service::Orchestrator`] to the HTTP surface in [`api`];
//! tests build the same router around fake collaborators.

pub mod api;
pub mod config;
pub mod repository;
pub mod service;
