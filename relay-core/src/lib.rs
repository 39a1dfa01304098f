//! Relay Core
//!
//! Core types shared by the Relay orchestrator, client and CLI.
//!
//! This crate contains:
//! - Domain types: Task descriptors, runs, results, outcomes, events
//! - DTOs: Request/response bodies and executor wire envelopes

pub mod domain;
pub mod dto;
