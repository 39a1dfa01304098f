//! Core domain types
//!
//! This module contains the core domain structures used across Relay crates.
//! These types are owned by the orchestrator and serialized as-is over its
//! HTTP surface.

pub mod event;
pub mod executor;
pub mod outcome;
pub mod result;
pub mod run;
pub mod task;
