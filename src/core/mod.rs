//! Core orchestration logic.
//!
//! This module contains:
//! - PipelineEngine: the resumable stage machine
//! - ArtifactStore: generated Terraform on disk
//! - EventStore: per-run journal (event log, snapshot, lock)
//! - Safety: timeouts and size limits
//! - Cancel: caller-driven cancellation

pub mod artifact_store;
pub mod cancel;
pub mod engine;
pub mod event_store;
pub mod safety;

// Re-export commonly used types
pub use artifact_store::ArtifactStore;
pub use cancel::{CancelSignal, Canceller};
pub use engine::{Collaborators, PipelineEngine};
pub use event_store::{generate_idempotency_key, hash_input, EventStore, RunLock};
pub use safety::{SafetyLimits, SafetyViolation};
