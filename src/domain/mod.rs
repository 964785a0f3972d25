//! Domain types for the comparison pipeline.
//!
//! This module contains the core data structures:
//! - Stage / Transition: The pipeline state machine
//! - RunState: The record threaded through every stage
//! - Provider: The two compared clouds
//! - Events: Journal records of stage attempts

pub mod events;
pub mod provider;
pub mod run;
pub mod stage;

// Re-export commonly used types
pub use events::{Event, EventType};
pub use provider::{Provider, ProviderPair};
pub use run::{Field, FieldView, RunState, StageFailure};
pub(crate) use run::StageOutput;
pub use stage::{Stage, Transition};
