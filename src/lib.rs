//! infracompare - Resumable AWS vs Azure cost comparison pipeline
//!
//! Turns a plain-language infrastructure requirement into one Terraform
//! configuration per cloud provider, prices both with infracost, and asks
//! a language model for a comparison and a final summary.
//!
//! # Architecture
//!
//! The pipeline is a resumable state machine:
//! - A caller-owned `RunState` records the last completed stage and every
//!   output committed so far
//! - Each `PipelineEngine::advance` performs exactly one transition and
//!   commits all of its outputs or none of them
//! - A failed transition is retried by calling `advance` again; earlier
//!   stages are never repeated
//!
//! # Modules
//!
//! - `adapters`: Collaborator traits plus the OpenAI and infracost adapters
//! - `core`: Engine, artifact store, journal, safety limits, cancellation
//! - `domain`: Run state, stages, providers, journal events
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Start a comparison
//! infracompare run "A web app with two VMs, a load balancer and Postgres"
//!
//! # Check where it stands
//! infracompare status
//!
//! # Continue after a failure
//! infracompare resume
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;

// Re-export main types at crate root for convenience
pub use adapters::{AdapterError, Comparator, CostEstimator, PlanGenerator, Summarizer};
pub use crate::core::{ArtifactStore, CancelSignal, Canceller, Collaborators, PipelineEngine, SafetyLimits};
pub use domain::{Field, FieldView, Provider, ProviderPair, RunState, Stage, Transition};
pub use error::{ErrorKind, PipelineError, PipelineResult};
