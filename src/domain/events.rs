//! Journal events for a run.
//!
//! Every stage attempt is recorded as an immutable event in the run's
//! append-only log. The log is an audit trail; the authoritative state of a
//! run is its snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::{Stage, Transition};

/// A single event in the append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Transition being attempted (if applicable)
    pub transition: Option<Transition>,

    /// Type of event
    pub event_type: EventType,

    /// Idempotency key format: "{run_id}:{transition}:{input_hash}"
    pub idempotency_key: String,

    /// Human-readable summary (NO secrets, NO generated content)
    pub payload_summary: String,

    /// Stage of the run after this event
    pub stage: Stage,

    /// Time taken in milliseconds (for finished transitions)
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        transition: Option<Transition>,
        event_type: EventType,
        idempotency_key: String,
        payload_summary: String,
        stage: Stage,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            transition,
            event_type,
            idempotency_key,
            payload_summary,
            stage,
            duration_ms: None,
            error: None,
        }
    }

    /// Create an event with duration information
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Create an event with error information
    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Types of events recorded for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A new run was created
    RunCreated,

    /// The run reached `Complete`
    RunCompleted,

    /// The run was reset to `Created`
    RunRestarted,

    /// A transition started
    StageStarted,

    /// A transition committed its output
    StageCompleted,

    /// A transition failed; the run is `Failed` until retried
    StageFailed,

    /// A transition was cancelled by the caller; nothing committed
    StageCancelled,
}
