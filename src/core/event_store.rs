//! Per-run journal with file-based persistence.
//!
//! Each run gets a directory under the runs root:
//! - `events.jsonl`: append-only newline-delimited JSON event log
//! - `state.json`: latest RunState snapshot, replaced atomically
//! - `run.lock`: held exclusively by the process driving the run
//!
//! The runs root also holds a `current` file naming the run the CLI is
//! working on.

use std::fs::File;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{Event, EventType, RunState, Transition};
use crate::error::{PipelineError, PipelineResult};

const EVENTS_FILE: &str = "events.jsonl";
const STATE_FILE: &str = "state.json";
const LOCK_FILE: &str = "run.lock";
const CURRENT_FILE: &str = "current";

/// File-based journal for one run
#[derive(Debug, Clone)]
pub struct EventStore {
    /// Directory containing the run
    run_dir: PathBuf,

    /// Path to the events.jsonl file
    events_path: PathBuf,

    /// Path to the state.json snapshot
    state_path: PathBuf,
}

impl EventStore {
    /// Create or open the journal for a run
    pub async fn open(runs_root: &Path, run_id: Uuid) -> PipelineResult<Self> {
        let store = Self::locate(runs_root, run_id);

        fs::create_dir_all(&store.run_dir).await.map_err(|e| {
            PipelineError::persistence(format!("run directory {}", store.run_dir.display()), e)
        })?;

        Ok(store)
    }

    /// Journal paths for a run, without touching the filesystem
    pub fn locate(runs_root: &Path, run_id: Uuid) -> Self {
        let run_dir = runs_root.join(run_id.to_string());
        Self {
            events_path: run_dir.join(EVENTS_FILE),
            state_path: run_dir.join(STATE_FILE),
            run_dir,
        }
    }

    /// Whether a journal exists for a run
    pub fn exists(runs_root: &Path, run_id: Uuid) -> bool {
        Self::locate(runs_root, run_id).state_path.exists()
    }

    /// Get the run directory
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Get the path to the events file
    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Append an event to the log
    pub async fn append(&self, event: &Event) -> PipelineResult<()> {
        let persist_err = |e: std::io::Error| PipelineError::persistence("run event", e);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .map_err(persist_err)?;

        let json = serde_json::to_string(event).map_err(|e| persist_err(e.into()))?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .map_err(persist_err)?;
        file.flush().await.map_err(persist_err)?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> PipelineResult<Vec<Event>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let persist_err = |e: std::io::Error| PipelineError::persistence("run events", e);

        let file = fs::File::open(&self.events_path).await.map_err(persist_err)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await.map_err(persist_err)? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line).map_err(|e| persist_err(e.into()))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Get the last event of a specific type
    pub async fn last_event_of_type(&self, event_type: EventType) -> PipelineResult<Option<Event>> {
        let events = self.replay().await?;
        Ok(events.into_iter().rev().find(|e| e.event_type == event_type))
    }

    /// Replace the state snapshot atomically (write temp file, then rename)
    pub async fn save_state(&self, run: &RunState) -> PipelineResult<()> {
        let persist_err =
            |e: std::io::Error| PipelineError::persistence("run state snapshot", e);

        let json = serde_json::to_string_pretty(run).map_err(|e| persist_err(e.into()))?;

        let tmp_path = self.state_path.with_extension("json.tmp");
        fs::write(&tmp_path, json).await.map_err(persist_err)?;
        fs::rename(&tmp_path, &self.state_path)
            .await
            .map_err(persist_err)?;

        Ok(())
    }

    /// Load the state snapshot. Returns None if the run was never saved.
    pub async fn load_state(&self) -> PipelineResult<Option<RunState>> {
        if !self.state_path.exists() {
            return Ok(None);
        }

        let persist_err =
            |e: std::io::Error| PipelineError::persistence("run state snapshot", e);

        let content = fs::read_to_string(&self.state_path)
            .await
            .map_err(persist_err)?;
        let run = serde_json::from_str(&content).map_err(|e| persist_err(e.into()))?;

        Ok(Some(run))
    }

    /// Take the run lock without blocking. Fails if another process holds it.
    /// The lock is released when the returned guard is dropped.
    pub fn lock(&self) -> PipelineResult<RunLock> {
        let path = self.run_dir.join(LOCK_FILE);
        let persist_err = |e: std::io::Error| {
            PipelineError::persistence(format!("run lock {}", path.display()), e)
        };

        let file = File::create(&path).map_err(persist_err)?;
        file.try_lock_exclusive().map_err(persist_err)?;

        Ok(RunLock { _file: file })
    }

    /// Delete the journal directory
    pub async fn remove(&self) -> PipelineResult<()> {
        if !self.run_dir.exists() {
            return Ok(());
        }

        fs::remove_dir_all(&self.run_dir)
            .await
            .map_err(|e| PipelineError::persistence("run journal", e))
    }

    /// Run id recorded as current under the runs root
    pub async fn current_run(runs_root: &Path) -> PipelineResult<Option<Uuid>> {
        let path = runs_root.join(CURRENT_FILE);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| PipelineError::persistence("current run pointer", e))?;

        Ok(Uuid::parse_str(content.trim()).ok())
    }

    /// Record a run as current
    pub async fn set_current_run(runs_root: &Path, run_id: Uuid) -> PipelineResult<()> {
        let persist_err =
            |e: std::io::Error| PipelineError::persistence("current run pointer", e);

        fs::create_dir_all(runs_root).await.map_err(persist_err)?;
        fs::write(runs_root.join(CURRENT_FILE), run_id.to_string())
            .await
            .map_err(persist_err)
    }

    /// Forget the current run
    pub async fn clear_current_run(runs_root: &Path) -> PipelineResult<()> {
        let path = runs_root.join(CURRENT_FILE);

        if !path.exists() {
            return Ok(());
        }

        fs::remove_file(&path)
            .await
            .map_err(|e| PipelineError::persistence("current run pointer", e))
    }
}

/// Exclusive hold on a run's lock file
#[derive(Debug)]
pub struct RunLock {
    _file: File,
}

/// Generate an idempotency key for a transition
pub fn generate_idempotency_key(run_id: Uuid, transition: Transition, input: &str) -> String {
    let input_hash = hash_input(input);
    format!("{}:{}:{}", run_id, transition, input_hash)
}

/// Hash input content (first 16 chars of SHA256)
pub fn hash_input(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8]) // First 16 hex chars (8 bytes)
}
