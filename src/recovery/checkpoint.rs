//! Checkpoint store - immutable state snapshots with undo/redo history

use crate::core::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Opaque checkpoint identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointId(Uuid);

impl CheckpointId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Immutable snapshot of [`State`] at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub label: String,
    pub created_at: DateTime<Utc>,
    state: State,
}

impl Checkpoint {
    fn new(label: &str, state: State) -> Self {
        Self {
            id: CheckpointId::new(),
            label: label.to_string(),
            created_at: Utc::now(),
            state,
        }
    }

    /// Read access to the snapshot
    pub fn state(&self) -> &State {
        &self.state
    }
}

/// Errors from the direct checkpoint API.
///
/// A bad rollback target is a programmer error and fails fast; the recovery
/// path maps it to an Abort decision instead of propagating.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint not found: {0}")]
    NotFound(CheckpointId),
}

/// Store of immutable snapshots plus undo/redo history.
///
/// Owned by exactly one [`RecoveryManager`](crate::recovery::RecoveryManager)
/// instance; nothing outside it mutates the stacks.
#[derive(Default)]
pub struct CheckpointStore {
    checkpoints: HashMap<CheckpointId, Checkpoint>,
    undo: Vec<Checkpoint>,
    redo: Vec<Checkpoint>,
    persist_dir: Option<PathBuf>,
    persist_seq: usize,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that also writes each checkpoint to `dir` as pretty JSON.
    ///
    /// Persistence is diagnostics-only: write failures are logged and ignored.
    pub fn with_persist_dir(dir: PathBuf) -> Self {
        Self {
            persist_dir: Some(dir),
            ..Self::default()
        }
    }

    /// Snapshot `state` under `label`.
    ///
    /// Deep-copies the state, pushes the snapshot onto the undo stack, and
    /// clears the redo stack.
    pub fn create_checkpoint(&mut self, state: &State, label: &str) -> CheckpointId {
        let checkpoint = Checkpoint::new(label, state.clone());
        let id = checkpoint.id;

        debug!("Checkpoint created: {} ({})", label, id);
        self.persist(&checkpoint);
        self.undo.push(checkpoint.clone());
        self.redo.clear();
        self.checkpoints.insert(id, checkpoint);

        id
    }

    /// Look up a checkpoint by id
    pub fn get_checkpoint(&self, id: CheckpointId) -> Option<&Checkpoint> {
        self.checkpoints.get(&id)
    }

    /// Restore the state captured by `id`.
    ///
    /// The pre-rollback state is pushed onto the redo stack so the rollback
    /// itself can be reversed. Fails fast on an unknown id.
    pub fn rollback_to_checkpoint(
        &mut self,
        id: CheckpointId,
        current: &State,
    ) -> Result<State, CheckpointError> {
        let checkpoint = self
            .checkpoints
            .get(&id)
            .ok_or(CheckpointError::NotFound(id))?;

        let restored = checkpoint.state.clone();
        self.redo
            .push(Checkpoint::new("Pre-rollback", current.clone()));
        debug!("Rolled back to checkpoint {} ({})", checkpoint.label, id);

        Ok(restored)
    }

    /// Step back one checkpoint.
    ///
    /// Pops the top of the undo stack onto the redo stack and returns the
    /// state of the new top. `None` when there is no earlier checkpoint.
    pub fn undo(&mut self) -> Option<State> {
        if self.undo.len() < 2 {
            return None;
        }
        let popped = self.undo.pop()?;
        self.redo.push(popped);
        self.undo.last().map(|c| c.state.clone())
    }

    /// Reverse the most recent undo.
    pub fn redo(&mut self) -> Option<State> {
        let checkpoint = self.redo.pop()?;
        let state = checkpoint.state.clone();
        self.undo.push(checkpoint);
        Some(state)
    }

    /// Number of checkpoints on the undo stack
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Number of checkpoints available to redo
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    fn persist(&mut self, checkpoint: &Checkpoint) {
        let Some(dir) = &self.persist_dir else {
            return;
        };

        self.persist_seq += 1;
        let slug: String = checkpoint
            .label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        let path = dir.join(format!("{:04}-{}.json", self.persist_seq, slug));

        let result = std::fs::create_dir_all(dir)
            .and_then(|_| serde_json::to_string_pretty(checkpoint).map_err(Into::into))
            .and_then(|json| std::fs::write(&path, json));

        if let Err(e) = result {
            warn!("Failed to persist checkpoint {}: {}", checkpoint.id, e);
        }
    }
}
