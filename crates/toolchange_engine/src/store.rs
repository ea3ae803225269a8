use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use toolchange_core::{ProgressState, StateError};
use tracker_logging::{tracker_debug, tracker_warn};

use crate::ownership::FileOwner;
use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize progress state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write progress state: {0}")]
    Persist(#[from] PersistError),
    #[error("progress state at {0:?} was modified by another process")]
    Conflict(PathBuf),
}

/// Why an on-disk document was discarded.
#[derive(Debug, Error)]
pub enum InvalidState {
    #[error("unreadable: {0}")]
    Unreadable(#[from] io::Error),
    #[error("not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("top level is not an object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is not {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error(transparent)]
    Inconsistent(#[from] StateError),
}

type FieldCheck = (&'static str, fn(&Value) -> bool, &'static str);

const REQUIRED_FIELDS: [FieldCheck; 3] = [
    ("total_changes", Value::is_u64, "a non-negative integer"),
    ("current_change", Value::is_u64, "a non-negative integer"),
    ("changes", Value::is_array, "a list"),
];

/// The progress document of the active job.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    owner: Option<FileOwner>,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path, owner: None }
    }

    /// Files written by this store are handed to `owner` afterwards.
    pub fn with_owner(mut self, owner: Option<FileOwner>) -> Self {
        self.owner = owner;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the document. A missing, unreadable or invalid document yields
    /// the empty default; printing must never block on a bad state file.
    pub fn load(&self) -> ProgressState {
        match self.read_document() {
            Ok(Some(state)) => state,
            Ok(None) => {
                tracker_debug!("No progress state at {:?}", self.path);
                ProgressState::default()
            }
            Err(err) => {
                tracker_warn!("Discarding progress state at {:?}: {}", self.path, err);
                ProgressState::default()
            }
        }
    }

    /// Strict read: `Ok(None)` when there is no document.
    pub fn read_document(&self) -> Result<Option<ProgressState>, InvalidState> {
        let content = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let value: Value = serde_json::from_str(&content)?;
        validate_schema(&value)?;
        let state: ProgressState = serde_json::from_value(value)?;
        state.check_consistency()?;
        Ok(Some(state))
    }

    /// Replace the document wholesale.
    pub fn save(&self, state: &ProgressState) -> Result<(), StoreError> {
        let mut content = serde_json::to_string_pretty(state)?;
        content.push('\n');

        AtomicFileWriter::new(self.path.clone()).write(&content)?;
        if let Some(owner) = &self.owner {
            owner.apply(&self.path);
        }
        tracker_debug!(
            "Saved progress {}/{} to {:?}",
            state.current_change(),
            state.total_changes(),
            self.path
        );
        Ok(())
    }

    /// Save `next` only if the document on disk still equals `expected`.
    ///
    /// The check and the rename are not one atomic step; this narrows the
    /// window for two overlapping advances but does not close it.
    pub fn commit(&self, expected: &ProgressState, next: &ProgressState) -> Result<(), StoreError> {
        let on_disk = self.read_document().ok().flatten();
        if on_disk.as_ref() != Some(expected) {
            return Err(StoreError::Conflict(self.path.clone()));
        }
        self.save(next)
    }
}

fn validate_schema(value: &Value) -> Result<(), InvalidState> {
    let object = value.as_object().ok_or(InvalidState::NotAnObject)?;
    for (field, check, expected) in REQUIRED_FIELDS {
        let entry = object.get(field).ok_or(InvalidState::MissingField(field))?;
        if !check(entry) {
            return Err(InvalidState::WrongType { field, expected });
        }
    }
    Ok(())
}
