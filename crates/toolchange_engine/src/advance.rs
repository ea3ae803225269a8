use std::path::PathBuf;

use thiserror::Error;
use toolchange_core::{advance, Advance, MetadataOrigin, Phase, ProgressState, ToolChangeEvent};
use tracker_logging::{tracker_info, tracker_warn};

use crate::store::{StateStore, StoreError};

/// Attempts made when another process rewrote the document mid-advance.
pub const MAX_COMMIT_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum AdvanceError {
    #[error("Tool change data not found at {}. Please run the pre-scan first.", path.display())]
    NotScanned { path: PathBuf },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read-only view of the active job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub phase: Phase,
    pub current_change: usize,
    pub total_changes: usize,
    pub next: Option<ToolChangeEvent>,
    pub metadata: MetadataOrigin,
    pub source_file: Option<String>,
}

/// Drives one step of the tool change sequence per invocation.
///
/// Holds no progress of its own: every call goes through the state file.
pub struct AdvanceController {
    store: StateStore,
}

impl AdvanceController {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Consume the next pending tool change, or report completion.
    pub fn advance(&self) -> Result<Advance, AdvanceError> {
        self.advance_with(|_, _| {})
    }

    /// `before_commit` runs between loading the document and committing it.
    fn advance_with(
        &self,
        mut before_commit: impl FnMut(&StateStore, &ProgressState),
    ) -> Result<Advance, AdvanceError> {
        self.require_scanned()?;

        let mut attempt = 1;
        loop {
            let loaded = self.store.load();
            let (next, outcome) = advance(loaded.clone());
            if matches!(outcome, Advance::Completed { .. }) {
                tracker_info!("All {} tool changes already reported", next.total_changes());
                return Ok(outcome);
            }

            before_commit(&self.store, &loaded);
            match self.store.commit(&loaded, &next) {
                Ok(()) => {
                    tracker_info!("{}", outcome);
                    return Ok(outcome);
                }
                Err(StoreError::Conflict(path)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    tracker_warn!(
                        "{:?} changed during advance (attempt {}), retrying",
                        path,
                        attempt
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn status(&self) -> Result<StatusReport, AdvanceError> {
        self.require_scanned()?;
        let state = self.store.load();
        Ok(StatusReport {
            phase: state.phase(),
            current_change: state.current_change(),
            total_changes: state.total_changes(),
            next: state.next_pending().cloned(),
            metadata: state.metadata(),
            source_file: state.source_file().map(str::to_string),
        })
    }

    fn require_scanned(&self) -> Result<(), AdvanceError> {
        if self.store.exists() {
            Ok(())
        } else {
            Err(AdvanceError::NotScanned {
                path: self.store.path().to_path_buf(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use toolchange_core::FilamentInfo;

    use super::*;

    fn scanned(temp: &TempDir, changes: u32) -> AdvanceController {
        let events = (0..changes)
            .map(|tool| {
                ToolChangeEvent::new(tool, u64::from(tool) * 10 + 1, FilamentInfo::unknown())
            })
            .collect();
        let store = StateStore::new(temp.path().join("tool_changes.json"));
        store
            .save(&ProgressState::from_scan(events, None, MetadataOrigin::Slicer))
            .unwrap();
        AdvanceController::new(store)
    }

    /// Another invocation advancing the document on disk.
    fn advance_on_disk(store: &StateStore, loaded: &ProgressState) {
        let (theirs, _) = advance(loaded.clone());
        store.save(&theirs).unwrap();
    }

    #[test]
    fn conflicting_write_is_retried_on_fresh_state() {
        let temp = TempDir::new().unwrap();
        let controller = scanned(&temp, 4);

        let mut calls = 0;
        let outcome = controller
            .advance_with(|store, loaded| {
                calls += 1;
                if calls == 1 {
                    advance_on_disk(store, loaded);
                }
            })
            .unwrap();

        assert_eq!(calls, 2);
        assert!(matches!(outcome, Advance::Reached { number: 2, total: 4, .. }));
        assert_eq!(controller.store().load().current_change(), 2);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let temp = TempDir::new().unwrap();
        let controller = scanned(&temp, 5);

        let mut calls = 0;
        let result = controller.advance_with(|store, loaded| {
            calls += 1;
            advance_on_disk(store, loaded);
        });

        assert!(matches!(
            result,
            Err(AdvanceError::Store(StoreError::Conflict(_)))
        ));
        assert_eq!(calls, MAX_COMMIT_ATTEMPTS);
        // Only the competing writes landed.
        assert_eq!(
            controller.store().load().current_change(),
            MAX_COMMIT_ATTEMPTS
        );
    }
}
