use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::color::UNKNOWN;
use crate::filament::{FilamentInfo, MetadataOrigin};

fn unknown() -> String {
    UNKNOWN.to_string()
}

/// One `MANUAL_TOOL_CHANGE` marker, with the filament metadata copied in at
/// scan time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolChangeEvent {
    pub tool_number: u32,
    pub color: String,
    #[serde(default = "unknown")]
    pub hex_color: String,
    #[serde(default = "unknown")]
    pub brand: String,
    #[serde(default = "unknown")]
    pub material: String,
    #[serde(default = "unknown")]
    pub full_name: String,
    /// 1-based source line of the marker.
    pub line: u64,
}

impl ToolChangeEvent {
    pub fn new(tool_number: u32, line: u64, filament: FilamentInfo) -> Self {
        Self {
            tool_number,
            color: filament.color_name,
            hex_color: filament.hex_color,
            brand: filament.brand,
            material: filament.material,
            full_name: filament.full_name,
            line,
        }
    }
}

/// Where a job stands in its list of tool changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing to track: no scan yet, or the scan found no markers.
    NotStarted,
    /// `current_change < total_changes`, including a freshly scanned job.
    InProgress,
    /// Every recorded change has been reported.
    Complete,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("total_changes is {declared} but {actual} changes are listed")]
    CountMismatch { declared: usize, actual: usize },
    #[error("current_change {current} exceeds total_changes {total}")]
    CursorOutOfRange { current: usize, total: usize },
}

/// The persisted progress document for the active print job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressState {
    total_changes: usize,
    current_change: usize,
    changes: Vec<ToolChangeEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_file: Option<String>,
    #[serde(default)]
    metadata: MetadataOrigin,
}

impl ProgressState {
    /// Fresh state for a newly scanned job; the cursor starts at zero.
    pub fn from_scan(
        changes: Vec<ToolChangeEvent>,
        source_file: Option<String>,
        metadata: MetadataOrigin,
    ) -> Self {
        Self {
            total_changes: changes.len(),
            current_change: 0,
            changes,
            source_file,
            metadata,
        }
    }

    pub fn total_changes(&self) -> usize {
        self.total_changes
    }

    pub fn current_change(&self) -> usize {
        self.current_change
    }

    pub fn changes(&self) -> &[ToolChangeEvent] {
        &self.changes
    }

    pub fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    pub fn metadata(&self) -> MetadataOrigin {
        self.metadata
    }

    pub fn phase(&self) -> Phase {
        if self.total_changes == 0 {
            Phase::NotStarted
        } else if self.current_change < self.total_changes {
            Phase::InProgress
        } else {
            Phase::Complete
        }
    }

    /// The event the next advance will report.
    pub fn next_pending(&self) -> Option<&ToolChangeEvent> {
        if self.current_change >= self.total_changes {
            return None;
        }
        self.changes.get(self.current_change)
    }

    /// Check the invariants a deserialized document may violate.
    pub fn check_consistency(&self) -> Result<(), StateError> {
        if self.changes.len() != self.total_changes {
            return Err(StateError::CountMismatch {
                declared: self.total_changes,
                actual: self.changes.len(),
            });
        }
        if self.current_change > self.total_changes {
            return Err(StateError::CursorOutOfRange {
                current: self.current_change,
                total: self.total_changes,
            });
        }
        Ok(())
    }
}

/// Result of one [`advance`] step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Change number `number` (1-based) of `total` was reached.
    Reached {
        number: usize,
        total: usize,
        event: ToolChangeEvent,
    },
    /// Every change has already been reported; the state is unchanged.
    Completed { total: usize },
}

impl fmt::Display for Advance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advance::Reached {
                number,
                total,
                event,
            } => write!(
                f,
                "Tool Change {number} of {total} - {} (T{}) at line {}",
                event.color, event.tool_number, event.line
            ),
            Advance::Completed { .. } => write!(f, "Tool changes completed."),
        }
    }
}

/// Pure transition: move the cursor past the next pending event.
pub fn advance(mut state: ProgressState) -> (ProgressState, Advance) {
    let total = state.total_changes;
    let Some(event) = state.next_pending().cloned() else {
        return (state, Advance::Completed { total });
    };

    state.current_change += 1;
    let outcome = Advance::Reached {
        number: state.current_change,
        total,
        event,
    };
    (state, outcome)
}
