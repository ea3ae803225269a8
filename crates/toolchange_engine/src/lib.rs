//! Tool change engine: file I/O around the core, scanning and the state store.
mod advance;
mod config;
mod ownership;
mod persist;
mod scan;
mod store;

pub use advance::{AdvanceController, AdvanceError, StatusReport, MAX_COMMIT_ATTEMPTS};
pub use config::{
    ConfigFile, Environment, TrackerConfig, CONFIG_FILENAME, FALLBACK_STATE_FILE, GCODE_DIR_VAR,
    PRINTER_CONFIG_DIR_VAR, STATE_FILENAME, STATE_FILE_VAR,
};
pub use ownership::FileOwner;
pub use persist::{ensure_state_dir, AtomicFileWriter, PersistError};
pub use scan::{
    extract_filament_table, find_latest_gcode, scan, scan_job, validate_gcode_path, ScanError,
    GCODE_EXTENSION,
};
pub use store::{InvalidState, StateStore, StoreError};
