use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use toolchange_core::{
    parse_tool_change_marker, FilamentExtractor, FilamentTable, ProgressState, ToolChangeEvent,
};
use tracker_logging::{tracker_debug, tracker_info, tracker_warn};

/// Extension (case-insensitive) a scannable file must carry.
pub const GCODE_EXTENSION: &str = "gcode";

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Not a G-code file: {}", .0.display())]
    NotGcode(PathBuf),
    #[error("Not a regular file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("Could not read {}: {source}", path.display())]
    Unreadable { path: PathBuf, source: io::Error },
    #[error("No G-code files found in {}", .0.display())]
    NoGcodeFiles(PathBuf),
    #[error("Could not list {}: {source}", path.display())]
    DirectoryUnreadable { path: PathBuf, source: io::Error },
}

fn has_gcode_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(GCODE_EXTENSION))
}

/// Reject anything that is not an existing `.gcode` file.
pub fn validate_gcode_path(path: &Path) -> Result<(), ScanError> {
    if !path.exists() {
        return Err(ScanError::NotFound(path.to_path_buf()));
    }
    if !has_gcode_extension(path) {
        return Err(ScanError::NotGcode(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(ScanError::NotAFile(path.to_path_buf()));
    }
    Ok(())
}

/// The most recently modified `.gcode` file directly inside `dir`.
///
/// Equal modification times are broken by file name so the pick is stable.
pub fn find_latest_gcode(dir: &Path) -> Result<PathBuf, ScanError> {
    let entries = fs::read_dir(dir).map_err(|source| ScanError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracker_warn!("Skipping unreadable entry in {:?}: {}", dir, err);
                continue;
            }
        };
        let path = entry.path();
        if !has_gcode_extension(&path) {
            continue;
        }
        let modified = match entry.metadata().and_then(|meta| {
            if meta.is_file() {
                meta.modified().map(Some)
            } else {
                Ok(None)
            }
        }) {
            Ok(Some(modified)) => modified,
            Ok(None) => continue,
            Err(err) => {
                tracker_warn!("Skipping {:?}: {}", path, err);
                continue;
            }
        };

        let newer = match &latest {
            None => true,
            Some((best_time, best_path)) => (modified, &path) > (*best_time, best_path),
        };
        if newer {
            latest = Some((modified, path));
        }
    }

    latest
        .map(|(_, path)| path)
        .ok_or_else(|| ScanError::NoGcodeFiles(dir.to_path_buf()))
}

/// Visit every line with its 1-based number. Bytes that are not UTF-8 are
/// replaced rather than failing the read.
fn for_each_line(path: &Path, mut visit: impl FnMut(u64, &str)) -> Result<(), ScanError> {
    let unreadable = |source| ScanError::Unreadable {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(unreadable)?;
    let mut reader = BufReader::new(file);
    let mut buffer = Vec::new();
    let mut line_number = 0;
    loop {
        buffer.clear();
        let read = reader.read_until(b'\n', &mut buffer).map_err(unreadable)?;
        if read == 0 {
            return Ok(());
        }
        line_number += 1;
        visit(line_number, &String::from_utf8_lossy(&buffer));
    }
}

/// Collect filament metadata from `path` in one streaming pass.
pub fn extract_filament_table(path: &Path) -> Result<FilamentTable, ScanError> {
    let mut extractor = FilamentExtractor::new();
    for_each_line(path, |_, line| extractor.feed_line(line))?;
    Ok(extractor.finish())
}

fn marker_at(line_number: u64, line: &str) -> Option<(u32, u64)> {
    let tool = parse_tool_change_marker(line)?;
    tracker_debug!("T{} at line {}", tool, line_number);
    Some((tool, line_number))
}

fn build_state(path: &Path, markers: Vec<(u32, u64)>, filament: &FilamentTable) -> ProgressState {
    let changes: Vec<ToolChangeEvent> = markers
        .into_iter()
        .map(|(tool, line)| ToolChangeEvent::new(tool, line, filament.lookup(tool)))
        .collect();
    tracker_info!("Found {} tool changes in {:?}", changes.len(), path);
    ProgressState::from_scan(changes, Some(path.display().to_string()), filament.origin)
}

/// Build a fresh progress state from the tool change markers in `path`.
pub fn scan(path: &Path, filament: &FilamentTable) -> Result<ProgressState, ScanError> {
    validate_gcode_path(path)?;

    let mut markers = Vec::new();
    for_each_line(path, |line_number, line| {
        markers.extend(marker_at(line_number, line));
    })?;
    Ok(build_state(path, markers, filament))
}

/// Validate `path`, then read its filament metadata and markers in one pass.
///
/// Markers are joined with the metadata only at the end, so a header that
/// follows the first marker still applies to it.
pub fn scan_job(path: &Path) -> Result<ProgressState, ScanError> {
    validate_gcode_path(path)?;

    let mut extractor = FilamentExtractor::new();
    let mut markers = Vec::new();
    for_each_line(path, |line_number, line| {
        extractor.feed_line(line);
        markers.extend(marker_at(line_number, line));
    })?;

    let filament = extractor.finish();
    tracker_info!(
        "Filament metadata for {:?}: {} slots ({:?})",
        path,
        filament.len(),
        filament.origin
    );
    Ok(build_state(path, markers, &filament))
}
