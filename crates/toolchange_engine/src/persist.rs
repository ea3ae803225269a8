use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("state directory missing or not writable: {0}")]
    StateDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure the directory holding the state file exists; create if missing.
pub fn ensure_state_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::StateDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::StateDir(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::StateDir(e.to_string()))?;
    }
    Ok(())
}

/// Atomically replace a file by writing a sibling temp file and renaming it
/// over the target. Readers see either the old or the new content, never a
/// partial write.
pub struct AtomicFileWriter {
    target: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(target: PathBuf) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn write(&self, content: &str) -> Result<(), PersistError> {
        let dir = parent_dir(&self.target);
        ensure_state_dir(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        match_permissions(tmp.as_file(), &self.target)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        // rename(2) replaces the target in one step; never delete it first.
        tmp.persist(&self.target)
            .map_err(|e| PersistError::Io(e.error))?;
        sync_dir(dir);
        Ok(())
    }
}

fn parent_dir(target: &Path) -> &Path {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Temp files are created `0600`; give the replacement the target's current
/// mode, or `0644` for a new document, so other users can still read it.
#[cfg(unix)]
fn match_permissions(tmp: &fs::File, target: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = match fs::metadata(target) {
        Ok(meta) => meta.permissions(),
        Err(_) => fs::Permissions::from_mode(0o644),
    };
    tmp.set_permissions(permissions)
}

#[cfg(not(unix))]
fn match_permissions(_tmp: &fs::File, _target: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    // Makes the rename itself durable. Best effort: the data is already synced.
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_file_name_writes_into_current_dir() {
        assert_eq!(parent_dir(Path::new("state.json")), Path::new("."));
        assert_eq!(parent_dir(Path::new("/tmp/state.json")), Path::new("/tmp"));
    }
}
