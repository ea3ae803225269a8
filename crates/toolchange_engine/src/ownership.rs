use std::path::Path;

use tracker_logging::{tracker_debug, tracker_warn};

/// Account that should own files written while running under `sudo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileOwner {
    pub uid: u32,
    pub gid: u32,
}

impl FileOwner {
    /// Build from the `SUDO_UID` / `SUDO_GID` values; both must be integers.
    pub fn from_sudo_ids(uid: Option<&str>, gid: Option<&str>) -> Option<Self> {
        let uid = uid?.trim().parse().ok()?;
        let gid = gid?.trim().parse().ok()?;
        Some(Self { uid, gid })
    }

    /// Hand `path` back to this owner. Failure is logged, never returned.
    pub fn apply(&self, path: &Path) {
        match chown(path, self.uid, self.gid) {
            Ok(()) => tracker_debug!("Set owner of {:?} to {}:{}", path, self.uid, self.gid),
            Err(err) => tracker_warn!(
                "Could not set owner of {:?} to {}:{}: {}",
                path,
                self.uid,
                self.gid,
                err
            ),
        }
    }
}

#[cfg(unix)]
fn chown(path: &Path, uid: u32, gid: u32) -> std::io::Result<()> {
    std::os::unix::fs::chown(path, Some(uid), Some(gid))
}

#[cfg(not(unix))]
fn chown(_path: &Path, _uid: u32, _gid: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_ids_are_required() {
        assert_eq!(
            FileOwner::from_sudo_ids(Some("1000"), Some("1000")),
            Some(FileOwner {
                uid: 1000,
                gid: 1000
            })
        );
        assert_eq!(FileOwner::from_sudo_ids(Some("1000"), None), None);
        assert_eq!(FileOwner::from_sudo_ids(Some("pi"), Some("1000")), None);
    }
}
