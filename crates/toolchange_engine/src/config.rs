//! Where the tracker reads G-code from and keeps its progress document.
//!
//! Everything is resolved once, at process start, from an [`Environment`]
//! snapshot. Tests build that snapshot by hand instead of touching the real
//! process environment.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracker_logging::{tracker_debug, tracker_warn};

use crate::ownership::FileOwner;
use crate::store::StateStore;

/// Name of the optional key-value config file.
pub const CONFIG_FILENAME: &str = ".toolchange-config";
/// Progress document name inside the printer config directory.
pub const STATE_FILENAME: &str = "tool_changes.json";
/// Progress document used when no printer config directory can be found.
pub const FALLBACK_STATE_FILE: &str = "/tmp/tool_change_data.json";

pub const PRINTER_CONFIG_DIR_VAR: &str = "PRINTER_CONFIG_DIR";
pub const STATE_FILE_VAR: &str = "TOOLCHANGE_STATE_FILE";
pub const GCODE_DIR_VAR: &str = "TOOLCHANGE_GCODE_DIR";
const GCODE_DIR_KEY: &str = "GCODE_DIR";

/// The inputs configuration is resolved from.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub variables: HashMap<String, String>,
    /// Home of the user the printer runs as (the `sudo` caller, if any).
    pub home: Option<PathBuf>,
    pub cwd: PathBuf,
}

impl Environment {
    pub fn from_process() -> Self {
        let variables: HashMap<String, String> = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let sudo_home = variables.get("SUDO_USER").and_then(|user| {
            let passwd = fs::read_to_string("/etc/passwd").ok()?;
            home_from_passwd(&passwd, user)
        });
        let home = sudo_home.or_else(dirs::home_dir);

        Self {
            variables,
            home,
            cwd,
        }
    }

    /// A variable's value, treating empty as unset.
    pub fn var(&self, key: &str) -> Option<&str> {
        self.variables
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Home directory of `user` from `/etc/passwd`-formatted text.
fn home_from_passwd(passwd: &str, user: &str) -> Option<PathBuf> {
    passwd
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            match fields.as_slice() {
                [name, _, _, _, _, home, ..] if *name == user && !home.is_empty() => {
                    Some(PathBuf::from(*home))
                }
                _ => None,
            }
        })
}

/// Parsed `KEY=VALUE` lines of a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    values: HashMap<String, String>,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Self {
        let values = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| {
                let value = value.trim().trim_matches(['"', '\'']);
                (key.trim().to_string(), value.to_string())
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// `key` as a path, only if it names an existing directory.
    fn directory(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from).filter(|path| path.is_dir())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub printer_config_dir: Option<PathBuf>,
    pub gcode_dir: PathBuf,
    pub state_file: PathBuf,
    pub owner: Option<FileOwner>,
}

impl TrackerConfig {
    pub fn resolve(env: &Environment) -> Self {
        let config_files = load_config_files(env);
        let printer_config_dir = resolve_printer_config_dir(env, &config_files);

        let state_file = match env.var(STATE_FILE_VAR) {
            Some(path) => PathBuf::from(path),
            None => printer_config_dir
                .as_ref()
                .map(|dir| dir.join(STATE_FILENAME))
                .unwrap_or_else(|| PathBuf::from(FALLBACK_STATE_FILE)),
        };
        let gcode_dir = resolve_gcode_dir(env, &config_files, printer_config_dir.as_deref());
        let owner = FileOwner::from_sudo_ids(env.var("SUDO_UID"), env.var("SUDO_GID"));

        let config = Self {
            printer_config_dir,
            gcode_dir,
            state_file,
            owner,
        };
        tracker_debug!("Resolved configuration: {:?}", config);
        config
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(self.state_file.clone()).with_owner(self.owner)
    }
}

fn config_search_dirs(env: &Environment) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(dir) = env.var(PRINTER_CONFIG_DIR_VAR) {
        dirs.push(PathBuf::from(dir));
    }
    dirs.push(env.cwd.clone());
    if let Some(home) = &env.home {
        dirs.push(home.join("printer_data").join("config"));
        dirs.push(home.join(".config").join("toolchange"));
    }
    dirs
}

fn load_config_files(env: &Environment) -> Vec<ConfigFile> {
    config_search_dirs(env)
        .into_iter()
        .map(|dir| dir.join(CONFIG_FILENAME))
        .filter(|path| path.is_file())
        .filter_map(|path| match fs::read_to_string(&path) {
            Ok(text) => {
                tracker_debug!("Read {:?}", path);
                Some(ConfigFile::parse(&text))
            }
            Err(err) => {
                tracker_warn!("Ignoring unreadable config {:?}: {}", path, err);
                None
            }
        })
        .collect()
}

fn resolve_printer_config_dir(env: &Environment, config_files: &[ConfigFile]) -> Option<PathBuf> {
    if let Some(dir) = env.var(PRINTER_CONFIG_DIR_VAR).map(PathBuf::from) {
        if dir.is_dir() {
            return Some(dir);
        }
        tracker_warn!("{} is set but {:?} is not a directory", PRINTER_CONFIG_DIR_VAR, dir);
    }

    config_files
        .iter()
        .find_map(|file| file.directory(PRINTER_CONFIG_DIR_VAR))
        .or_else(|| env.home.as_deref().and_then(scan_home_for_printer_config))
}

/// `<home>/printer_data/config`, else the first `<home>/printer*/printer_data/config`.
fn scan_home_for_printer_config(home: &Path) -> Option<PathBuf> {
    let direct = home.join("printer_data").join("config");
    if direct.is_dir() {
        return Some(direct);
    }

    let entries = match fs::read_dir(home) {
        Ok(entries) => entries,
        Err(err) => {
            tracker_warn!("Could not scan {:?} for printer directories: {}", home, err);
            return None;
        }
    };
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("printer"))
        .map(|entry| entry.path().join("printer_data").join("config"))
        .filter(|path| path.is_dir())
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

fn resolve_gcode_dir(
    env: &Environment,
    config_files: &[ConfigFile],
    printer_config_dir: Option<&Path>,
) -> PathBuf {
    if let Some(dir) = env.var(GCODE_DIR_VAR) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = config_files
        .iter()
        .find_map(|file| file.directory(GCODE_DIR_KEY))
    {
        return dir;
    }
    if let Some(sibling) = printer_config_dir
        .and_then(Path::parent)
        .map(|data_dir| data_dir.join("gcodes"))
        .filter(|path| path.is_dir())
    {
        return sibling;
    }
    env.home
        .clone()
        .unwrap_or_else(|| env.cwd.clone())
        .join("printer_data")
        .join("gcodes")
}
