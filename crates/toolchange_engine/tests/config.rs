use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use toolchange_engine::{
    Environment, FileOwner, TrackerConfig, CONFIG_FILENAME, FALLBACK_STATE_FILE, GCODE_DIR_VAR,
    PRINTER_CONFIG_DIR_VAR, STATE_FILE_VAR,
};

fn env_with(home: &TempDir, cwd: &TempDir, vars: &[(&str, String)]) -> Environment {
    Environment {
        variables: vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect::<HashMap<_, _>>(),
        home: Some(home.path().to_path_buf()),
        cwd: cwd.path().to_path_buf(),
    }
}

fn mkdir(path: PathBuf) -> PathBuf {
    fs::create_dir_all(&path).unwrap();
    path
}

#[test]
fn nothing_found_falls_back_to_tmp_state_file() {
    let home = TempDir::new().unwrap();
    let cwd = TempDir::new().unwrap();
    let config = TrackerConfig::resolve(&env_with(&home, &cwd, &[]));

    assert_eq!(config.printer_config_dir, None);
    assert_eq!(config.state_file, PathBuf::from(FALLBACK_STATE_FILE));
    assert_eq!(
        config.gcode_dir,
        home.path().join("printer_data").join("gcodes")
    );
    assert_eq!(config.owner, None);
}

#[test]
fn environment_variable_wins() {
    let home = TempDir::new().unwrap();
    let cwd = TempDir::new().unwrap();
    let printer = mkdir(home.path().join("custom"));
    mkdir(home.path().join("printer_data").join("config"));

    let env = env_with(
        &home,
        &cwd,
        &[(PRINTER_CONFIG_DIR_VAR, printer.display().to_string())],
    );
    let config = TrackerConfig::resolve(&env);
    assert_eq!(config.printer_config_dir, Some(printer.clone()));
    assert_eq!(config.state_file, printer.join("tool_changes.json"));
}

#[test]
fn config_file_in_cwd_is_used_when_variable_is_unset() {
    let home = TempDir::new().unwrap();
    let cwd = TempDir::new().unwrap();
    let printer = mkdir(home.path().join("elsewhere").join("config"));
    let gcodes = mkdir(home.path().join("uploads"));
    fs::write(
        cwd.path().join(CONFIG_FILENAME),
        format!(
            "PRINTER_CONFIG_DIR=\"{}\"\nGCODE_DIR='{}'\n",
            printer.display(),
            gcodes.display()
        ),
    )
    .unwrap();

    let config = TrackerConfig::resolve(&env_with(&home, &cwd, &[]));
    assert_eq!(config.printer_config_dir, Some(printer));
    assert_eq!(config.gcode_dir, gcodes);
}

#[test]
fn config_file_pointing_at_missing_dir_is_ignored() {
    let home = TempDir::new().unwrap();
    let cwd = TempDir::new().unwrap();
    fs::write(
        cwd.path().join(CONFIG_FILENAME),
        "PRINTER_CONFIG_DIR=/definitely/not/here\n",
    )
    .unwrap();
    let auto = mkdir(home.path().join("printer_data").join("config"));

    let config = TrackerConfig::resolve(&env_with(&home, &cwd, &[]));
    assert_eq!(config.printer_config_dir, Some(auto));
}

#[test]
fn home_scan_finds_printer_prefixed_directories() {
    let home = TempDir::new().unwrap();
    let cwd = TempDir::new().unwrap();
    let second = mkdir(home.path().join("printer_2").join("printer_data").join("config"));
    mkdir(home.path().join("printer_2").join("printer_data").join("gcodes"));
    mkdir(home.path().join("printer_3").join("printer_data").join("config"));
    mkdir(home.path().join("backup").join("printer_data").join("config"));

    let config = TrackerConfig::resolve(&env_with(&home, &cwd, &[]));
    assert_eq!(config.printer_config_dir, Some(second.clone()));
    assert_eq!(
        config.gcode_dir,
        home.path().join("printer_2").join("printer_data").join("gcodes")
    );
    assert_eq!(config.store().path(), second.join("tool_changes.json"));
}

#[test]
fn explicit_overrides_and_sudo_owner() {
    let home = TempDir::new().unwrap();
    let cwd = TempDir::new().unwrap();
    let state = home.path().join("state.json");
    let env = env_with(
        &home,
        &cwd,
        &[
            (STATE_FILE_VAR, state.display().to_string()),
            (GCODE_DIR_VAR, "/srv/gcodes".to_string()),
            ("SUDO_UID", "1000".to_string()),
            ("SUDO_GID", "1001".to_string()),
        ],
    );
    let config = TrackerConfig::resolve(&env);
    assert_eq!(config.state_file, state);
    assert_eq!(config.gcode_dir, PathBuf::from("/srv/gcodes"));
    assert_eq!(
        config.owner,
        Some(FileOwner {
            uid: 1000,
            gid: 1001
        })
    );
}
