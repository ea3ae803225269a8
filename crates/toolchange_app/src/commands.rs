use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use toolchange_core::{MetadataOrigin, Phase, ProgressState};
use toolchange_engine::{
    find_latest_gcode, scan_job, validate_gcode_path, AdvanceController, TrackerConfig,
};
use tracker_logging::tracker_info;

use crate::cli::{Command, ScanArgs};

pub fn run(command: &Command, config: &TrackerConfig, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Scan(args) => scan(args, config, out),
        Command::Advance(_) => advance(config, out),
        Command::Status(_) => status(config, out),
    }
}

fn scan(args: &ScanArgs, config: &TrackerConfig, out: &mut impl Write) -> Result<()> {
    let path: PathBuf = match &args.file {
        Some(file) => file.clone(),
        None => find_latest_gcode(&config.gcode_dir)?,
    };
    validate_gcode_path(&path)?;

    writeln!(out, "Scanning G-code file: {}", path.display())?;
    let state = scan_job(&path)?;
    if state.metadata() == MetadataOrigin::Placeholder {
        tracker_info!("No slicer filament metadata in {:?}", path);
    }
    writeln!(
        out,
        "PRE_SCAN_COMPLETE: {} tool changes found.",
        state.total_changes()
    )?;

    if args.dry_run {
        print_changes(&state, out)?;
        return Ok(());
    }

    let store = config.store();
    store
        .save(&state)
        .with_context(|| format!("Failed to save {}", store.path().display()))?;
    writeln!(out, "Data saved to: {}", store.path().display())?;
    Ok(())
}

fn print_changes(state: &ProgressState, out: &mut impl Write) -> Result<()> {
    for (index, change) in state.changes().iter().enumerate() {
        writeln!(
            out,
            "  {}. T{} {} {} {} ({}) at line {}",
            index + 1,
            change.tool_number,
            change.color,
            change.brand,
            change.material,
            change.hex_color,
            change.line
        )?;
    }
    Ok(())
}

fn advance(config: &TrackerConfig, out: &mut impl Write) -> Result<()> {
    let outcome = AdvanceController::new(config.store()).advance()?;
    writeln!(out, "{outcome}")?;
    Ok(())
}

fn status(config: &TrackerConfig, out: &mut impl Write) -> Result<()> {
    let report = AdvanceController::new(config.store()).status()?;
    writeln!(
        out,
        "Tool change {} of {}",
        report.current_change, report.total_changes
    )?;
    if let Some(source) = &report.source_file {
        writeln!(out, "File: {source}")?;
    }
    if report.metadata == MetadataOrigin::Placeholder {
        writeln!(out, "Filament metadata: placeholder tool names")?;
    }
    match (&report.phase, &report.next) {
        (Phase::Complete, _) | (_, None) => writeln!(out, "Tool changes completed.")?,
        (_, Some(next)) => writeln!(
            out,
            "Next: {} {} {} (T{}) at line {}",
            next.color, next.brand, next.material, next.tool_number, next.line
        )?,
    }
    Ok(())
}
