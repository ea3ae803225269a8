use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "toolchange",
    version,
    about = "Track manual filament/tool changes in G-code files"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan a G-code file and record its tool changes for the next print
    Scan(ScanArgs),
    /// Report the next tool change; call once per manual tool change pause
    Advance(LogArgs),
    /// Show progress through the recorded tool changes
    Status(LogArgs),
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// G-code file to scan. Defaults to the newest file in the G-code directory.
    pub file: Option<PathBuf>,
    /// Print what would be recorded without writing the state file
    #[arg(long)]
    pub dry_run: bool,
    #[command(flatten)]
    pub logging: LogArgs,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Log debug details to stderr
    #[arg(short, long)]
    pub verbose: bool,
    /// Also write the log to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Command {
    pub fn logging(&self) -> &LogArgs {
        match self {
            Command::Scan(args) => &args.logging,
            Command::Advance(args) | Command::Status(args) => args,
        }
    }
}
