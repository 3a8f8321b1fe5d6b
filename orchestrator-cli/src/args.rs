//! Command-line surface (spec §6).
//!
//! Grounded on `av1an-cli::CliOpts`: one `#[derive(Parser)]` struct with a
//! doc comment per field, which `clap` promotes to `--help` text.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[clap(name = "transcode-orchestrator", version)]
pub struct CliOpts {
    /// Mission config document to run.
    ///
    /// The format is chosen by file extension: `.json`, `.yml`/`.yaml`, or
    /// `.conf` (HOCON).
    #[clap(parse(from_os_str))]
    pub config: PathBuf,

    /// Named parameter-template document (audio/video cmd templates,
    /// segmented-transcode config templates). Same extension dispatch as
    /// `config`.
    #[clap(long, parse(from_os_str))]
    pub templates: Option<PathBuf>,

    /// Write logs to this file instead of `<cache_dir>/log.log`.
    #[clap(long, parse(from_os_str))]
    pub log_file: Option<PathBuf>,

    /// Minimum log level written to the log file and stderr.
    #[clap(long, default_value = "info")]
    pub log_level: log::LevelFilter,

    /// Run planning and validation only; do not invoke any external tool.
    #[clap(long)]
    pub dry_run: bool,
}
