use clap::Parser;
use std::path::PathBuf;

/// Marquee Server CLI - run the display fleet control plane
#[derive(Debug, Parser)]
#[command(name = "marquee-server")]
#[command(author, version, about)]
pub struct ServerArgs {
    /// Path to the JSON config file (created with defaults if missing)
    #[arg(short, long, default_value = "marquee.json")]
    pub config: PathBuf,

    /// Logging level (simple version, e.g. 'info', 'debug')
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Advanced logging filter (e.g. "info,marquee=debug")
    /// This overrides log_level if provided
    #[arg(long)]
    pub log_filter: Option<String>,

    /// Log directory
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,

    /// Log to stdout as well
    #[arg(long)]
    pub log_stdout: bool,
}
