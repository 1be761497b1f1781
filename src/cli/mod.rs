//! CLI surface (SPEC_FULL §6): `--daemon` runs the scheduler loop in the
//! foreground, `--health` reads the cache's heartbeat and exits, `--config`
//! overrides the TOML config file search.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Aggregating status dashboard daemon for billing, mesh, cluster, and Claude usage sources", long_about = None)]
pub struct Args {
    /// Run the scheduler loop in the foreground until SIGINT/SIGTERM.
    #[arg(long)]
    pub daemon: bool,

    /// Print a health summary read from the cache's heartbeat and exit.
    #[arg(long)]
    pub health: bool,

    /// Emit --health output as JSON instead of colorized text.
    #[arg(long)]
    pub json: bool,

    /// Path to the TOML config file (default: $XDG_CONFIG_HOME/statusline-daemon/config.toml).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}
