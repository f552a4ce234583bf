//! CLI for gamereel.

mod commands;
mod control_socket;
mod manifest;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use gamereel_core::config;
use std::path::PathBuf;

use commands::{
    run_cancel, run_check, run_checksum, run_fetch, run_health, run_process, run_push,
    run_transfers,
};

/// Top-level CLI for gamereel.
#[derive(Debug, Parser)]
#[command(name = "gamereel")]
#[command(about = "gamereel: cut, downscale and upload multi-angle game recordings", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Process every game in a manifest: extract, downscale if needed, upload.
    Run {
        /// TOML manifest listing the games and the recording of each angle.
        manifest: PathBuf,
        /// Print every angle transition, not just the final summary.
        #[arg(long, short)]
        verbose: bool,
    },

    /// Validate a manifest without processing anything.
    Check {
        manifest: PathBuf,
    },

    /// Stop admitting angles of a game (or of every game) in the active run.
    Cancel {
        /// Game id such as `10-02_game1`, or `all`.
        target: String,
    },

    /// Show GPU, free disk and the concurrency ceiling this host would use.
    Health,

    /// Download an object (or an http(s) URL) with resume.
    Fetch {
        /// Destination-store key, or an absolute http(s) URL.
        source: String,
        /// Local output file.
        output: PathBuf,
    },

    /// Upload a local file to the destination store with resume.
    Push {
        file: PathBuf,
        /// Destination-store key.
        key: String,
    },

    /// List unfinished transfers kept for resume.
    Transfers {
        /// Drop failed records, uploads whose source file is gone, and their leftovers.
        #[arg(long)]
        prune: bool,
    },

    /// Compute SHA-256 of a file.
    Checksum {
        path: PathBuf,
    },

    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        if let CliCommand::Completions { shell } = cli.command {
            clap_complete::generate(shell, &mut Cli::command(), "gamereel", &mut std::io::stdout());
            return Ok(());
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run { manifest, verbose } => run_process(&cfg, &manifest, verbose).await?,
            CliCommand::Check { manifest } => run_check(&manifest)?,
            CliCommand::Cancel { target } => run_cancel(&target).await?,
            CliCommand::Health => run_health(&cfg).await?,
            CliCommand::Fetch { source, output } => run_fetch(&cfg, &source, &output).await?,
            CliCommand::Push { file, key } => run_push(&cfg, &file, &key).await?,
            CliCommand::Transfers { prune } => run_transfers(&cfg, prune).await?,
            CliCommand::Checksum { path } => run_checksum(&path)?,
            CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
