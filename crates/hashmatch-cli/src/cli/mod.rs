//! CLI for hashmatch.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hashmatch_core::config::{self, HashmatchConfig};
use std::path::{Path, PathBuf};

use commands::{run_checksum, run_serve};

/// Top-level CLI for hashmatch.
#[derive(Debug, Parser)]
#[command(name = "hashmatch")]
#[command(about = "hashmatch: check that an uploaded file and a remote file are byte-identical", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/hashmatch/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log to stderr instead of the state-dir log file.
    #[arg(long, global = true)]
    pub log_stderr: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the verification HTTP server.
    Serve {
        /// Address to listen on, e.g. 127.0.0.1:5678.
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
        /// Directory containing index.html for the web page.
        #[arg(long, value_name = "DIR")]
        static_dir: Option<PathBuf>,
        /// Maximum request body size in bytes.
        #[arg(long, value_name = "BYTES")]
        max_upload_bytes: Option<u64>,
    },

    /// Compute SHA-256 of a local file.
    Checksum {
        /// Path to the file.
        path: String,
    },
}

impl CliCommand {
    /// Fold command-line flags over the loaded config.
    fn apply_overrides(&self, cfg: &mut HashmatchConfig) {
        if let CliCommand::Serve {
            listen,
            static_dir,
            max_upload_bytes,
        } = self
        {
            if let Some(addr) = listen {
                cfg.listen_addr = addr.clone();
            }
            if let Some(dir) = static_dir {
                cfg.static_dir = dir.clone();
            }
            if let Some(max) = max_upload_bytes {
                cfg.max_upload_bytes = *max;
            }
        }
    }
}

impl Cli {
    fn load_config(&self) -> Result<HashmatchConfig> {
        let mut cfg = match &self.config {
            Some(path) => config::load_from(path)?,
            None => config::load_or_init()?,
        };
        self.command.apply_overrides(&mut cfg);
        Ok(cfg)
    }

    pub async fn run(self) -> Result<()> {
        match &self.command {
            CliCommand::Serve { .. } => {
                let cfg = self.load_config()?;
                tracing::debug!("loaded config: {:?}", cfg);
                run_serve(&cfg).await?;
            }
            CliCommand::Checksum { path } => run_checksum(Path::new(path)).await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
