// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! omxil CLI
//!
//! Lists the registered components and runs a demo tunnel through the core.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "omxil")]
#[command(author, version, about = "OpenMAX IL style component core", long_about = None)]
struct Cli {
    /// Directory containing omxil.yaml (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered components and their roles
    List {
        /// Only components implementing this role
        #[arg(long)]
        role: Option<String>,
    },

    /// Stream buffers through passthrough -> sink over a tunnel
    Run {
        /// Number of buffers to send; the last one carries end-of-stream
        #[arg(short = 'n', long, default_value = "16")]
        buffers: usize,

        /// Payload bytes per buffer
        #[arg(short, long, default_value = "1024")]
        size: usize,

        /// Seconds to wait for any single step before giving up
        #[arg(long, default_value = "5")]
        timeout: u64,
    },
}

fn main() -> Result<()> {
    // Load .env before anything reads the environment.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Some(Commands::List { role }) => commands::list::components(&config_dir, role.as_deref())?,
        Some(Commands::Run {
            buffers,
            size,
            timeout,
        }) => commands::run::run(&config_dir, buffers, size, timeout)?,
        None => {
            // No subcommand: show help
            Cli::parse_from(["omxil", "--help"]);
        }
    }

    Ok(())
}
