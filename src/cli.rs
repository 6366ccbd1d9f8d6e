// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The gateway's `clap` CLI surface: run the server, or invoke a single
//! headless operation without standing up the HTTP listener.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "nextai", about = "Agent gateway: turn engine, cron scheduler, inbound session supervisor")]
pub struct Cli {
    /// Explicit config file, layered on top of the discovered search paths.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increases log verbosity (-v debug, -vv trace); `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Runs the HTTP server, cron scheduler, and inbound supervisor (default).
    Serve,
    /// Prints the effective layered configuration as YAML and exits.
    ShowConfig,
    /// Runs a single agent turn headlessly against stdin/an inline string.
    Agent {
        /// Text to send as the turn's sole user input. Reads stdin if omitted.
        text: Option<String>,
        #[arg(long, default_value = "console")]
        channel: String,
        #[arg(long, default_value = "")]
        session_id: String,
        #[arg(long, default_value = "")]
        user_id: String,
    },
    /// Runs one cron job immediately, bypassing the scheduler's next-run timing.
    Cron { job_id: String },
    /// Prints shell completion scripts for the given shell.
    Completions { shell: clap_complete::Shell },
}
