// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Elastisim CLI
//!
//! Command-line driver for the adaptive resource allocator.

use clap::{Parser, Subcommand};

mod commands;
mod metrics;

/// Elastisim - adaptive request allocator over an elastic pool of simulated servers
#[derive(Parser)]
#[command(name = "elastisim")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "elastisim.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a load simulation against the allocator
    Run {
        /// Number of requests to submit
        #[arg(short = 'n', long, default_value_t = 50)]
        requests: usize,

        /// Mean arrival rate in requests per second
        #[arg(short, long, default_value_t = 2.0)]
        rate: f64,

        /// Seed for the synthetic workload
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },

    /// Train the demand model from a CSV file
    Train {
        /// CSV with `length,category,demand` columns
        #[arg(short, long)]
        data: String,

        /// Where to write the trained model
        #[arg(short, long)]
        out: String,

        /// Gradient descent epochs
        #[arg(short, long, default_value_t = 100)]
        epochs: usize,

        /// Gradient descent step size
        #[arg(short, long, default_value_t = 0.05)]
        learning_rate: f64,
    },

    /// Predict demand for a prompt
    Predict {
        /// Prompt text to analyze
        #[arg(short, long)]
        text: String,
    },

    /// Show the status written by a running simulation
    Stats {
        /// Status file to read instead of the configured one
        #[arg(short, long)]
        file: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            requests,
            rate,
            seed,
        } => commands::run::execute(&cli.config, requests, rate, seed).await,
        Commands::Validate { file } => commands::validate::execute(&file).await,
        Commands::Train {
            data,
            out,
            epochs,
            learning_rate,
        } => commands::train::execute(&data, &out, epochs, learning_rate).await,
        Commands::Predict { text } => commands::predict::execute(&cli.config, &text).await,
        Commands::Stats { file } => commands::stats::execute(&cli.config, file.as_deref()).await,
    }
}
