//! batchkit CLI — exercise the coalescing engine from the terminal.
//!
//! # Commands
//! ```text
//! batchkit demo
//! batchkit bench --calls <N> --distinct <D> --latency-ms <L> [--delay-ms <ms>] [--limit <n>] [--parallel]
//! batchkit config [--config <file.json>] [--delay-ms <ms>] [--limit <n>] [--parallel]
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use batchkit_core::BatcherConfig;
use clap::{Args, Parser, Subcommand};

mod cmd_bench;
mod cmd_demo;
mod logging;

use logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "batchkit",
    about = "Coalesce single-key calls into bulk calls — batchkit CLI",
    version
)]
struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Batcher options shared by commands that build a batcher.
#[derive(Args, Debug, Clone)]
struct BatcherArgs {
    /// JSON file with `delay_ms`, `parallel` and `limit`
    #[arg(long)]
    config: Option<String>,
    /// Debounce delay in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,
    /// Allow batches to run concurrently
    #[arg(long)]
    parallel: bool,
    /// Maximum distinct keys per batch
    #[arg(long)]
    limit: Option<usize>,
}

impl BatcherArgs {
    /// File values first, then flag overrides.
    fn resolve(&self) -> Result<BatcherConfig> {
        let mut config = match &self.config {
            Some(path) => BatcherConfig::from_json_file(path)
                .with_context(|| format!("loading batcher config from '{path}'"))?,
            None => BatcherConfig::default(),
        };
        if let Some(ms) = self.delay_ms {
            config.delay_ms = ms;
        }
        if self.parallel {
            config.parallel = true;
        }
        if let Some(limit) = self.limit {
            config.limit = Some(limit);
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in coalescing scenarios
    Demo,

    /// Fire a burst of concurrent calls and report how they coalesced
    Bench {
        /// Total number of calls
        #[arg(long, default_value_t = 10_000)]
        calls: usize,
        /// Number of distinct keys the calls cycle through
        #[arg(long, default_value_t = 1_000)]
        distinct: u64,
        /// Simulated batch function latency in milliseconds
        #[arg(long, default_value_t = 5)]
        latency_ms: u64,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        batcher: BatcherArgs,
    },

    /// Print the effective batcher configuration as JSON
    Config {
        #[command(flatten)]
        batcher: BatcherArgs,
    },
}

// Coalescing needs the deferred batch check to run after the caller yields,
// which only a single-threaded runtime guarantees.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&LogConfig {
        level: cli.log_level.clone(),
        json: cli.log_json,
    });

    match cli.command {
        Commands::Demo => cmd_demo::run().await,

        Commands::Bench { calls, distinct, latency_ms, json, batcher } => {
            let config = batcher.resolve()?;
            cmd_bench::run(calls, distinct, Duration::from_millis(latency_ms), config, json).await
        }

        Commands::Config { batcher } => {
            let config = batcher.resolve()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
