//! tierkv CLI
//!
//! Runs one command against a data directory and closes the engine.

use clap::{Parser, Subcommand};
use tierkv::{Config, Engine, FlushMode};
use tracing_subscriber::{fmt, EnvFilter};

/// tierkv CLI
#[derive(Parser, Debug)]
#[command(name = "tierkv-cli")]
#[command(about = "Inspect and edit a tierkv data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./tierkv_data")]
    data_dir: String,

    /// MemTable budget in KB before flush
    #[arg(short = 'm', long, default_value = "4096")]
    memtable_kb: usize,

    /// Tables per tier before compaction
    #[arg(short, long, default_value = "5")]
    threshold: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key from the write buffer
    Delete {
        /// The key to delete
        key: String,
    },

    /// Flush the write buffer to a tier
    Flush {
        /// Target tier
        #[arg(default_value_t = 0)]
        tier: u32,
    },

    /// Print per-tier table counts
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tierkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Every command is one short-lived engine, so writes go to disk inline
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .memtable_size_limit(args.memtable_kb * 1024)
        .tier_threshold(args.threshold)
        .flush_mode(FlushMode::Inline)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&engine, args.command) {
        tracing::error!("Command failed: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = engine.close() {
        tracing::error!("Failed to close engine: {}", e);
        std::process::exit(1);
    }
}

fn run(engine: &Engine, command: Commands) -> tierkv::Result<()> {
    match command {
        Commands::Get { key } => match engine.get(&key)? {
            Some(value) => println!("{}", value),
            None => println!("(nil)"),
        },
        Commands::Put { key, value } => {
            engine.put(&key, &value)?;
            println!("OK");
        }
        Commands::Delete { key } => {
            engine.delete(&key)?;
            println!("OK");
        }
        Commands::Flush { tier } => {
            engine.flush(tier)?;
            println!("OK");
        }
        Commands::Stats => {
            let config = engine.config();
            println!("data_dir: {}", engine.data_dir().display());
            println!("tier_threshold: {}", config.tier_threshold);
            for tier in 0..config.num_tiers {
                println!("T{}: {} table(s)", tier, engine.tier_table_count(tier));
            }
            println!("total: {}", engine.table_count());
        }
    }
    Ok(())
}
