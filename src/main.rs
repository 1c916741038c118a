//! Shellback CLI - outbound command-execution client.
//!
//! This is the main binary entry point. See the `shellback` library
//! for the protocol and session machinery.

use anyhow::Result;
use mimalloc::MiMalloc;
use shellback::{ChannelCipher, Client, Config};

/// mimalloc provides better multi-threaded performance than the system
/// allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
use clap::{Parser, Subcommand};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Global flag for signal-triggered shutdown (as Arc for signal-hook
/// compatibility). The connection layer polls it between reads.
static SHUTDOWN_FLAG: std::sync::LazyLock<Arc<AtomicBool>> =
    std::sync::LazyLock::new(|| Arc::new(AtomicBool::new(false)));

/// Connect to the controller and serve sessions until a signal lands.
fn run_client(host: Option<String>, port: Option<u16>, retry_interval: Option<u64>) -> Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::flag;
    flag::register(SIGINT, Arc::clone(&SHUTDOWN_FLAG))?;
    flag::register(SIGTERM, Arc::clone(&SHUTDOWN_FLAG))?;
    flag::register(SIGHUP, Arc::clone(&SHUTDOWN_FLAG))?;

    let mut config = Config::load()?;
    config.apply_cli_overrides(host, port, retry_interval);

    log::info!("shellback v{VERSION} starting");
    let client = Client::new(&config, Arc::clone(&SHUTDOWN_FLAG))?;
    client.run();

    Ok(())
}

// CLI
#[derive(Parser)]
#[command(name = "shellback")]
#[command(version = VERSION)]
#[command(about = "Outbound command-execution client for authorized remote administration")]
struct Cli {
    /// Controller address to dial
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Controller port to dial
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// Seconds to wait between connection attempts
    #[arg(long)]
    retry_interval: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a fresh channel key
    Keygen {
        /// Also store the key in the configuration file
        #[arg(long)]
        save: bool,
    },
    /// Print the resolved configuration as JSON
    Config {
        /// Also write the resolved configuration to disk
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    // Log panics before the default handler takes over.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        log::error!("PANIC: {panic_info:?}");
        default_hook(panic_info);
    }));

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Keygen { save }) => {
            let key = ChannelCipher::generate_key();
            if save {
                let mut config = Config::load()?;
                config.key.clone_from(&key);
                config.save()?;
                eprintln!("Key saved to {}", Config::config_path()?.display());
            }
            // Stdout carries only the key so scripts can capture it.
            println!("{key}");
        }
        Some(Commands::Config { write }) => {
            let config = Config::load()?;
            if write {
                config.save()?;
                eprintln!("Configuration written to {}", Config::config_path()?.display());
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        None => {
            run_client(cli.host, cli.port, cli.retry_interval)?;
        }
    }

    Ok(())
}
