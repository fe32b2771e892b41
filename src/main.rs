use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use fnbridge::bridge::Bridge;
use fnbridge::config::{BridgeConfig, DEFAULT_DRAIN_TIMEOUT_MS, DEFAULT_LOG_DIRECTORY};
use fnbridge::executor::{math::AddFunction, ExecutorRegistry};
use fnbridge::logging::Logger;
use fnbridge::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "fnbridge")]
#[command(version)]
#[command(about = "Executes host-requested functions in isolated workers over stdin/stdout")]
struct Args {
    /// Directory the bridge log file is written to
    #[arg(long, default_value = DEFAULT_LOG_DIRECTORY)]
    log_dir: PathBuf,

    /// How long to keep draining worker messages at shutdown, per message
    /// (milliseconds)
    #[arg(long, default_value_t = DEFAULT_DRAIN_TIMEOUT_MS)]
    drain_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // stdout carries response frames, so operator diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = BridgeConfig::new(args.log_dir).with_drain_timeout_ms(args.drain_timeout_ms);
    let logger = Arc::new(Logger::new(&config.log_directory)?);

    let mut registry = ExecutorRegistry::new();
    // host-visible identifiers are kept for compatibility with existing callers
    registry.register("add", "Math.py", AddFunction);

    let mut bridge = Bridge::new(config, logger, Arc::new(registry));
    install_shutdown_handler(bridge.shutdown_token());

    tracing::info!("Starting bridge");

    let stdin = BufReader::new(tokio::io::stdin());
    bridge.run(stdin, tokio::io::stdout()).await?;
    bridge.dispose()?;

    tracing::info!("Bridge stopped");
    Ok(())
}
