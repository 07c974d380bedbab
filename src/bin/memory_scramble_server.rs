use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use memory_scramble::config::ServerConfig;
use memory_scramble::parser;
use memory_scramble::server::run_server;
use memory_scramble::Board;

const DEFAULT_BIND: &str = "127.0.0.1:4000";

#[derive(Debug, Parser)]
#[command(name = "memory_scramble_server")]
#[command(about = "Launch the Memory Scramble HTTP server", long_about = None)]
struct Args {
    /// Address to bind the HTTP server to (host:port)
    #[arg(long, env = "SERVER_BIND", default_value = DEFAULT_BIND)]
    bind: SocketAddr,

    /// Path to a board file in `<rows>x<cols>` + one-token-per-line format
    #[arg(long, env = "SERVER_BOARD_FILE")]
    board_file: PathBuf,

    /// Seconds between automatic board resets; omit to disable
    #[arg(long, env = "SERVER_RESET_INTERVAL_SECS")]
    reset_interval_secs: Option<u64>,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "SERVER_LOG_JSON", default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();
    init_tracing(args.json)?;

    let board_source = std::fs::read_to_string(&args.board_file)
        .with_context(|| format!("failed to read board file {}", args.board_file.display()))?;
    let parsed = parser::parse(&board_source)
        .with_context(|| format!("failed to parse board file {}", args.board_file.display()))?;
    let board = Board::new(parsed.rows, parsed.cols, parsed.tokens)
        .map_err(|err| anyhow::anyhow!(err.to_string()))
        .context("failed to construct board")?;

    let config = ServerConfig {
        bind: args.bind,
        board_file: args.board_file,
        reset_interval: args.reset_interval_secs.map(Duration::from_secs),
    };

    run_server(config, std::sync::Arc::new(board)).await
}

fn load_dotenv() {
    let manifest_env = env!("CARGO_MANIFEST_DIR");
    let manifest_env_path = PathBuf::from(manifest_env).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(false);

    if json {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
