//! Server-side configuration, built from CLI args / environment variables
//! (see `bin/memory_scramble_server.rs`) and handed to
//! [`crate::server::run_server`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the HTTP front door and its background jobs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub board_file: PathBuf,
    pub reset_interval: Option<Duration>,
}
