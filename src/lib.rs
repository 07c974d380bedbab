pub mod board;
pub mod config;
pub mod parser;
pub mod server;
pub mod tokio_tools;

pub use board::{Board, BoardError, BoardResult};
