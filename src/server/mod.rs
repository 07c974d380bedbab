mod background;
pub mod bootstrap;
mod error;
mod logging;
pub mod routes;

pub use bootstrap::run_server;
pub use error::ApiError;
pub use routes::{MemoryScrambleServer, ServerContext};
