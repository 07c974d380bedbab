use thiserror::Error;

/// Error kinds surfaced by the board's public operations.
///
/// None of these poison board state beyond the partial effects §7 of the
/// design already calls out (2-A/2-B relinquish the first card before
/// raising); the invariant check at the end of every monitor section holds
/// on every path, including failing ones.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("no card at that position")]
    NoCardAtPosition,

    #[error("card already controlled")]
    CardAlreadyControlled,

    #[error("operation cancelled")]
    Cancelled,
}

pub type BoardResult<T> = Result<T, BoardError>;
