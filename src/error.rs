//! Error types.

use futures::task::SpawnError;
use thiserror::Error;

/// Errors raised while wiring notifiers together.
///
/// All of these are input-validation failures reported at call time. State
/// writes, publishes and resets never fail.
#[derive(Debug, Error)]
pub enum Error {
    /// The object handed to a bridge cannot act as a source.
    #[error("invalid notifier source: {0}")]
    InvalidSource(String),

    /// The projection handed to a bridge cannot be applied to the source.
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// An async selector could not schedule its first evaluation.
    #[error("failed to spawn selector evaluation: {0}")]
    Spawn(#[from] SpawnError),
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
