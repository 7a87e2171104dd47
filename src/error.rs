//! Fatal errors that abort a property or equivalence run.

use thiserror::Error;

use crate::{generator::GenerationError, transport::TransportError};

/// A run ended without a verdict.
#[derive(Debug, Error)]
pub enum CheckError {
    /// A request could not be generated.
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// A request could not be delivered or its response read.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl CheckError {
    /// Whether the run ended because the server did not answer in time.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Timeout { .. }))
    }
}
