//! Persistence error types.

use snark_dispute_tx_graph::TemplateName;
use thiserror::Error;

/// Persistence failures. Unknown-setup and unknown-template are configuration bugs and
/// fatal; the storage variant covers backend-specific trouble.
#[derive(Debug, Error)]
pub enum DbError {
    /// No setup registered under the identifier.
    #[error("unknown setup {0}")]
    UnknownSetup(String),

    /// The setup has no template with the name.
    #[error("setup {setup} has no template {name}")]
    UnknownTemplate {
        /// The setup identifier.
        setup: String,
        /// The missing template.
        name: TemplateName,
    },

    /// A backend failure.
    #[error("storage: {0}")]
    Storage(String),
}

/// Convenience alias for persistence results.
pub type DbResult<T> = Result<T, DbError>;
