//! The observable on-chain state machines of both parties.
//!
//! Each agent is a poll loop over one setup: scan newly-confirmed blocks for the
//! setup's template txids, record what confirmed, fold the ordered confirmations into
//! a [`GameView`], and execute whichever duty the resulting phase assigns to this
//! side. The fold is a pure function of the confirmation sequence (plus the current
//! height for timeout edges), so an agent restarted from chain state alone lands in
//! exactly the position it left.

use snark_dispute_chain::ChainError;
use snark_dispute_db::errors::DbError;
use snark_dispute_dissection::DissectionError;
use snark_dispute_refutation::RefutationError;
use snark_dispute_tx_graph::{TemplateName, TxGraphError};
use thiserror::Error;

mod agent;
mod decoder;
mod game;
mod prover;
mod verifier;

pub use agent::scan_new_blocks;
pub use decoder::{StaticDecoder, TemplateDecoder};
pub use game::{fold_game, DisputePhase, GameView, TransitionErr};
pub use prover::ProtocolProver;
pub use verifier::ProtocolVerifier;

/// Protocol-level failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The confirmation sequence does not fit the game's grammar.
    #[error(transparent)]
    Transition(#[from] TransitionErr),

    /// A persistence failure. Fatal.
    #[error(transparent)]
    Db(#[from] DbError),

    /// A chain read failed. Transient: skip the item this cycle, retry next poll.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// A bisection failure.
    #[error(transparent)]
    Dissection(#[from] DissectionError),

    /// An argument/refutation failure.
    #[error(transparent)]
    Refutation(#[from] RefutationError),

    /// A template-graph failure.
    #[error(transparent)]
    TxGraph(#[from] TxGraphError),

    /// A confirmed transaction's committed values could not be decoded.
    #[error("failed to decode witness values of {0}")]
    Decode(TemplateName),
}

impl ProtocolError {
    /// Whether the poll loop should retry next cycle instead of treating this as a
    /// bug.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProtocolError::Chain(_))
    }
}
