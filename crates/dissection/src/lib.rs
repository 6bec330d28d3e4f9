//! Bisection arithmetic and register-file commitments.
//!
//! The [`Decasector`] maps the linear instruction trace onto a fixed-depth 10-ary
//! search tree and hands out [`StateCommitment`]s for the interior cut points; the
//! [`FatMerkleProof`] commits to the 128-register snapshot behind each of those states
//! and pinpoints the first dishonest hash step when a posted proof disagrees.
//!
//! Everything here is a pure function of the saved program and the proof witness, so
//! both parties recompute it independently and must agree.

use thiserror::Error;

mod decasector;
mod fat_merkle;

pub use decasector::{Decasector, SelectionPath, StateCommitment};
pub use fat_merkle::{register_root, FatMerkleProof, RegHash};

/// Structural failures around bisection inputs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DissectionError {
    /// A register snapshot has the wrong number of registers.
    #[error("register file has {actual} registers, expected {expected}")]
    WrongRegisterCount {
        /// Expected register count.
        expected: usize,
        /// Observed register count.
        actual: usize,
    },

    /// A posted membership proof has the wrong number of hashes.
    #[error("membership proof has {actual} hashes, expected {expected}")]
    WrongProofLength {
        /// Expected hash count.
        expected: usize,
        /// Observed hash count.
        actual: usize,
    },

    /// A register index is outside the register file.
    #[error("register index {0} outside the register file")]
    RegisterOutOfRange(usize),

    /// A selection digit is outside the tree arity.
    #[error("selection digit {0} outside the search arity")]
    DigitOutOfRange(u8),

    /// A selection path is longer than the round count.
    #[error("selection path longer than {0} rounds")]
    PathTooLong(usize),

    /// The operation needs a fully narrowed path but got a partial one.
    #[error("selection path has {0} digits but the game runs to full depth")]
    PathIncomplete(usize),

    /// The operation needs a partial path but got a fully narrowed one.
    #[error("selection path is already fully narrowed")]
    PathComplete,

    /// Every posted boundary agrees and the witness satisfies the program, so there
    /// is nothing to narrow towards. Reaching this mid-dispute is a derivation desync.
    #[error("no boundary disagreement and no failing assertion")]
    NoDisagreement,
}
