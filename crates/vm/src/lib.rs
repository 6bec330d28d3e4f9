//! The arithmetic VM whose execution trace the dispute game bisects.
//!
//! A program is an externally-produced, immutable artifact: the pairing DSL compiles a
//! Groth16 verification into a linear sequence of register instructions, and this crate
//! only replays it. Replay is fully deterministic given the same program and proof
//! witness, which is what lets both parties recompute any intermediate state
//! independently and agree bit-for-bit.

use thiserror::Error;

mod exec;
mod program;

pub use exec::{check_line, execute_line, initial_registers, program_succeeds, quotient, replay};
pub use program::{Instruction, Opcode, SavedProgram};

/// Structural failures around program artifacts.
///
/// All of these indicate a broken or mismatched artifact, never a dishonest
/// counterparty, and are fatal to the setup that hit them.
#[derive(Debug, Error)]
pub enum VmError {
    /// The artifact file could not be read.
    #[error("failed to read program artifact: {0}")]
    Io(#[from] std::io::Error),

    /// The artifact file is not a valid program encoding.
    #[error("failed to parse program artifact: {0}")]
    Malformed(#[from] serde_json::Error),

    /// An instruction names a register outside the register file.
    #[error("line {line} references register {register} outside the register file")]
    RegisterOutOfRange {
        /// The offending line number.
        line: u64,
        /// The offending register index.
        register: u32,
    },

    /// A bit-test instruction is missing its bit index, or carries one out of range.
    #[error("line {line} has a bad bit index")]
    BadBitIndex {
        /// The offending line number.
        line: u64,
    },
}
