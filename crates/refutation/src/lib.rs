//! The argument/refutation layer of the dispute game.
//!
//! Once six narrowing rounds pin the disagreement to a single trace line, the prover
//! opens that line: the instruction index (re-derivable from the already-published
//! selection digits), its operands, and membership proofs binding the operands to the
//! two state roots both parties are already committed to. Exactly one of those claims
//! must be false whenever the opening is dishonest, and every possible falsehood has a
//! dedicated taproot leaf prepared in advance; the [`DoomsdayGenerator`] enumerates
//! them all, and [`refute`] decides which one applies and proves it.

use thiserror::Error;

mod argument;
mod descriptor;
mod emitter;
mod generator;
mod messages;
mod refute;

pub use argument::{field_to_hash, hash_to_field, make_argument, ArgumentData, ARGUMENT_OUTPUTS};
pub use descriptor::{max_refutation_index, RefutationDescriptor};
pub use emitter::{BuiltinEmitter, RefutationScriptEmitter, ScriptShape, ScriptTemplate};
pub use generator::{DoomsdayGenerator, DoomsdayTree, RequestedLeaf, WorkerSpec};
pub use messages::{answer_chunk, ChunkRequest, ChunkResponse};
pub use refute::{derive_refutation, refute, Refutation};

use snark_dispute_dissection::DissectionError;
use snark_dispute_taptree::TapTreeError;

/// Failures while building or answering an argument.
#[derive(Debug, Error)]
pub enum RefutationError {
    /// A refutation index is outside the leaf space.
    #[error("refutation index {index} outside leaf space of {max}")]
    IndexOutOfRange {
        /// The offending index.
        index: u64,
        /// The size of the leaf space.
        max: u64,
    },

    /// A descriptor's fields are outside their domains.
    #[error("refutation descriptor out of range: {0}")]
    BadDescriptor(&'static str),

    /// The posted argument data does not have the agreed shape.
    #[error("malformed argument data: {0}")]
    MalformedArgument(&'static str),

    /// The index re-derived from the selection path disagrees with the posted index.
    ///
    /// The commitment scheme makes the posted index a deterministic function of the
    /// published digits, so this can only happen when the two sides derive from
    /// different inputs. Fatal.
    #[error("derived line {derived} but the argument posts line {posted}")]
    IndexDerivationMismatch {
        /// The line derived from the selection path.
        derived: u64,
        /// The line posted in the argument.
        posted: u64,
    },

    /// The instruction checks out and all three membership proofs verify.
    ///
    /// Refutation is only ever invoked when local replay disagrees with the published
    /// trace, so one of the four claims must be false; reaching this state means the
    /// two sides derived different commitments from the same inputs. Fatal.
    #[error("argument survived every check although replay disagrees")]
    NothingToRefute,

    /// A bisection-layer failure.
    #[error(transparent)]
    Dissection(#[from] DissectionError),

    /// A generation failure while fetching the refutation leaf.
    #[error(transparent)]
    Generation(#[from] DoomsdayError),
}

/// Failures of refutation-tree generation.
///
/// Any of these aborts the whole generation; a partial tree is never surfaced because
/// both parties must arrive at the identical root.
#[derive(Debug, Error)]
pub enum DoomsdayError {
    /// A worker process failed to start, died, or answered garbage.
    #[error("worker for chunk {chunk} failed: {message}")]
    Worker {
        /// The chunk whose worker failed.
        chunk: usize,
        /// What went wrong.
        message: String,
    },

    /// Worker process I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A worker message could not be encoded or decoded.
    #[error("worker message codec: {0}")]
    Codec(#[from] serde_json::Error),

    /// The folded leaf count disagrees with the refutation index space.
    #[error("generated {actual} leaves but the index space holds {expected}")]
    LeafCount {
        /// The index-space size.
        expected: u64,
        /// The number of leaves folded.
        actual: u64,
    },

    /// The requested leaf was not produced by any chunk.
    #[error("requested leaf {0} missing from every chunk")]
    RequestedMissing(u64),

    /// A tree-construction failure.
    #[error(transparent)]
    TapTree(#[from] TapTreeError),

    /// The worker could not load the program artifact.
    #[error("worker program artifact: {0}")]
    Program(#[from] snark_dispute_vm::VmError),
}
