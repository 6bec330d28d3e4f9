//! Protocol-critical parameters for the dissection game.
//!
//! These constants are integral to the dispute protocol i.e., changing them changes the
//! shape of the search tree, the register commitments and the refutation leaf space, so
//! both parties must compile against the same values.

use std::sync::LazyLock;

use bitcoin::{
    hashes::{sha256, Hash},
    opcodes::all::OP_RETURN,
    script::Builder,
    taproot::{LeafVersion, TapLeafHash, TapNodeHash},
};
use num_bigint::BigUint;
use num_traits::Num;
use secp256k1::XOnlyPublicKey;

/// The number of bisection rounds in the dissection game.
///
/// Each round narrows the disputed line range by a factor of [`BISECTION_FANOUT`], so the
/// searchable trace space is `BISECTION_FANOUT^ITERATIONS` lines.
pub const ITERATIONS: usize = 6;

/// The arity of the search tree: every round splits the current range into this many
/// sub-ranges, which requires publishing `BISECTION_FANOUT - 1` interior state roots.
pub const BISECTION_FANOUT: u64 = 10;

/// The total searchable line space, `BISECTION_FANOUT^ITERATIONS`.
///
/// Programs shorter than this are treated as padded with no-ops; replay clamps at the
/// actual program length.
pub const SEARCH_SPAN: u64 = 1_000_000;

/// The number of VM registers covered by every state commitment.
pub const NUM_REGISTERS: usize = 128;

/// The depth of the register commitment tree (`log2(NUM_REGISTERS)`).
pub const REGISTER_TREE_DEPTH: usize = 7;

/// The number of hashes in a register membership proof: one node and one sibling per
/// level plus the root.
pub const REGISTER_PROOF_LEN: usize = 2 * REGISTER_TREE_DEPTH + 1;

/// The number of register membership proofs posted with an argument: the two source
/// registers and the destination register.
pub const PROOFS_PER_ARGUMENT: usize = 3;

/// The number of refutable hash steps per membership proof.
pub const HASH_OPTIONS_PER_PROOF: usize = REGISTER_TREE_DEPTH;

/// The number of HASH-type refutation leaves per disputed line.
pub const HASH_OPTIONS_PER_LINE: u64 = (PROOFS_PER_ARGUMENT * HASH_OPTIONS_PER_PROOF) as u64;

/// The maximum number of field elements committed per transaction output.
pub const FIELDS_PER_OUTPUT: usize = 12;

/// The number of index ranges the refutation leaf space is split into when generation
/// fans out across worker processes.
pub const PARALLEL_CHUNKS: u64 = 16;

/// The number of index ranges used by the single-process generation path.
pub const SEQUENTIAL_CHUNKS: u64 = 100;

/// The default relative-timelock, in blocks, applied to timeout spending conditions.
pub const DEFAULT_TIMEOUT_BLOCKS: u16 = 6;

/// The BN254 scalar field modulus; all VM registers hold values in this field.
pub static FIELD_PRIME: LazyLock<BigUint> = LazyLock::new(|| {
    BigUint::from_str_radix(
        "21888242871839275222246405745257275088548364400416034343698204186575808495617",
        10,
    )
    .expect("valid field modulus")
});

const UNSPENDABLE_PUBLIC_KEY_INPUT: &[u8] = b"Snark Dispute Unspendable";

/// A verifiably unspendable public key, produced by hashing a fixed string to a curve
/// group generator.
///
/// This is related to the technique used in [BIP-341](https://github.com/bitcoin/bips/blob/master/bip-0341.mediawiki#constructing-and-spending-taproot-outputs).
///
/// Note that this is _not_ necessarily a uniformly-sampled curve point!
///
/// But this is fine; we only need a generator with no efficiently-computable discrete
/// logarithm relation against the standard generator.
pub static UNSPENDABLE_INTERNAL_KEY: LazyLock<XOnlyPublicKey> =
    LazyLock::new(|| -> XOnlyPublicKey {
        XOnlyPublicKey::from_slice(sha256::Hash::hash(UNSPENDABLE_PUBLIC_KEY_INPUT).as_byte_array())
            .expect("valid xonly public key")
    });

/// The merkle root committed by a leafless taproot tree.
///
/// Spending through the script path of an output tweaked with this root requires a
/// preimage of the root under the tagged branch hash, so the path is never spendable.
pub static DEAD_ROOT: LazyLock<TapNodeHash> = LazyLock::new(|| {
    let script = Builder::new().push_opcode(OP_RETURN).into_script();
    TapNodeHash::from(TapLeafHash::from_script(&script, LeafVersion::TapScript))
});
