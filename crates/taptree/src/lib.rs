//! Taproot tree construction over refutation leaf scripts.
//!
//! The dispute locking output commits to one leaf script per possible refutation, which
//! for a full program means millions of leaves. [`SimpleTapTree`] materializes every
//! level and is the reference used in tests and for small trees;
//! [`TapTreeCompressor`] builds the identical tree in a single streaming pass with
//! O(depth) memory, capturing the merkle path of one chosen leaf along the way.
//!
//! Both produce the same shape: levels are reduced pairwise in leaf order and an odd
//! trailing node at any level is paired with itself.

use bitcoin::{
    key::TapTweak,
    taproot::{LeafVersion, TapLeafHash, TapNodeHash},
    Script, ScriptBuf,
};
use secp256k1::SECP256K1;
use snark_dispute_params::{DEAD_ROOT, UNSPENDABLE_INTERNAL_KEY};
use thiserror::Error;

mod compressor;
mod simple;

pub use compressor::{CompressedTapTree, TapTreeCompressor};
pub use simple::SimpleTapTree;

/// Errors from tree construction and proof extraction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TapTreeError {
    /// The requested leaf index is not part of the tree.
    #[error("leaf index {index} out of range for {leaves} leaves")]
    NoSuchLeaf {
        /// The requested index.
        index: u64,
        /// The number of leaves in the tree.
        leaves: u64,
    },

    /// The streaming pass finished without observing every sibling of the saved index.
    /// This indicates a construction bug, not bad input.
    #[error("merkle path for saved index {0} is incomplete")]
    IncompletePath(u64),
}

/// The tagged hash of a leaf script.
pub fn leaf_hash(script: &Script) -> TapLeafHash {
    TapLeafHash::from_script(script, LeafVersion::TapScript)
}

/// Combines two sibling nodes; ordering is handled by the tagged branch hash.
fn branch(a: TapNodeHash, b: TapNodeHash) -> TapNodeHash {
    TapNodeHash::from_node_hashes(a, b)
}

/// The P2TR script pubkey committing to the given merkle root under the fixed
/// unspendable internal key.
pub fn script_pubkey_for_root(root: TapNodeHash) -> ScriptBuf {
    ScriptBuf::new_p2tr(SECP256K1, *UNSPENDABLE_INTERNAL_KEY, Some(root))
}

/// Serializes a script-path control block for a proof captured against `root`.
///
/// Layout per BIP-341: `[0xc0 | parity] || 32-byte x-only internal key || path hashes`,
/// leaf to root.
pub fn control_block_for_proof(root: TapNodeHash, proof: &[TapNodeHash]) -> Vec<u8> {
    let (_, parity) = UNSPENDABLE_INTERNAL_KEY.tap_tweak(SECP256K1, Some(root));
    let mut bytes = Vec::with_capacity(33 + 32 * proof.len());
    bytes.push(0xc0 | parity.to_u8());
    bytes.extend_from_slice(&UNSPENDABLE_INTERNAL_KEY.serialize());
    for node in proof {
        bytes.extend_from_slice(node.as_ref());
    }
    bytes
}

/// The root of an empty tree: a constant whose script path can never be satisfied.
pub fn dead_root() -> TapNodeHash {
    *DEAD_ROOT
}

#[cfg(test)]
mod tests {
    use bitcoin::taproot::ControlBlock;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn dummy_scripts(count: usize) -> Vec<ScriptBuf> {
        let mut rng = StdRng::seed_from_u64(0xdead);
        (0..count)
            .map(|_| {
                let len = rng.gen_range(1..40);
                let mut bytes = vec![0u8; len];
                rng.fill(bytes.as_mut_slice());
                ScriptBuf::from_bytes(bytes)
            })
            .collect()
    }

    #[test]
    fn compressor_matches_reference_for_every_index() {
        for count in [1usize, 2, 3, 5, 8, 13] {
            let scripts = dummy_scripts(count);
            let reference = SimpleTapTree::new(scripts.clone());

            for index in 0..count as u64 {
                let mut compressor = TapTreeCompressor::new(index);
                for script in &scripts {
                    compressor.add_leaf(script);
                }
                let tree = compressor.finalize();

                assert_eq!(tree.root(), reference.root(), "root for {count}/{index}");
                assert_eq!(
                    tree.script_pubkey(),
                    reference.script_pubkey(),
                    "spk for {count}/{index}"
                );
                assert_eq!(
                    tree.control_block().unwrap(),
                    reference.control_block(index).unwrap(),
                    "control block for {count}/{index}"
                );
            }
        }
    }

    #[test]
    fn empty_trees_share_the_dead_root() {
        let reference = SimpleTapTree::new(vec![]);
        let tree = TapTreeCompressor::new(0).finalize();
        assert_eq!(reference.root(), dead_root());
        assert_eq!(tree.root(), dead_root());
        assert_eq!(tree.script_pubkey(), reference.script_pubkey());
    }

    #[test]
    fn control_blocks_satisfy_the_taproot_commitment() {
        let scripts = dummy_scripts(13);
        let reference = SimpleTapTree::new(scripts.clone());
        let (output_key, _) =
            UNSPENDABLE_INTERNAL_KEY.tap_tweak(SECP256K1, Some(reference.root()));

        for (index, script) in scripts.iter().enumerate() {
            let bytes = reference.control_block(index as u64).unwrap();
            let control_block = ControlBlock::decode(&bytes).expect("serialized control block");
            assert!(
                control_block.verify_taproot_commitment(SECP256K1, output_key.into(), script),
                "leaf {index} does not verify"
            );
        }
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let scripts = dummy_scripts(3);
        let reference = SimpleTapTree::new(scripts.clone());
        assert_eq!(
            reference.control_block(3),
            Err(TapTreeError::NoSuchLeaf {
                index: 3,
                leaves: 3
            })
        );

        let mut compressor = TapTreeCompressor::new(7);
        for script in &scripts {
            compressor.add_leaf(script);
        }
        assert!(compressor.finalize().control_block().is_err());
    }
}
