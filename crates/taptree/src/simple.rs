//! Reference taproot tree that materializes every level.

use bitcoin::{taproot::TapNodeHash, ScriptBuf};

use crate::{branch, control_block_for_proof, dead_root, leaf_hash, script_pubkey_for_root, TapTreeError};

/// A fully materialized taproot tree.
///
/// Holds every leaf script and recomputes levels on demand. Memory grows with the leaf
/// count, so this is only suitable for small trees and as the equivalence oracle for
/// [`crate::TapTreeCompressor`] in tests.
#[derive(Debug, Clone)]
pub struct SimpleTapTree {
    leaves: Vec<ScriptBuf>,
}

impl SimpleTapTree {
    /// Creates a tree over the given leaf scripts, in order.
    pub fn new(leaves: Vec<ScriptBuf>) -> Self {
        Self { leaves }
    }

    /// The number of leaves.
    pub fn len(&self) -> u64 {
        self.leaves.len() as u64
    }

    /// Whether the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    fn levels(&self) -> Vec<Vec<TapNodeHash>> {
        let mut level: Vec<TapNodeHash> = self
            .leaves
            .iter()
            .map(|script| TapNodeHash::from(leaf_hash(script)))
            .collect();
        let mut levels = vec![level.clone()];
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => branch(*left, *right),
                    // an odd trailing node pairs with itself
                    [lone] => branch(*lone, *lone),
                    _ => unreachable!("chunks of two"),
                })
                .collect();
            levels.push(level.clone());
        }
        levels
    }

    /// The merkle root, or the dead root for an empty tree.
    pub fn root(&self) -> TapNodeHash {
        if self.leaves.is_empty() {
            return dead_root();
        }
        self.levels().last().expect("at least the leaf level")[0]
    }

    /// The P2TR script pubkey committing to this tree.
    pub fn script_pubkey(&self) -> ScriptBuf {
        script_pubkey_for_root(self.root())
    }

    /// The merkle path for one leaf, leaf level first.
    pub fn proof(&self, index: u64) -> Result<Vec<TapNodeHash>, TapTreeError> {
        if index >= self.len() {
            return Err(TapTreeError::NoSuchLeaf {
                index,
                leaves: self.len(),
            });
        }
        let levels = self.levels();
        let mut path = Vec::with_capacity(levels.len() - 1);
        let mut position = index as usize;
        for level in &levels[..levels.len() - 1] {
            let sibling = position ^ 1;
            // a self-paired node is its own sibling
            path.push(level[usize::min(sibling, level.len() - 1)]);
            position >>= 1;
        }
        Ok(path)
    }

    /// The serialized control block authorizing a script-path spend of one leaf.
    pub fn control_block(&self, index: u64) -> Result<Vec<u8>, TapTreeError> {
        Ok(control_block_for_proof(self.root(), &self.proof(index)?))
    }
}
