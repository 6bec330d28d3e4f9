//! Streaming taproot tree builder with online proof capture.

use bitcoin::{
    taproot::{TapLeafHash, TapNodeHash},
    Script, ScriptBuf,
};

use crate::{branch, control_block_for_proof, dead_root, leaf_hash, script_pubkey_for_root, TapTreeError};

/// Builds the same tree as [`crate::SimpleTapTree`] without holding the leaves.
///
/// One pending-node slot is kept per level, like the digits of a binary counter: a new
/// leaf lands at level 0, and whenever a level holds two nodes they are combined and
/// carried upward. Memory is O(depth) regardless of the leaf count.
///
/// The index to save must be known up front. Every node produced during the pass knows
/// its `(level, position)`; whenever that coordinate lies on the sibling path of the
/// saved index the node is captured, so the single pass also yields the leaf's merkle
/// path. A single instance is strictly sequential; never feed one from two threads.
#[derive(Debug)]
pub struct TapTreeCompressor {
    index_to_save: u64,
    /// Pending left node per level.
    slots: Vec<Option<TapNodeHash>>,
    /// Number of nodes produced so far per level.
    counts: Vec<u64>,
    /// Captured sibling per level of the saved index's path.
    path: Vec<Option<TapNodeHash>>,
    leaves: u64,
}

/// The finished tree: root, leaf count and the captured merkle path.
#[derive(Debug, Clone)]
pub struct CompressedTapTree {
    index_to_save: u64,
    root: TapNodeHash,
    leaves: u64,
    path: Vec<TapNodeHash>,
    complete: bool,
}

impl TapTreeCompressor {
    /// Creates a compressor that will capture the merkle path of `index_to_save`.
    pub fn new(index_to_save: u64) -> Self {
        Self {
            index_to_save,
            slots: Vec::new(),
            counts: Vec::new(),
            path: Vec::new(),
            leaves: 0,
        }
    }

    /// Folds one leaf script into the tree.
    pub fn add_leaf(&mut self, script: &Script) {
        self.add_leaf_hash(leaf_hash(script));
    }

    /// Folds one precomputed leaf hash into the tree.
    pub fn add_leaf_hash(&mut self, leaf: TapLeafHash) {
        self.leaves += 1;
        self.place(0, TapNodeHash::from(leaf));
    }

    /// The number of leaves folded in so far.
    pub fn leaves(&self) -> u64 {
        self.leaves
    }

    fn ensure_level(&mut self, level: usize) {
        while self.slots.len() <= level {
            self.slots.push(None);
            self.counts.push(0);
            self.path.push(None);
        }
    }

    fn capture_sibling(&mut self, level: usize, position: u64, node: TapNodeHash) {
        if (self.index_to_save >> level) ^ 1 == position {
            self.path[level] = Some(node);
        }
    }

    /// Places a node produced at `level`, combining and carrying when the slot fills.
    fn place(&mut self, level: usize, node: TapNodeHash) {
        self.ensure_level(level);
        let position = self.counts[level];
        self.counts[level] += 1;
        self.capture_sibling(level, position, node);
        match self.slots[level].take() {
            None => self.slots[level] = Some(node),
            Some(left) => self.place(level + 1, branch(left, node)),
        }
    }

    /// Drains the pending slots into the root.
    ///
    /// An odd trailing node at any level pairs with itself before carrying upward,
    /// which matches the reference tree's shape for non-power-of-two leaf counts; when
    /// the saved index's path runs through such a node, the node itself is its own
    /// sibling and is captured as the path entry.
    pub fn finalize(mut self) -> CompressedTapTree {
        if self.leaves == 0 {
            return CompressedTapTree {
                index_to_save: self.index_to_save,
                root: dead_root(),
                leaves: 0,
                path: Vec::new(),
                complete: false,
            };
        }

        let mut carry: Option<TapNodeHash> = None;
        let mut root_level = 0;
        for level in 0..self.slots.len() {
            let higher_pending = self.slots[level + 1..].iter().any(Option::is_some);
            carry = match (self.slots[level].take(), carry) {
                (Some(left), Some(right)) => {
                    let position = self.counts[level];
                    self.counts[level] += 1;
                    self.capture_sibling(level, position, right);
                    root_level = level + 1;
                    Some(branch(left, right))
                }
                (Some(lone), None) if higher_pending => {
                    let position = self.counts[level] - 1;
                    if self.index_to_save >> level == position {
                        self.path[level] = Some(lone);
                    }
                    root_level = level + 1;
                    Some(branch(lone, lone))
                }
                (Some(root), None) => {
                    root_level = level;
                    Some(root)
                }
                (None, Some(lone)) if higher_pending => {
                    let position = self.counts[level];
                    self.counts[level] += 1;
                    if self.index_to_save >> level == position {
                        self.path[level] = Some(lone);
                    }
                    root_level = level + 1;
                    Some(branch(lone, lone))
                }
                (None, carried) => carried,
            };
        }

        let root = carry.expect("at least one leaf was placed");
        let captured: Vec<TapNodeHash> = self.path[..root_level].iter().flatten().copied().collect();
        let complete = self.index_to_save < self.leaves && captured.len() == root_level;
        CompressedTapTree {
            index_to_save: self.index_to_save,
            root,
            leaves: self.leaves,
            path: captured,
            complete,
        }
    }
}

impl CompressedTapTree {
    /// The merkle root, or the dead root when no leaves were added.
    pub fn root(&self) -> TapNodeHash {
        self.root
    }

    /// The number of leaves in the tree.
    pub fn leaves(&self) -> u64 {
        self.leaves
    }

    /// The P2TR script pubkey committing to this tree.
    pub fn script_pubkey(&self) -> ScriptBuf {
        script_pubkey_for_root(self.root)
    }

    /// The captured merkle path of the saved index, leaf level first.
    pub fn proof(&self) -> Result<&[TapNodeHash], TapTreeError> {
        if self.index_to_save >= self.leaves {
            return Err(TapTreeError::NoSuchLeaf {
                index: self.index_to_save,
                leaves: self.leaves,
            });
        }
        if !self.complete {
            return Err(TapTreeError::IncompletePath(self.index_to_save));
        }
        Ok(&self.path)
    }

    /// The serialized control block authorizing a script-path spend of the saved leaf.
    pub fn control_block(&self) -> Result<Vec<u8>, TapTreeError> {
        Ok(control_block_for_proof(self.root, self.proof()?))
    }
}
