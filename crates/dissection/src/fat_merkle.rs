//! Merkle commitments over the 128-register file.

use std::sync::LazyLock;

use num_bigint::BigUint;
use snark_dispute_params::{NUM_REGISTERS, REGISTER_PROOF_LEN, REGISTER_TREE_DEPTH};

use crate::DissectionError;

/// A node of the register commitment tree.
pub type RegHash = [u8; 32];

/// Filler node paired with the trailing element of an odd layer.
static PAD: LazyLock<RegHash> =
    LazyLock::new(|| *blake3::hash(b"register-tree-pad").as_bytes());

fn register_bytes(value: &BigUint) -> [u8; 32] {
    let raw = value.to_bytes_be();
    let mut bytes = [0u8; 32];
    bytes[32 - raw.len()..].copy_from_slice(&raw);
    bytes
}

fn leaf_hash(value: &BigUint) -> RegHash {
    *blake3::hash(&register_bytes(value)).as_bytes()
}

fn node_hash(left: &RegHash, right: &RegHash) -> RegHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

fn layer_up(layer: &[RegHash]) -> Vec<RegHash> {
    layer
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => node_hash(left, right),
            [lone] => node_hash(lone, &PAD),
            _ => unreachable!("chunks of two"),
        })
        .collect()
}

fn layers(regs: &[BigUint]) -> Result<Vec<Vec<RegHash>>, DissectionError> {
    if regs.len() != NUM_REGISTERS {
        return Err(DissectionError::WrongRegisterCount {
            expected: NUM_REGISTERS,
            actual: regs.len(),
        });
    }
    let mut layers = vec![regs.iter().map(leaf_hash).collect::<Vec<_>>()];
    while layers.last().expect("leaf layer").len() > 1 {
        layers.push(layer_up(layers.last().expect("previous layer")));
    }
    Ok(layers)
}

/// The commitment root of a full register snapshot.
pub fn register_root(regs: &[BigUint]) -> Result<RegHash, DissectionError> {
    Ok(layers(regs)?.last().expect("root layer")[0])
}

/// A membership proof for one register in a committed snapshot.
///
/// The proof interleaves the path node and its sibling at every level and ends with the
/// root: `[n0, s0, n1, s1, …, n6, s6, root]`, 15 hashes in all, where `n0` is the leaf
/// hash and each `n(i+1)` is claimed to combine `ni` with `si`. Verification re-derives
/// every combination, which is exactly what makes a dishonest proof refutable: the
/// first pair that fails to combine is a single provably-false hash statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatMerkleProof {
    hashes: Vec<RegHash>,
    leaf_index: usize,
}

impl FatMerkleProof {
    /// Builds the proof for `leaf_index` from a full register snapshot.
    pub fn from_regs(regs: &[BigUint], leaf_index: usize) -> Result<Self, DissectionError> {
        if leaf_index >= NUM_REGISTERS {
            return Err(DissectionError::RegisterOutOfRange(leaf_index));
        }
        let layers = layers(regs)?;
        let mut hashes = Vec::with_capacity(REGISTER_PROOF_LEN);
        for (level, layer) in layers[..REGISTER_TREE_DEPTH].iter().enumerate() {
            let position = leaf_index >> level;
            hashes.push(layer[position]);
            hashes.push(layer[position ^ 1]);
        }
        hashes.push(layers[REGISTER_TREE_DEPTH][0]);
        Ok(Self { hashes, leaf_index })
    }

    /// Rebuilds a proof from posted witness data: the 13 middle hashes published
    /// on-chain, the revealed register value, and the root both parties already hold.
    pub fn from_argument(
        middle: &[RegHash],
        leaf: &BigUint,
        root: RegHash,
        leaf_index: usize,
    ) -> Result<Self, DissectionError> {
        if leaf_index >= NUM_REGISTERS {
            return Err(DissectionError::RegisterOutOfRange(leaf_index));
        }
        if middle.len() != REGISTER_PROOF_LEN - 2 {
            return Err(DissectionError::WrongProofLength {
                expected: REGISTER_PROOF_LEN - 2,
                actual: middle.len(),
            });
        }
        let mut hashes = Vec::with_capacity(REGISTER_PROOF_LEN);
        hashes.push(leaf_hash(leaf));
        hashes.extend_from_slice(middle);
        hashes.push(root);
        Ok(Self { hashes, leaf_index })
    }

    /// The index of the committed register.
    pub fn leaf_index(&self) -> usize {
        self.leaf_index
    }

    /// All 15 hashes, leaf first.
    pub fn hashes(&self) -> &[RegHash] {
        &self.hashes
    }

    /// The 13 hashes between leaf and root, as they are posted on-chain.
    pub fn middle(&self) -> &[RegHash] {
        &self.hashes[1..REGISTER_PROOF_LEN - 1]
    }

    /// The committed root.
    pub fn root(&self) -> RegHash {
        self.hashes[REGISTER_PROOF_LEN - 1]
    }

    /// The first hash step that fails to recombine, if any.
    ///
    /// `None` means the proof is consistent. `Some(i)` names the level whose claimed
    /// parent does not equal the combination of its children; that index is the
    /// refutable hash option.
    pub fn index_to_refute(&self) -> Option<usize> {
        (0..REGISTER_TREE_DEPTH).find(|&level| {
            let node = &self.hashes[2 * level];
            let sibling = &self.hashes[2 * level + 1];
            let claimed_parent = &self.hashes[2 * level + 2];
            let parent = if (self.leaf_index >> level) & 1 == 0 {
                node_hash(node, sibling)
            } else {
                node_hash(sibling, node)
            };
            &parent != claimed_parent
        })
    }

    /// Whether every hash step recombines.
    pub fn verify(&self) -> bool {
        self.index_to_refute().is_none()
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn snapshot(seed: u64) -> Vec<BigUint> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..NUM_REGISTERS)
            .map(|_| {
                let mut bytes = [0u8; 31];
                rng.fill(&mut bytes[..]);
                BigUint::from_bytes_be(&bytes)
            })
            .collect()
    }

    #[test]
    fn honest_proofs_verify_for_every_register() {
        let regs = snapshot(7);
        let root = register_root(&regs).unwrap();
        for index in [0usize, 1, 63, 64, 126, 127] {
            let proof = FatMerkleProof::from_regs(&regs, index).unwrap();
            assert_eq!(proof.hashes().len(), REGISTER_PROOF_LEN);
            assert_eq!(proof.root(), root);
            assert!(proof.verify());
            assert_eq!(proof.index_to_refute(), None);
        }
    }

    #[test]
    fn posted_witness_rebuilds_the_same_proof() {
        let regs = snapshot(11);
        let root = register_root(&regs).unwrap();
        let index = 93;
        let built = FatMerkleProof::from_regs(&regs, index).unwrap();
        let rebuilt =
            FatMerkleProof::from_argument(built.middle(), &regs[index], root, index).unwrap();
        assert_eq!(built, rebuilt);
        assert!(rebuilt.verify());
    }

    #[test]
    fn corruption_is_caught_at_or_before_the_level() {
        let regs = snapshot(13);
        for corrupt_at in 1..REGISTER_PROOF_LEN - 1 {
            let mut proof = FatMerkleProof::from_regs(&regs, 45).unwrap();
            proof.hashes[corrupt_at][0] ^= 0xff;
            let refuted = proof
                .index_to_refute()
                .expect("corrupt proof must be refutable");
            // Entries 2l, 2l+1 feed the check at level l; entry 2l+2 is first checked
            // at level l and checked again as a child at level l+1.
            assert!(refuted <= corrupt_at / 2, "entry {corrupt_at}");
            assert!(!proof.verify());
        }
    }

    #[test]
    fn wrong_leaf_value_is_refuted_at_the_first_level() {
        let regs = snapshot(17);
        let root = register_root(&regs).unwrap();
        let index = 20;
        let built = FatMerkleProof::from_regs(&regs, index).unwrap();
        let lying_leaf = &regs[index] + 1u8;
        let rebuilt =
            FatMerkleProof::from_argument(built.middle(), &lying_leaf, root, index).unwrap();
        assert_eq!(rebuilt.index_to_refute(), Some(0));
    }

    #[test]
    fn arity_errors_are_structural() {
        let regs = snapshot(19);
        assert!(matches!(
            FatMerkleProof::from_regs(&regs[..100], 0),
            Err(DissectionError::WrongRegisterCount { .. })
        ));
        assert!(matches!(
            FatMerkleProof::from_regs(&regs, 128),
            Err(DissectionError::RegisterOutOfRange(128))
        ));
        assert!(matches!(
            FatMerkleProof::from_argument(&[[0u8; 32]; 5], &BigUint::from(1u8), [0u8; 32], 0),
            Err(DissectionError::WrongProofLength { .. })
        ));
    }
}
