//! The flat index space of every possible refutation.

use snark_dispute_params::{HASH_OPTIONS_PER_LINE, HASH_OPTIONS_PER_PROOF, PROOFS_PER_ARGUMENT};

use crate::RefutationError;

/// What, precisely, is being proven false.
///
/// Every descriptor bijects to a flat `u64` so the whole space can be enumerated into
/// one taproot tree: INSTR leaves occupy `[0, L)` and HASH leaves the remainder, where
/// `L` is the program length. HASH lines range over `[0, L]` inclusive because the
/// destination-register proof of the last instruction commits to the state one past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefutationDescriptor {
    /// The instruction at `line` was executed wrong.
    Instr {
        /// The disputed trace line.
        line: u64,
    },
    /// One hash step of one membership proof is false.
    Hash {
        /// The disputed trace line.
        line: u64,
        /// Which of the three membership proofs (0 = first source, 1 = second source,
        /// 2 = destination).
        which_proof: u8,
        /// Which hash step within the proof.
        which_hash: u8,
    },
}

/// The size of the refutation index space for a program of `program_len` lines.
pub const fn max_refutation_index(program_len: u64) -> u64 {
    program_len + (program_len + 1) * HASH_OPTIONS_PER_LINE
}

impl RefutationDescriptor {
    /// The flat leaf index of this descriptor.
    pub fn to_index(&self, program_len: u64) -> Result<u64, RefutationError> {
        match *self {
            RefutationDescriptor::Instr { line } => {
                if line >= program_len {
                    return Err(RefutationError::BadDescriptor("instruction line"));
                }
                Ok(line)
            }
            RefutationDescriptor::Hash {
                line,
                which_proof,
                which_hash,
            } => {
                if line > program_len {
                    return Err(RefutationError::BadDescriptor("hash line"));
                }
                if which_proof as usize >= PROOFS_PER_ARGUMENT {
                    return Err(RefutationError::BadDescriptor("proof selector"));
                }
                if which_hash as usize >= HASH_OPTIONS_PER_PROOF {
                    return Err(RefutationError::BadDescriptor("hash selector"));
                }
                Ok(program_len
                    + line * HASH_OPTIONS_PER_LINE
                    + u64::from(which_proof) * HASH_OPTIONS_PER_PROOF as u64
                    + u64::from(which_hash))
            }
        }
    }

    /// The descriptor at a flat leaf index.
    pub fn from_index(index: u64, program_len: u64) -> Result<Self, RefutationError> {
        let max = max_refutation_index(program_len);
        if index >= max {
            return Err(RefutationError::IndexOutOfRange { index, max });
        }
        if index < program_len {
            return Ok(RefutationDescriptor::Instr { line: index });
        }
        let rest = index - program_len;
        let line = rest / HASH_OPTIONS_PER_LINE;
        let within = rest % HASH_OPTIONS_PER_LINE;
        Ok(RefutationDescriptor::Hash {
            line,
            which_proof: (within / HASH_OPTIONS_PER_PROOF as u64) as u8,
            which_hash: (within % HASH_OPTIONS_PER_PROOF as u64) as u8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEN: u64 = 37;

    #[test]
    fn indices_biject_over_the_whole_space() {
        let max = max_refutation_index(LEN);
        assert_eq!(max, LEN + (LEN + 1) * 21);
        for index in 0..max {
            let descriptor = RefutationDescriptor::from_index(index, LEN).unwrap();
            assert_eq!(descriptor.to_index(LEN).unwrap(), index);
        }
    }

    #[test]
    fn instr_and_hash_ranges_are_disjoint() {
        for index in 0..max_refutation_index(LEN) {
            let descriptor = RefutationDescriptor::from_index(index, LEN).unwrap();
            match descriptor {
                RefutationDescriptor::Instr { line } => assert!(line < LEN),
                RefutationDescriptor::Hash {
                    line,
                    which_proof,
                    which_hash,
                } => {
                    assert!(index >= LEN);
                    assert!(line <= LEN);
                    assert!(which_proof < 3);
                    assert!(which_hash < 7);
                }
            }
        }
    }

    #[test]
    fn out_of_domain_descriptors_are_rejected() {
        assert!(RefutationDescriptor::Instr { line: LEN }.to_index(LEN).is_err());
        assert!(RefutationDescriptor::Hash {
            line: LEN + 1,
            which_proof: 0,
            which_hash: 0
        }
        .to_index(LEN)
        .is_err());
        assert!(RefutationDescriptor::Hash {
            line: 0,
            which_proof: 3,
            which_hash: 0
        }
        .to_index(LEN)
        .is_err());
        assert!(RefutationDescriptor::Hash {
            line: 0,
            which_proof: 0,
            which_hash: 7
        }
        .to_index(LEN)
        .is_err());
        assert!(RefutationDescriptor::from_index(max_refutation_index(LEN), LEN).is_err());
    }
}
