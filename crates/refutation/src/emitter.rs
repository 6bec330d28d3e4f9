//! The boundary to the external script emitter.
//!
//! The locking scripts that actually verify a refutation on-chain are produced by an
//! external compiler. The generator only needs two things from it: that scripts for
//! the same instruction shape differ only in their line-dependent bytes, and that the
//! result is deterministic. Templates capture exactly that: one script per shape with
//! the offsets of the line bytes, instantiated per line with a fixed-width patch.

use bitcoin::{
    opcodes::all::{OP_2DROP, OP_PUSHNUM_1},
    ScriptBuf,
};
use snark_dispute_vm::{Opcode, SavedProgram};

use crate::RefutationDescriptor;

/// A shape-invariant script with placeholder line bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTemplate {
    /// The serialized script with placeholder bytes at the line offsets.
    pub bytes: Vec<u8>,
    /// Offsets of 4-byte little-endian line slots.
    pub line_offsets: Vec<usize>,
}

impl ScriptTemplate {
    /// Instantiates the template for one trace line.
    pub fn instantiate(&self, line: u64) -> ScriptBuf {
        let mut bytes = self.bytes.clone();
        let patch = (line as u32).to_le_bytes();
        for &offset in &self.line_offsets {
            bytes[offset..offset + 4].copy_from_slice(&patch);
        }
        ScriptBuf::from_bytes(bytes)
    }
}

/// The equivalence class a refutation leaf's script belongs to.
///
/// Scripts for two descriptors with the same shape are byte-identical except for their
/// line bytes, which is what makes memoized generation over millions of leaves cheap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptShape {
    /// An instruction-check leaf for one opcode shape.
    Instr {
        /// The opcode.
        op: Opcode,
        /// The tested bit for bit-test opcodes.
        bit: Option<u64>,
    },
    /// A hash-check leaf for one proof/step coordinate.
    HashCheck {
        /// Which membership proof.
        which_proof: u8,
        /// Which hash step.
        which_hash: u8,
    },
}

impl ScriptShape {
    /// The shape of the leaf for a descriptor, under a given program.
    pub fn of(descriptor: &RefutationDescriptor, program: &SavedProgram) -> Self {
        match *descriptor {
            RefutationDescriptor::Instr { line } => {
                let instr = program.instruction_at(line);
                ScriptShape::Instr {
                    op: instr.op,
                    bit: instr.bit,
                }
            }
            RefutationDescriptor::Hash {
                which_proof,
                which_hash,
                ..
            } => ScriptShape::HashCheck {
                which_proof,
                which_hash,
            },
        }
    }
}

/// Produces the shape-invariant template for every leaf script.
///
/// Implementations must be deterministic: both parties regenerate the whole tree
/// independently and must arrive at the same root.
pub trait RefutationScriptEmitter: Send + Sync {
    /// The template for one script shape.
    fn template(&self, shape: &ScriptShape) -> ScriptTemplate;
}

/// A deterministic stand-in emitter.
///
/// Each template pushes the line slot and a tag identifying the shape, which is enough
/// to give every leaf a distinct, reproducible script. The production emitter plugs in
/// through [`RefutationScriptEmitter`] without touching the generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEmitter;

impl RefutationScriptEmitter for BuiltinEmitter {
    fn template(&self, shape: &ScriptShape) -> ScriptTemplate {
        let tag: Vec<u8> = match *shape {
            ScriptShape::Instr { op, bit } => {
                let bit = bit.unwrap_or(0) as u16;
                let mut tag = vec![0x01, op as u8];
                tag.extend_from_slice(&bit.to_le_bytes());
                tag
            }
            ScriptShape::HashCheck {
                which_proof,
                which_hash,
            } => vec![0x02, which_proof, which_hash],
        };

        // OP_PUSHBYTES_4 <line> OP_PUSHBYTES_n <tag> OP_2DROP OP_PUSHNUM_1
        let mut bytes = vec![0x04, 0, 0, 0, 0];
        bytes.push(tag.len() as u8);
        bytes.extend_from_slice(&tag);
        bytes.push(OP_2DROP.to_u8());
        bytes.push(OP_PUSHNUM_1.to_u8());
        ScriptTemplate {
            bytes,
            line_offsets: vec![1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiation_only_touches_the_line_bytes() {
        let emitter = BuiltinEmitter;
        let template = emitter.template(&ScriptShape::HashCheck {
            which_proof: 1,
            which_hash: 4,
        });
        let a = template.instantiate(17);
        let b = template.instantiate(90_000);
        assert_ne!(a, b);
        assert_eq!(a.len(), b.len());
        assert_eq!(&a.as_bytes()[5..], &b.as_bytes()[5..]);
        assert_eq!(&a.as_bytes()[1..5], &17u32.to_le_bytes()[..]);
    }

    #[test]
    fn distinct_shapes_get_distinct_templates() {
        let emitter = BuiltinEmitter;
        let instr = emitter.template(&ScriptShape::Instr {
            op: Opcode::Addmod,
            bit: None,
        });
        let hash = emitter.template(&ScriptShape::HashCheck {
            which_proof: 0,
            which_hash: 0,
        });
        assert_ne!(instr, hash);
    }
}
