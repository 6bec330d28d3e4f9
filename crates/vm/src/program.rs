//! The saved-program artifact.

use std::path::Path;

use serde::{Deserialize, Serialize};
use snark_dispute_params::NUM_REGISTERS;

use crate::VmError;

/// The instruction set of the arithmetic VM.
///
/// All arithmetic is over the scalar field; logical operations treat any non-zero
/// register as true and produce 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    /// `target = (param1 + param2) mod p`
    Addmod,
    /// `target = (param1 - param2) mod p`
    Submod,
    /// `target = (param1 * param2) mod p`
    Mulmod,
    /// `target = param1 * param2^-1 mod p` (0 when `param2` is 0)
    Divmod,
    /// `target = param2` when the given bit of `param1` is set, else 0
    Andbit,
    /// `target = param2` when the given bit of `param1` is clear, else 0
    Andnotbit,
    /// `target = param1`
    Mov,
    /// `target = (param1 == param2)`
    Equal,
    /// `target = (param1 != 0 || param2 != 0)`
    Or,
    /// `target = (param1 != 0 && param2 != 0)`
    And,
    /// `target = (param1 == 0)`
    Not,
    /// Fails the program unless `param1 == 1`; registers are untouched.
    AssertOne,
    /// Fails the program unless `param1 == 0`; registers are untouched.
    AssertZero,
}

impl Opcode {
    /// Whether the second operand is ignored (and duplicated from the first when the
    /// instruction's operands are published).
    pub const fn is_unary(&self) -> bool {
        matches!(
            self,
            Opcode::Mov | Opcode::Not | Opcode::AssertOne | Opcode::AssertZero
        )
    }

    /// Whether the instruction tests a single bit of its first operand.
    pub const fn uses_bit(&self) -> bool {
        matches!(self, Opcode::Andbit | Opcode::Andnotbit)
    }

    /// Whether the instruction's arithmetic check needs the published quotient.
    pub const fn uses_quotient(&self) -> bool {
        matches!(self, Opcode::Mulmod | Opcode::Divmod)
    }

    /// Whether the instruction can fail the whole program.
    pub const fn is_assertion(&self) -> bool {
        matches!(self, Opcode::AssertOne | Opcode::AssertZero)
    }
}

/// One line of a saved program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// The operation.
    pub op: Opcode,
    /// Destination register.
    pub target: u32,
    /// First source register.
    pub param1: u32,
    /// Second source register (ignored by unary operations).
    pub param2: u32,
    /// Bit index for bit-test operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit: Option<u64>,
}

/// The no-op used for trace positions past the end of the program.
///
/// Both parties derive instructions for padded lines the same way, so a dispute pushed
/// past the program end still resolves deterministically.
pub const NOP: Instruction = Instruction {
    op: Opcode::Mov,
    target: 0,
    param1: 0,
    param2: 0,
    bit: None,
};

/// An immutable, externally-compiled program artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedProgram {
    /// The instruction sequence.
    pub lines: Vec<Instruction>,
}

impl SavedProgram {
    /// Wraps an instruction sequence, validating register and bit indices.
    pub fn new(lines: Vec<Instruction>) -> Result<Self, VmError> {
        let program = Self { lines };
        program.validate()?;
        Ok(program)
    }

    /// Loads and validates an artifact from disk.
    pub fn from_file(path: &Path) -> Result<Self, VmError> {
        let bytes = std::fs::read(path)?;
        let program: Self = serde_json::from_slice(&bytes)?;
        program.validate()?;
        Ok(program)
    }

    /// Writes the artifact to disk.
    pub fn to_file(&self, path: &Path) -> Result<(), VmError> {
        let bytes = serde_json::to_vec(self).map_err(VmError::Malformed)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// The number of lines.
    pub fn len(&self) -> u64 {
        self.lines.len() as u64
    }

    /// Whether the program has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The instruction at `line`, or the shared no-op for padded positions.
    pub fn instruction_at(&self, line: u64) -> Instruction {
        usize::try_from(line)
            .ok()
            .and_then(|idx| self.lines.get(idx).copied())
            .unwrap_or(NOP)
    }

    fn validate(&self) -> Result<(), VmError> {
        for (idx, instr) in self.lines.iter().enumerate() {
            let line = idx as u64;
            for register in [instr.target, instr.param1, instr.param2] {
                if register as usize >= NUM_REGISTERS {
                    return Err(VmError::RegisterOutOfRange { line, register });
                }
            }
            match (instr.op.uses_bit(), instr.bit) {
                (true, Some(bit)) if bit < 256 => {}
                (false, None) => {}
                _ => return Err(VmError::BadBitIndex { line }),
            }
        }
        Ok(())
    }
}
