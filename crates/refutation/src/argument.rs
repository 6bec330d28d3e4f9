//! Building and reading the argument payload.

use num_bigint::BigUint;
use snark_dispute_dissection::{Decasector, FatMerkleProof, RegHash, SelectionPath};
use snark_dispute_params::{
    FIELDS_PER_OUTPUT, ITERATIONS, PROOFS_PER_ARGUMENT, REGISTER_PROOF_LEN,
};
use snark_dispute_vm::quotient;

use crate::RefutationError;

/// The number of middle hashes each membership proof posts (leaf and root are derived
/// on the reading side).
const MIDDLE_HASHES: usize = REGISTER_PROOF_LEN - 2;

/// The number of outputs a membership proof occupies once chunked.
const OUTPUTS_PER_PROOF: usize = MIDDLE_HASHES.div_ceil(FIELDS_PER_OUTPUT);

/// The number of transaction outputs an argument occupies.
pub const ARGUMENT_OUTPUTS: usize = 2 + PROOFS_PER_ARGUMENT * OUTPUTS_PER_PROOF;

/// The values an argument commits on-chain, grouped by transaction output.
///
/// Output 0 carries the six selection digits followed by the derived line index; the
/// digits repeat commitments already published in earlier rounds, which is what lets
/// the chain re-derive the index from keys it has already seen. Output 1 carries the
/// operands `a, b, c, d`. The remaining outputs carry the three membership proofs'
/// middle hashes, at most [`FIELDS_PER_OUTPUT`] values each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentData {
    /// The committed values, one vector per transaction output.
    pub outputs: Vec<Vec<BigUint>>,
}

/// A commitment hash as the field element it is posted as.
pub fn hash_to_field(hash: &RegHash) -> BigUint {
    BigUint::from_bytes_be(hash)
}

/// A posted field element back into a commitment hash.
pub fn field_to_hash(value: &BigUint) -> Result<RegHash, RefutationError> {
    let raw = value.to_bytes_be();
    if raw.len() > 32 {
        return Err(RefutationError::MalformedArgument("hash wider than 32 bytes"));
    }
    let mut hash = [0u8; 32];
    hash[32 - raw.len()..].copy_from_slice(&raw);
    Ok(hash)
}

fn to_u64(value: &BigUint, what: &'static str) -> Result<u64, RefutationError> {
    u64::try_from(value).map_err(|_| RefutationError::MalformedArgument(what))
}

impl ArgumentData {
    fn output(&self, index: usize, len: usize) -> Result<&[BigUint], RefutationError> {
        let output = self
            .outputs
            .get(index)
            .ok_or(RefutationError::MalformedArgument("missing output"))?;
        if output.len() != len {
            return Err(RefutationError::MalformedArgument("output arity"));
        }
        Ok(output)
    }

    /// The six selection digits republished with the argument.
    pub fn selection_path(&self) -> Result<SelectionPath, RefutationError> {
        let head = self.output(0, ITERATIONS + 1)?;
        let digits = head[..ITERATIONS]
            .iter()
            .map(|d| u8::try_from(d).map_err(|_| RefutationError::MalformedArgument("digit")))
            .collect::<Result<Vec<_>, _>>()?;
        SelectionPath::new(digits).map_err(RefutationError::from)
    }

    /// The line index the argument claims to open.
    pub fn posted_index(&self) -> Result<u64, RefutationError> {
        let head = self.output(0, ITERATIONS + 1)?;
        to_u64(&head[ITERATIONS], "line index")
    }

    /// The operands `(a, b, c, d)`.
    pub fn operands(&self) -> Result<(BigUint, BigUint, BigUint, BigUint), RefutationError> {
        let ops = self.output(1, 4)?;
        Ok((ops[0].clone(), ops[1].clone(), ops[2].clone(), ops[3].clone()))
    }

    /// The 13 middle hashes of one membership proof, reassembled from its chunks.
    pub fn merkle_middle(&self, which_proof: usize) -> Result<Vec<RegHash>, RefutationError> {
        if which_proof >= PROOFS_PER_ARGUMENT {
            return Err(RefutationError::MalformedArgument("proof selector"));
        }
        let mut fields = Vec::with_capacity(MIDDLE_HASHES);
        let first = 2 + which_proof * OUTPUTS_PER_PROOF;
        for (chunk, output_index) in (first..first + OUTPUTS_PER_PROOF).enumerate() {
            let remaining = MIDDLE_HASHES - chunk * FIELDS_PER_OUTPUT;
            let len = remaining.min(FIELDS_PER_OUTPUT);
            fields.extend_from_slice(self.output(output_index, len)?);
        }
        fields.iter().map(field_to_hash).collect()
    }
}

/// Builds the argument for the line a complete selection path narrows to.
///
/// The second source proof duplicates the first for unary instructions, so the output
/// shape is identical for every opcode.
pub fn make_argument(
    sector: &Decasector,
    path: &SelectionPath,
) -> Result<ArgumentData, RefutationError> {
    let line = path.line()?;
    let instr = sector.program().instruction_at(line);
    let before = sector.registers_at_line(line);
    let after = sector.registers_at_line(line + 1);

    let param2 = if instr.op.is_unary() {
        instr.param1
    } else {
        instr.param2
    };
    let a = before[instr.param1 as usize].clone();
    let b = before[param2 as usize].clone();
    let c = after[instr.target as usize].clone();
    let d = quotient(&instr, &a, &b, &c);

    let proofs = [
        FatMerkleProof::from_regs(&before, instr.param1 as usize)?,
        FatMerkleProof::from_regs(&before, param2 as usize)?,
        FatMerkleProof::from_regs(&after, instr.target as usize)?,
    ];

    let mut outputs = Vec::with_capacity(ARGUMENT_OUTPUTS);
    let mut head: Vec<BigUint> = path.digits().iter().map(|&d| BigUint::from(d)).collect();
    head.push(BigUint::from(line));
    outputs.push(head);
    outputs.push(vec![a, b, c, d]);
    for proof in &proofs {
        for chunk in proof.middle().chunks(FIELDS_PER_OUTPUT) {
            outputs.push(chunk.iter().map(hash_to_field).collect());
        }
    }
    debug_assert_eq!(outputs.len(), ARGUMENT_OUTPUTS);
    Ok(ArgumentData { outputs })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use snark_dispute_vm::{Instruction, Opcode, SavedProgram};

    use super::*;

    fn sector() -> Decasector {
        let lines = (0..20)
            .map(|_| Instruction {
                op: Opcode::Mulmod,
                target: 2,
                param1: 0,
                param2: 1,
                bit: None,
            })
            .collect();
        Decasector::new(
            Arc::new(SavedProgram::new(lines).unwrap()),
            vec![BigUint::from(3u8), BigUint::from(5u8)],
        )
    }

    fn full_path(line: u64) -> SelectionPath {
        let mut digits = vec![0u8; ITERATIONS];
        let mut rest = line;
        for slot in digits.iter_mut().rev() {
            *slot = (rest % 10) as u8;
            rest /= 10;
        }
        SelectionPath::new(digits).unwrap()
    }

    #[test]
    fn argument_has_the_agreed_shape() {
        let sector = sector();
        let path = full_path(7);
        let argument = make_argument(&sector, &path).unwrap();

        assert_eq!(argument.outputs.len(), ARGUMENT_OUTPUTS);
        assert_eq!(argument.posted_index().unwrap(), 7);
        assert_eq!(argument.selection_path().unwrap(), path);

        let (a, b, c, d) = argument.operands().unwrap();
        let before = sector.registers_at_line(7);
        let after = sector.registers_at_line(8);
        assert_eq!(a, before[0]);
        assert_eq!(b, before[1]);
        assert_eq!(c, after[2]);
        // Small products never wrap the field.
        assert_eq!(d, BigUint::from(0u8));
    }

    #[test]
    fn middle_hashes_round_trip_through_field_elements() {
        let sector = sector();
        let argument = make_argument(&sector, &full_path(3)).unwrap();
        let before = sector.registers_at_line(3);
        let expected = FatMerkleProof::from_regs(&before, 0).unwrap();
        assert_eq!(argument.merkle_middle(0).unwrap(), expected.middle());
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let sector = sector();
        let mut argument = make_argument(&sector, &full_path(3)).unwrap();
        argument.outputs[1].pop();
        assert!(matches!(
            argument.operands(),
            Err(RefutationError::MalformedArgument("output arity"))
        ));
        assert!(argument.merkle_middle(3).is_err());
    }
}
