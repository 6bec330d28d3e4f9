//! Deciding and proving why an argument is false.

use bitcoin::ScriptBuf;
use num_bigint::BigUint;
use snark_dispute_dissection::{FatMerkleProof, RegHash};
use snark_dispute_vm::{check_line, SavedProgram};
use tracing::{error, info};

use crate::{ArgumentData, DoomsdayGenerator, RefutationDescriptor, RefutationError};

/// A complete, publishable refutation: what is false, the values that show it, and the
/// pre-committed leaf that lets the chain check it.
#[derive(Debug, Clone)]
pub struct Refutation {
    /// What is being proven false.
    pub descriptor: RefutationDescriptor,
    /// The values committed in the refutation transaction.
    pub data: Vec<BigUint>,
    /// The refutation leaf script.
    pub script: ScriptBuf,
    /// The control block proving the leaf's membership in the dispute output.
    pub control_block: Vec<u8>,
}

fn hash_field(hash: &RegHash) -> BigUint {
    BigUint::from_bytes_be(hash)
}

/// Decides which claim of an argument is false.
///
/// `before_root` and `after_root` are the state roots both parties are bound to on
/// either side of the disputed line. Exactly one of the argument's four claims (the
/// instruction result or one of the three membership proofs) must fail; which one
/// determines the refutation leaf and the values to publish with it.
pub fn derive_refutation(
    program: &SavedProgram,
    argument: &ArgumentData,
    before_root: RegHash,
    after_root: RegHash,
) -> Result<(RefutationDescriptor, Vec<BigUint>), RefutationError> {
    let path = argument.selection_path()?;
    let derived = path.line()?;
    let posted = argument.posted_index()?;
    if derived != posted {
        // The commitment keys force the posted index to be a function of the published
        // digits; disagreement here means the two sides are not looking at the same
        // dispute. Do not answer on-chain with desynced state.
        error!(derived, posted, "argument index disagrees with its own selection path");
        return Err(RefutationError::IndexDerivationMismatch { derived, posted });
    }

    let instr = program.instruction_at(derived);
    let (a, b, c, d) = argument.operands()?;
    if !check_line(&instr, &a, &b, &c, &d) {
        info!(line = derived, "instruction check failed; refuting the execution");
        let data = vec![
            BigUint::from(derived),
            a.clone(),
            b.clone(),
            c.clone(),
            d.clone(),
        ];
        return Ok((RefutationDescriptor::Instr { line: derived }, data));
    }

    let param2 = if instr.op.is_unary() {
        instr.param1
    } else {
        instr.param2
    };
    let openings = [
        (a, before_root, instr.param1 as usize),
        (b, before_root, param2 as usize),
        (c, after_root, instr.target as usize),
    ];
    for (which_proof, (leaf, root, register)) in openings.into_iter().enumerate() {
        let middle = argument.merkle_middle(which_proof)?;
        let proof = FatMerkleProof::from_argument(&middle, &leaf, root, register)?;
        if let Some(step) = proof.index_to_refute() {
            info!(
                line = derived,
                which_proof, step, "membership proof failed; refuting the hash step"
            );
            let hashes = proof.hashes();
            let data = vec![
                BigUint::from(derived),
                hash_field(&hashes[2 * step]),
                hash_field(&hashes[2 * step + 1]),
                hash_field(&hashes[2 * step + 2]),
            ];
            return Ok((
                RefutationDescriptor::Hash {
                    line: derived,
                    which_proof: which_proof as u8,
                    which_hash: step as u8,
                },
                data,
            ));
        }
    }

    // Refutation is only invoked when local replay disagrees with the published trace,
    // so the argument cannot be clean. Reaching this point means the two sides derive
    // different commitments from the same inputs; crash loudly rather than forfeit.
    error!(line = derived, "argument survived every check; derivation desync");
    Err(RefutationError::NothingToRefute)
}

/// Decides the refutation and fetches its leaf spend from the generator.
pub fn refute(
    generator: &DoomsdayGenerator,
    argument: &ArgumentData,
    before_root: RegHash,
    after_root: RegHash,
) -> Result<Refutation, RefutationError> {
    let (descriptor, data) =
        derive_refutation(generator.program(), argument, before_root, after_root)?;
    let index = descriptor.to_index(generator.program().len())?;
    let tree = generator.generate_sequential(Some(index))?;
    let leaf = tree
        .requested
        .ok_or(crate::DoomsdayError::RequestedMissing(index))?;
    Ok(Refutation {
        descriptor,
        data,
        script: leaf.script,
        control_block: leaf.control_block,
    })
}
