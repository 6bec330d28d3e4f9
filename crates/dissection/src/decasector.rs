//! The 10-ary search tree over the instruction trace.

use std::sync::{Arc, OnceLock};

use num_bigint::BigUint;
use num_traits::{One, Zero};
use snark_dispute_params::{BISECTION_FANOUT, ITERATIONS, SEARCH_SPAN};
use snark_dispute_vm::{execute_line, initial_registers, replay, Opcode, SavedProgram};

use crate::{register_root, DissectionError, RegHash};

/// An ordered sequence of narrowing digits, at most one per round.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionPath(Vec<u8>);

impl SelectionPath {
    /// The empty path: the whole search span.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validates digit range and length.
    pub fn new(digits: Vec<u8>) -> Result<Self, DissectionError> {
        if digits.len() > ITERATIONS {
            return Err(DissectionError::PathTooLong(ITERATIONS));
        }
        if let Some(&bad) = digits.iter().find(|&&d| u64::from(d) >= BISECTION_FANOUT) {
            return Err(DissectionError::DigitOutOfRange(bad));
        }
        Ok(Self(digits))
    }

    /// Returns the path extended by one more round's digit.
    pub fn extended(&self, digit: u8) -> Result<Self, DissectionError> {
        let mut digits = self.0.clone();
        digits.push(digit);
        Self::new(digits)
    }

    /// The narrowing digits, first round first.
    pub fn digits(&self) -> &[u8] {
        &self.0
    }

    /// The number of rounds taken so far.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no rounds have been taken.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the path has been narrowed for every round.
    pub fn is_complete(&self) -> bool {
        self.0.len() == ITERATIONS
    }

    /// The single trace line a complete path narrows to.
    pub fn line(&self) -> Result<u64, DissectionError> {
        if !self.is_complete() {
            return Err(DissectionError::PathIncomplete(self.0.len()));
        }
        Ok(self
            .0
            .iter()
            .fold(0u64, |acc, &d| acc * BISECTION_FANOUT + u64::from(d)))
    }
}

/// A lazily evaluated commitment to the VM state at one cut point of the search tree.
///
/// The register snapshot is produced by deterministic replay up to `line` and cached on
/// first use; replaying a deep line of a long trace is expensive, and most commitments
/// handed out during a round are never opened.
#[derive(Debug, Clone)]
pub struct StateCommitment {
    /// Inclusive lower bound of the range this commitment cuts.
    pub left: u64,
    /// Exclusive upper bound of the range this commitment cuts.
    pub right: u64,
    /// The round that produced this commitment.
    pub iteration: usize,
    /// The sub-range this commitment closes: it is the state at the right edge of
    /// sub-range `selection`.
    pub selection: u8,
    /// The trace line the registers are snapshotted at.
    pub line: u64,
    program: Arc<SavedProgram>,
    witness: Arc<Vec<BigUint>>,
    values: OnceLock<Vec<BigUint>>,
    root: OnceLock<RegHash>,
}

impl StateCommitment {
    /// The register snapshot at `line`, replayed on first access and cached.
    pub fn values(&self) -> &[BigUint] {
        self.values
            .get_or_init(|| replay(&self.program, &self.witness, self.line))
    }

    /// The commitment root over [`StateCommitment::values`].
    pub fn root(&self) -> RegHash {
        *self.root.get_or_init(|| {
            register_root(self.values()).expect("replay yields a full register file")
        })
    }
}

/// Pure bisection arithmetic over a program and proof witness.
///
/// Both parties construct their own instance from the same inputs; every range, cut
/// line and state root derived from it is identical on both sides, which is what the
/// protocol's narrowing rounds rely on.
#[derive(Debug, Clone)]
pub struct Decasector {
    program: Arc<SavedProgram>,
    witness: Arc<Vec<BigUint>>,
}

impl Decasector {
    /// Creates the search tree for one program and proof witness.
    pub fn new(program: Arc<SavedProgram>, witness: Vec<BigUint>) -> Self {
        Self {
            program,
            witness: Arc::new(witness),
        }
    }

    /// The program being dissected.
    pub fn program(&self) -> &Arc<SavedProgram> {
        &self.program
    }

    /// The proof witness the replay is seeded with.
    pub fn witness(&self) -> &[BigUint] {
        &self.witness
    }

    /// The line range a selection path narrows to.
    pub fn range_for_selection_path(&self, path: &SelectionPath) -> (u64, u64) {
        let mut left = 0u64;
        let mut right = SEARCH_SPAN;
        for &digit in path.digits() {
            let step = (right - left) / BISECTION_FANOUT;
            left += u64::from(digit) * step;
            right = left + step;
        }
        (left, right)
    }

    /// The 9 interior cut lines one round past the path.
    pub fn lines_for_selection_path(
        &self,
        path: &SelectionPath,
    ) -> Result<Vec<u64>, DissectionError> {
        if path.is_complete() {
            return Err(DissectionError::PathComplete);
        }
        let (left, right) = self.range_for_selection_path(path);
        let step = (right - left) / BISECTION_FANOUT;
        Ok((1..BISECTION_FANOUT).map(|i| left + i * step).collect())
    }

    /// The state commitments at the 9 interior cut lines one round past the path.
    pub fn commitments_for_selection_path(
        &self,
        path: &SelectionPath,
    ) -> Result<Vec<StateCommitment>, DissectionError> {
        let (left, right) = self.range_for_selection_path(path);
        let lines = self.lines_for_selection_path(path)?;
        Ok(lines
            .into_iter()
            .enumerate()
            .map(|(i, line)| StateCommitment {
                left,
                right,
                iteration: path.len(),
                selection: i as u8,
                line,
                program: Arc::clone(&self.program),
                witness: Arc::clone(&self.witness),
                values: OnceLock::new(),
                root: OnceLock::new(),
            })
            .collect())
    }

    /// The register snapshot before `line` executes.
    pub fn registers_at_line(&self, line: u64) -> Vec<BigUint> {
        replay(&self.program, &self.witness, line)
    }

    /// The commitment root of the state before `line` executes.
    pub fn state_root_at_line(&self, line: u64) -> RegHash {
        register_root(&self.registers_at_line(line)).expect("replay yields a full register file")
    }

    /// The first line whose assertion fails under honest replay, if any.
    ///
    /// When a dispute runs against a witness that does not satisfy the program, the
    /// published state roots can all be honest; the provably-false claim is then the
    /// failing assertion itself, and the narrowing must steer towards its line.
    pub fn first_failing_assert(&self) -> Option<u64> {
        let mut regs = initial_registers(&self.witness);
        for (idx, instr) in self.program.lines.iter().enumerate() {
            let held = match instr.op {
                Opcode::AssertOne => regs[instr.param1 as usize].is_one(),
                Opcode::AssertZero => regs[instr.param1 as usize].is_zero(),
                _ => {
                    execute_line(&mut regs, instr);
                    true
                }
            };
            if !held {
                return Some(idx as u64);
            }
        }
        None
    }

    /// Names the sub-range that provably contains a refutable line.
    ///
    /// This is the verifier's move in every narrowing round: the first posted boundary
    /// root that disagrees with local replay wins; when every boundary agrees, the
    /// narrowing follows the first failing assertion instead. Agreement with a
    /// satisfied witness means there is nothing to dispute, which is a derivation
    /// desync at this layer.
    pub fn find_first_disagreement(
        &self,
        path: &SelectionPath,
        posted: &[RegHash],
    ) -> Result<u8, DissectionError> {
        let own = self.commitments_for_selection_path(path)?;
        if posted.len() != own.len() {
            return Err(DissectionError::WrongProofLength {
                expected: own.len(),
                actual: posted.len(),
            });
        }
        for (commitment, posted_root) in own.iter().zip(posted) {
            if commitment.root() != *posted_root {
                return Ok(commitment.selection);
            }
        }
        let failing = self
            .first_failing_assert()
            .ok_or(DissectionError::NoDisagreement)?;
        let (left, right) = self.range_for_selection_path(path);
        let step = (right - left) / BISECTION_FANOUT;
        let digit = failing.clamp(left, right - 1).saturating_sub(left) / step;
        Ok(digit as u8)
    }
}

#[cfg(test)]
mod tests {
    use snark_dispute_vm::{Instruction, Opcode};

    use super::*;

    fn counting_program(len: usize) -> Arc<SavedProgram> {
        // r1 = r1 + r0, repeated: every line changes the state.
        let lines = (0..len)
            .map(|_| Instruction {
                op: Opcode::Addmod,
                target: 1,
                param1: 1,
                param2: 0,
                bit: None,
            })
            .collect();
        Arc::new(SavedProgram::new(lines).unwrap())
    }

    fn witness() -> Vec<BigUint> {
        vec![BigUint::from(1u8), BigUint::from(0u8)]
    }

    #[test]
    fn ranges_narrow_by_powers_of_ten() {
        let sector = Decasector::new(counting_program(10), witness());
        let path = SelectionPath::new(vec![3, 1, 4, 1, 5, 9]).unwrap();
        assert_eq!(sector.range_for_selection_path(&SelectionPath::empty()), (0, SEARCH_SPAN));
        assert_eq!(sector.range_for_selection_path(&path), (314_159, 314_160));
        assert_eq!(path.line().unwrap(), 314_159);
    }

    #[test]
    fn interior_lines_split_the_range_evenly() {
        let sector = Decasector::new(counting_program(10), witness());
        let path = SelectionPath::new(vec![2]).unwrap();
        let lines = sector.lines_for_selection_path(&path).unwrap();
        assert_eq!(lines.len(), 9);
        assert_eq!(lines[0], 210_000);
        assert_eq!(lines[8], 290_000);

        let full = SelectionPath::new(vec![0; ITERATIONS]).unwrap();
        assert_eq!(
            sector.lines_for_selection_path(&full),
            Err(DissectionError::PathComplete)
        );
    }

    #[test]
    fn independent_instances_agree_everywhere() {
        let a = Decasector::new(counting_program(40), witness());
        let b = Decasector::new(counting_program(40), witness());
        let paths = [
            vec![],
            vec![0],
            vec![0, 0, 0],
            vec![9, 9],
            vec![0, 0, 0, 0, 1],
            vec![0, 0, 0, 0, 0, 3],
        ];
        for digits in paths {
            let path = SelectionPath::new(digits).unwrap();
            assert_eq!(
                a.range_for_selection_path(&path),
                b.range_for_selection_path(&path)
            );
            if !path.is_complete() {
                let ca = a.commitments_for_selection_path(&path).unwrap();
                let cb = b.commitments_for_selection_path(&path).unwrap();
                for (x, y) in ca.iter().zip(&cb) {
                    assert_eq!(x.line, y.line);
                    assert_eq!(x.root(), y.root());
                }
            }
        }
    }

    #[test]
    fn replay_clamps_past_the_program_end() {
        let sector = Decasector::new(counting_program(25), witness());
        // r1 counts executed lines, so clamping is observable directly.
        assert_eq!(sector.registers_at_line(7)[1], BigUint::from(7u8));
        assert_eq!(sector.registers_at_line(25)[1], BigUint::from(25u8));
        assert_eq!(sector.registers_at_line(500_000)[1], BigUint::from(25u8));
    }

    #[test]
    fn memoized_values_are_stable() {
        let sector = Decasector::new(counting_program(30), witness());
        let commitment = &sector
            .commitments_for_selection_path(&SelectionPath::empty())
            .unwrap()[0];
        let first = commitment.values().to_vec();
        assert_eq!(commitment.values(), first.as_slice());
        assert_eq!(commitment.root(), commitment.root());
    }

    fn honest_roots(sector: &Decasector, path: &SelectionPath) -> Vec<RegHash> {
        sector
            .commitments_for_selection_path(path)
            .unwrap()
            .iter()
            .map(|c| c.root())
            .collect()
    }

    #[test]
    fn disagreement_points_at_the_first_lying_boundary() {
        let sector = Decasector::new(counting_program(50), witness());
        let path = SelectionPath::empty();
        let mut lying = honest_roots(&sector, &path);
        lying[4][0] ^= 1;
        assert_eq!(sector.find_first_disagreement(&path, &lying).unwrap(), 4);
    }

    #[test]
    fn agreement_steers_towards_the_failing_assertion() {
        // r1 counts lines; the assertion at line 30 demands r1 == 0 and fails.
        let mut lines = counting_program(30).lines.clone();
        lines.push(Instruction {
            op: Opcode::AssertZero,
            target: 0,
            param1: 1,
            param2: 1,
            bit: None,
        });
        let sector = Decasector::new(Arc::new(SavedProgram::new(lines).unwrap()), witness());
        assert_eq!(sector.first_failing_assert(), Some(30));

        // Every boundary of the first round agrees, so the narrowing follows line 30
        // into sub-range 0; at a narrower range the digit tracks the line directly.
        let path = SelectionPath::empty();
        let roots = honest_roots(&sector, &path);
        assert_eq!(sector.find_first_disagreement(&path, &roots).unwrap(), 0);

        let deep = SelectionPath::new(vec![0, 0, 0, 0]).unwrap();
        let deep_roots = honest_roots(&sector, &deep);
        assert_eq!(sector.find_first_disagreement(&deep, &deep_roots).unwrap(), 3);
    }

    #[test]
    fn agreement_with_a_satisfied_witness_is_a_desync() {
        let sector = Decasector::new(counting_program(50), witness());
        let path = SelectionPath::empty();
        let roots = honest_roots(&sector, &path);
        assert_eq!(
            sector.find_first_disagreement(&path, &roots),
            Err(DissectionError::NoDisagreement)
        );
    }

    #[test]
    fn invalid_paths_are_rejected() {
        assert_eq!(
            SelectionPath::new(vec![10]),
            Err(DissectionError::DigitOutOfRange(10))
        );
        assert_eq!(
            SelectionPath::new(vec![0; 7]),
            Err(DissectionError::PathTooLong(ITERATIONS))
        );
        assert_eq!(
            SelectionPath::new(vec![1, 2]).unwrap().line(),
            Err(DissectionError::PathIncomplete(2))
        );
    }
}
