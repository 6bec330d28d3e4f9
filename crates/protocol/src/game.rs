//! The pure fold from confirmed templates to a game position.

use num_bigint::BigUint;
use snark_dispute_db::ConfirmedTemplate;
use snark_dispute_dissection::{RegHash, SelectionPath};
use snark_dispute_params::{BISECTION_FANOUT, ITERATIONS};
use snark_dispute_refutation::{field_to_hash, ArgumentData, ARGUMENT_OUTPUTS};
use snark_dispute_tx_graph::TemplateName;
use thiserror::Error;

/// A confirmation sequence that cannot occur under the pre-signed graph.
///
/// The graph only lets each template spend its designated parent, so hitting this
/// means the observer is mis-wired, not that the counterparty found a new move.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionErr {
    /// A template confirmed out of order.
    #[error("template {0} confirmed out of order")]
    UnexpectedTemplate(TemplateName),

    /// A confirmed template's decoded values have the wrong shape.
    #[error("template {name} carries malformed data: {what}")]
    MalformedData {
        /// The offending template.
        name: TemplateName,
        /// What was wrong.
        what: &'static str,
    },
}

/// Whose move the game is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputePhase {
    /// Nothing on-chain yet; the prover opens.
    AwaitingProof,
    /// The proof is up; the verifier may challenge, or the timeout runs out.
    AwaitingChallengeOrTimeout,
    /// The prover owes the round's 9 interior state roots.
    AwaitingState(u8),
    /// The verifier owes the round's narrowing digit.
    AwaitingSelect(u8),
    /// The prover owes the single-instruction opening.
    AwaitingArgument,
    /// The argument is up; the verifier may refute, or the timeout runs out.
    AwaitingRefutationOrTimeout,
    /// Terminal: the prover took a winning spend.
    ProverWon(TemplateName),
    /// Terminal: the verifier published a refutation.
    VerifierWon,
}

impl DisputePhase {
    /// Whether the game is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DisputePhase::ProverWon(_) | DisputePhase::VerifierWon)
    }
}

/// Everything the confirmation sequence pins down about the game.
#[derive(Debug, Clone)]
pub struct GameView {
    /// Whose move it is.
    pub phase: DisputePhase,
    /// The narrowing digits observed so far.
    pub path: SelectionPath,
    /// The proof witness posted by the prover's opening transaction.
    pub proof_witness: Vec<BigUint>,
    /// The 9 boundary roots of the round currently awaiting selection, if any.
    pub posted_roots: Option<Vec<RegHash>>,
    /// The posted root bounding the disputed range on the left, once narrowing
    /// produced one. `None` means the initial state, which both sides derive locally.
    pub bound_before: Option<RegHash>,
    /// The posted root bounding the disputed range on the right, once narrowing
    /// produced one.
    pub bound_after: Option<RegHash>,
    /// The argument payload, once posted.
    pub argument: Option<ArgumentData>,
    /// The height of the most recent confirmation, for timeout edges.
    pub last_height: Option<u64>,
}

fn roots_from_data(
    name: TemplateName,
    data: &[Vec<BigUint>],
) -> Result<Vec<RegHash>, TransitionErr> {
    let malformed = |what| TransitionErr::MalformedData { name, what };
    let fields = data.first().ok_or(malformed("missing output"))?;
    if fields.len() != (BISECTION_FANOUT - 1) as usize {
        return Err(malformed("boundary root count"));
    }
    fields
        .iter()
        .map(|f| field_to_hash(f).map_err(|_| malformed("boundary root width")))
        .collect()
}

fn digit_from_data(name: TemplateName, data: &[Vec<BigUint>]) -> Result<u8, TransitionErr> {
    let malformed = |what| TransitionErr::MalformedData { name, what };
    data.first()
        .and_then(|output| output.first())
        .ok_or(malformed("missing digit"))
        .and_then(|d| u8::try_from(d).map_err(|_| malformed("digit width")))
}

/// Folds the ordered confirmations of one setup into the current game position.
pub fn fold_game(confirmations: &[ConfirmedTemplate]) -> Result<GameView, TransitionErr> {
    let mut view = GameView {
        phase: DisputePhase::AwaitingProof,
        path: SelectionPath::empty(),
        proof_witness: Vec::new(),
        posted_roots: None,
        bound_before: None,
        bound_after: None,
        argument: None,
        last_height: None,
    };

    for confirmation in confirmations {
        let name = confirmation.name;
        view.phase = match (view.phase, name) {
            (DisputePhase::AwaitingProof, TemplateName::Proof) => {
                view.proof_witness = confirmation.data.first().cloned().unwrap_or_default();
                DisputePhase::AwaitingChallengeOrTimeout
            }
            (DisputePhase::AwaitingChallengeOrTimeout, TemplateName::Challenge) => {
                DisputePhase::AwaitingState(0)
            }
            (DisputePhase::AwaitingChallengeOrTimeout, TemplateName::ProofUncontested) => {
                DisputePhase::ProverWon(TemplateName::ProofUncontested)
            }
            (DisputePhase::AwaitingState(round), TemplateName::State(r)) if r == round => {
                view.posted_roots = Some(roots_from_data(name, &confirmation.data)?);
                DisputePhase::AwaitingSelect(round)
            }
            (DisputePhase::AwaitingSelect(round), TemplateName::Select(r)) if r == round => {
                let digit = digit_from_data(name, &confirmation.data)?;
                view.path = view
                    .path
                    .extended(digit)
                    .map_err(|_| TransitionErr::MalformedData {
                        name,
                        what: "digit range",
                    })?;
                let roots = view.posted_roots.take().ok_or(
                    TransitionErr::UnexpectedTemplate(name),
                )?;
                if digit > 0 {
                    view.bound_before = Some(roots[digit as usize - 1]);
                }
                if u64::from(digit) < BISECTION_FANOUT - 1 {
                    view.bound_after = Some(roots[digit as usize]);
                }
                if usize::from(round) + 1 < ITERATIONS {
                    DisputePhase::AwaitingState(round + 1)
                } else {
                    DisputePhase::AwaitingArgument
                }
            }
            (DisputePhase::AwaitingArgument, TemplateName::Argument) => {
                if confirmation.data.len() != ARGUMENT_OUTPUTS {
                    return Err(TransitionErr::MalformedData {
                        name,
                        what: "argument output count",
                    });
                }
                view.argument = Some(ArgumentData {
                    outputs: confirmation.data.clone(),
                });
                DisputePhase::AwaitingRefutationOrTimeout
            }
            (DisputePhase::AwaitingRefutationOrTimeout, TemplateName::ProofRefuted) => {
                DisputePhase::VerifierWon
            }
            (DisputePhase::AwaitingRefutationOrTimeout, TemplateName::ArgumentUncontested) => {
                DisputePhase::ProverWon(TemplateName::ArgumentUncontested)
            }
            (_, name) => return Err(TransitionErr::UnexpectedTemplate(name)),
        };
        view.last_height = Some(confirmation.height);
    }
    Ok(view)
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash;
    use bitcoin::Txid;

    use super::*;

    fn confirmed(name: TemplateName, height: u64, data: Vec<Vec<BigUint>>) -> ConfirmedTemplate {
        ConfirmedTemplate {
            name,
            txid: Txid::all_zeros(),
            height,
            data,
        }
    }

    fn nine_roots(salt: u8) -> Vec<Vec<BigUint>> {
        vec![(0..9u8)
            .map(|i| BigUint::from_bytes_be(&[salt + i; 32]))
            .collect()]
    }

    #[test]
    fn the_contested_path_reaches_the_argument() {
        let mut sequence = vec![
            confirmed(TemplateName::Proof, 1, vec![vec![BigUint::from(5u8)]]),
            confirmed(TemplateName::Challenge, 2, Vec::new()),
        ];
        for round in 0..ITERATIONS as u8 {
            sequence.push(confirmed(TemplateName::State(round), 3, nine_roots(round)));
            sequence.push(confirmed(
                TemplateName::Select(round),
                4,
                vec![vec![BigUint::from(3u8)]],
            ));
        }

        let view = fold_game(&sequence).unwrap();
        assert_eq!(view.phase, DisputePhase::AwaitingArgument);
        assert!(view.path.is_complete());
        assert_eq!(view.path.line().unwrap(), 333_333);
        // Digit 3 binds boundary roots 2 and 3 of the final round.
        assert_eq!(view.bound_before, Some([5 + 2; 32]));
        assert_eq!(view.bound_after, Some([5 + 3; 32]));
    }

    #[test]
    fn timeouts_end_the_game_for_the_prover() {
        let view = fold_game(&[
            confirmed(TemplateName::Proof, 1, vec![Vec::new()]),
            confirmed(TemplateName::ProofUncontested, 10, Vec::new()),
        ])
        .unwrap();
        assert_eq!(
            view.phase,
            DisputePhase::ProverWon(TemplateName::ProofUncontested)
        );
        assert!(view.phase.is_terminal());
        assert_eq!(view.last_height, Some(10));
    }

    #[test]
    fn out_of_order_confirmations_are_rejected() {
        let result = fold_game(&[confirmed(TemplateName::Challenge, 1, Vec::new())]);
        assert_eq!(
            result.unwrap_err(),
            TransitionErr::UnexpectedTemplate(TemplateName::Challenge)
        );
    }

    #[test]
    fn malformed_round_data_is_rejected() {
        let result = fold_game(&[
            confirmed(TemplateName::Proof, 1, vec![Vec::new()]),
            confirmed(TemplateName::Challenge, 2, Vec::new()),
            confirmed(TemplateName::State(0), 3, vec![vec![BigUint::from(1u8)]]),
        ]);
        assert!(matches!(
            result,
            Err(TransitionErr::MalformedData { what: "boundary root count", .. })
        ));
    }
}
