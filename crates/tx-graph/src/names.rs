//! Canonical template names of the dispute graph.

use std::fmt;

use serde::{Deserialize, Serialize};
use snark_dispute_params::ITERATIONS;

/// The closed set of transactions a dispute setup can publish.
///
/// Names double as persistence keys and as commitment-key labels, so their textual
/// form is part of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateName {
    /// The prover's initial claim carrying the proof witness.
    Proof,
    /// The verifier's objection that starts the bisection.
    Challenge,
    /// The prover's 9 interior state roots for round `.0`.
    State(u8),
    /// The verifier's narrowing digit for round `.0`.
    Select(u8),
    /// The prover's single-instruction opening.
    Argument,
    /// The verifier's winning spend through a refutation leaf.
    ProofRefuted,
    /// The prover's winning timeout spend when no challenge arrives.
    ProofUncontested,
    /// The prover's winning timeout spend when the argument goes unanswered.
    ArgumentUncontested,
}

impl TemplateName {
    /// The commitment-key label and persistence key for this template.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TemplateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateName::Proof => write!(f, "proof"),
            TemplateName::Challenge => write!(f, "challenge"),
            TemplateName::State(round) => write!(f, "state_{round:02}"),
            TemplateName::Select(round) => write!(f, "select_{round:02}"),
            TemplateName::Argument => write!(f, "argument"),
            TemplateName::ProofRefuted => write!(f, "proof_refuted"),
            TemplateName::ProofUncontested => write!(f, "proof_uncontested"),
            TemplateName::ArgumentUncontested => write!(f, "argument_uncontested"),
        }
    }
}

/// Every template of the graph in publish order along the contested path, with the
/// timeout spends at the end.
pub static DISPUTE_GRAPH_ORDER: std::sync::LazyLock<Vec<TemplateName>> =
    std::sync::LazyLock::new(|| {
        let mut names = vec![TemplateName::Proof, TemplateName::Challenge];
        for round in 0..ITERATIONS as u8 {
            names.push(TemplateName::State(round));
            names.push(TemplateName::Select(round));
        }
        names.extend([
            TemplateName::Argument,
            TemplateName::ProofRefuted,
            TemplateName::ProofUncontested,
            TemplateName::ArgumentUncontested,
        ]);
        names
    });

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        assert_eq!(TemplateName::State(3).label(), "state_03");
        assert_eq!(TemplateName::Select(0).label(), "select_00");
        assert_eq!(TemplateName::ProofUncontested.label(), "proof_uncontested");
    }

    #[test]
    fn graph_order_covers_every_round() {
        assert_eq!(DISPUTE_GRAPH_ORDER.len(), 2 + 2 * ITERATIONS + 4);
    }
}
