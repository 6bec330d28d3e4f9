//! The verifier's side of the dispute.

use std::{sync::Arc, time::Duration};

use num_bigint::BigUint;
use snark_dispute_chain::ChainReader;
use snark_dispute_db::{DisputeDb, SetupStatus};
use snark_dispute_dissection::Decasector;
use snark_dispute_refutation::{refute, DoomsdayGenerator};
use snark_dispute_tx_graph::{LeafSpend, TemplateName};
use snark_dispute_vm::{program_succeeds, SavedProgram};
use tracing::{info, warn};

use crate::{
    agent::scan_new_blocks, fold_game, DisputePhase, GameView, ProtocolError, TemplateDecoder,
};

/// Drives one setup from the verifier's seat: challenge an unsatisfied proof, narrow
/// every round to the first provable lie, and publish the refutation.
pub struct ProtocolVerifier {
    db: Arc<dyn DisputeDb>,
    chain: Arc<dyn ChainReader>,
    decoder: Arc<dyn TemplateDecoder>,
    setup_id: String,
    program: Arc<SavedProgram>,
}

impl std::fmt::Debug for ProtocolVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolVerifier")
            .field("setup_id", &self.setup_id)
            .finish()
    }
}

impl ProtocolVerifier {
    /// Creates a verifier agent over one setup.
    ///
    /// Unlike the prover, the verifier starts with only the program; its replay is
    /// seeded with whatever witness the prover posts on-chain.
    pub fn new(
        db: Arc<dyn DisputeDb>,
        chain: Arc<dyn ChainReader>,
        decoder: Arc<dyn TemplateDecoder>,
        setup_id: impl Into<String>,
        program: Arc<SavedProgram>,
    ) -> Self {
        Self {
            db,
            chain,
            decoder,
            setup_id: setup_id.into(),
            program,
        }
    }

    fn sector_for(&self, view: &GameView) -> Decasector {
        Decasector::new(Arc::clone(&self.program), view.proof_witness.clone())
    }

    async fn queue(
        &self,
        name: TemplateName,
        data: Vec<Vec<BigUint>>,
        leaf: Option<LeafSpend>,
    ) -> Result<(), ProtocolError> {
        info!(template = %name, setup = %self.setup_id, "queueing template for publication");
        self.db
            .mark_ready_to_send(&self.setup_id, name, data, leaf)
            .await?;
        Ok(())
    }

    /// One poll cycle: ingest confirmations, then act on the resulting position.
    pub async fn poll(&self) -> Result<(), ProtocolError> {
        scan_new_blocks(&self.db, &self.chain, &self.decoder, &self.setup_id).await?;
        let confirmations = self.db.confirmations(&self.setup_id).await?;
        let view = fold_game(&confirmations)?;

        match view.phase {
            DisputePhase::AwaitingProof | DisputePhase::AwaitingState(_) => Ok(()),
            DisputePhase::AwaitingChallengeOrTimeout => {
                if program_succeeds(&self.program, &view.proof_witness) {
                    // Nothing to dispute; let the prover take the timeout spend.
                    return Ok(());
                }
                info!(setup = %self.setup_id, "posted witness fails the program; challenging");
                self.queue(TemplateName::Challenge, Vec::new(), None).await
            }
            DisputePhase::AwaitingSelect(round) => {
                let sector = self.sector_for(&view);
                let posted = view
                    .posted_roots
                    .as_ref()
                    .ok_or(ProtocolError::Decode(TemplateName::State(round)))?;
                let digit = sector.find_first_disagreement(&view.path, posted)?;
                self.queue(
                    TemplateName::Select(round),
                    vec![vec![BigUint::from(digit)]],
                    None,
                )
                .await
            }
            DisputePhase::AwaitingArgument => Ok(()),
            DisputePhase::AwaitingRefutationOrTimeout => {
                // Regenerating the leaf tree is expensive; do it once per dispute.
                let queued = self.db.outgoing(&self.setup_id).await?;
                if queued.iter().any(|o| o.name == TemplateName::ProofRefuted) {
                    return Ok(());
                }
                let sector = self.sector_for(&view);
                let argument = view
                    .argument
                    .as_ref()
                    .ok_or(ProtocolError::Decode(TemplateName::Argument))?;
                let line = view.path.line().map_err(ProtocolError::Dissection)?;
                let before = view
                    .bound_before
                    .unwrap_or_else(|| sector.state_root_at_line(0));
                let after = view
                    .bound_after
                    .unwrap_or_else(|| sector.state_root_at_line(line + 1));

                let generator = DoomsdayGenerator::new(Arc::clone(&self.program));
                let refutation = refute(&generator, argument, before, after)?;
                info!(
                    setup = %self.setup_id,
                    descriptor = ?refutation.descriptor,
                    "publishing refutation"
                );
                self.queue(
                    TemplateName::ProofRefuted,
                    vec![refutation.data],
                    Some(LeafSpend {
                        script: refutation.script,
                        control_block: refutation.control_block,
                    }),
                )
                .await
            }
            DisputePhase::VerifierWon => {
                info!(setup = %self.setup_id, "refutation confirmed; dispute won");
                self.db
                    .set_status(&self.setup_id, SetupStatus::VerifierWon)
                    .await?;
                Ok(())
            }
            DisputePhase::ProverWon(reason) => {
                info!(setup = %self.setup_id, %reason, "dispute resolved for the prover");
                self.db
                    .set_status(&self.setup_id, SetupStatus::ProverWon)
                    .await?;
                Ok(())
            }
        }
    }

    /// Polls forever at a fixed interval, treating transient errors as skips.
    pub async fn run(&self, interval: Duration) -> Result<(), ProtocolError> {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.poll().await {
                Ok(()) => {}
                Err(err) if err.is_transient() => {
                    warn!(%err, setup = %self.setup_id, "transient poll failure; retrying next cycle");
                }
                Err(err) => return Err(err),
            }
        }
    }
}
