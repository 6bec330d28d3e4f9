//! The prover's side of the dispute.

use std::{sync::Arc, time::Duration};

use num_bigint::BigUint;
use snark_dispute_chain::ChainReader;
use snark_dispute_db::{DisputeDb, SetupStatus};
use snark_dispute_dissection::Decasector;
use snark_dispute_refutation::{hash_to_field, make_argument};
use snark_dispute_tx_graph::TemplateName;
use tracing::{error, info, warn};

use crate::{
    agent::{scan_new_blocks, timeout_of},
    fold_game, DisputePhase, ProtocolError, TemplateDecoder,
};

/// Drives one setup from the prover's seat: publish the proof, answer every
/// narrowing round with state roots, open the disputed instruction, and take the
/// timeout spends when the verifier goes silent.
pub struct ProtocolProver {
    db: Arc<dyn DisputeDb>,
    chain: Arc<dyn ChainReader>,
    decoder: Arc<dyn TemplateDecoder>,
    setup_id: String,
    sector: Decasector,
}

impl std::fmt::Debug for ProtocolProver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolProver")
            .field("setup_id", &self.setup_id)
            .finish()
    }
}

impl ProtocolProver {
    /// Creates a prover agent over one setup. The sector holds the program and the
    /// proof witness this prover is claiming.
    pub fn new(
        db: Arc<dyn DisputeDb>,
        chain: Arc<dyn ChainReader>,
        decoder: Arc<dyn TemplateDecoder>,
        setup_id: impl Into<String>,
        sector: Decasector,
    ) -> Self {
        Self {
            db,
            chain,
            decoder,
            setup_id: setup_id.into(),
            sector,
        }
    }

    async fn queue(
        &self,
        name: TemplateName,
        data: Vec<Vec<BigUint>>,
    ) -> Result<(), ProtocolError> {
        info!(template = %name, setup = %self.setup_id, "queueing template for publication");
        self.db
            .mark_ready_to_send(&self.setup_id, name, data, None)
            .await?;
        Ok(())
    }

    /// One poll cycle: ingest confirmations, then act on the resulting position.
    pub async fn poll(&self) -> Result<(), ProtocolError> {
        scan_new_blocks(&self.db, &self.chain, &self.decoder, &self.setup_id).await?;
        let confirmations = self.db.confirmations(&self.setup_id).await?;
        let view = fold_game(&confirmations)?;

        match view.phase {
            DisputePhase::AwaitingProof => {
                let witness = self.sector.witness().to_vec();
                self.queue(TemplateName::Proof, vec![witness]).await
            }
            DisputePhase::AwaitingChallengeOrTimeout => {
                self.try_timeout(
                    TemplateName::Proof,
                    TemplateName::ProofUncontested,
                    view.last_height,
                )
                .await
            }
            DisputePhase::AwaitingState(round) => {
                let commitments = self.sector.commitments_for_selection_path(&view.path)?;
                let roots = commitments
                    .iter()
                    .map(|c| hash_to_field(&c.root()))
                    .collect();
                self.queue(TemplateName::State(round), vec![roots]).await
            }
            DisputePhase::AwaitingSelect(_) => Ok(()),
            DisputePhase::AwaitingArgument => {
                let argument = make_argument(&self.sector, &view.path)?;
                self.queue(TemplateName::Argument, argument.outputs).await
            }
            DisputePhase::AwaitingRefutationOrTimeout => {
                self.try_timeout(
                    TemplateName::Argument,
                    TemplateName::ArgumentUncontested,
                    view.last_height,
                )
                .await
            }
            DisputePhase::ProverWon(reason) => {
                info!(setup = %self.setup_id, %reason, "dispute won");
                self.db
                    .set_status(&self.setup_id, SetupStatus::ProverWon)
                    .await?;
                Ok(())
            }
            DisputePhase::VerifierWon => {
                error!(setup = %self.setup_id, "our claim was refuted on-chain");
                self.db
                    .set_status(&self.setup_id, SetupStatus::VerifierWon)
                    .await?;
                Ok(())
            }
        }
    }

    async fn try_timeout(
        &self,
        waiting_on: TemplateName,
        claim: TemplateName,
        confirmed_at: Option<u64>,
    ) -> Result<(), ProtocolError> {
        let Some(confirmed_at) = confirmed_at else {
            return Ok(());
        };
        let templates = self.db.templates(&self.setup_id).await?;
        let timeout = timeout_of(&templates, waiting_on)?;
        let tip = self.chain.get_block_count().await?;
        if tip >= confirmed_at + u64::from(timeout) {
            self.queue(claim, Vec::new()).await?;
        }
        Ok(())
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
