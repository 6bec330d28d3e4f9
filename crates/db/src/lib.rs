//! Per-setup persistence as the protocol sees it.
//!
//! The real deployment keeps this in a relational store; the protocol only depends on
//! the [`DisputeDb`] trait, and the in-memory implementation backs tests and
//! single-process runs. Writes are per-call; the protocol never needs cross-call
//! transactions because every state transition is anchored to an on-chain
//! confirmation.

pub mod errors;
pub mod inmemory;

use async_trait::async_trait;
use bitcoin::Txid;
use num_bigint::BigUint;
use snark_dispute_tx_graph::{LeafSpend, SignedTemplate, TemplateName};

use crate::errors::DbResult;

/// Where a setup stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetupStatus {
    /// Templates exchanged, nothing on-chain yet.
    #[default]
    Pending,
    /// The dispute is live on-chain.
    Active,
    /// A prover win was observed.
    ProverWon,
    /// A verifier win was observed.
    VerifierWon,
}

/// One tracked setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setup {
    /// The setup's identifier.
    pub id: String,
    /// Where the setup stands.
    pub status: SetupStatus,
    /// The last block height the poll loop finished scanning.
    pub last_checked_height: u64,
}

/// A template observed confirmed on-chain, with the values decoded from its witness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTemplate {
    /// Which template confirmed.
    pub name: TemplateName,
    /// The confirming txid.
    pub txid: Txid,
    /// The confirmation height.
    pub height: u64,
    /// The committed values, one vector per output.
    pub data: Vec<Vec<BigUint>>,
}

/// A template queued for publication with its witness values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingTemplate {
    /// Which template to publish.
    pub name: TemplateName,
    /// The values to commit, one vector per output.
    pub data: Vec<Vec<BigUint>>,
    /// A computed leaf spend to attach, for refutation publications.
    pub leaf: Option<LeafSpend>,
}

/// The persistence operations the protocol drives.
#[async_trait]
pub trait DisputeDb: Send + Sync {
    /// Registers a setup with its fully-built templates.
    async fn create_setup(&self, id: &str, templates: Vec<SignedTemplate>) -> DbResult<()>;

    /// Reads a setup's status row.
    async fn setup(&self, id: &str) -> DbResult<Setup>;

    /// Updates a setup's status.
    async fn set_status(&self, id: &str, status: SetupStatus) -> DbResult<()>;

    /// Records the last block height the poll loop finished scanning.
    async fn set_last_checked_height(&self, id: &str, height: u64) -> DbResult<()>;

    /// The setup's templates, in graph order.
    async fn templates(&self, id: &str) -> DbResult<Vec<SignedTemplate>>;

    /// Queues a template for publication with its witness values and, for refutation
    /// spends, the computed leaf.
    async fn mark_ready_to_send(
        &self,
        id: &str,
        name: TemplateName,
        data: Vec<Vec<BigUint>>,
        leaf: Option<LeafSpend>,
    ) -> DbResult<()>;

    /// Templates queued for publication, oldest first.
    async fn outgoing(&self, id: &str) -> DbResult<Vec<OutgoingTemplate>>;

    /// Records a newly observed confirmation. Recording the same template twice is a
    /// no-op, so re-scanning a block range is safe.
    async fn record_confirmation(&self, id: &str, confirmation: ConfirmedTemplate)
        -> DbResult<()>;

    /// Every recorded confirmation, in recording order.
    async fn confirmations(&self, id: &str) -> DbResult<Vec<ConfirmedTemplate>>;
}
