//! In-memory implementation of the persistence traits.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use num_bigint::BigUint;
use snark_dispute_tx_graph::{LeafSpend, SignedTemplate, TemplateName};
use tokio::sync::RwLock;

use crate::{
    errors::{DbError, DbResult},
    ConfirmedTemplate, DisputeDb, OutgoingTemplate, Setup, SetupStatus,
};

#[derive(Debug, Default)]
struct SetupRecord {
    status: SetupStatus,
    last_checked_height: u64,
    templates: Vec<SignedTemplate>,
    outgoing: Vec<OutgoingTemplate>,
    confirmations: Vec<ConfirmedTemplate>,
}

/// In-memory dispute database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDb {
    setups: Arc<RwLock<HashMap<String, SetupRecord>>>,
}

impl InMemoryDb {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_setup<T>(
        &self,
        id: &str,
        f: impl FnOnce(&SetupRecord) -> T,
    ) -> DbResult<T> {
        let setups = self.setups.read().await;
        setups
            .get(id)
            .map(f)
            .ok_or_else(|| DbError::UnknownSetup(id.to_string()))
    }

    async fn with_setup_mut<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut SetupRecord) -> T,
    ) -> DbResult<T> {
        let mut setups = self.setups.write().await;
        setups
            .get_mut(id)
            .map(f)
            .ok_or_else(|| DbError::UnknownSetup(id.to_string()))
    }
}

#[async_trait]
impl DisputeDb for InMemoryDb {
    async fn create_setup(&self, id: &str, templates: Vec<SignedTemplate>) -> DbResult<()> {
        let mut setups = self.setups.write().await;
        setups.insert(
            id.to_string(),
            SetupRecord {
                templates,
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn setup(&self, id: &str) -> DbResult<Setup> {
        self.with_setup(id, |record| Setup {
            id: id.to_string(),
            status: record.status,
            last_checked_height: record.last_checked_height,
        })
        .await
    }

    async fn set_status(&self, id: &str, status: SetupStatus) -> DbResult<()> {
        self.with_setup_mut(id, |record| record.status = status).await
    }

    async fn set_last_checked_height(&self, id: &str, height: u64) -> DbResult<()> {
        self.with_setup_mut(id, |record| record.last_checked_height = height)
            .await
    }

    async fn templates(&self, id: &str) -> DbResult<Vec<SignedTemplate>> {
        self.with_setup(id, |record| record.templates.clone()).await
    }

    async fn mark_ready_to_send(
        &self,
        id: &str,
        name: TemplateName,
        data: Vec<Vec<BigUint>>,
        leaf: Option<LeafSpend>,
    ) -> DbResult<()> {
        let known = self
            .with_setup(id, |record| {
                record.templates.iter().any(|t| t.name() == name)
            })
            .await?;
        if !known {
            return Err(DbError::UnknownTemplate {
                setup: id.to_string(),
                name,
            });
        }
        self.with_setup_mut(id, |record| {
            if !record.outgoing.iter().any(|o| o.name == name) {
                record.outgoing.push(OutgoingTemplate { name, data, leaf });
            }
        })
        .await
    }

    async fn outgoing(&self, id: &str) -> DbResult<Vec<OutgoingTemplate>> {
        self.with_setup(id, |record| record.outgoing.clone()).await
    }

    async fn record_confirmation(
        &self,
        id: &str,
        confirmation: ConfirmedTemplate,
    ) -> DbResult<()> {
        self.with_setup_mut(id, |record| {
            if !record
                .confirmations
                .iter()
                .any(|c| c.name == confirmation.name)
            {
                record.confirmations.push(confirmation);
            }
        })
        .await
    }

    async fn confirmations(&self, id: &str) -> DbResult<Vec<ConfirmedTemplate>> {
        self.with_setup(id, |record| record.confirmations.clone())
            .await
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash;
    use bitcoin::Txid;

    use super::*;

    #[tokio::test]
    async fn unknown_setups_are_fatal() {
        let db = InMemoryDb::new();
        assert!(matches!(
            db.setup("nope").await,
            Err(DbError::UnknownSetup(_))
        ));
    }

    #[tokio::test]
    async fn confirmations_keep_recording_order_and_dedupe() {
        let db = InMemoryDb::new();
        db.create_setup("s", Vec::new()).await.unwrap();

        for (i, name) in [TemplateName::Proof, TemplateName::Challenge]
            .into_iter()
            .enumerate()
        {
            db.record_confirmation(
                "s",
                ConfirmedTemplate {
                    name,
                    txid: Txid::all_zeros(),
                    height: i as u64,
                    data: Vec::new(),
                },
            )
            .await
            .unwrap();
        }
        // Re-scan of the same block range.
        db.record_confirmation(
            "s",
            ConfirmedTemplate {
                name: TemplateName::Proof,
                txid: Txid::all_zeros(),
                height: 9,
                data: Vec::new(),
            },
        )
        .await
        .unwrap();

        let confirmed = db.confirmations("s").await.unwrap();
        assert_eq!(confirmed.len(), 2);
        assert_eq!(confirmed[0].name, TemplateName::Proof);
        assert_eq!(confirmed[0].height, 0);
        assert_eq!(confirmed[1].name, TemplateName::Challenge);
    }

    #[tokio::test]
    async fn outgoing_requires_a_known_template() {
        let db = InMemoryDb::new();
        db.create_setup("s", Vec::new()).await.unwrap();
        assert!(matches!(
            db.mark_ready_to_send("s", TemplateName::Proof, Vec::new(), None)
                .await,
            Err(DbError::UnknownTemplate { .. })
        ));
    }
}
