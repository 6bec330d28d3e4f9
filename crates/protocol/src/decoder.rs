//! Decoding committed values out of confirmed transactions.

use std::{collections::HashMap, sync::RwLock};

use bitcoin::{Transaction, Txid};
use num_bigint::BigUint;
use snark_dispute_tx_graph::TemplateName;

use crate::ProtocolError;

/// Extracts the values a confirmed template committed in its witness.
///
/// The production implementation walks the transaction's witness stacks and decodes
/// the one-time signatures against the template's public keys; that parsing lives with
/// the transaction assembly outside this workspace. The protocol only needs the
/// decoded values.
pub trait TemplateDecoder: Send + Sync {
    /// The committed values of `tx`, one vector per output.
    fn decode(
        &self,
        name: TemplateName,
        tx: &Transaction,
    ) -> Result<Vec<Vec<BigUint>>, ProtocolError>;
}

/// A table-backed decoder for tests and drivers that already know each transaction's
/// values.
#[derive(Debug, Default)]
pub struct StaticDecoder {
    values: RwLock<HashMap<Txid, Vec<Vec<BigUint>>>>,
}

impl StaticDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the committed values of one transaction.
    pub fn insert(&self, txid: Txid, data: Vec<Vec<BigUint>>) {
        self.values.write().expect("decoder table").insert(txid, data);
    }
}

impl TemplateDecoder for StaticDecoder {
    fn decode(
        &self,
        name: TemplateName,
        tx: &Transaction,
    ) -> Result<Vec<Vec<BigUint>>, ProtocolError> {
        self.values
            .read()
            .expect("decoder table")
            .get(&tx.compute_txid())
            .cloned()
            .ok_or(ProtocolError::Decode(name))
    }
}
