//! The read-only chain interface the protocol polls through.
//!
//! The actual node client lives outside this workspace; the protocol only ever needs
//! the six read calls below. [`MockChain`] is the in-memory double used by protocol
//! tests: blocks are appended by hand and served back exactly like a node would.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use bitcoin::{
    absolute,
    block::{Header, Version},
    hashes::Hash,
    Block, BlockHash, CompactTarget, Transaction, TxMerkleNode, TxOut, Txid,
};
use thiserror::Error;
use tokio::sync::RwLock;

/// Chain-read failures.
///
/// Everything here is treated as transient by the poll loop: the failing item is
/// skipped for the cycle and retried on the next one.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The requested block is unknown.
    #[error("unknown block {0}")]
    UnknownBlock(BlockHash),

    /// The requested height is past the tip.
    #[error("height {0} past the chain tip")]
    UnknownHeight(u64),

    /// The requested transaction is unknown.
    #[error("unknown transaction {0}")]
    UnknownTransaction(Txid),

    /// The node could not be reached.
    #[error("node transport: {0}")]
    Transport(String),
}

/// Convenience alias for chain-read results.
pub type ChainResult<T> = Result<T, ChainError>;

/// The node read calls the protocol depends on.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// The hash of the current tip.
    async fn get_best_block_hash(&self) -> ChainResult<BlockHash>;

    /// A full block by hash.
    async fn get_block(&self, hash: &BlockHash) -> ChainResult<Block>;

    /// The hash of the block at a height.
    async fn get_block_hash(&self, height: u64) -> ChainResult<BlockHash>;

    /// The height of the current tip.
    async fn get_block_count(&self) -> ChainResult<u64>;

    /// A raw transaction, optionally constrained to a block.
    async fn get_raw_transaction(
        &self,
        txid: &Txid,
        blockhash: Option<&BlockHash>,
    ) -> ChainResult<Transaction>;

    /// An unspent output, optionally considering the mempool.
    async fn get_tx_out(
        &self,
        txid: &Txid,
        vout: u32,
        include_mempool: bool,
    ) -> ChainResult<Option<TxOut>>;
}

#[derive(Debug, Default)]
struct MockChainState {
    blocks: Vec<Block>,
    by_hash: HashMap<BlockHash, usize>,
    txs: HashMap<Txid, (Transaction, BlockHash)>,
    spent: HashSet<(Txid, u32)>,
}

/// An in-memory chain for tests: blocks are appended explicitly, and reads behave like
/// a node at the resulting tip. Height 0 is the first appended block.
#[derive(Debug, Clone, Default)]
pub struct MockChain {
    state: Arc<RwLock<MockChainState>>,
}

impl MockChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    fn header(prev: BlockHash) -> Header {
        Header {
            version: Version::TWO,
            prev_blockhash: prev,
            merkle_root: TxMerkleNode::all_zeros(),
            time: 0,
            bits: CompactTarget::from_consensus(0x207f_ffff),
            nonce: 0,
        }
    }

    /// Appends a block holding the given transactions and returns its hash.
    pub async fn mine_block(&self, txdata: Vec<Transaction>) -> BlockHash {
        let mut state = self.state.write().await;
        let prev = state
            .blocks
            .last()
            .map(|b| b.block_hash())
            .unwrap_or_else(BlockHash::all_zeros);
        let block = Block {
            header: Self::header(prev),
            txdata,
        };
        let hash = block.block_hash();
        for tx in &block.txdata {
            let txid = tx.compute_txid();
            state.txs.insert(txid, (tx.clone(), hash));
            for input in &tx.input {
                state
                    .spent
                    .insert((input.previous_output.txid, input.previous_output.vout));
            }
        }
        let height = state.blocks.len();
        state.by_hash.insert(hash, height);
        state.blocks.push(block);
        hash
    }

    /// Appends `count` empty blocks.
    pub async fn mine_empty_blocks(&self, count: u64) {
        for _ in 0..count {
            self.mine_block(Vec::new()).await;
        }
    }
}

/// A coinbase-like transaction with a distinct txid per `tag`, for tests that need
/// recognizable confirmations.
pub fn tagged_transaction(tag: u64) -> Transaction {
    use bitcoin::{transaction, OutPoint, ScriptBuf, Sequence, TxIn, Witness};
    Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: Txid::all_zeros(),
                vout: tag as u32,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: bitcoin::Amount::from_sat(330),
            script_pubkey: ScriptBuf::new(),
        }],
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn get_best_block_hash(&self) -> ChainResult<BlockHash> {
        let state = self.state.read().await;
        state
            .blocks
            .last()
            .map(|b| b.block_hash())
            .ok_or(ChainError::UnknownHeight(0))
    }

    async fn get_block(&self, hash: &BlockHash) -> ChainResult<Block> {
        let state = self.state.read().await;
        state
            .by_hash
            .get(hash)
            .map(|&height| state.blocks[height].clone())
            .ok_or(ChainError::UnknownBlock(*hash))
    }

    async fn get_block_hash(&self, height: u64) -> ChainResult<BlockHash> {
        let state = self.state.read().await;
        state
            .blocks
            .get(height as usize)
            .map(|b| b.block_hash())
            .ok_or(ChainError::UnknownHeight(height))
    }

    async fn get_block_count(&self) -> ChainResult<u64> {
        let state = self.state.read().await;
        Ok(state.blocks.len().saturating_sub(1) as u64)
    }

    async fn get_raw_transaction(
        &self,
        txid: &Txid,
        blockhash: Option<&BlockHash>,
    ) -> ChainResult<Transaction> {
        let state = self.state.read().await;
        match state.txs.get(txid) {
            Some((tx, block)) if blockhash.is_none() || blockhash == Some(block) => {
                Ok(tx.clone())
            }
            _ => Err(ChainError::UnknownTransaction(*txid)),
        }
    }

    async fn get_tx_out(
        &self,
        txid: &Txid,
        vout: u32,
        _include_mempool: bool,
    ) -> ChainResult<Option<TxOut>> {
        let state = self.state.read().await;
        if state.spent.contains(&(*txid, vout)) {
            return Ok(None);
        }
        Ok(state
            .txs
            .get(txid)
            .and_then(|(tx, _)| tx.output.get(vout as usize).cloned()))
    }
}
