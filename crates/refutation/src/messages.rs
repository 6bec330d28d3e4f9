//! The typed request/response protocol between the generator and its chunk workers.
//!
//! One request and one response per worker, line-delimited JSON over stdio. Workers
//! share no state with the parent: they load the program artifact themselves, answer
//! their one chunk and exit.

use std::{path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};
use snark_dispute_vm::SavedProgram;

use crate::{DoomsdayError, DoomsdayGenerator};

/// A chunk of the refutation index space for a worker to hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRequest {
    /// The program artifact to load instruction shapes from.
    pub program_file: PathBuf,
    /// First index of the chunk, inclusive.
    pub start: u64,
    /// Last index of the chunk, exclusive.
    pub end: u64,
    /// A single leaf whose script should be returned verbatim, when it falls inside
    /// this chunk.
    pub requested: Option<u64>,
}

/// A worker's complete answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResponse {
    /// Echo of the chunk's first index, for sanity checking.
    pub start: u64,
    /// The tagged leaf hash of every script in the chunk, in index order.
    pub leaf_hashes: Vec<[u8; 32]>,
    /// The requested leaf's script bytes, when it fell inside this chunk.
    pub requested_script: Option<Vec<u8>>,
}

/// Computes the answer to one chunk request. This is the whole worker body; the binary
/// wraps it in stdio framing.
pub fn answer_chunk(request: &ChunkRequest) -> Result<ChunkResponse, DoomsdayError> {
    let program = SavedProgram::from_file(&request.program_file)?;
    let generator = DoomsdayGenerator::new(Arc::new(program));
    let (leaf_hashes, requested_script) =
        generator.chunk_leaf_hashes(request.start, request.end, request.requested)?;
    Ok(ChunkResponse {
        start: request.start,
        leaf_hashes,
        requested_script: requested_script.map(|script| script.into_bytes()),
    })
}
