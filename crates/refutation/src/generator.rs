//! Exhaustive refutation-tree generation.

use std::{
    collections::HashMap,
    fmt,
    path::PathBuf,
    process::Stdio,
    sync::{Arc, Mutex},
};

use bitcoin::{
    hashes::Hash,
    taproot::{TapLeafHash, TapNodeHash},
    ScriptBuf,
};
use snark_dispute_params::{PARALLEL_CHUNKS, SEQUENTIAL_CHUNKS};
use snark_dispute_taptree::{leaf_hash, TapTreeCompressor};
use snark_dispute_vm::SavedProgram;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::{
    BuiltinEmitter, ChunkRequest, ChunkResponse, DoomsdayError, RefutationDescriptor,
    RefutationScriptEmitter, ScriptShape, ScriptTemplate,
};

/// Where and how to spawn chunk workers for the parallel path.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    /// The binary exposing the chunk-worker entry point.
    pub worker_bin: PathBuf,
    /// The program artifact workers load their instruction shapes from. Must hold the
    /// same program the parent generator was built with.
    pub program_file: PathBuf,
}

/// The single leaf requested alongside a generation run.
#[derive(Debug, Clone)]
pub struct RequestedLeaf {
    /// The leaf's flat refutation index.
    pub index: u64,
    /// The leaf script.
    pub script: ScriptBuf,
    /// The serialized control block proving the leaf's membership.
    pub control_block: Vec<u8>,
}

/// The finished refutation tree.
#[derive(Debug, Clone)]
pub struct DoomsdayTree {
    /// The taproot merkle root.
    pub root: TapNodeHash,
    /// The P2TR locking script committing to the root.
    pub script_pubkey: ScriptBuf,
    /// The number of leaves, equal to the refutation index space.
    pub leaves: u64,
    /// The requested leaf's spend material, when one was requested.
    pub requested: Option<RequestedLeaf>,
}

/// Enumerates every refutation leaf of a program into one taproot tree.
///
/// Scripts are regenerated rather than stored: the template for each instruction shape
/// is produced once and memoized, and only the line bytes are patched per leaf. The
/// sequential and parallel paths fold the identical leaf-hash sequence into the same
/// streaming compressor, so they are root-for-root interchangeable; both parties must
/// get the same bytes no matter which path they ran.
pub struct DoomsdayGenerator {
    program: Arc<SavedProgram>,
    emitter: Arc<dyn RefutationScriptEmitter>,
    templates: Mutex<HashMap<ScriptShape, ScriptTemplate>>,
}

impl fmt::Debug for DoomsdayGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoomsdayGenerator")
            .field("program_len", &self.program.len())
            .field("max_index", &self.max_index())
            .finish()
    }
}

impl DoomsdayGenerator {
    /// Creates a generator over a program with the builtin emitter.
    pub fn new(program: Arc<SavedProgram>) -> Self {
        Self::with_emitter(program, Arc::new(BuiltinEmitter))
    }

    /// Creates a generator with a caller-provided script emitter.
    pub fn with_emitter(
        program: Arc<SavedProgram>,
        emitter: Arc<dyn RefutationScriptEmitter>,
    ) -> Self {
        Self {
            program,
            emitter,
            templates: Mutex::new(HashMap::new()),
        }
    }

    /// The program this generator enumerates.
    pub fn program(&self) -> &Arc<SavedProgram> {
        &self.program
    }

    /// The size of the refutation index space.
    pub fn max_index(&self) -> u64 {
        crate::max_refutation_index(self.program.len())
    }

    /// The leaf script for one descriptor.
    pub fn script_for(&self, descriptor: &RefutationDescriptor) -> ScriptBuf {
        let shape = ScriptShape::of(descriptor, &self.program);
        let line = match *descriptor {
            RefutationDescriptor::Instr { line } => line,
            RefutationDescriptor::Hash { line, .. } => line,
        };
        let mut templates = self.templates.lock().expect("template cache");
        templates
            .entry(shape)
            .or_insert_with(|| self.emitter.template(&shape))
            .instantiate(line)
    }

    /// The leaf script at one flat index.
    pub fn script_for_index(&self, index: u64) -> Result<ScriptBuf, DoomsdayError> {
        let descriptor = RefutationDescriptor::from_index(index, self.program.len())
            .map_err(|_| DoomsdayError::RequestedMissing(index))?;
        Ok(self.script_for(&descriptor))
    }

    /// Splits `[0, max)` into `chunks` contiguous ranges.
    fn chunk_ranges(max: u64, chunks: u64) -> Vec<(u64, u64)> {
        let size = max.div_ceil(chunks).max(1);
        (0..chunks)
            .map(|i| (i * size, ((i + 1) * size).min(max)))
            .filter(|(start, end)| start < end)
            .collect()
    }

    /// The leaf hashes of one index range, plus the requested script when it falls
    /// inside the range. This is the unit of work a chunk worker performs.
    pub fn chunk_leaf_hashes(
        &self,
        start: u64,
        end: u64,
        requested: Option<u64>,
    ) -> Result<(Vec<[u8; 32]>, Option<ScriptBuf>), DoomsdayError> {
        let mut hashes = Vec::with_capacity((end - start) as usize);
        let mut requested_script = None;
        for index in start..end {
            let script = self.script_for_index(index)?;
            hashes.push(leaf_hash(&script).to_byte_array());
            if requested == Some(index) {
                requested_script = Some(script);
            }
        }
        Ok((hashes, requested_script))
    }

    fn finish(
        &self,
        compressor: TapTreeCompressor,
        requested: Option<u64>,
        requested_script: Option<ScriptBuf>,
    ) -> Result<DoomsdayTree, DoomsdayError> {
        let max = self.max_index();
        if compressor.leaves() != max {
            return Err(DoomsdayError::LeafCount {
                expected: max,
                actual: compressor.leaves(),
            });
        }
        let tree = compressor.finalize();
        let requested = match requested {
            None => None,
            Some(index) => {
                let script =
                    requested_script.ok_or(DoomsdayError::RequestedMissing(index))?;
                Some(RequestedLeaf {
                    index,
                    control_block: tree.control_block()?,
                    script,
                })
            }
        };
        Ok(DoomsdayTree {
            root: tree.root(),
            script_pubkey: tree.script_pubkey(),
            leaves: tree.leaves(),
            requested,
        })
    }

    fn validate_requested(&self, requested: Option<u64>) -> Result<(), DoomsdayError> {
        if let Some(index) = requested {
            if index >= self.max_index() {
                return Err(DoomsdayError::RequestedMissing(index));
            }
        }
        Ok(())
    }

    /// Generates the whole tree in this process, in [`SEQUENTIAL_CHUNKS`] ranges.
    pub fn generate_sequential(
        &self,
        requested: Option<u64>,
    ) -> Result<DoomsdayTree, DoomsdayError> {
        self.validate_requested(requested)?;
        let max = self.max_index();
        let mut compressor = TapTreeCompressor::new(requested.unwrap_or(0));
        let mut requested_script = None;
        for (start, end) in Self::chunk_ranges(max, SEQUENTIAL_CHUNKS) {
            let (hashes, script) = self.chunk_leaf_hashes(start, end, requested)?;
            for hash in hashes {
                compressor.add_leaf_hash(TapLeafHash::from_byte_array(hash));
            }
            requested_script = requested_script.or(script);
        }
        self.finish(compressor, requested, requested_script)
    }

    /// Generates the whole tree across [`PARALLEL_CHUNKS`] worker processes.
    ///
    /// Each worker answers exactly one chunk request over its stdio and owns its
    /// sub-range outright; the parent folds the workers' hash lists in original chunk
    /// order, which the streaming compressor requires. Any worker failure aborts the
    /// whole generation.
    pub async fn generate_parallel(
        &self,
        worker: &WorkerSpec,
        requested: Option<u64>,
    ) -> Result<DoomsdayTree, DoomsdayError> {
        self.validate_requested(requested)?;
        let max = self.max_index();
        let ranges = Self::chunk_ranges(max, PARALLEL_CHUNKS);
        info!(
            leaves = max,
            chunks = ranges.len(),
            "generating refutation tree across worker processes"
        );

        let jobs = ranges.iter().enumerate().map(|(chunk, &(start, end))| {
            let request = ChunkRequest {
                program_file: worker.program_file.clone(),
                start,
                end,
                requested,
            };
            let worker_bin = worker.worker_bin.clone();
            async move {
                let response = run_worker(&worker_bin, &request).await.map_err(|err| {
                    DoomsdayError::Worker {
                        chunk,
                        message: err.to_string(),
                    }
                })?;
                debug!(chunk, start, end, "chunk worker finished");
                Ok::<ChunkResponse, DoomsdayError>(response)
            }
        });
        let responses = futures::future::try_join_all(jobs).await?;

        let mut compressor = TapTreeCompressor::new(requested.unwrap_or(0));
        let mut requested_script = None;
        for response in responses {
            for hash in response.leaf_hashes {
                compressor.add_leaf_hash(TapLeafHash::from_byte_array(hash));
            }
            if let Some(bytes) = response.requested_script {
                requested_script = Some(ScriptBuf::from_bytes(bytes));
            }
        }
        self.finish(compressor, requested, requested_script)
    }
}

/// Spawns one worker process, sends it a single request and reads its single response.
async fn run_worker(
    worker_bin: &PathBuf,
    request: &ChunkRequest,
) -> Result<ChunkResponse, DoomsdayError> {
    let mut child = tokio::process::Command::new(worker_bin)
        .arg("doomsday-worker")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdin = child.stdin.take().expect("piped stdin");
    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    stdin.write_all(&line).await?;
    drop(stdin);

    let stdout = child.stdout.take().expect("piped stdout");
    let mut reader = BufReader::new(stdout);
    let mut response_line = String::new();
    reader.read_line(&mut response_line).await?;

    let status = child.wait().await?;
    if !status.success() {
        return Err(DoomsdayError::Worker {
            chunk: 0,
            message: format!("worker exited with {status}"),
        });
    }
    Ok(serde_json::from_str(&response_line)?)
}
