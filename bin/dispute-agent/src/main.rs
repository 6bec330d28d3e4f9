//! Command-line front end for refutation-tree generation.
//!
//! The interesting entry point is the hidden `doomsday-worker` subcommand: the
//! generator's parallel path spawns this binary once per index chunk, writes a single
//! request line to its stdin and reads a single response line back. The worker stays
//! silent on stdout apart from that one line.

use std::{
    io::{BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use snark_dispute_refutation::{answer_chunk, ChunkRequest, DoomsdayGenerator, WorkerSpec};
use snark_dispute_vm::SavedProgram;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "dispute-agent", about = "refutation tree generation for dispute setups")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate the refutation tree for a program artifact and print its root and
    /// script pubkey; optionally extract one leaf's spend material.
    Generate {
        /// The program artifact.
        #[arg(long)]
        program: PathBuf,

        /// A leaf index whose script and control block to print.
        #[arg(long)]
        index: Option<u64>,

        /// Fan generation out across worker processes.
        #[arg(long)]
        parallel: bool,
    },

    /// Answer one chunk request over stdio. Spawned by the parallel generation path.
    #[command(hide = true)]
    DoomsdayWorker,
}

fn run_worker() -> Result<()> {
    let stdin = std::io::stdin();
    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .context("reading chunk request")?;
    let request: ChunkRequest = serde_json::from_str(&line).context("parsing chunk request")?;
    let response = answer_chunk(&request).context("answering chunk request")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer(&mut out, &response).context("writing chunk response")?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

async fn run_generate(program: PathBuf, index: Option<u64>, parallel: bool) -> Result<()> {
    let artifact = SavedProgram::from_file(&program)
        .with_context(|| format!("loading program artifact {}", program.display()))?;
    let generator = DoomsdayGenerator::new(Arc::new(artifact));
    info!(leaves = generator.max_index(), "generating refutation tree");

    let tree = if parallel {
        let worker = WorkerSpec {
            worker_bin: std::env::current_exe().context("locating worker binary")?,
            program_file: program,
        };
        generator.generate_parallel(&worker, index).await?
    } else {
        generator.generate_sequential(index)?
    };

    println!("root: {}", tree.root);
    println!("script_pubkey: {}", hex::encode(tree.script_pubkey.as_bytes()));
    if let Some(leaf) = tree.requested {
        println!("leaf {}:", leaf.index);
        println!("  script: {}", hex::encode(leaf.script.as_bytes()));
        println!("  control_block: {}", hex::encode(&leaf.control_block));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        // Workers keep stdout clean for the response line; no subscriber.
        Command::DoomsdayWorker => run_worker(),
        Command::Generate {
            program,
            index,
            parallel,
        } => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_writer(std::io::stderr)
                .init();
            run_generate(program, index, parallel).await
        }
    }
}
