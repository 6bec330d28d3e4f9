//! Process fan-out against the in-process reference.

use std::{path::PathBuf, sync::Arc};

use snark_dispute_refutation::{DoomsdayGenerator, WorkerSpec};
use snark_dispute_vm::{Instruction, Opcode, SavedProgram};

fn test_program() -> SavedProgram {
    let lines = (0..15)
        .map(|i| Instruction {
            op: match i % 4 {
                0 => Opcode::Addmod,
                1 => Opcode::Mulmod,
                2 => Opcode::Submod,
                _ => Opcode::Mov,
            },
            target: 2,
            param1: 0,
            param2: 1,
            bit: None,
        })
        .collect();
    SavedProgram::new(lines).unwrap()
}

#[tokio::test]
async fn parallel_generation_matches_sequential() {
    let program = test_program();
    let dir = tempfile::tempdir().unwrap();
    let program_file = dir.path().join("program.json");
    program.to_file(&program_file).unwrap();

    let generator = DoomsdayGenerator::new(Arc::new(program));
    let requested = Some(generator.max_index() / 2);

    let sequential = generator.generate_sequential(requested).unwrap();

    let worker = WorkerSpec {
        worker_bin: PathBuf::from(env!("CARGO_BIN_EXE_dispute-agent")),
        program_file,
    };
    let parallel = generator
        .generate_parallel(&worker, requested)
        .await
        .unwrap();

    assert_eq!(parallel.root, sequential.root);
    assert_eq!(parallel.script_pubkey, sequential.script_pubkey);
    assert_eq!(parallel.leaves, sequential.leaves);

    let (par, seq) = (parallel.requested.unwrap(), sequential.requested.unwrap());
    assert_eq!(par.script, seq.script);
    assert_eq!(par.control_block, seq.control_block);
}

#[tokio::test]
async fn a_missing_program_fails_the_whole_generation() {
    let program = test_program();
    let generator = DoomsdayGenerator::new(Arc::new(program));
    let worker = WorkerSpec {
        worker_bin: PathBuf::from(env!("CARGO_BIN_EXE_dispute-agent")),
        program_file: PathBuf::from("/nonexistent/program.json"),
    };
    assert!(generator.generate_parallel(&worker, None).await.is_err());
}
