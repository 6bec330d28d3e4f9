//! End-to-end dispute runs over a mock chain.
//!
//! A driver shuttles each agent's queued templates onto the chain as tagged
//! transactions, registering the committed values with both sides' decoders, and then
//! lets the agents poll. Dishonesty is injected by tampering with the values a
//! template is published with.

use std::{collections::HashMap, sync::Arc};

use num_bigint::BigUint;
use num_traits::Zero;
use snark_dispute_chain::{tagged_transaction, ChainReader, MockChain};
use snark_dispute_db::{inmemory::InMemoryDb, DisputeDb, SetupStatus};
use snark_dispute_dissection::Decasector;
use snark_dispute_params::DEFAULT_TIMEOUT_BLOCKS;
use snark_dispute_protocol::{ProtocolProver, ProtocolVerifier, StaticDecoder, TemplateDecoder};
use snark_dispute_tx_graph::{
    keys_for_template, standard_graph, LeafSpend, OutputScripts, RawTemplate, SignedTemplate,
    TemplateName,
};
use snark_dispute_vm::{program_succeeds, Instruction, Opcode, SavedProgram};
use bitcoin::{Amount, ScriptBuf, Transaction};

const SETUP: &str = "setup-1";

/// r3 = r0 * r1; r4 = (r3 == r2); assert r4 — the witness claims the product in r2.
fn program_with_product_check() -> Arc<SavedProgram> {
    let lines = vec![
        Instruction {
            op: Opcode::Mulmod,
            target: 3,
            param1: 0,
            param2: 1,
            bit: None,
        },
        Instruction {
            op: Opcode::Equal,
            target: 4,
            param1: 3,
            param2: 2,
            bit: None,
        },
        Instruction {
            op: Opcode::AssertOne,
            target: 0,
            param1: 4,
            param2: 0,
            bit: None,
        },
    ];
    Arc::new(SavedProgram::new(lines).unwrap())
}

fn valid_witness() -> Vec<BigUint> {
    // 6 * 7 == 42.
    vec![
        BigUint::from(6u8),
        BigUint::from(7u8),
        BigUint::from(42u8),
    ]
}

fn invalid_witness() -> Vec<BigUint> {
    // 6 * 7 != 43: the assertion at line 2 fails.
    vec![
        BigUint::from(6u8),
        BigUint::from(7u8),
        BigUint::from(43u8),
    ]
}

/// Builds the full signed graph with a distinct txid per template.
fn signed_templates() -> (Vec<SignedTemplate>, HashMap<TemplateName, Transaction>) {
    let mut txs = HashMap::new();
    let templates = standard_graph()
        .into_iter()
        .enumerate()
        .map(|(i, raw): (usize, RawTemplate)| {
            let keys = keys_for_template(b"prover master secret", &raw, 3);
            let keyed = raw.with_keys(keys).unwrap();
            let scripts = keyed
                .outputs
                .iter()
                .map(|o| OutputScripts {
                    script_pubkey: ScriptBuf::new(),
                    leaves: o
                        .conditions
                        .iter()
                        .map(|_| LeafSpend {
                            script: ScriptBuf::new(),
                            control_block: Vec::new(),
                        })
                        .collect(),
                })
                .collect();
            let scripted = keyed.with_scripts(scripts).unwrap();
            let amounts = vec![Amount::from_sat(330); scripted.outputs.len()];
            let funded = scripted.with_amounts(amounts).unwrap();

            let tx = tagged_transaction(i as u64 + 1);
            let signed = funded.signed(tx.compute_txid());
            txs.insert(signed.name(), tx);
            signed
        })
        .collect();
    (templates, txs)
}

struct Harness {
    chain: MockChain,
    prover_db: Arc<InMemoryDb>,
    verifier_db: Arc<InMemoryDb>,
    decoder: Arc<StaticDecoder>,
    txs: HashMap<TemplateName, Transaction>,
    prover: ProtocolProver,
    verifier: ProtocolVerifier,
}

impl Harness {
    async fn new(program: Arc<SavedProgram>, witness: Vec<BigUint>) -> Self {
        let (templates, txs) = signed_templates();
        let chain = MockChain::new();
        // Establish a genesis block so height bookkeeping starts above zero.
        chain.mine_block(Vec::new()).await;

        let prover_db = Arc::new(InMemoryDb::new());
        let verifier_db = Arc::new(InMemoryDb::new());
        prover_db.create_setup(SETUP, templates.clone()).await.unwrap();
        verifier_db.create_setup(SETUP, templates).await.unwrap();

        let decoder = Arc::new(StaticDecoder::new());
        let sector = Decasector::new(Arc::clone(&program), witness);

        let prover = ProtocolProver::new(
            prover_db.clone() as Arc<dyn DisputeDb>,
            Arc::new(chain.clone()) as Arc<dyn ChainReader>,
            decoder.clone() as Arc<dyn TemplateDecoder>,
            SETUP,
            sector,
        );
        let verifier = ProtocolVerifier::new(
            verifier_db.clone() as Arc<dyn DisputeDb>,
            Arc::new(chain.clone()) as Arc<dyn ChainReader>,
            decoder.clone() as Arc<dyn TemplateDecoder>,
            SETUP,
            program,
        );

        Self {
            chain,
            prover_db,
            verifier_db,
            decoder,
            txs,
            prover,
            verifier,
        }
    }

    /// Publishes one side's queued templates, optionally tampering with the values.
    /// Templates in `withhold` stay queued but never reach the chain.
    async fn publish_outgoing(
        &self,
        db: &Arc<InMemoryDb>,
        published: &mut Vec<TemplateName>,
        withhold: &[TemplateName],
        tamper: &dyn Fn(TemplateName, &mut Vec<Vec<BigUint>>),
    ) {
        for outgoing in db.outgoing(SETUP).await.unwrap() {
            if published.contains(&outgoing.name) || withhold.contains(&outgoing.name) {
                continue;
            }
            let mut data = outgoing.data.clone();
            tamper(outgoing.name, &mut data);
            let tx = self.txs[&outgoing.name].clone();
            self.decoder.insert(tx.compute_txid(), data);
            self.chain.mine_block(vec![tx]).await;
            published.push(outgoing.name);
        }
    }

    /// Runs poll/publish rounds for both agents.
    async fn drive(
        &self,
        rounds: usize,
        tamper_prover: &dyn Fn(TemplateName, &mut Vec<Vec<BigUint>>),
        withhold_verifier: &[TemplateName],
    ) {
        let mut published = Vec::new();
        for _ in 0..rounds {
            self.prover.poll().await.unwrap();
            self.publish_outgoing(&self.prover_db, &mut published, &[], tamper_prover)
                .await;
            self.verifier.poll().await.unwrap();
            self.publish_outgoing(&self.verifier_db, &mut published, withhold_verifier, &|_, _| {})
                .await;
        }
    }
}

fn no_tamper(_: TemplateName, _: &mut Vec<Vec<BigUint>>) {}

#[tokio::test]
async fn an_invalid_proof_is_refuted_at_the_failing_assertion() {
    // The graph's argument outputs and the argument payload must agree on shape.
    assert_eq!(
        snark_dispute_tx_graph::ARGUMENT_DATA_OUTPUTS,
        snark_dispute_refutation::ARGUMENT_OUTPUTS
    );

    let program = program_with_product_check();
    assert!(!program_succeeds(&program, &invalid_witness()));
    let harness = Harness::new(Arc::clone(&program), invalid_witness()).await;

    // proof, challenge, 6 state/select rounds, argument, refutation: well under 20.
    harness.drive(20, &no_tamper, &[]).await;

    let status = harness.verifier_db.setup(SETUP).await.unwrap().status;
    assert_eq!(status, SetupStatus::VerifierWon);
    let confirmed = harness.verifier_db.confirmations(SETUP).await.unwrap();
    let names: Vec<_> = confirmed.iter().map(|c| c.name).collect();
    assert!(names.contains(&TemplateName::ProofRefuted));
    assert!(names.contains(&TemplateName::Select(5)));

    // The refutation targeted the failing assertion's line.
    let refuted = harness
        .verifier_db
        .outgoing(SETUP)
        .await
        .unwrap()
        .into_iter()
        .find(|o| o.name == TemplateName::ProofRefuted)
        .expect("refutation queued");
    assert_eq!(refuted.data[0][0], BigUint::from(2u8));
    assert!(refuted.leaf.is_some());
}

#[tokio::test]
async fn a_corrupted_state_root_is_refuted_as_a_hash_lie() {
    let program = program_with_product_check();
    let harness = Harness::new(Arc::clone(&program), invalid_witness()).await;

    // The prover lies in the final round: boundary 4's root is corrupted, so the
    // verifier narrows there by first-disagreement and the bound after-root is false.
    let tamper = |name: TemplateName, data: &mut Vec<Vec<BigUint>>| {
        if name == TemplateName::State(5) {
            data[0][4] += 1u8;
        }
    };
    harness.drive(20, &tamper, &[]).await;

    let status = harness.verifier_db.setup(SETUP).await.unwrap().status;
    assert_eq!(status, SetupStatus::VerifierWon);

    let refuted = harness
        .verifier_db
        .outgoing(SETUP)
        .await
        .unwrap()
        .into_iter()
        .find(|o| o.name == TemplateName::ProofRefuted)
        .expect("refutation queued");
    // Hash refutations publish the disputed line and the failing hash triple.
    assert_eq!(refuted.data[0].len(), 4);
    assert!(!refuted.data[0][1].is_zero());
}

#[tokio::test]
async fn a_valid_proof_wins_by_timeout() {
    let program = program_with_product_check();
    assert!(program_succeeds(&program, &valid_witness()));
    let harness = Harness::new(Arc::clone(&program), valid_witness()).await;

    harness.drive(2, &no_tamper, &[]).await;
    // The verifier saw nothing to dispute; run out the clock.
    harness
        .chain
        .mine_empty_blocks(u64::from(DEFAULT_TIMEOUT_BLOCKS) + 1)
        .await;
    harness.drive(3, &no_tamper, &[]).await;

    let status = harness.prover_db.setup(SETUP).await.unwrap().status;
    assert_eq!(status, SetupStatus::ProverWon);
}

#[tokio::test]
async fn an_unanswered_argument_wins_by_timeout() {
    let program = program_with_product_check();
    let harness = Harness::new(Arc::clone(&program), invalid_witness()).await;

    // The verifier computes its refutation but never manages to publish it.
    let withhold = [TemplateName::ProofRefuted];
    harness.drive(16, &no_tamper, &withhold).await;
    let confirmed = harness.prover_db.confirmations(SETUP).await.unwrap();
    assert!(confirmed.iter().any(|c| c.name == TemplateName::Argument));

    harness
        .chain
        .mine_empty_blocks(u64::from(DEFAULT_TIMEOUT_BLOCKS) + 1)
        .await;
    harness.drive(3, &no_tamper, &withhold).await;
    let status = harness.prover_db.setup(SETUP).await.unwrap().status;
    assert_eq!(status, SetupStatus::ProverWon);
}
