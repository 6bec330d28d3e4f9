//! The staged template pipeline.

use bitcoin::{Amount, ScriptBuf, Txid};
use snark_dispute_params::{
    DEFAULT_TIMEOUT_BLOCKS, FIELDS_PER_OUTPUT, ITERATIONS, PROOFS_PER_ARGUMENT,
    REGISTER_PROOF_LEN,
};
use snark_dispute_wots::{WotsPublicKey, WotsSpec};

use crate::{TemplateName, TxGraphError};

/// The number of outputs the argument's payload is chunked across: the selection head,
/// the operands, and each membership proof's middle hashes at the per-output limit.
pub const ARGUMENT_DATA_OUTPUTS: usize =
    2 + PROOFS_PER_ARGUMENT * (REGISTER_PROOF_LEN - 2).div_ceil(FIELDS_PER_OUTPUT);

/// Which party owns (funds and publishes) a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Published by the prover.
    Prover,
    /// Published by the verifier.
    Verifier,
}

/// Which pre-signatures a spending condition requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    /// No signature; the condition is data-only.
    None,
    /// The prover's signature.
    Prover,
    /// The verifier's signature.
    Verifier,
    /// Both parties' signatures.
    Both,
}

/// A reference to the output (and spending condition) a template input consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRef {
    /// The template whose output is spent.
    pub template: TemplateName,
    /// The spent output index.
    pub output: usize,
    /// The spending condition used.
    pub condition: usize,
}

/// A spending condition before any keys are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCondition {
    /// Required pre-signatures.
    pub signature: SignatureKind,
    /// Relative timelock in blocks for timeout conditions.
    pub timeout_blocks: Option<u16>,
}

/// An output before any keys are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    /// Spending conditions, in leaf order.
    pub conditions: Vec<RawCondition>,
}

/// Stage 1: the bare structure of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTemplate {
    /// The template's name.
    pub name: TemplateName,
    /// The publishing party.
    pub role: Role,
    /// The outputs this template spends.
    pub inputs: Vec<InputRef>,
    /// The outputs this template creates.
    pub outputs: Vec<RawOutput>,
}

/// The keys attached to one spending condition at stage 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondKeys {
    /// One commitment flavor per committed value.
    pub wots_specs: Vec<WotsSpec>,
    /// One public key per committed value.
    pub wots_public_keys: Vec<WotsPublicKey>,
}

/// A spending condition with commitment keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedCondition {
    /// Required pre-signatures.
    pub signature: SignatureKind,
    /// Relative timelock in blocks for timeout conditions.
    pub timeout_blocks: Option<u16>,
    /// One commitment flavor per committed value.
    pub wots_specs: Vec<WotsSpec>,
    /// One public key per committed value.
    pub wots_public_keys: Vec<WotsPublicKey>,
}

/// An output with commitment keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedOutput {
    /// Spending conditions, in leaf order.
    pub conditions: Vec<KeyedCondition>,
}

/// Stage 2: structure plus commitment keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedTemplate {
    /// The template's name.
    pub name: TemplateName,
    /// The publishing party.
    pub role: Role,
    /// The outputs this template spends.
    pub inputs: Vec<InputRef>,
    /// The outputs this template creates.
    pub outputs: Vec<KeyedOutput>,
}

/// The script material attached to one output at stage 3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputScripts {
    /// The output's locking script.
    pub script_pubkey: ScriptBuf,
    /// Per condition: the leaf script and its control block.
    pub leaves: Vec<LeafSpend>,
}

/// A leaf script together with the control block that proves its membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafSpend {
    /// The tapscript.
    pub script: ScriptBuf,
    /// The serialized control block.
    pub control_block: Vec<u8>,
}

/// A spending condition with its tapscript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCondition {
    /// The keyed condition.
    pub keys: KeyedCondition,
    /// The leaf script and control block.
    pub leaf: LeafSpend,
}

/// An output with its locking script and leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedOutput {
    /// The output's locking script.
    pub script_pubkey: ScriptBuf,
    /// Spending conditions, in leaf order.
    pub conditions: Vec<ScriptedCondition>,
}

/// Stage 3: structure, keys and scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedTemplate {
    /// The template's name.
    pub name: TemplateName,
    /// The publishing party.
    pub role: Role,
    /// The outputs this template spends.
    pub inputs: Vec<InputRef>,
    /// The outputs this template creates.
    pub outputs: Vec<ScriptedOutput>,
}

/// Stage 4: everything but the final txid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundedTemplate {
    /// The scripted template.
    pub template: ScriptedTemplate,
    /// One amount per output.
    pub amounts: Vec<Amount>,
}

/// Stage 5: the fully assembled, pre-signed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTemplate {
    /// The funded template.
    pub template: FundedTemplate,
    /// The txid the pre-signed transaction will confirm under.
    pub txid: Txid,
}

impl RawTemplate {
    /// Attaches commitment keys, one [`CondKeys`] per spending condition.
    pub fn with_keys(self, keys: Vec<Vec<CondKeys>>) -> Result<KeyedTemplate, TxGraphError> {
        if keys.len() != self.outputs.len() {
            return Err(TxGraphError::ArityMismatch {
                what: "per-output keys",
                expected: self.outputs.len(),
                actual: keys.len(),
            });
        }
        let mut outputs = Vec::with_capacity(self.outputs.len());
        for (output, cond_keys) in self.outputs.into_iter().zip(keys) {
            if cond_keys.len() != output.conditions.len() {
                return Err(TxGraphError::ArityMismatch {
                    what: "per-condition keys",
                    expected: output.conditions.len(),
                    actual: cond_keys.len(),
                });
            }
            let conditions = output
                .conditions
                .into_iter()
                .zip(cond_keys)
                .map(|(cond, keys)| KeyedCondition {
                    signature: cond.signature,
                    timeout_blocks: cond.timeout_blocks,
                    wots_specs: keys.wots_specs,
                    wots_public_keys: keys.wots_public_keys,
                })
                .collect();
            outputs.push(KeyedOutput { conditions });
        }
        Ok(KeyedTemplate {
            name: self.name,
            role: self.role,
            inputs: self.inputs,
            outputs,
        })
    }
}

impl KeyedTemplate {
    /// Attaches taproot scripts, one [`OutputScripts`] per output.
    pub fn with_scripts(self, scripts: Vec<OutputScripts>) -> Result<ScriptedTemplate, TxGraphError> {
        if scripts.len() != self.outputs.len() {
            return Err(TxGraphError::ArityMismatch {
                what: "per-output scripts",
                expected: self.outputs.len(),
                actual: scripts.len(),
            });
        }
        let mut outputs = Vec::with_capacity(self.outputs.len());
        for (output, output_scripts) in self.outputs.into_iter().zip(scripts) {
            if output_scripts.leaves.len() != output.conditions.len() {
                return Err(TxGraphError::ArityMismatch {
                    what: "per-condition leaves",
                    expected: output.conditions.len(),
                    actual: output_scripts.leaves.len(),
                });
            }
            let conditions = output
                .conditions
                .into_iter()
                .zip(output_scripts.leaves)
                .map(|(keys, leaf)| ScriptedCondition { keys, leaf })
                .collect();
            outputs.push(ScriptedOutput {
                script_pubkey: output_scripts.script_pubkey,
                conditions,
            });
        }
        Ok(ScriptedTemplate {
            name: self.name,
            role: self.role,
            inputs: self.inputs,
            outputs,
        })
    }
}

impl ScriptedTemplate {
    /// Attaches one amount per output.
    pub fn with_amounts(self, amounts: Vec<Amount>) -> Result<FundedTemplate, TxGraphError> {
        if amounts.len() != self.outputs.len() {
            return Err(TxGraphError::ArityMismatch {
                what: "per-output amounts",
                expected: self.outputs.len(),
                actual: amounts.len(),
            });
        }
        Ok(FundedTemplate {
            template: self,
            amounts,
        })
    }
}

impl FundedTemplate {
    /// Seals the template under its final txid.
    pub fn signed(self, txid: Txid) -> SignedTemplate {
        SignedTemplate {
            template: self,
            txid,
        }
    }
}

impl SignedTemplate {
    /// The template's name.
    pub fn name(&self) -> TemplateName {
        self.template.template.name
    }

    /// The publishing party.
    pub fn role(&self) -> Role {
        self.template.template.role
    }

    /// The txid the transaction confirms under.
    pub fn txid(&self) -> Txid {
        self.txid
    }

    /// Looks up one spending condition.
    pub fn condition(
        &self,
        output: usize,
        condition: usize,
    ) -> Result<&ScriptedCondition, TxGraphError> {
        self.template
            .template
            .outputs
            .get(output)
            .and_then(|o| o.conditions.get(condition))
            .ok_or(TxGraphError::MissingCondition {
                template: self.name(),
                output,
                condition,
            })
    }

    /// The relative timelock of one spending condition, if it is a timeout path.
    pub fn timeout_blocks(
        &self,
        output: usize,
        condition: usize,
    ) -> Result<Option<u16>, TxGraphError> {
        Ok(self.condition(output, condition)?.keys.timeout_blocks)
    }
}

/// The raw dispute graph: every template of one setup wired to its parents, with the
/// default timeout conditions on each contested edge.
///
/// The setup pipeline enriches these through the later stages; the state machines only
/// ever read the finished [`SignedTemplate`]s.
pub fn standard_graph() -> Vec<RawTemplate> {
    let data_output = |conditions: usize| RawOutput {
        conditions: vec![
            RawCondition {
                signature: SignatureKind::Both,
                timeout_blocks: None,
            };
            conditions
        ],
    };
    let timeout_condition = RawCondition {
        signature: SignatureKind::Both,
        timeout_blocks: Some(DEFAULT_TIMEOUT_BLOCKS),
    };
    let spend = |template: TemplateName, condition: usize| InputRef {
        template,
        output: 0,
        condition,
    };

    let mut graph = vec![
        RawTemplate {
            name: TemplateName::Proof,
            role: Role::Prover,
            inputs: Vec::new(),
            outputs: vec![RawOutput {
                // condition 0: challenge, condition 1: timeout to proof_uncontested
                conditions: vec![
                    RawCondition {
                        signature: SignatureKind::Both,
                        timeout_blocks: None,
                    },
                    timeout_condition,
                ],
            }],
        },
        RawTemplate {
            name: TemplateName::Challenge,
            role: Role::Verifier,
            inputs: vec![spend(TemplateName::Proof, 0)],
            outputs: vec![data_output(2)],
        },
    ];

    for round in 0..ITERATIONS as u8 {
        let parent = if round == 0 {
            TemplateName::Challenge
        } else {
            TemplateName::Select(round - 1)
        };
        graph.push(RawTemplate {
            name: TemplateName::State(round),
            role: Role::Prover,
            inputs: vec![spend(parent, 0)],
            outputs: vec![RawOutput {
                conditions: vec![
                    RawCondition {
                        signature: SignatureKind::Both,
                        timeout_blocks: None,
                    },
                    timeout_condition,
                ],
            }],
        });
        graph.push(RawTemplate {
            name: TemplateName::Select(round),
            role: Role::Verifier,
            inputs: vec![spend(TemplateName::State(round), 0)],
            outputs: vec![RawOutput {
                conditions: vec![
                    RawCondition {
                        signature: SignatureKind::Both,
                        timeout_blocks: None,
                    },
                    timeout_condition,
                ],
            }],
        });
    }

    // The argument's payload is spread across one output per committed value group,
    // bounded by the per-output commitment limit; only output 0 carries the contested
    // spending conditions.
    let mut argument_outputs = vec![RawOutput {
        // condition 0: refutation leaves, condition 1: timeout
        conditions: vec![
            RawCondition {
                signature: SignatureKind::Verifier,
                timeout_blocks: None,
            },
            timeout_condition,
        ],
    }];
    argument_outputs.resize(ARGUMENT_DATA_OUTPUTS, data_output(1));

    graph.extend([
        RawTemplate {
            name: TemplateName::Argument,
            role: Role::Prover,
            inputs: vec![spend(TemplateName::Select(ITERATIONS as u8 - 1), 0)],
            outputs: argument_outputs,
        },
        RawTemplate {
            name: TemplateName::ProofRefuted,
            role: Role::Verifier,
            inputs: vec![spend(TemplateName::Argument, 0)],
            outputs: vec![data_output(1)],
        },
        RawTemplate {
            name: TemplateName::ProofUncontested,
            role: Role::Prover,
            inputs: vec![spend(TemplateName::Proof, 1)],
            outputs: vec![data_output(1)],
        },
        RawTemplate {
            name: TemplateName::ArgumentUncontested,
            role: Role::Prover,
            inputs: vec![spend(TemplateName::Argument, 1)],
            outputs: vec![data_output(1)],
        },
    ]);

    graph
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash;

    use super::*;

    fn keys_for(template: &RawTemplate) -> Vec<Vec<CondKeys>> {
        template
            .outputs
            .iter()
            .map(|output| {
                output
                    .conditions
                    .iter()
                    .map(|_| CondKeys {
                        wots_specs: vec![WotsSpec::W24],
                        wots_public_keys: vec![WotsPublicKey(vec![[0u8; 20]; 10])],
                    })
                    .collect()
            })
            .collect()
    }

    fn scripts_for(template: &KeyedTemplate) -> Vec<OutputScripts> {
        template
            .outputs
            .iter()
            .map(|output| OutputScripts {
                script_pubkey: ScriptBuf::new(),
                leaves: output
                    .conditions
                    .iter()
                    .map(|_| LeafSpend {
                        script: ScriptBuf::new(),
                        control_block: vec![0xc0],
                    })
                    .collect(),
            })
            .collect()
    }

    #[test]
    fn pipeline_reaches_signed_stage() {
        for raw in standard_graph() {
            let keys = keys_for(&raw);
            let keyed = raw.with_keys(keys).unwrap();
            let scripts = scripts_for(&keyed);
            let scripted = keyed.with_scripts(scripts).unwrap();
            let amounts = vec![Amount::from_sat(330); scripted.outputs.len()];
            let signed = scripted
                .with_amounts(amounts)
                .unwrap()
                .signed(Txid::all_zeros());
            assert!(signed.condition(0, 0).is_ok());
        }
    }

    #[test]
    fn arity_mismatches_are_rejected() {
        let raw = standard_graph().remove(0);
        assert!(matches!(
            raw.with_keys(vec![]),
            Err(TxGraphError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn timeout_edges_carry_their_locks() {
        let graph = standard_graph();
        let proof = graph.iter().find(|t| t.name == TemplateName::Proof).unwrap();
        assert_eq!(
            proof.outputs[0].conditions[1].timeout_blocks,
            Some(DEFAULT_TIMEOUT_BLOCKS)
        );
        let refuted = graph
            .iter()
            .find(|t| t.name == TemplateName::ProofRefuted)
            .unwrap();
        assert_eq!(refuted.inputs[0].condition, 0);
    }
}
