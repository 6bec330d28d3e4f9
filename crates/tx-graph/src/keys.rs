//! Commitment-key derivation for the dispute graph.

use snark_dispute_params::{FIELDS_PER_OUTPUT, ITERATIONS, REGISTER_PROOF_LEN};
use snark_dispute_wots::{public_key, WotsSpec};

use crate::{CondKeys, RawTemplate, TemplateName};

/// The commitment flavors of the values one template output carries.
///
/// `witness_len` is the number of proof witness values the opening transaction
/// commits; everything else is fixed by the protocol. Outputs that commit nothing
/// (timeout claims, the challenge) get an empty list.
pub fn value_specs(name: TemplateName, output: usize, witness_len: usize) -> Vec<WotsSpec> {
    match (name, output) {
        (TemplateName::Proof, 0) => vec![WotsSpec::W256x4; witness_len],
        (TemplateName::State(_), 0) => vec![WotsSpec::W256; 9],
        (TemplateName::Select(_), 0) => vec![WotsSpec::W24],
        // The selection digits republished for on-chain re-derivation, plus the index.
        (TemplateName::Argument, 0) => vec![WotsSpec::W24; ITERATIONS + 1],
        (TemplateName::Argument, 1) => vec![WotsSpec::W256x4; 4],
        (TemplateName::Argument, n) => {
            let middle = REGISTER_PROOF_LEN - 2;
            let offset = ((n - 2) % middle.div_ceil(FIELDS_PER_OUTPUT)) * FIELDS_PER_OUTPUT;
            vec![WotsSpec::W256x4; (middle - offset).min(FIELDS_PER_OUTPUT)]
        }
        (TemplateName::ProofRefuted, 0) => vec![WotsSpec::W256x4; 5],
        _ => Vec::new(),
    }
}

/// Derives every spending condition's commitment keys for one template.
///
/// Labels bind each key chain to its exact slot, so no two committed values ever
/// share a chain: `{template}/{output}/{condition}/{value}`.
pub fn keys_for_template(
    secret: &[u8],
    template: &RawTemplate,
    witness_len: usize,
) -> Vec<Vec<CondKeys>> {
    template
        .outputs
        .iter()
        .enumerate()
        .map(|(output_idx, output)| {
            output
                .conditions
                .iter()
                .enumerate()
                .map(|(cond_idx, condition)| {
                    // Timeout paths reveal nothing; only data paths carry chains.
                    let specs = if condition.timeout_blocks.is_some() || cond_idx != 0 {
                        Vec::new()
                    } else {
                        value_specs(template.name, output_idx, witness_len)
                    };
                    let wots_public_keys = specs
                        .iter()
                        .enumerate()
                        .map(|(value_idx, &spec)| {
                            let label = format!(
                                "{}/{}/{}/{}",
                                template.name, output_idx, cond_idx, value_idx
                            );
                            public_key(spec, secret, &label)
                        })
                        .collect();
                    CondKeys {
                        wots_specs: specs,
                        wots_public_keys,
                    }
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::standard_graph;

    use super::*;

    #[test]
    fn argument_outputs_chunk_the_proofs() {
        // Head, operands, then 12+1 hashes per membership proof.
        assert_eq!(value_specs(TemplateName::Argument, 0, 8).len(), 7);
        assert_eq!(value_specs(TemplateName::Argument, 1, 8).len(), 4);
        assert_eq!(value_specs(TemplateName::Argument, 2, 8).len(), 12);
        assert_eq!(value_specs(TemplateName::Argument, 3, 8).len(), 1);
        assert_eq!(value_specs(TemplateName::Argument, 7, 8).len(), 1);
    }

    #[test]
    fn every_graph_template_gets_matching_keys() {
        let secret = b"test master secret";
        for raw in standard_graph() {
            let keys = keys_for_template(secret, &raw, 8);
            let keyed = raw.with_keys(keys).unwrap();
            for output in &keyed.outputs {
                for condition in &output.conditions {
                    assert_eq!(
                        condition.wots_specs.len(),
                        condition.wots_public_keys.len()
                    );
                    for (spec, key) in condition
                        .wots_specs
                        .iter()
                        .zip(&condition.wots_public_keys)
                    {
                        assert_eq!(key.0.len(), spec.total_nibbles());
                    }
                }
            }
        }
    }

    #[test]
    fn labels_make_keys_distinct() {
        let graph = standard_graph();
        let state = graph
            .iter()
            .find(|t| t.name == TemplateName::State(0))
            .unwrap();
        let keys = keys_for_template(b"secret", state, 8);
        let pks = &keys[0][0].wots_public_keys;
        assert_eq!(pks.len(), 9);
        assert!(pks.windows(2).all(|w| w[0] != w[1]));
    }
}
