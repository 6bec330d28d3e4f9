//! The pre-signed transaction graph of one dispute setup.
//!
//! Templates are built in fixed stages, each an immutable value type that adds exactly
//! the fields its stage is responsible for: structure, then commitment keys, then
//! taproot scripts, then amounts, then the final txid. A template can only reach a
//! later stage by passing through the earlier ones, so "field X is present by stage Y"
//! holds by construction rather than by optional-field discipline.

use thiserror::Error;

mod keys;
mod names;
mod stages;

pub use keys::{keys_for_template, value_specs};
pub use names::{TemplateName, DISPUTE_GRAPH_ORDER};
pub use stages::{
    standard_graph, CondKeys, FundedTemplate, InputRef, KeyedCondition, KeyedOutput,
    KeyedTemplate, LeafSpend, OutputScripts, RawCondition, RawOutput, RawTemplate, Role,
    ScriptedCondition, ScriptedOutput, ScriptedTemplate, SignatureKind, SignedTemplate,
    ARGUMENT_DATA_OUTPUTS,
};

/// Structural failures while assembling the graph. These are setup bugs: fatal, never
/// retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TxGraphError {
    /// A stage was fed data whose shape does not match the template.
    #[error("{what}: got {actual}, expected {expected}")]
    ArityMismatch {
        /// What was being attached.
        what: &'static str,
        /// Expected element count.
        expected: usize,
        /// Observed element count.
        actual: usize,
    },

    /// A round index is outside the game's round count.
    #[error("round {0} outside the dispute round count")]
    BadRound(u8),

    /// A referenced output or spending condition does not exist.
    #[error("template {template} has no condition {condition} on output {output}")]
    MissingCondition {
        /// The referenced template.
        template: TemplateName,
        /// The referenced output index.
        output: usize,
        /// The referenced condition index.
        condition: usize,
    },
}
