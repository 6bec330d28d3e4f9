//! Shared polling machinery for both agents.

use std::{collections::HashMap, sync::Arc};

use snark_dispute_chain::ChainReader;
use snark_dispute_db::{ConfirmedTemplate, DisputeDb};
use snark_dispute_tx_graph::{SignedTemplate, TemplateName};
use tracing::{debug, warn};

use crate::{ProtocolError, TemplateDecoder};

/// Scans blocks between the setup's last checked height and the current tip for the
/// setup's template txids, recording every confirmation found.
///
/// Failures reading a single block stop the scan for this cycle without advancing the
/// checkpoint, so the next poll retries the same block; confirmations already recorded
/// are kept (re-recording is a no-op).
pub async fn scan_new_blocks(
    db: &Arc<dyn DisputeDb>,
    chain: &Arc<dyn ChainReader>,
    decoder: &Arc<dyn TemplateDecoder>,
    setup_id: &str,
) -> Result<(), ProtocolError> {
    let setup = db.setup(setup_id).await?;
    let tip = chain.get_block_count().await?;
    if tip <= setup.last_checked_height {
        return Ok(());
    }

    let templates = db.templates(setup_id).await?;
    let by_txid: HashMap<_, TemplateName> = templates
        .iter()
        .map(|t: &SignedTemplate| (t.txid(), t.name()))
        .collect();

    for height in setup.last_checked_height + 1..=tip {
        let block = match chain.get_block_hash(height).await {
            Ok(hash) => match chain.get_block(&hash).await {
                Ok(block) => block,
                Err(err) => {
                    warn!(%err, height, "skipping block read this cycle");
                    return Ok(());
                }
            },
            Err(err) => {
                warn!(%err, height, "skipping block read this cycle");
                return Ok(());
            }
        };

        for tx in &block.txdata {
            let txid = tx.compute_txid();
            let Some(&name) = by_txid.get(&txid) else {
                continue;
            };
            let data = decoder.decode(name, tx)?;
            debug!(%txid, template = %name, height, "recording confirmation");
            db.record_confirmation(
                setup_id,
                ConfirmedTemplate {
                    name,
                    txid,
                    height,
                    data,
                },
            )
            .await?;
        }
        db.set_last_checked_height(setup_id, height).await?;
    }
    Ok(())
}

/// The timeout, in blocks, of a template's timeout spending condition.
///
/// By convention the timeout path is condition 1 of output 0; a template without one
/// is a setup bug.
pub(crate) fn timeout_of(
    templates: &[SignedTemplate],
    name: TemplateName,
) -> Result<u16, ProtocolError> {
    let template = templates
        .iter()
        .find(|t| t.name() == name)
        .ok_or_else(|| {
            ProtocolError::TxGraph(snark_dispute_tx_graph::TxGraphError::MissingCondition {
                template: name,
                output: 0,
                condition: 1,
            })
        })?;
    template
        .timeout_blocks(0, 1)?
        .ok_or_else(|| {
            ProtocolError::TxGraph(snark_dispute_tx_graph::TxGraphError::MissingCondition {
                template: name,
                output: 0,
                condition: 1,
            })
        })
}
