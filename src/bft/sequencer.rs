//! Local block sequencer
//!
//! Stand-in driver for the external consensus engine: drains a mempool on a
//! fixed cadence and feeds the application hooks strictly in order
//! (`PrepareProposal → ProcessProposal → DeliverTx → EndBlock → Commit`),
//! one block at a time. Performs no voting, gossip or cryptographic
//! commitment. On commit, the block's deliberation transcript is persisted
//! through the DA service; a rejected proposal leaves the committed height
//! unchanged and writes no blob.

use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::types::ProposalDecision;
use crate::consensus::Application;
use crate::core::Block;
use crate::da::{DaService, OffchainDiscussionData};
use crate::discussions::DiscussionLog;
use crate::events::{EventHub, EVENT_BLOCK_PROPOSED, EVENT_BLOCK_VALIDATED};
use crate::types::{ConclaveError, Result};

const MEMPOOL_CAPACITY: usize = 1024;

/// Committed blocks for one chain, indexed by height.
#[derive(Default)]
pub struct ChainStore {
    blocks: RwLock<BTreeMap<u64, Block>>,
}

impl ChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, block: Block) {
        self.blocks
            .write()
            .expect("chain store lock poisoned")
            .insert(block.height, block);
    }

    pub fn by_height(&self, height: u64) -> Option<Block> {
        self.blocks
            .read()
            .expect("chain store lock poisoned")
            .get(&height)
            .cloned()
    }

    /// Latest committed (height, hash); (0, "") before the first block.
    pub fn latest(&self) -> (u64, String) {
        let blocks = self.blocks.read().expect("chain store lock poisoned");
        blocks
            .iter()
            .next_back()
            .map(|(h, b)| (*h, b.hash.clone()))
            .unwrap_or((0, String::new()))
    }
}

pub struct LocalSequencer {
    chain_id: String,
    mempool_tx: mpsc::Sender<Vec<u8>>,
}

impl LocalSequencer {
    /// Start the sequencer task. Returns the handle used to submit
    /// transactions plus the task's join handle.
    pub fn spawn(
        chain_id: &str,
        app: Arc<Application>,
        store: Arc<ChainStore>,
        da: Arc<DaService>,
        hub: EventHub,
        discussion_log: DiscussionLog,
        block_interval: std::time::Duration,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (mempool_tx, mut mempool_rx) = mpsc::channel::<Vec<u8>>(MEMPOOL_CAPACITY);
        let sequencer = Arc::new(Self {
            chain_id: chain_id.to_string(),
            mempool_tx,
        });

        let chain_id = chain_id.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(block_interval);
            loop {
                ticker.tick().await;

                // Drain whatever is in the mempool; no empty blocks
                let mut txs = Vec::new();
                while let Ok(tx) = mempool_rx.try_recv() {
                    txs.push(tx);
                }
                if txs.is_empty() {
                    continue;
                }

                produce_block(&chain_id, &app, &store, &da, &hub, &discussion_log, txs).await;
            }
        });

        (sequencer, handle)
    }

    /// Queue a transaction for the next block. Returns its hash.
    pub async fn submit_tx(&self, tx: Vec<u8>) -> Result<String> {
        let hash = tx_hash(&tx);
        self.mempool_tx
            .send(tx)
            .await
            .map_err(|_| ConclaveError::Internal("sequencer mempool closed".to_string()))?;
        info!(chain = %self.chain_id, hash = %hash, "Transaction queued");
        Ok(hash)
    }
}

/// Hash a raw transaction for client receipts.
pub fn tx_hash(tx: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode_upper(Sha256::digest(tx))
}

async fn produce_block(
    chain_id: &str,
    app: &Arc<Application>,
    store: &Arc<ChainStore>,
    da: &Arc<DaService>,
    hub: &EventHub,
    discussion_log: &DiscussionLog,
    txs: Vec<Vec<u8>>,
) {
    // Leader-side filter
    let txs = app.prepare_proposal(txs);
    if txs.is_empty() {
        return;
    }

    let (latest_height, prev_hash) = store.latest();
    let height = latest_height + 1;
    let hash = Block::compute_hash(chain_id, height, &prev_hash, &txs);
    let block = Block {
        height,
        hash: hash.clone(),
        prev_hash,
        proposer: "genesis".to_string(),
        timestamp: Utc::now(),
        txs: txs.clone(),
    };

    hub.broadcast(
        EVENT_BLOCK_PROPOSED,
        json!({
            "chainId": chain_id,
            "height": height,
            "hash": hash,
            "prevHash": block.prev_hash,
            "proposer": block.proposer,
            "numTxs": txs.len(),
        }),
    );

    // Follower-side deliberation
    let decision = app.process_proposal(&txs, &block).await;
    let transcript = app.take_transcript();

    if let ProposalDecision::Reject(reason) = decision {
        warn!(chain = %chain_id, height, reason = %reason, "Block rejected by deliberation");
        hub.broadcast(
            EVENT_BLOCK_VALIDATED,
            json!({
                "chainId": chain_id,
                "height": height,
                "hash": hash,
                "approved": false,
                "reason": reason,
            }),
        );
        return;
    }

    // Commit path: strictly serial per block
    for tx in &txs {
        let result = app.deliver_tx(tx).await;
        if !result.is_ok() {
            warn!(chain = %chain_id, height, "DeliverTx error (logged, block continues)");
        }
    }
    let updates = app.end_block(height);
    app.commit();
    store.insert(block);

    info!(
        chain = %chain_id,
        height,
        txs = txs.len(),
        validator_updates = updates.len(),
        "Block committed"
    );

    hub.broadcast(
        EVENT_BLOCK_VALIDATED,
        json!({
            "chainId": chain_id,
            "height": height,
            "hash": hash,
            "approved": true,
        }),
    );

    // Persist the deliberation transcript keyed to the new block and
    // advance the chain's deliberation round
    if !transcript.discussions.is_empty() || !transcript.votes.is_empty() {
        let data = OffchainDiscussionData {
            discussions: transcript.discussions,
            votes: transcript.votes,
            outcome: "accepted".to_string(),
            agent_identities: transcript.agent_identities,
            timestamp: Utc::now(),
        };
        if let Err(e) = da
            .put_discussion_blob(chain_id, &hash, height, "accepted", &data)
            .await
        {
            error!(chain = %chain_id, height, "Failed to persist discussion blob: {}", e);
        }
        if let Err(e) = discussion_log.increment_round(chain_id).await {
            warn!(chain = %chain_id, "Failed to advance round counter: {}", e);
        }
    }
}
