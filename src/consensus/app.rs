//! The consensus application
//!
//! Implements the engine's hook contract: transaction decode/validate in
//! `PrepareProposal`/`CheckTx`, agent deliberation in `ProcessProposal`,
//! validator-set mutation buffered in `RegisterValidator` and applied as a
//! single batch in `EndBlock`. Every hook returns a tagged value; bad input
//! never panics.

use chrono::Utc;
use serde_json::json;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::bft::types::{AppInfo, ConsensusParams, ProposalDecision, TxResult, ValidatorUpdate};
use crate::core::{
    Agent, Block, Transaction, TX_DISCUSS, TX_LOAN_REQUEST, TX_REGISTER_VALIDATOR, TX_SUBMIT_PAPER,
};
use crate::da::{DiscussionEntry, VoteEntry};
use crate::deliberation::{
    multi_round_loan_review, multi_round_paper_review, validator_discussion, ResearchPaper,
};
use crate::discussions::DiscussionLog;
use crate::events::{EventHub, EVENT_AGENT_VOTE};
use crate::llm::LlmClient;
use crate::registry::AgentRegistry;

/// Voting power granted to validators registered through transactions.
pub const REGISTERED_VALIDATOR_POWER: i64 = 100;

/// Deliberation transcript accumulated during ProcessProposal, drained by
/// the engine driver after commit for DA persistence.
#[derive(Default)]
pub struct BlockTranscript {
    pub discussions: Vec<DiscussionEntry>,
    pub votes: Vec<VoteEntry>,
    pub agent_identities: Vec<String>,
}

pub struct Application {
    chain_id: String,
    self_validator_addr: String,
    llm: Arc<dyn LlmClient>,
    registry: Arc<AgentRegistry>,
    discussion_log: DiscussionLog,
    hub: EventHub,
    /// Live validator set; mutated only in InitChain and EndBlock
    validators: RwLock<Vec<ValidatorUpdate>>,
    /// Deltas buffered until the next EndBlock
    pending_updates: RwLock<Vec<ValidatorUpdate>>,
    transcript: Mutex<BlockTranscript>,
}

impl Application {
    pub fn new(
        chain_id: &str,
        self_validator_addr: &str,
        llm: Arc<dyn LlmClient>,
        registry: Arc<AgentRegistry>,
        discussion_log: DiscussionLog,
        hub: EventHub,
    ) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            self_validator_addr: self_validator_addr.to_string(),
            llm,
            registry,
            discussion_log,
            hub,
            validators: RwLock::new(Vec::new()),
            pending_updates: RwLock::new(Vec::new()),
            transcript: Mutex::new(BlockTranscript::default()),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    // ---- hooks -----------------------------------------------------------

    pub fn info(&self) -> AppInfo {
        AppInfo {
            data: "Conclave".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            app_version: 1,
        }
    }

    /// Install the initial validator set verbatim from the genesis document.
    pub fn init_chain(&self, genesis_validators: Vec<ValidatorUpdate>) -> ConsensusParams {
        info!(
            chain = %self.chain_id,
            validators = genesis_validators.len(),
            "InitChain: installing genesis validator set"
        );
        *self.validators.write().expect("validator lock poisoned") = genesis_validators;
        ConsensusParams::default()
    }

    /// Stateless decode gate: accept anything that parses.
    pub fn check_tx(&self, tx: &[u8]) -> TxResult {
        match Transaction::decode(tx) {
            Ok(_) => TxResult::Ok(String::new()),
            Err(e) => TxResult::Error(format!("invalid transaction format: {}", e)),
        }
    }

    /// Leader-side filter. Malformed transactions are dropped silently;
    /// ordering of the survivors is preserved.
    pub fn prepare_proposal(&self, txs: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        let mut valid = Vec::new();
        for raw in txs {
            let Ok(tx) = Transaction::decode(&raw) else {
                warn!(chain = %self.chain_id, "Dropping undecodable transaction from proposal");
                continue;
            };

            let include = match tx.tx_type.as_str() {
                TX_REGISTER_VALIDATOR => !tx.data.is_empty(),
                TX_DISCUSS => !tx.content.is_empty(),
                TX_LOAN_REQUEST => !tx.content.is_empty(),
                TX_SUBMIT_PAPER => match serde_json::from_str::<ResearchPaper>(&tx.content) {
                    Ok(paper) => !paper.title.is_empty() && !paper.content.is_empty(),
                    Err(_) => false,
                },
                _ => false,
            };

            if include {
                valid.push(raw);
            } else {
                info!(
                    chain = %self.chain_id,
                    tx_type = %tx.tx_type,
                    from = %tx.from,
                    "Excluding transaction from proposal"
                );
            }
        }
        valid
    }

    /// Follower-side accept/reject. Runs the deliberator for the reviewed
    /// transaction types; the first rejection short-circuits.
    pub async fn process_proposal(&self, txs: &[Vec<u8>], block: &Block) -> ProposalDecision {
        let Some(agent) = self
            .registry
            .agent_by_validator(&self.chain_id, &self.self_validator_addr)
            .await
        else {
            info!(
                chain = %self.chain_id,
                validator = %self.self_validator_addr,
                "No agent bound to this validator, accepting by default"
            );
            return ProposalDecision::Accept;
        };

        for (i, raw) in txs.iter().enumerate() {
            let Ok(tx) = Transaction::decode(raw) else {
                warn!(chain = %self.chain_id, index = i, "Skipping undecodable transaction");
                continue;
            };

            let decision = match tx.tx_type.as_str() {
                TX_SUBMIT_PAPER => self.deliberate_paper(&agent, &tx).await,
                TX_LOAN_REQUEST => self.deliberate_loan(&agent, &tx).await,
                TX_DISCUSS => self.deliberate_discussion(&agent, &tx, block).await,
                _ => ProposalDecision::Accept,
            };

            if let ProposalDecision::Reject(reason) = decision {
                return ProposalDecision::Reject(reason);
            }
        }

        ProposalDecision::Accept
    }

    /// State transition. `register_validator` buffers a validator-set delta
    /// and binds the agent; the deliberated types are logged only.
    pub async fn deliver_tx(&self, raw: &[u8]) -> TxResult {
        let tx = match Transaction::decode(raw) {
            Ok(tx) => tx,
            Err(e) => return TxResult::Error(format!("invalid transaction format: {}", e)),
        };

        match tx.tx_type.as_str() {
            TX_REGISTER_VALIDATOR => {
                let Ok(pub_key) = <[u8; 32]>::try_from(tx.data.as_slice()) else {
                    return TxResult::Error("validator public key must be 32 bytes".to_string());
                };

                let update = ValidatorUpdate::new(pub_key, REGISTERED_VALIDATOR_POWER);
                let addr = update.address();
                self.register_validator(update);

                if !tx.from.is_empty() {
                    if let Err(e) = self
                        .registry
                        .link_validator(&self.chain_id, &tx.from, &addr)
                        .await
                    {
                        warn!(chain = %self.chain_id, "Failed to persist validator binding: {}", e);
                    }
                }

                info!(chain = %self.chain_id, from = %tx.from, address = %addr, "Registered validator");
                TxResult::Ok(format!("Validator {} registered successfully", tx.from))
            }
            TX_SUBMIT_PAPER | TX_LOAN_REQUEST | TX_DISCUSS => {
                info!(chain = %self.chain_id, tx_type = %tx.tx_type, from = %tx.from, "Accepted transaction");
                TxResult::Ok(format!("{} accepted from {}", tx.tx_type, tx.from))
            }
            _ => TxResult::Ok(String::new()),
        }
    }

    /// Apply pending validator-set deltas as one batch: replace-or-append by
    /// 32-byte key. Readers of the live set never observe a partial batch.
    pub fn end_block(&self, height: u64) -> Vec<ValidatorUpdate> {
        let mut pending = self.pending_updates.write().expect("validator lock poisoned");
        if pending.is_empty() {
            return Vec::new();
        }

        info!(
            chain = %self.chain_id,
            height,
            updates = pending.len(),
            "EndBlock: applying validator updates"
        );

        let updates: Vec<ValidatorUpdate> = pending.drain(..).collect();
        let mut live = self.validators.write().expect("validator lock poisoned");
        for update in &updates {
            match live.iter_mut().find(|v| v.pub_key == update.pub_key) {
                Some(existing) => existing.power = update.power,
                None => live.push(update.clone()),
            }
        }

        updates
    }

    /// No durable state beyond what the engine persists.
    pub fn commit(&self) {}

    // ---- validator-set bookkeeping ---------------------------------------

    /// Buffer a validator-set delta, deduplicating by key against both the
    /// live set and the already-pending deltas. The live set is untouched
    /// until EndBlock.
    pub fn register_validator(&self, update: ValidatorUpdate) {
        let live = self.validators.read().expect("validator lock poisoned");
        if live.iter().any(|v| v.pub_key == update.pub_key) {
            info!(chain = %self.chain_id, "Validator already in live set, not adding again");
            return;
        }
        drop(live);

        let mut pending = self.pending_updates.write().expect("validator lock poisoned");
        if pending.iter().any(|v| v.pub_key == update.pub_key) {
            info!(chain = %self.chain_id, "Validator already pending, not adding again");
            return;
        }
        pending.push(update);
    }

    pub fn live_validators(&self) -> Vec<ValidatorUpdate> {
        self.validators
            .read()
            .expect("validator lock poisoned")
            .clone()
    }

    /// Drain the deliberation transcript accumulated for the current block.
    pub fn take_transcript(&self) -> BlockTranscript {
        std::mem::take(&mut *self.transcript.lock().expect("transcript lock poisoned"))
    }

    // ---- deliberation ----------------------------------------------------

    fn record_transcript(&self, agent: &Agent, entry_type: &str, round: u32, message: &str, approval: bool) {
        let mut transcript = self.transcript.lock().expect("transcript lock poisoned");
        transcript.discussions.push(DiscussionEntry {
            id: Uuid::new_v4().to_string(),
            validator_id: agent.id.clone(),
            message: message.to_string(),
            timestamp: Utc::now(),
            entry_type: entry_type.to_string(),
            round,
        });
        transcript.votes.push(VoteEntry {
            validator_id: agent.id.clone(),
            approval,
        });
        if !transcript.agent_identities.contains(&agent.name) {
            transcript.agent_identities.push(agent.name.clone());
        }
    }

    async fn deliberate_paper(&self, agent: &Agent, tx: &Transaction) -> ProposalDecision {
        let paper: ResearchPaper = match serde_json::from_str(&tx.content) {
            Ok(p) => p,
            Err(e) => {
                return ProposalDecision::Reject(format!("unparseable paper submission: {}", e))
            }
        };

        let review = multi_round_paper_review(
            self.llm.as_ref(),
            agent,
            &paper,
            &self.chain_id,
            &self.discussion_log,
        )
        .await;

        self.record_transcript(agent, "paper_review", 0, &review.summary, review.approval);
        self.broadcast_vote(agent, review.approval, &review.summary);

        if review.approval {
            ProposalDecision::Accept
        } else {
            ProposalDecision::Reject(format!("{} rejected paper \"{}\"", agent.name, paper.title))
        }
    }

    async fn deliberate_loan(&self, agent: &Agent, tx: &Transaction) -> ProposalDecision {
        let review = multi_round_loan_review(
            self.llm.as_ref(),
            agent,
            &tx.content,
            &self.chain_id,
            &self.discussion_log,
        )
        .await;

        self.record_transcript(agent, "loan_review", 0, &review.summary, review.approval);
        self.broadcast_vote(agent, review.approval, &review.summary);

        if review.approval {
            ProposalDecision::Accept
        } else {
            ProposalDecision::Reject(format!("{} rejected loan request", agent.name))
        }
    }

    async fn deliberate_discussion(
        &self,
        agent: &Agent,
        tx: &Transaction,
        block: &Block,
    ) -> ProposalDecision {
        let opinion = validator_discussion(self.llm.as_ref(), agent, tx).await;

        if let Err(e) = self
            .discussion_log
            .append(
                &self.chain_id,
                &crate::discussions::format_round_line(
                    opinion.round,
                    opinion.support,
                    &agent.name,
                    &opinion.message,
                ),
            )
            .await
        {
            warn!(chain = %self.chain_id, "Failed to append discussion line: {}", e);
        }

        self.record_transcript(agent, "discussion", opinion.round, &opinion.message, opinion.support);
        self.broadcast_vote(agent, opinion.support, &opinion.message);

        if opinion.support {
            ProposalDecision::Accept
        } else {
            ProposalDecision::Reject(format!(
                "{} did not support discussion at height {}",
                agent.name, block.height
            ))
        }
    }

    fn broadcast_vote(&self, agent: &Agent, approval: bool, message: &str) {
        self.hub.broadcast(
            EVENT_AGENT_VOTE,
            json!({
                "validatorId": agent.id,
                "validatorName": agent.name,
                "approval": approval,
                "message": message,
                "chainId": self.chain_id,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentRole;
    use crate::deliberation::testutil::ScriptedLlm;

    async fn test_app(llm: Arc<dyn LlmClient>, dir: &std::path::Path) -> Application {
        let registry = Arc::new(AgentRegistry::load(dir).await);
        Application::new(
            "demo",
            "SELFADDR",
            llm,
            registry,
            DiscussionLog::new(dir),
            EventHub::new(64),
        )
    }

    async fn bind_agent(app: &Application) {
        let mut agent = Agent::new("a1", "Ada", AgentRole::Validator)
            .with_traits(vec!["analytical".into()]);
        agent.is_validator = true;
        app.registry.register_agent("demo", agent).await.unwrap();
        app.registry
            .link_validator("demo", "a1", "SELFADDR")
            .await
            .unwrap();
    }

    fn block(txs: Vec<Vec<u8>>) -> Block {
        Block {
            height: 1,
            hash: "h1".into(),
            prev_hash: "h0".into(),
            proposer: "genesis".into(),
            timestamp: Utc::now(),
            txs,
        }
    }

    fn paper_tx(title: &str, content: &str) -> Vec<u8> {
        let paper = json!({
            "title": title,
            "abstract": "A",
            "content": content,
            "author": "author",
            "topic_tags": [],
            "timestamp": 0,
        });
        Transaction {
            tx_type: TX_SUBMIT_PAPER.to_string(),
            from: "client".into(),
            content: paper.to_string(),
            data: vec![],
            chain_id: "demo".into(),
        }
        .encode()
        .unwrap()
    }

    #[tokio::test]
    async fn test_prepare_proposal_filters_by_type() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(Arc::new(ScriptedLlm::repeating("{}")), dir.path()).await;

        let txs = vec![
            Transaction::register_validator("demo", "v1", &[1u8; 32]).encode().unwrap(),
            // register with empty key: dropped
            Transaction::register_validator("demo", "v2", &[]).encode().unwrap(),
            Transaction::discussion("demo", "v1", "a topic").encode().unwrap(),
            // empty discussion: dropped
            Transaction::discussion("demo", "v1", "").encode().unwrap(),
            paper_tx("P", "C"),
            // paper with empty title: dropped
            paper_tx("", "C"),
            // garbage: dropped silently
            b"not json".to_vec(),
        ];

        let kept = app.prepare_proposal(txs.clone());
        assert_eq!(kept.len(), 3);
        // Ordering preserved
        assert_eq!(kept[0], txs[0]);
        assert_eq!(kept[1], txs[2]);
        assert_eq!(kept[2], txs[4]);
    }

    #[tokio::test]
    async fn test_process_proposal_unbound_accepts() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(Arc::new(ScriptedLlm::repeating("{}")), dir.path()).await;

        let txs = vec![Transaction::discussion("demo", "v1", "topic").encode().unwrap()];
        let decision = app.process_proposal(&txs, &block(txs.clone())).await;
        assert_eq!(decision, ProposalDecision::Accept);
    }

    #[tokio::test]
    async fn test_process_proposal_rejects_on_no_support() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::repeating(
            r#"{"message":"I disagree","support":false,"oppose":true,"question":false}"#,
        ));
        let app = test_app(llm, dir.path()).await;
        bind_agent(&app).await;

        let txs = vec![Transaction::discussion("demo", "v1", "topic").encode().unwrap()];
        let decision = app.process_proposal(&txs, &block(txs.clone())).await;
        assert!(matches!(decision, ProposalDecision::Reject(_)));
    }

    #[tokio::test]
    async fn test_process_proposal_outcome_is_and_of_approvals() {
        let dir = tempfile::tempdir().unwrap();
        // Two discussion txs: first supported, second not; block rejects
        let llm = Arc::new(ScriptedLlm::new(vec![
            r#"{"message":"fine","support":true,"oppose":false,"question":false}"#.to_string(),
            r#"{"message":"no","support":false,"oppose":true,"question":false}"#.to_string(),
        ]));
        let app = test_app(llm, dir.path()).await;
        bind_agent(&app).await;

        let txs = vec![
            Transaction::discussion("demo", "v1", "topic one").encode().unwrap(),
            Transaction::discussion("demo", "v1", "topic two").encode().unwrap(),
        ];
        let decision = app.process_proposal(&txs, &block(txs.clone())).await;
        assert!(matches!(decision, ProposalDecision::Reject(_)));
    }

    #[tokio::test]
    async fn test_register_validator_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(Arc::new(ScriptedLlm::repeating("{}")), dir.path()).await;

        let update = ValidatorUpdate::new([7u8; 32], 100);
        app.register_validator(update.clone());
        app.register_validator(update.clone());

        let applied = app.end_block(1);
        assert_eq!(applied.len(), 1);
        assert_eq!(app.live_validators().len(), 1);

        // Registering again after it is live produces nothing
        app.register_validator(update);
        assert!(app.end_block(2).is_empty());
        assert_eq!(app.live_validators().len(), 1);
    }

    #[tokio::test]
    async fn test_validator_set_convergence_replace_or_append() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(Arc::new(ScriptedLlm::repeating("{}")), dir.path()).await;
        app.init_chain(vec![ValidatorUpdate::new([1u8; 32], 1_000_000)]);

        app.register_validator(ValidatorUpdate::new([2u8; 32], 100));
        app.register_validator(ValidatorUpdate::new([3u8; 32], 100));
        app.end_block(1);

        let live = app.live_validators();
        assert_eq!(live.len(), 3);
        let keys: Vec<[u8; 32]> = live.iter().map(|v| v.pub_key).collect();
        assert!(keys.contains(&[1u8; 32]));
        assert!(keys.contains(&[2u8; 32]));
        assert!(keys.contains(&[3u8; 32]));
    }

    #[tokio::test]
    async fn test_deliver_register_validator_binds_agent() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(Arc::new(ScriptedLlm::repeating("{}")), dir.path()).await;
        app.registry
            .register_agent("demo", Agent::new("a1", "Ada", AgentRole::Validator))
            .await
            .unwrap();

        let raw = Transaction::register_validator("demo", "a1", &[9u8; 32]).encode().unwrap();
        let result = app.deliver_tx(&raw).await;
        assert!(result.is_ok());

        let expected_addr = ValidatorUpdate::new([9u8; 32], 100).address();
        let agent = app
            .registry
            .agent_by_validator("demo", &expected_addr)
            .await
            .unwrap();
        assert_eq!(agent.id, "a1");
        assert!(agent.is_validator);
    }

    #[tokio::test]
    async fn test_deliver_tx_rejects_bad_key_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(Arc::new(ScriptedLlm::repeating("{}")), dir.path()).await;

        let raw = Transaction::register_validator("demo", "a1", &[1u8; 5]).encode().unwrap();
        assert!(matches!(app.deliver_tx(&raw).await, TxResult::Error(_)));

        assert!(matches!(app.deliver_tx(b"garbage").await, TxResult::Error(_)));
    }

    #[tokio::test]
    async fn test_check_tx_is_a_decode_gate() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(Arc::new(ScriptedLlm::repeating("{}")), dir.path()).await;

        let ok = Transaction::discussion("demo", "v1", "x").encode().unwrap();
        assert!(app.check_tx(&ok).is_ok());
        assert!(!app.check_tx(b"][").is_ok());
    }
}
