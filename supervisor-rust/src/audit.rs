//! # audit
//!
//! SHA-256 chained, append-only log of the supervisor's interventions.
//!
//! Every directive the supervisor issues, every hand-over to another
//! authority and every parameter change is appended as a block whose hash
//! covers the previous block's hash. Editing or dropping a line breaks the
//! chain, which [`verify_chain`] detects.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

// ── Audit Event Types ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    /// Supervisor session started or stopped
    SessionEvent,
    /// A plan-generation request was issued
    DirectiveIssued,
    /// Another authority took over plan control
    Relinquished,
    /// Policy parameters changed at runtime
    ParametersUpdated,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SessionEvent => "SESSION_EVENT",
            Self::DirectiveIssued => "DIRECTIVE_ISSUED",
            Self::Relinquished => "RELINQUISHED",
            Self::ParametersUpdated => "PARAMETERS_UPDATED",
        };
        f.write_str(s)
    }
}

// ── Audit Block ───────────────────────────────────────────────────────────────

pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditBlock {
    /// Monotonically increasing per-session block sequence number
    pub block_seq: u64,
    pub session_id: String,
    /// Wall-clock timestamp in milliseconds
    pub timestamp_ms: i64,
    /// Hash of the previous block; [`GENESIS_HASH`] for the first
    pub prev_hash: String,
    pub event_type: AuditEventType,
    pub payload_json: String,
    /// SHA-256 of (prev_hash || timestamp_ms || event_type || payload_json)
    pub block_hash: String,
}

impl AuditBlock {
    fn compute_hash(
        prev_hash: &str,
        timestamp_ms: i64,
        event_type: AuditEventType,
        payload_json: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prev_hash.as_bytes());
        hasher.update(timestamp_ms.to_le_bytes());
        hasher.update(event_type.to_string().as_bytes());
        hasher.update(payload_json.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn new(
        block_seq: u64,
        session_id: String,
        timestamp_ms: i64,
        prev_hash: String,
        event_type: AuditEventType,
        payload_json: String,
    ) -> Self {
        let block_hash = Self::compute_hash(&prev_hash, timestamp_ms, event_type, &payload_json);
        Self { block_seq, session_id, timestamp_ms, prev_hash, event_type, payload_json, block_hash }
    }

    /// This block's hash matches its contents.
    pub fn verify(&self) -> bool {
        Self::compute_hash(&self.prev_hash, self.timestamp_ms, self.event_type, &self.payload_json)
            == self.block_hash
    }
}

/// Every block is intact and links to its predecessor.
pub fn verify_chain(blocks: &[AuditBlock]) -> bool {
    let mut prev = GENESIS_HASH;
    for (i, block) in blocks.iter().enumerate() {
        if block.block_seq != i as u64 || block.prev_hash != prev || !block.verify() {
            return false;
        }
        prev = block.block_hash.as_str();
    }
    true
}

// ── Audit Logger ──────────────────────────────────────────────────────────────

struct ChainHead {
    block_seq: u64,
    last_hash: String,
}

/// Thread-safe append-only audit logger; writes JSON lines to `path`.
#[derive(Clone)]
pub struct AuditLogger {
    head: Arc<Mutex<ChainHead>>,
    session_id: String,
    path: Option<PathBuf>,
}

impl AuditLogger {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            head: Arc::new(Mutex::new(ChainHead {
                block_seq: 0,
                last_hash: GENESIS_HASH.to_string(),
            })),
            session_id: Uuid::new_v4().to_string(),
            path,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append one block. Write failures are logged; supervision carries on.
    pub async fn append(&self, event_type: AuditEventType, payload: serde_json::Value) -> AuditBlock {
        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        let block = {
            let mut head = self.head.lock().await;
            let block = AuditBlock::new(
                head.block_seq,
                self.session_id.clone(),
                timestamp_ms,
                head.last_hash.clone(),
                event_type,
                payload.to_string(),
            );
            head.last_hash = block.block_hash.clone();
            head.block_seq += 1;
            block
        };

        let Some(path) = &self.path else {
            info!("Audit[{}]: {} — {}", block.block_seq, block.event_type, block.block_hash);
            return block;
        };

        let line = match serde_json::to_string(&block) {
            Ok(l) => format!("{l}\n"),
            Err(e) => {
                warn!("Audit: failed to serialize block: {e}");
                return block;
            }
        };

        match OpenOptions::new().create(true).append(true).open(path).await {
            Ok(mut f) => {
                if let Err(e) = f.write_all(line.as_bytes()).await {
                    warn!("Audit: write failed: {e}");
                }
            }
            Err(e) => {
                info!("Audit[{}]: {} — {}", block.block_seq, block.event_type, block.block_hash);
                warn!("Audit: could not open {}: {e}", path.display());
            }
        }
        block
    }

    pub async fn log_session_event(&self, event: &str) {
        self.append(AuditEventType::SessionEvent, serde_json::json!({ "event": event }))
            .await;
    }

    pub async fn log_directive(&self, plan_id: &str, decision: &impl Serialize) {
        self.append(
            AuditEventType::DirectiveIssued,
            serde_json::json!({ "plan_id": plan_id, "decision": decision }),
        )
        .await;
    }

    pub async fn log_relinquished(&self, by: &impl Serialize) {
        self.append(AuditEventType::Relinquished, serde_json::json!({ "by": by }))
            .await;
    }

    pub async fn log_parameters(&self, params: &impl Serialize) {
        self.append(AuditEventType::ParametersUpdated, serde_json::json!({ "params": params }))
            .await;
    }
}

/// Parse a JSON-lines audit file back into blocks.
pub fn parse_log(raw: &str) -> Result<Vec<AuditBlock>, serde_json::Error> {
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l))
        .collect()
}
