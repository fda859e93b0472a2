// src/ledger.rs
//
// Record of fiat payments turned into on-chain grants, keyed by Stripe event
// id. A redelivered event that was already applied is acknowledged without
// touching the chain; a failed one may be claimed again.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy::primitives::{Address, TxHash};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::models::ProductType;

/// A pending claim older than this is assumed abandoned and may be retaken.
pub const STALE_CLAIM_SECS: i64 = 600;

/// Default time a webhook delivery may spend on its grant, receipt wait
/// included. Must stay below [`STALE_CLAIM_SECS`]: a claim can only be
/// retaken after the delivery holding it has given up.
pub const DEFAULT_GRANT_DEADLINE_SECS: u64 = 300;

const _: () = assert!((DEFAULT_GRANT_DEADLINE_SECS as i64) < STALE_CLAIM_SECS);

/// Entries kept by [`MemoryLedger`] before settled ones are evicted.
pub const MEMORY_LEDGER_CAPACITY: usize = 10_000;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("plan id {0} does not fit the ledger")]
    PlanIdOutOfRange(u64),
    #[error("event {0} has no claim")]
    UnknownEvent(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRequest {
    pub event_id: String,
    pub session_id: String,
    pub wallet: Address,
    pub product_type: ProductType,
    pub plan_id: Option<u64>,
    pub content_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller owns the grant and must mark it applied or failed.
    Claimed,
    AlreadyApplied { tx_hash: Option<String> },
    /// Another delivery is working on it right now.
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantStatus {
    Pending,
    Applied,
    Failed,
}

impl GrantStatus {
    fn as_str(self) -> &'static str {
        match self {
            GrantStatus::Pending => "pending",
            GrantStatus::Applied => "applied",
            GrantStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(GrantStatus::Pending),
            "applied" => Some(GrantStatus::Applied),
            "failed" => Some(GrantStatus::Failed),
            _ => None,
        }
    }
}

#[async_trait]
pub trait GrantLedger: Send + Sync {
    async fn claim(&self, req: &GrantRequest) -> Result<ClaimOutcome, LedgerError>;
    async fn mark_applied(&self, event_id: &str, tx_hash: TxHash) -> Result<(), LedgerError>;
    async fn mark_failed(&self, event_id: &str, reason: &str) -> Result<(), LedgerError>;
}

#[derive(Debug, Clone)]
struct Entry {
    status: GrantStatus,
    attempts: u32,
    tx_hash: Option<String>,
    last_error: Option<String>,
    updated_at: DateTime<Utc>,
}

/// Process-local ledger for development and tests. Dedups redeliveries
/// while the process lives; once `capacity` entries are held, the oldest
/// applied or failed entry is dropped for each new event. Pending claims
/// are never evicted.
#[derive(Debug)]
pub struct MemoryLedger {
    entries: Mutex<HashMap<String, Entry>>,
    capacity: usize,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::with_capacity(MEMORY_LEDGER_CAPACITY)
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn status(&self, event_id: &str) -> Option<GrantStatus> {
        self.lock().get(event_id).map(|e| e.status)
    }

    pub fn attempts(&self, event_id: &str) -> u32 {
        self.lock().get(event_id).map(|e| e.attempts).unwrap_or(0)
    }

    pub fn last_error(&self, event_id: &str) -> Option<String> {
        self.lock().get(event_id).and_then(|e| e.last_error.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // a poisoned map is still consistent: every update is a single insert
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn update(
        &self,
        event_id: &str,
        f: impl FnOnce(&mut Entry),
    ) -> Result<(), LedgerError> {
        let mut entries = self.lock();
        let entry = entries
            .get_mut(event_id)
            .ok_or_else(|| LedgerError::UnknownEvent(event_id.to_string()))?;
        f(entry);
        entry.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl GrantLedger for MemoryLedger {
    async fn claim(&self, req: &GrantRequest) -> Result<ClaimOutcome, LedgerError> {
        let now = Utc::now();
        let mut entries = self.lock();

        if let Some(entry) = entries.get_mut(&req.event_id) {
            let stale = now - entry.updated_at > Duration::seconds(STALE_CLAIM_SECS);
            return Ok(match entry.status {
                GrantStatus::Applied => ClaimOutcome::AlreadyApplied {
                    tx_hash: entry.tx_hash.clone(),
                },
                GrantStatus::Pending if !stale => ClaimOutcome::InFlight,
                GrantStatus::Pending | GrantStatus::Failed => {
                    entry.status = GrantStatus::Pending;
                    entry.attempts += 1;
                    entry.last_error = None;
                    entry.updated_at = now;
                    ClaimOutcome::Claimed
                }
            });
        }

        if entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .filter(|(_, e)| e.status != GrantStatus::Pending)
                .min_by_key(|(_, e)| e.updated_at)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                entries.remove(&id);
            }
        }

        entries.insert(
            req.event_id.clone(),
            Entry {
                status: GrantStatus::Pending,
                attempts: 1,
                tx_hash: None,
                last_error: None,
                updated_at: now,
            },
        );
        Ok(ClaimOutcome::Claimed)
    }

    async fn mark_applied(&self, event_id: &str, tx_hash: TxHash) -> Result<(), LedgerError> {
        self.update(event_id, |e| {
            e.status = GrantStatus::Applied;
            e.tx_hash = Some(tx_hash.to_string());
        })
    }

    async fn mark_failed(&self, event_id: &str, reason: &str) -> Result<(), LedgerError> {
        self.update(event_id, |e| {
            e.status = GrantStatus::Failed;
            e.last_error = Some(reason.to_string());
        })
    }
}

/// Ledger in the `fiat_grants` table; survives restarts and keeps failed
/// grants for follow-up.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn status(&self, event_id: &str) -> Result<Option<GrantStatus>, LedgerError> {
        let row = sqlx::query(r#"SELECT status FROM fiat_grants WHERE event_id = $1"#)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|r| GrantStatus::parse(r.get::<String, _>("status").as_str())))
    }
}

#[async_trait]
impl GrantLedger for PgLedger {
    async fn claim(&self, req: &GrantRequest) -> Result<ClaimOutcome, LedgerError> {
        let plan_id = req
            .plan_id
            .map(|p| i64::try_from(p).map_err(|_| LedgerError::PlanIdOutOfRange(p)))
            .transpose()?;

        // Insert a fresh claim, or retake a failed/abandoned one, atomically.
        let claimed = sqlx::query(
            r#"INSERT INTO fiat_grants
                   (event_id, session_id, wallet_address, product_type, plan_id, content_id, status)
               VALUES ($1, $2, $3, $4, $5, $6, 'pending')
               ON CONFLICT (event_id) DO UPDATE
                   SET status = 'pending',
                       attempts = fiat_grants.attempts + 1,
                       last_error = NULL,
                       updated_at = now()
                   WHERE fiat_grants.status = 'failed'
                      OR (fiat_grants.status = 'pending'
                          AND fiat_grants.updated_at < now() - make_interval(secs => $7))
               RETURNING event_id"#,
        )
        .bind(&req.event_id)
        .bind(&req.session_id)
        .bind(req.wallet.to_string())
        .bind(req.product_type.as_str())
        .bind(plan_id)
        .bind(req.content_id.as_deref())
        .bind(STALE_CLAIM_SECS as f64)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_some() {
            return Ok(ClaimOutcome::Claimed);
        }

        let row = sqlx::query(r#"SELECT status, tx_hash FROM fiat_grants WHERE event_id = $1"#)
            .bind(&req.event_id)
            .fetch_one(&self.pool)
            .await?;
        let status: String = row.get("status");
        Ok(match GrantStatus::parse(&status) {
            Some(GrantStatus::Applied) => ClaimOutcome::AlreadyApplied {
                tx_hash: row.get("tx_hash"),
            },
            _ => ClaimOutcome::InFlight,
        })
    }

    async fn mark_applied(&self, event_id: &str, tx_hash: TxHash) -> Result<(), LedgerError> {
        let res = sqlx::query(
            r#"UPDATE fiat_grants
               SET status = $1, tx_hash = $2, updated_at = now()
               WHERE event_id = $3"#,
        )
        .bind(GrantStatus::Applied.as_str())
        .bind(tx_hash.to_string())
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(LedgerError::UnknownEvent(event_id.to_string()));
        }
        Ok(())
    }

    async fn mark_failed(&self, event_id: &str, reason: &str) -> Result<(), LedgerError> {
        let res = sqlx::query(
            r#"UPDATE fiat_grants
               SET status = $1, last_error = $2, updated_at = now()
               WHERE event_id = $3"#,
        )
        .bind(GrantStatus::Failed.as_str())
        .bind(reason)
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(LedgerError::UnknownEvent(event_id.to_string()));
        }
        Ok(())
    }
}
