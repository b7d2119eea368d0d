//! Email verification codes: issuance, validation, and expiry.
//!
//! A code is 6 decimal digits, valid for a configurable window (10 minutes
//! by default), and consumable exactly once. Expiry is enforced passively
//! at validation time and actively by a background sweep that purges
//! expired records from the store.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use thiserror::Error;
use tokio::task::JoinHandle;

use biosift_storage::{Store, StoreError, VerificationCode, VerificationCodeId};

/// Default validity window for issued codes.
pub const DEFAULT_CODE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Outcome of validating a submitted code. Consumption wins over expiry:
/// a code that was used and has since expired reports `AlreadyUsed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Validation {
    Accepted,
    Expired,
    NotFound,
    AlreadyUsed,
}

/// A freshly issued code, ready to hand to the email sender.
#[derive(Clone, Debug)]
pub struct IssuedCode {
    pub id: VerificationCodeId,
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Generate a random 6-digit code. Leading zeros are preserved, so the
/// space is the full 000000..=999999.
pub fn generate_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:06}", n)
}

/// Trim and lowercase an email address so lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Issues and validates verification codes against a [`Store`].
#[derive(Clone)]
pub struct VerificationService {
    store: Arc<dyn Store>,
    ttl: Duration,
}

impl VerificationService {
    pub fn new(store: Arc<dyn Store>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn with_default_ttl(store: Arc<dyn Store>) -> Self {
        Self::new(store, Duration::minutes(DEFAULT_CODE_TTL_MINUTES))
    }

    /// Issue a new code for `email`. Any earlier codes for the same
    /// address stay in the store until they expire or get purged; they
    /// remain independently valid.
    pub async fn issue(&self, email: &str) -> Result<IssuedCode, VerificationError> {
        let email = normalize_email(email);
        let now = Utc::now();
        let record = VerificationCode {
            id: VerificationCodeId::new(),
            email: email.clone(),
            code: generate_code(),
            created_at: now,
            expires_at: now + self.ttl,
            used: false,
        };

        self.store.insert_code(&record).await?;

        tracing::debug!(email = %record.email, expires_at = %record.expires_at, "issued verification code");

        Ok(IssuedCode {
            id: record.id,
            email: record.email,
            code: record.code,
            expires_at: record.expires_at,
        })
    }

    /// Validate a submitted `(email, code)` pair.
    ///
    /// Only `Accepted` consumes the code, via the store's one-way
    /// conditional transition. If two callers race on the same code,
    /// exactly one sees `Accepted` and the other `AlreadyUsed`.
    pub async fn validate(&self, email: &str, code: &str) -> Result<Validation, VerificationError> {
        let email = normalize_email(email);

        let record = match self.store.find_code(&email, code).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => return Ok(Validation::NotFound),
            Err(err) => return Err(err.into()),
        };

        if record.used {
            return Ok(Validation::AlreadyUsed);
        }
        if record.is_expired(Utc::now()) {
            return Ok(Validation::Expired);
        }

        match self.store.mark_code_used(&record.id).await {
            Ok(()) => Ok(Validation::Accepted),
            Err(StoreError::Conflict) => Ok(Validation::AlreadyUsed),
            // The expiry sweep only removes expired records, so losing the
            // record between lookup and mark-used means it just expired.
            Err(StoreError::NotFound) => Ok(Validation::Expired),
            Err(err) => Err(err.into()),
        }
    }
}

/// Spawn a background task that periodically removes expired codes from
/// the store. `on_purged` runs after every sweep that removed at least
/// one record, so the owner can mirror the mutation. Returns the task
/// handle so the owner can abort it on shutdown.
pub fn spawn_expiry_sweep<F>(
    store: Arc<dyn Store>,
    every: StdDuration,
    mut on_purged: F,
) -> JoinHandle<()>
where
    F: FnMut(u64) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired_codes(Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => {
                    tracing::info!(purged, "removed expired verification codes");
                    on_purged(purged);
                }
                Err(err) => tracing::error!(error = %err, "verification code sweep failed"),
            }
        }
    })
}
