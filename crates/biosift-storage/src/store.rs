//! The Store trait that backends implement.

use chrono::{DateTime, Utc};

use crate::types::*;
use crate::StoreError;

/// The authoritative-store trait the ledger and verification services
/// depend on.
///
/// Balance changes are expressed only as relative atomic operations, and
/// the used-code transition is a single conditional update: other
/// concurrent operations never observe an intermediate state.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────── Accounts ─────────────────────────────────

    /// Create a new credit account (returns generated ID).
    /// Fails with `AlreadyExists` if the email is taken.
    async fn create_account(&self, params: &CreateAccountParams) -> Result<UserId, StoreError>;

    /// Get account by ID.
    async fn get_account(&self, user_id: &UserId) -> Result<CreditAccount, StoreError>;

    /// Get account by normalized email.
    async fn get_account_by_email(&self, email: &str) -> Result<CreditAccount, StoreError>;

    /// Atomically add `amount` to the balance and stamp
    /// `last_credit_renewal`. Returns the new balance.
    async fn credit_account(&self, user_id: &UserId, amount: u32) -> Result<u32, StoreError>;

    /// Atomically check `current_credits >= amount` and subtract in one
    /// conditional update. Returns the new balance, or
    /// `InsufficientCredits` with the balance untouched.
    async fn debit_account(&self, user_id: &UserId, amount: u32) -> Result<u32, StoreError>;

    // ───────────────────────────── Verification codes ───────────────────────────

    /// Persist a freshly issued verification code. Prior codes for the
    /// same email are left alone.
    async fn insert_code(&self, code: &VerificationCode) -> Result<(), StoreError>;

    /// Find the most relevant record for `(email, code)`: an unused,
    /// unexpired match if one exists, otherwise the newest match.
    async fn find_code(&self, email: &str, code: &str) -> Result<VerificationCode, StoreError>;

    /// One-way conditional transition to used. Returns `Conflict` if the
    /// code was already consumed, so a racing second validation can never
    /// re-accept.
    async fn mark_code_used(&self, id: &VerificationCodeId) -> Result<(), StoreError>;

    /// Remove every code with `expires_at < now`. Returns the number of
    /// records removed.
    async fn purge_expired_codes(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    // ──────────────────────────── Uploads & dataset ─────────────────────────────

    /// Record uploaded-file metadata.
    async fn record_upload(&self, file: &UploadedFile) -> Result<(), StoreError>;

    /// Replace the contact dataset wholesale (dataset import).
    async fn replace_contacts(&self, contacts: Vec<ContactRecord>) -> Result<(), StoreError>;

    // ───────────────────────────── Snapshot reads ───────────────────────────────
    // Read-only exports consumed by the persistence mirror. The mirror
    // never writes back through these.

    async fn list_accounts(&self) -> Result<Vec<CreditAccount>, StoreError>;

    async fn list_codes(&self) -> Result<Vec<VerificationCode>, StoreError>;

    async fn list_uploads(&self) -> Result<Vec<UploadedFile>, StoreError>;

    async fn list_contacts(&self) -> Result<Vec<ContactRecord>, StoreError>;
}
