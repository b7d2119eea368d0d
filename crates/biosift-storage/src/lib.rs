//! Storage abstraction for biosift.
//!
//! Backend crates (e.g., biosift-store-memory) implement the [`Store`] trait
//! so the ledger and verification services don't depend on any specific
//! engine. The trait is deliberately narrow: every balance change goes
//! through a relative atomic increment/decrement, and the used-code
//! transition is a one-way conditional update. There is no raw balance
//! setter.

use thiserror::Error;

mod store;
mod types;

pub use store::Store;
#[cfg(feature = "test-support")]
pub use store::MockStore;
pub use types::{
    ContactRecord, CreateAccountParams, CreditAccount, Plan, UploadedFile, UploadedFileId, UserId,
    VerificationCode, VerificationCodeId,
};

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    /// A conditional update lost its race (e.g., a code was consumed by a
    /// concurrent validation between lookup and mark-used).
    #[error("conflict")]
    Conflict,
    /// A debit would take the balance below zero; the balance is untouched.
    #[error("insufficient credits")]
    InsufficientCredits,
    #[error("backend error: {0}")]
    Backend(String),
}
