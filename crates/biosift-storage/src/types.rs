//! Record and identifier types shared by all storage backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new ID using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

id_type!(
    /// Unique identifier for a user's credit account.
    UserId
);
id_type!(
    /// Unique identifier for an issued verification code.
    VerificationCodeId
);
id_type!(
    /// Unique identifier for an uploaded file's metadata record.
    UploadedFileId
);

/// Subscription plan. Owned by the billing integration; the ledger only
/// reads it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        };
        write!(f, "{}", s)
    }
}

/// A user's metered-credit account.
///
/// `current_credits` only ever changes through the store's relative atomic
/// debit/credit operations. `plan`, `approved`, and `payment_completed`
/// gate whether debits are permitted; they are written by external
/// collaborators (billing, admin tooling) and only read here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreditAccount {
    pub id: UserId,
    /// Normalized (trimmed, lowercased) email; unique per account.
    pub email: String,
    pub current_credits: u32,
    /// Stamped on every credit-granting event.
    pub last_credit_renewal: Option<DateTime<Utc>>,
    pub plan: Plan,
    pub approved: bool,
    pub payment_completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a credit account.
#[derive(Clone, Debug)]
pub struct CreateAccountParams {
    pub email: String,
    pub initial_credits: u32,
    pub plan: Plan,
    pub approved: bool,
    pub payment_completed: bool,
}

/// A short-lived email verification code.
///
/// Multiple historical codes for the same email may coexist until expiry;
/// `used` flips to true exactly once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationCode {
    pub id: VerificationCodeId,
    /// Normalized (trimmed, lowercased) recipient address.
    pub email: String,
    /// Exactly 6 decimal digits; leading zeros allowed.
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl VerificationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Metadata for a file uploaded by a user. The file contents live outside
/// the ledger core; only the metadata is part of the snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: UploadedFileId,
    pub user_id: UserId,
    pub filename: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// One row of the flat biotech-contact dataset. The search queries over
/// these rows are owned elsewhere; the store owns the rows themselves so
/// they participate in the snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: Uuid,
    pub company: String,
    pub name: String,
    pub title: String,
    pub email: String,
    pub country: String,
}
