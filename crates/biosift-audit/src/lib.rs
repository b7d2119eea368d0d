//! Structured audit events for the biosift ledger core.
//!
//! Every state-mutating operation emits a [`LedgerEvent`] describing what
//! happened. The persistence mirror logs the event alongside each flush;
//! the event replaces the bare action-name strings that used to be
//! threaded through call sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use biosift_storage::UserId;

/// Unique identifier for a ledger event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerEventId(pub Uuid);

impl LedgerEventId {
    /// Generate a new event ID using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LedgerEventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LedgerEventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The state-mutating actions the ledger core performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    AccountCreated,
    CodeIssued,
    CodeValidated,
    CodesPurged,
    CreditGranted,
    CreditUsed,
    FileUploaded,
    DatasetImported,
    Shutdown,
}

impl std::fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LedgerAction::AccountCreated => "account.created",
            LedgerAction::CodeIssued => "code.issued",
            LedgerAction::CodeValidated => "code.validated",
            LedgerAction::CodesPurged => "codes.purged",
            LedgerAction::CreditGranted => "credit.granted",
            LedgerAction::CreditUsed => "credit.used",
            LedgerAction::FileUploaded => "file.uploaded",
            LedgerAction::DatasetImported => "dataset.imported",
            LedgerAction::Shutdown => "core.shutdown",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for LedgerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account.created" => Ok(LedgerAction::AccountCreated),
            "code.issued" => Ok(LedgerAction::CodeIssued),
            "code.validated" => Ok(LedgerAction::CodeValidated),
            "codes.purged" => Ok(LedgerAction::CodesPurged),
            "credit.granted" => Ok(LedgerAction::CreditGranted),
            "credit.used" => Ok(LedgerAction::CreditUsed),
            "file.uploaded" => Ok(LedgerAction::FileUploaded),
            "dataset.imported" => Ok(LedgerAction::DatasetImported),
            "core.shutdown" => Ok(LedgerAction::Shutdown),
            _ => Err(format!("Unknown ledger action: {}", s)),
        }
    }
}

/// A single auditable action performed by the ledger core.
///
/// Uses raw UUIDs for serialization compatibility; construct via the
/// builder from typed IDs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: LedgerEventId,
    pub timestamp: DateTime<Utc>,
    pub action: LedgerAction,
    /// Account the action concerned, if any.
    pub user_id: Option<Uuid>,
    /// Email the action concerned (verification flows).
    pub email: Option<String>,
    /// Credit amount moved, for debit/credit actions.
    pub amount: Option<u32>,
    /// Additional details as JSON.
    pub details: Option<serde_json::Value>,
}

impl LedgerEvent {
    pub fn builder(action: LedgerAction) -> LedgerEventBuilder {
        LedgerEventBuilder::new(action)
    }

    /// Get the account ID as a typed ID (if present).
    pub fn get_user_id(&self) -> Option<UserId> {
        self.user_id.map(UserId)
    }
}

/// Builder for constructing ledger events.
pub struct LedgerEventBuilder {
    action: LedgerAction,
    user_id: Option<Uuid>,
    email: Option<String>,
    amount: Option<u32>,
    details: Option<serde_json::Value>,
}

impl LedgerEventBuilder {
    pub fn new(action: LedgerAction) -> Self {
        Self {
            action,
            user_id: None,
            email: None,
            amount: None,
            details: None,
        }
    }

    pub fn user_id(mut self, user_id: &UserId) -> Self {
        self.user_id = Some(user_id.0);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn amount(mut self, amount: u32) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn build(self) -> LedgerEvent {
        LedgerEvent {
            id: LedgerEventId::new(),
            timestamp: Utc::now(),
            action: self.action,
            user_id: self.user_id,
            email: self.email,
            amount: self.amount,
            details: self.details,
        }
    }
}
