//! The assembled ledger core: store, verification, credits, mirror, and
//! backups behind one facade.
//!
//! [`Core::init`] loads the mirrored snapshot from disk, seeds the store
//! from it, and starts the background expiry sweep and backup schedule.
//! Every mutating facade operation flushes the mirror afterwards, tagged
//! with the audit event describing the mutation. Flushes are detached
//! from the calling request; a flush failure is logged, never returned.

mod config;

pub use config::{ConfigError, CoreConfig};

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use biosift_audit::{LedgerAction, LedgerEvent};
use biosift_ledger::{CreditLedger, LedgerError};
use biosift_mirror::{load_snapshot, spawn_backup_schedule, BackupManager, Mirror, MirrorError};
use biosift_storage::{
    ContactRecord, CreateAccountParams, CreditAccount, Store, StoreError, UploadedFile,
    UploadedFileId, UserId,
};
use biosift_verification::{
    spawn_expiry_sweep, IssuedCode, Validation, VerificationError, VerificationService,
};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Mirror(#[from] MirrorError),
}

/// The running ledger core. Construct with [`Core::init`], stop with
/// [`Core::shutdown`].
pub struct Core {
    store: Arc<dyn Store>,
    verification: VerificationService,
    ledger: CreditLedger,
    mirror: Mirror,
    backup: BackupManager,
    sweep_task: JoinHandle<()>,
    backup_task: Option<JoinHandle<()>>,
}

impl Core {
    /// Bring the core up from configuration: restore the store from the
    /// mirrored snapshot (empty on first boot), then start the expiry
    /// sweep and, if configured, the backup schedule.
    pub async fn init(config: CoreConfig) -> Result<Self, CoreError> {
        config.validate()?;

        let snapshot = load_snapshot(&config.data_dir).await?;
        tracing::info!(
            accounts = snapshot.accounts.len(),
            codes = snapshot.codes.len(),
            uploads = snapshot.uploads.len(),
            contacts = snapshot.contacts.len(),
            "restored snapshot from mirror"
        );

        // config.validate() pins store_url to the memory scheme.
        let store: Arc<dyn Store> = Arc::new(biosift_store_memory::MemoryStore::from_snapshot(
            snapshot.accounts,
            snapshot.codes,
            snapshot.uploads,
            snapshot.contacts,
        ));

        let verification = VerificationService::new(store.clone(), config.code_ttl);
        let ledger = CreditLedger::new(store.clone());
        let mirror = Mirror::new(store.clone(), config.data_dir.clone());
        let backup = BackupManager::new(config.data_dir.clone(), config.backup_root.clone());

        // The sweep mutates the store, so it flushes the mirror like any
        // other mutation; otherwise a restart would resurrect purged codes.
        let sweep_mirror = mirror.clone();
        let sweep_task = spawn_expiry_sweep(store.clone(), config.sweep_interval, move |purged| {
            sweep_mirror.flush_detached(
                LedgerEvent::builder(LedgerAction::CodesPurged)
                    .details(serde_json::json!({ "purged": purged }))
                    .build(),
            );
        });
        let backup_task = config
            .backup_interval
            .map(|every| spawn_backup_schedule(backup.clone(), every));

        Ok(Self {
            store,
            verification,
            ledger,
            mirror,
            backup,
            sweep_task,
            backup_task,
        })
    }

    // ───────────────────────────────── Accounts ─────────────────────────────────

    pub async fn create_account(&self, params: &CreateAccountParams) -> Result<UserId, CoreError> {
        let user_id = self.store.create_account(params).await?;
        self.mirror.flush_detached(
            LedgerEvent::builder(LedgerAction::AccountCreated)
                .user_id(&user_id)
                .email(params.email.clone())
                .build(),
        );
        Ok(user_id)
    }

    pub async fn get_account(&self, user_id: &UserId) -> Result<CreditAccount, CoreError> {
        Ok(self.store.get_account(user_id).await?)
    }

    pub async fn get_account_by_email(&self, email: &str) -> Result<CreditAccount, CoreError> {
        Ok(self.store.get_account_by_email(email).await?)
    }

    // ──────────────────────────────── Verification ──────────────────────────────

    pub async fn issue_code(&self, email: &str) -> Result<IssuedCode, CoreError> {
        let issued = self.verification.issue(email).await?;
        self.mirror.flush_detached(
            LedgerEvent::builder(LedgerAction::CodeIssued)
                .email(issued.email.clone())
                .build(),
        );
        Ok(issued)
    }

    /// Validate a submitted code. Only an accepted validation mutates
    /// state, so only that outcome triggers a flush.
    pub async fn validate_code(&self, email: &str, code: &str) -> Result<Validation, CoreError> {
        let outcome = self.verification.validate(email, code).await?;
        if outcome == Validation::Accepted {
            self.mirror.flush_detached(
                LedgerEvent::builder(LedgerAction::CodeValidated)
                    .email(biosift_verification::normalize_email(email))
                    .build(),
            );
        }
        Ok(outcome)
    }

    // ────────────────────────────────── Credits ─────────────────────────────────

    /// Spend credits. Returns the new balance.
    pub async fn debit(&self, user_id: &UserId, amount: u32) -> Result<u32, CoreError> {
        let balance = self.ledger.debit(user_id, amount).await?;
        self.mirror.flush_detached(
            LedgerEvent::builder(LedgerAction::CreditUsed)
                .user_id(user_id)
                .amount(amount)
                .build(),
        );
        Ok(balance)
    }

    /// Grant credits. Returns the new balance.
    pub async fn credit(&self, user_id: &UserId, amount: u32) -> Result<u32, CoreError> {
        let balance = self.ledger.credit(user_id, amount).await?;
        self.mirror.flush_detached(
            LedgerEvent::builder(LedgerAction::CreditGranted)
                .user_id(user_id)
                .amount(amount)
                .build(),
        );
        Ok(balance)
    }

    /// Current balance and last renewal, read-only.
    pub async fn balance(
        &self,
        user_id: &UserId,
    ) -> Result<(u32, Option<chrono::DateTime<chrono::Utc>>), CoreError> {
        Ok(self.ledger.balance(user_id).await?)
    }

    // ──────────────────────────── Uploads & dataset ─────────────────────────────

    pub async fn record_upload(
        &self,
        user_id: &UserId,
        filename: &str,
        size_bytes: u64,
    ) -> Result<UploadedFileId, CoreError> {
        let file = UploadedFile {
            id: UploadedFileId::new(),
            user_id: *user_id,
            filename: filename.to_string(),
            size_bytes,
            uploaded_at: chrono::Utc::now(),
        };
        self.store.record_upload(&file).await?;
        self.mirror.flush_detached(
            LedgerEvent::builder(LedgerAction::FileUploaded)
                .user_id(user_id)
                .details(serde_json::json!({ "filename": filename, "size_bytes": size_bytes }))
                .build(),
        );
        Ok(file.id)
    }

    pub async fn import_contacts(&self, contacts: Vec<ContactRecord>) -> Result<usize, CoreError> {
        let count = contacts.len();
        self.store.replace_contacts(contacts).await?;
        self.mirror.flush_detached(
            LedgerEvent::builder(LedgerAction::DatasetImported)
                .details(serde_json::json!({ "records": count }))
                .build(),
        );
        Ok(count)
    }

    // ────────────────────────────────── Backups ─────────────────────────────────

    /// Run an on-demand backup of the mirror's files.
    pub async fn run_backup(&self) -> Result<PathBuf, CoreError> {
        Ok(self.backup.run_backup().await?)
    }

    // ───────────────────────────────── Lifecycle ────────────────────────────────

    /// Stop the background tasks and take one final, awaited flush so the
    /// mirror holds the latest state before the process exits.
    pub async fn shutdown(self) -> Result<(), CoreError> {
        self.sweep_task.abort();
        if let Some(task) = self.backup_task {
            task.abort();
        }

        self.mirror
            .flush(&LedgerEvent::builder(LedgerAction::Shutdown).build())
            .await?;
        tracing::info!("ledger core shut down");
        Ok(())
    }
}
