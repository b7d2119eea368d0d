//! Durability mirror for the in-process store.
//!
//! The live store is authoritative; this crate maintains a secondary copy
//! of every collection as a JSON file on disk. After each mutation the
//! owning facade asks the mirror to flush, tagged with the audit event
//! that caused it. Flushes are best-effort: a failed flush is logged and
//! never fails the request that triggered it.
//!
//! Each file is written to a temp sibling and atomically renamed into
//! place, so a crash mid-write leaves the previous complete snapshot.

mod backup;

pub use backup::{spawn_backup_schedule, BackupManager};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use biosift_audit::LedgerEvent;
use biosift_storage::{ContactRecord, CreditAccount, Store, StoreError, UploadedFile, VerificationCode};

pub const ACCOUNTS_FILE: &str = "accounts.json";
pub const CODES_FILE: &str = "verification_codes.json";
pub const UPLOADS_FILE: &str = "uploaded_files.json";
pub const CONTACTS_FILE: &str = "contacts.json";

/// All mirrored collection files, in flush order.
pub const COLLECTION_FILES: [&str; 4] = [ACCOUNTS_FILE, CODES_FILE, UPLOADS_FILE, CONTACTS_FILE];

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// A full point-in-time copy of every mirrored collection.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub accounts: Vec<CreditAccount>,
    pub codes: Vec<VerificationCode>,
    pub uploads: Vec<UploadedFile>,
    pub contacts: Vec<ContactRecord>,
}

/// Mirrors the store's collections to JSON files under `data_dir`.
///
/// Flushes are serialized by an internal lock held across the full
/// export-and-write sequence, so concurrent flushes never interleave and
/// every installed snapshot is one flush's complete output.
#[derive(Clone)]
pub struct Mirror {
    store: Arc<dyn Store>,
    data_dir: PathBuf,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Mirror {
    pub fn new(store: Arc<dyn Store>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            data_dir: data_dir.into(),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Export the store and rewrite every collection file. `event` is the
    /// mutation that triggered the flush; it is logged, not persisted.
    pub async fn flush(&self, event: &LedgerEvent) -> Result<(), MirrorError> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.export().await?;
        tokio::fs::create_dir_all(&self.data_dir).await?;

        write_collection(&self.data_dir.join(ACCOUNTS_FILE), &snapshot.accounts).await?;
        write_collection(&self.data_dir.join(CODES_FILE), &snapshot.codes).await?;
        write_collection(&self.data_dir.join(UPLOADS_FILE), &snapshot.uploads).await?;
        write_collection(&self.data_dir.join(CONTACTS_FILE), &snapshot.contacts).await?;

        tracing::info!(action = %event.action, event_id = %event.id, "flushed store mirror");
        Ok(())
    }

    /// Fire-and-forget flush: spawn the write and return immediately. A
    /// failure is logged as an operational error and otherwise dropped.
    pub fn flush_detached(&self, event: LedgerEvent) {
        let mirror = self.clone();
        tokio::spawn(async move {
            if let Err(err) = mirror.flush(&event).await {
                tracing::error!(action = %event.action, error = %err, "mirror flush failed");
            }
        });
    }

    /// Read the mirrored files back into a snapshot.
    pub async fn load(&self) -> Result<Snapshot, MirrorError> {
        load_snapshot(&self.data_dir).await
    }

    async fn export(&self) -> Result<Snapshot, MirrorError> {
        Ok(Snapshot {
            accounts: self.store.list_accounts().await?,
            codes: self.store.list_codes().await?,
            uploads: self.store.list_uploads().await?,
            contacts: self.store.list_contacts().await?,
        })
    }
}

/// Read the mirrored files under `data_dir` into a snapshot, without
/// needing a live store. A missing file (or missing directory) yields an
/// empty collection, so first boot works with no seed data.
pub async fn load_snapshot(data_dir: &Path) -> Result<Snapshot, MirrorError> {
    Ok(Snapshot {
        accounts: read_collection(&data_dir.join(ACCOUNTS_FILE)).await?,
        codes: read_collection(&data_dir.join(CODES_FILE)).await?,
        uploads: read_collection(&data_dir.join(UPLOADS_FILE)).await?,
        contacts: read_collection(&data_dir.join(CONTACTS_FILE)).await?,
    })
}

async fn write_collection<T: Serialize>(path: &Path, records: &[T]) -> Result<(), MirrorError> {
    let json = serde_json::to_vec_pretty(records)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, MirrorError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biosift_audit::LedgerAction;
    use biosift_storage::{CreateAccountParams, Plan};
    use biosift_store_memory::MemoryStore;
    use uuid::Uuid;

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .create_account(&CreateAccountParams {
                email: "lab@example.com".to_string(),
                initial_credits: 50,
                plan: Plan::Pro,
                approved: true,
                payment_completed: true,
            })
            .await
            .unwrap();
        store
            .replace_contacts(vec![biosift_storage::ContactRecord {
                id: Uuid::new_v4(),
                company: "Helix Therapeutics".to_string(),
                name: "Ada Chen".to_string(),
                title: "Director of Discovery".to_string(),
                email: "ada.chen@helixtx.com".to_string(),
                country: "US".to_string(),
            }])
            .await
            .unwrap();
        store
    }

    fn flush_event() -> LedgerEvent {
        LedgerEvent::builder(LedgerAction::AccountCreated).build()
    }

    #[tokio::test]
    async fn flush_writes_every_collection_file() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = Mirror::new(seeded_store().await, dir.path());

        mirror.flush(&flush_event()).await.unwrap();

        for file in COLLECTION_FILES {
            let path = dir.path().join(file);
            assert!(path.exists(), "missing {file}");
            // No temp leftovers.
            assert!(!path.with_extension("json.tmp").exists());
        }
    }

    #[tokio::test]
    async fn flush_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = Mirror::new(seeded_store().await, dir.path());

        mirror.flush(&flush_event()).await.unwrap();
        let snapshot = mirror.load().await.unwrap();

        assert_eq!(snapshot.accounts.len(), 1);
        assert_eq!(snapshot.accounts[0].email, "lab@example.com");
        assert_eq!(snapshot.accounts[0].current_credits, 50);
        assert_eq!(snapshot.contacts.len(), 1);
        assert_eq!(snapshot.contacts[0].company, "Helix Therapeutics");
        assert!(snapshot.codes.is_empty());
        assert!(snapshot.uploads.is_empty());
    }

    #[tokio::test]
    async fn load_from_empty_dir_yields_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = Mirror::new(Arc::new(MemoryStore::new()), dir.path().join("never-written"));

        let snapshot = mirror.load().await.unwrap();
        assert!(snapshot.accounts.is_empty());
        assert!(snapshot.codes.is_empty());
        assert!(snapshot.uploads.is_empty());
        assert!(snapshot.contacts.is_empty());
    }

    #[tokio::test]
    async fn load_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(ACCOUNTS_FILE), b"{ not json")
            .await
            .unwrap();

        let mirror = Mirror::new(Arc::new(MemoryStore::new()), dir.path());
        let err = mirror.load().await.unwrap_err();
        assert!(matches!(err, MirrorError::Serialize(_)));
    }

    #[tokio::test]
    async fn flush_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store().await;
        let mirror = Mirror::new(store.clone(), dir.path());

        mirror.flush(&flush_event()).await.unwrap();

        let account = store.get_account_by_email("lab@example.com").await.unwrap();
        store.debit_account(&account.id, 20).await.unwrap();
        mirror.flush(&flush_event()).await.unwrap();

        let snapshot = mirror.load().await.unwrap();
        assert_eq!(snapshot.accounts[0].current_credits, 30);
    }

    #[tokio::test]
    async fn concurrent_flushes_all_succeed_and_leave_a_parseable_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = Mirror::new(seeded_store().await, dir.path());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let mirror = mirror.clone();
            handles.push(tokio::spawn(async move { mirror.flush(&flush_event()).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for file in COLLECTION_FILES {
            assert!(!dir.path().join(file).with_extension("json.tmp").exists());
        }

        let snapshot = mirror.load().await.unwrap();
        assert_eq!(snapshot.accounts.len(), 1);
        assert_eq!(snapshot.contacts.len(), 1);
    }

    #[tokio::test]
    async fn restart_from_snapshot_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store().await;
        let mirror = Mirror::new(store, dir.path());
        mirror.flush(&flush_event()).await.unwrap();

        let snapshot = mirror.load().await.unwrap();
        let restored = MemoryStore::from_snapshot(
            snapshot.accounts,
            snapshot.codes,
            snapshot.uploads,
            snapshot.contacts,
        );

        let account = restored.get_account_by_email("lab@example.com").await.unwrap();
        assert_eq!(account.current_credits, 50);
        assert_eq!(restored.list_contacts().await.unwrap().len(), 1);
    }
}
