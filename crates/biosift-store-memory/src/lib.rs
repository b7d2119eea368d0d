//! In-process store implementation backed by DashMap.
//!
//! This implementation is suitable for:
//! - Single server deployments
//! - Development and testing
//!
//! A `RefMut` from DashMap holds the shard lock for its key, so the
//! check-and-decrement in [`debit_account`](Store::debit_account) and the
//! used-flag transition in [`mark_code_used`](Store::mark_code_used) are
//! atomic per record. Operations on different accounts never contend.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::RwLock;

use biosift_storage::{
    ContactRecord, CreateAccountParams, CreditAccount, Store, StoreError, UploadedFile,
    UploadedFileId, UserId, VerificationCode, VerificationCodeId,
};

/// Single-process authoritative store.
#[derive(Default)]
pub struct MemoryStore {
    accounts: DashMap<UserId, CreditAccount>,
    by_email: DashMap<String, UserId>,
    codes: DashMap<VerificationCodeId, VerificationCode>,
    uploads: DashMap<UploadedFileId, UploadedFile>,
    contacts: RwLock<Vec<ContactRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from a previously persisted snapshot. Used only at
    /// process start.
    pub fn from_snapshot(
        accounts: Vec<CreditAccount>,
        codes: Vec<VerificationCode>,
        uploads: Vec<UploadedFile>,
        contacts: Vec<ContactRecord>,
    ) -> Self {
        let store = Self::new();
        for account in accounts {
            store.by_email.insert(account.email.clone(), account.id);
            store.accounts.insert(account.id, account);
        }
        for code in codes {
            store.codes.insert(code.id, code);
        }
        for upload in uploads {
            store.uploads.insert(upload.id, upload);
        }
        *store.contacts.write().expect("contacts lock poisoned") = contacts;
        store
    }
}

fn contacts_read(store: &MemoryStore) -> Result<Vec<ContactRecord>, StoreError> {
    store
        .contacts
        .read()
        .map(|guard| guard.clone())
        .map_err(|_| StoreError::Backend("contacts lock poisoned".into()))
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn create_account(&self, params: &CreateAccountParams) -> Result<UserId, StoreError> {
        let user_id = UserId::new();
        // The email-index entry is the uniqueness gate: Occupied means a
        // concurrent create already claimed the address.
        match self.by_email.entry(params.email.clone()) {
            Entry::Occupied(_) => return Err(StoreError::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(user_id);
            }
        }
        self.accounts.insert(
            user_id,
            CreditAccount {
                id: user_id,
                email: params.email.clone(),
                current_credits: params.initial_credits,
                last_credit_renewal: None,
                plan: params.plan,
                approved: params.approved,
                payment_completed: params.payment_completed,
                created_at: Utc::now(),
            },
        );
        Ok(user_id)
    }

    async fn get_account(&self, user_id: &UserId) -> Result<CreditAccount, StoreError> {
        self.accounts
            .get(user_id)
            .map(|a| a.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn get_account_by_email(&self, email: &str) -> Result<CreditAccount, StoreError> {
        let user_id = *self.by_email.get(email).ok_or(StoreError::NotFound)?;
        self.get_account(&user_id).await
    }

    async fn credit_account(&self, user_id: &UserId, amount: u32) -> Result<u32, StoreError> {
        let mut account = self.accounts.get_mut(user_id).ok_or(StoreError::NotFound)?;
        account.current_credits = account.current_credits.saturating_add(amount);
        account.last_credit_renewal = Some(Utc::now());
        Ok(account.current_credits)
    }

    async fn debit_account(&self, user_id: &UserId, amount: u32) -> Result<u32, StoreError> {
        let mut account = self.accounts.get_mut(user_id).ok_or(StoreError::NotFound)?;
        if account.current_credits < amount {
            return Err(StoreError::InsufficientCredits);
        }
        account.current_credits -= amount;
        Ok(account.current_credits)
    }

    async fn insert_code(&self, code: &VerificationCode) -> Result<(), StoreError> {
        self.codes.insert(code.id, code.clone());
        Ok(())
    }

    async fn find_code(&self, email: &str, code: &str) -> Result<VerificationCode, StoreError> {
        let now = Utc::now();
        let mut newest: Option<VerificationCode> = None;
        for entry in self.codes.iter() {
            if entry.email != email || entry.code != code {
                continue;
            }
            if !entry.used && !entry.is_expired(now) {
                return Ok(entry.clone());
            }
            match &newest {
                Some(best) if best.created_at >= entry.created_at => {}
                _ => newest = Some(entry.clone()),
            }
        }
        newest.ok_or(StoreError::NotFound)
    }

    async fn mark_code_used(&self, id: &VerificationCodeId) -> Result<(), StoreError> {
        let mut code = self.codes.get_mut(id).ok_or(StoreError::NotFound)?;
        if code.used {
            return Err(StoreError::Conflict);
        }
        code.used = true;
        Ok(())
    }

    async fn purge_expired_codes(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let expired: Vec<VerificationCodeId> = self
            .codes
            .iter()
            .filter(|c| c.is_expired(now))
            .map(|c| c.id)
            .collect();
        let mut removed = 0;
        for id in expired {
            if self.codes.remove(&id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn record_upload(&self, file: &UploadedFile) -> Result<(), StoreError> {
        self.uploads.insert(file.id, file.clone());
        Ok(())
    }

    async fn replace_contacts(&self, contacts: Vec<ContactRecord>) -> Result<(), StoreError> {
        let mut guard = self
            .contacts
            .write()
            .map_err(|_| StoreError::Backend("contacts lock poisoned".into()))?;
        *guard = contacts;
        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<CreditAccount>, StoreError> {
        let mut accounts: Vec<CreditAccount> =
            self.accounts.iter().map(|a| a.clone()).collect();
        accounts.sort_by_key(|a| a.id.0);
        Ok(accounts)
    }

    async fn list_codes(&self) -> Result<Vec<VerificationCode>, StoreError> {
        let mut codes: Vec<VerificationCode> = self.codes.iter().map(|c| c.clone()).collect();
        codes.sort_by_key(|c| c.id.0);
        Ok(codes)
    }

    async fn list_uploads(&self) -> Result<Vec<UploadedFile>, StoreError> {
        let mut uploads: Vec<UploadedFile> = self.uploads.iter().map(|u| u.clone()).collect();
        uploads.sort_by_key(|u| u.id.0);
        Ok(uploads)
    }

    async fn list_contacts(&self) -> Result<Vec<ContactRecord>, StoreError> {
        contacts_read(self)
    }
}
