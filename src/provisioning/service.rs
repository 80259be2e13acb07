// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use chrono::Utc;

use super::{ProvisioningError, UserDirectory, WalletStore};
use crate::derivation::{derive, MasterKeyMaterial};
use crate::storage::{DerivationRecord, InsertOutcome};

/// Result of [`WalletProvisioner::get_or_create_wallet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    /// This call assigned the index.
    Created(DerivationRecord),
    /// The user already had a wallet (or another request created it first).
    Existing(DerivationRecord),
}

impl Provisioned {
    pub fn was_created(&self) -> bool {
        matches!(self, Provisioned::Created(_))
    }

    pub fn record(&self) -> &DerivationRecord {
        match self {
            Provisioned::Created(record) | Provisioned::Existing(record) => record,
        }
    }

    pub fn into_record(self) -> DerivationRecord {
        match self {
            Provisioned::Created(record) | Provisioned::Existing(record) => record,
        }
    }
}

/// Assigns each user exactly one deposit address.
///
/// The master key is handed in at construction. `None` means the secret was
/// not configured; provisioning then fails instead of inventing a key.
pub struct WalletProvisioner<S, U> {
    store: Arc<S>,
    users: U,
    master_key: Option<Arc<MasterKeyMaterial>>,
}

impl<S: WalletStore, U: UserDirectory> WalletProvisioner<S, U> {
    pub fn new(store: Arc<S>, users: U, master_key: Option<Arc<MasterKeyMaterial>>) -> Self {
        Self {
            store,
            users,
            master_key,
        }
    }

    pub fn has_master_key(&self) -> bool {
        self.master_key.is_some()
    }

    pub fn master_key(&self) -> Option<&MasterKeyMaterial> {
        self.master_key.as_deref()
    }

    /// Read-only lookup of a user's record.
    pub async fn find_wallet(
        &self,
        user_id: &str,
    ) -> Result<Option<DerivationRecord>, ProvisioningError> {
        Ok(self.store.find_by_user_id(user_id).await?)
    }

    /// Return the user's wallet, creating it on first call.
    pub async fn get_or_create_wallet(
        &self,
        user_id: &str,
    ) -> Result<Provisioned, ProvisioningError> {
        let master = self
            .master_key
            .as_deref()
            .ok_or(ProvisioningError::MasterKeyUnavailable)?;

        if !self.users.user_exists(user_id).await? {
            return Err(ProvisioningError::UserNotFound(user_id.to_string()));
        }

        match self.provision(master, user_id).await {
            Err(ProvisioningError::PersistenceConflict(reason)) => {
                tracing::warn!(
                    user_id = %user_id,
                    reason = %reason,
                    "Provisioning conflict, retrying once"
                );
                match self.provision(master, user_id).await {
                    Err(ProvisioningError::PersistenceConflict(reason)) => {
                        Err(ProvisioningError::PersistenceFailure(format!(
                            "conflict persisted after retry: {reason}"
                        )))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn provision(
        &self,
        master: &MasterKeyMaterial,
        user_id: &str,
    ) -> Result<Provisioned, ProvisioningError> {
        if let Some(record) = self.store.find_by_user_id(user_id).await? {
            return self.existing(master, record).await;
        }

        let index = self.store.reserve_next_index().await?;
        let address = derive(master, index)?;
        let record = DerivationRecord {
            user_id: user_id.to_string(),
            derivation_index: index,
            derivation_path: master.child_path(index),
            address,
            created_at: Utc::now(),
        };

        match self.store.insert_if_absent(&record).await? {
            InsertOutcome::Inserted(record) => {
                tracing::info!(
                    user_id = %record.user_id,
                    derivation_index = record.derivation_index,
                    address = %record.address,
                    "Deposit wallet created"
                );
                Ok(Provisioned::Created(record))
            }
            InsertOutcome::Existing(winner) => {
                tracing::debug!(
                    user_id = %user_id,
                    abandoned_index = index,
                    "Concurrent request created the wallet first"
                );
                self.existing(master, winner).await
            }
        }
    }

    /// Serve a stored record, deriving the address at its own index if missing.
    async fn existing(
        &self,
        master: &MasterKeyMaterial,
        record: DerivationRecord,
    ) -> Result<Provisioned, ProvisioningError> {
        if record.has_address() {
            return Ok(Provisioned::Existing(record));
        }

        let address = derive(master, record.derivation_index)?;
        let completed = self
            .store
            .complete_address(&record.user_id, record.derivation_index, &address)
            .await?;
        tracing::info!(
            user_id = %completed.user_id,
            derivation_index = completed.derivation_index,
            address = %completed.address,
            "Completed partially provisioned wallet"
        );
        Ok(Provisioned::Existing(completed))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::backend::DirectoryError;
    use crate::derivation::master_key::tests::test_master_key;
    use crate::storage::wallet_database::tests::temp_db;
    use crate::storage::{StoreError, StoreResult, WalletDatabase};

    struct KnownUsers(HashSet<String>);

    impl KnownUsers {
        fn of(ids: &[&str]) -> Self {
            Self(ids.iter().map(|s| s.to_string()).collect())
        }
    }

    impl UserDirectory for KnownUsers {
        async fn user_exists(&self, user_id: &str) -> Result<bool, DirectoryError> {
            Ok(self.0.contains(user_id))
        }
    }

    struct BrokenDirectory;

    impl UserDirectory for BrokenDirectory {
        async fn user_exists(&self, _user_id: &str) -> Result<bool, DirectoryError> {
            Err(DirectoryError::Unavailable("connection refused".into()))
        }
    }

    /// Fails the first `conflicts` inserts with a uniqueness conflict.
    struct FlakyStore {
        inner: WalletDatabase,
        conflicts: AtomicUsize,
    }

    impl WalletStore for FlakyStore {
        async fn find_by_user_id(&self, user_id: &str) -> StoreResult<Option<DerivationRecord>> {
            self.inner.find_by_user_id(user_id)
        }

        async fn reserve_next_index(&self) -> StoreResult<u32> {
            self.inner.reserve_next_index()
        }

        async fn insert_if_absent(&self, record: &DerivationRecord) -> StoreResult<InsertOutcome> {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Conflict("address already assigned".into()));
            }
            self.inner.insert_if_absent(record)
        }

        async fn complete_address(
            &self,
            user_id: &str,
            index: u32,
            address: &str,
        ) -> StoreResult<DerivationRecord> {
            self.inner.complete_address(user_id, index, address)
        }
    }

    fn provisioner(
        db: Arc<WalletDatabase>,
        users: &[&str],
    ) -> WalletProvisioner<WalletDatabase, KnownUsers> {
        WalletProvisioner::new(db, KnownUsers::of(users), Some(Arc::new(test_master_key())))
    }

    #[tokio::test]
    async fn creates_then_returns_same_record() {
        let (db, _dir) = temp_db();
        let service = provisioner(Arc::new(db), &["alice"]);

        let first = service.get_or_create_wallet("alice").await.unwrap();
        assert!(first.was_created());
        assert_eq!(first.record().derivation_index, 0);
        assert_eq!(first.record().derivation_path, "m/0");
        assert_eq!(
            first.record().address,
            "0xAEfbb50942817d8270Bb9bD922aA5ca9cb06cDBf"
        );

        let second = service.get_or_create_wallet("alice").await.unwrap();
        assert!(!second.was_created());
        assert_eq!(second.into_record(), first.into_record());
    }

    #[tokio::test]
    async fn users_get_distinct_increasing_indices() {
        let (db, _dir) = temp_db();
        let service = provisioner(Arc::new(db), &["alice", "bob", "carol"]);

        let a = service.get_or_create_wallet("alice").await.unwrap().into_record();
        let b = service.get_or_create_wallet("bob").await.unwrap().into_record();
        let c = service.get_or_create_wallet("carol").await.unwrap().into_record();

        assert!(a.derivation_index < b.derivation_index);
        assert!(b.derivation_index < c.derivation_index);
        assert_ne!(a.address, b.address);
        assert_ne!(b.address, c.address);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_persist_one_record() {
        let (db, _dir) = temp_db();
        let db = Arc::new(db);
        let service = Arc::new(provisioner(db.clone(), &["alice"]));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.get_or_create_wallet("alice").await })
            })
            .collect();

        let mut records = Vec::new();
        let mut created = 0;
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            if outcome.was_created() {
                created += 1;
            }
            records.push(outcome.into_record());
        }

        assert_eq!(created, 1);
        assert!(records.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(db.list_addresses().unwrap().len(), 1);
        assert_eq!(db.find_by_user_id("alice").unwrap().as_ref(), records.first());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_distinct_users_get_distinct_indices() {
        let (db, _dir) = temp_db();
        let db = Arc::new(db);
        let users: Vec<String> = (0..24).map(|i| format!("user-{i}")).collect();
        let ids: Vec<&str> = users.iter().map(String::as_str).collect();
        let service = Arc::new(provisioner(db.clone(), &ids));

        let handles: Vec<_> = users
            .iter()
            .cloned()
            .map(|user| {
                let service = service.clone();
                tokio::spawn(async move { service.get_or_create_wallet(&user).await })
            })
            .collect();

        let mut indices = HashSet::new();
        let mut addresses = HashSet::new();
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert!(outcome.was_created());
            let record = outcome.into_record();
            assert_eq!(record.derivation_path, format!("m/{}", record.derivation_index));
            indices.insert(record.derivation_index);
            addresses.insert(record.address);
        }

        assert_eq!(indices.len(), users.len());
        assert_eq!(addresses.len(), users.len());
        assert_eq!(db.list_addresses().unwrap().len(), users.len());
    }

    #[tokio::test]
    async fn missing_master_key_creates_nothing() {
        let (db, _dir) = temp_db();
        let db = Arc::new(db);
        let service = WalletProvisioner::new(db.clone(), KnownUsers::of(&["alice"]), None);

        assert!(!service.has_master_key());
        let result = service.get_or_create_wallet("alice").await;
        assert!(matches!(result, Err(ProvisioningError::MasterKeyUnavailable)));
        assert_eq!(db.find_by_user_id("alice").unwrap(), None);
        // The allocator was not touched either
        assert_eq!(db.reserve_next_index().unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_user_is_rejected() {
        let (db, _dir) = temp_db();
        let db = Arc::new(db);
        let service = provisioner(db.clone(), &["alice"]);

        let result = service.get_or_create_wallet("mallory").await;
        assert!(matches!(result, Err(ProvisioningError::UserNotFound(id)) if id == "mallory"));
        assert_eq!(db.find_by_user_id("mallory").unwrap(), None);
    }

    #[tokio::test]
    async fn directory_failure_is_a_persistence_failure() {
        let (db, _dir) = temp_db();
        let service = WalletProvisioner::new(
            Arc::new(db),
            BrokenDirectory,
            Some(Arc::new(test_master_key())),
        );

        let result = service.get_or_create_wallet("alice").await;
        assert!(matches!(result, Err(ProvisioningError::PersistenceFailure(_))));
    }

    #[tokio::test]
    async fn single_conflict_is_retried() {
        let (db, _dir) = temp_db();
        let store = Arc::new(FlakyStore {
            inner: db,
            conflicts: AtomicUsize::new(1),
        });
        let service = WalletProvisioner::new(
            store.clone(),
            KnownUsers::of(&["alice"]),
            Some(Arc::new(test_master_key())),
        );

        let outcome = service.get_or_create_wallet("alice").await.unwrap();
        assert!(outcome.was_created());
        // The first reservation was burned by the failed attempt
        assert_eq!(outcome.record().derivation_index, 1);
        assert_eq!(
            outcome.record().address,
            "0x84f549a5bE894F8faeB744952d2669FB55366798"
        );
    }

    #[tokio::test]
    async fn second_conflict_surfaces_as_failure() {
        let (db, _dir) = temp_db();
        let store = Arc::new(FlakyStore {
            inner: db,
            conflicts: AtomicUsize::new(2),
        });
        let service = WalletProvisioner::new(
            store.clone(),
            KnownUsers::of(&["alice"]),
            Some(Arc::new(test_master_key())),
        );

        let result = service.get_or_create_wallet("alice").await;
        assert!(matches!(result, Err(ProvisioningError::PersistenceFailure(_))));
        assert_eq!(store.inner.find_by_user_id("alice").unwrap(), None);
    }

    #[tokio::test]
    async fn partially_provisioned_record_is_completed_at_its_own_index() {
        let (db, _dir) = temp_db();
        let db = Arc::new(db.with_start_index(500));
        db.insert_if_absent(&DerivationRecord {
            user_id: "legacy".into(),
            derivation_index: 101,
            derivation_path: "m/101".into(),
            address: String::new(),
            created_at: Utc::now(),
        })
        .unwrap();

        let service = provisioner(db.clone(), &["legacy"]);
        let outcome = service.get_or_create_wallet("legacy").await.unwrap();

        assert!(!outcome.was_created());
        assert_eq!(outcome.record().derivation_index, 101);
        assert_eq!(
            outcome.record().address,
            "0xbc76B477FcD93a2aC779c26D22CC8f92292d35e8"
        );
        assert_eq!(
            db.user_for_address("0xbc76b477fcd93a2ac779c26d22cc8f92292d35e8")
                .unwrap(),
            Some("legacy".to_string())
        );
        // No new index was consumed
        assert_eq!(db.reserve_next_index().unwrap(), 500);
    }

    #[tokio::test]
    async fn find_wallet_does_not_create() {
        let (db, _dir) = temp_db();
        let service = provisioner(Arc::new(db), &["alice"]);

        assert_eq!(service.find_wallet("alice").await.unwrap(), None);
        let created = service.get_or_create_wallet("alice").await.unwrap();
        assert_eq!(
            service.find_wallet("alice").await.unwrap().as_ref(),
            Some(created.record())
        );
    }
}
