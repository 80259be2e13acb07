// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::AuthConfig;
use crate::backend::{Directory, Ledger};
use crate::blockchain::ChainClient;
use crate::deposits::DepositReconciler;
use crate::provisioning::WalletProvisioner;
use crate::storage::{StoragePaths, WalletDatabase};

pub type Provisioner = WalletProvisioner<WalletDatabase, Directory>;
pub type Reconciler = DepositReconciler<ChainClient>;

#[derive(Clone)]
pub struct AppState {
    pub paths: StoragePaths,
    pub db: Arc<WalletDatabase>,
    pub provisioner: Arc<Provisioner>,
    pub ledger: Ledger,
    /// `None` when deposit scanning is not configured.
    pub reconciler: Option<Arc<Reconciler>>,
    pub auth_config: AuthConfig,
}

impl AppState {
    pub fn new(
        paths: StoragePaths,
        db: Arc<WalletDatabase>,
        provisioner: Provisioner,
        ledger: Ledger,
    ) -> Self {
        Self {
            paths,
            db,
            provisioner: Arc::new(provisioner),
            ledger,
            reconciler: None,
            auth_config: AuthConfig::default(),
        }
    }

    pub fn with_auth_config(mut self, auth_config: AuthConfig) -> Self {
        self.auth_config = auth_config;
        self
    }

    pub fn with_reconciler(mut self, reconciler: Arc<Reconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }
}
