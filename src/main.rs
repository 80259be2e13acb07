// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{process, sync::Arc};

use deposit_wallet_server::{
    api::router,
    backend::{BackendClient, Directory, Ledger},
    blockchain::ChainClient,
    config::AppConfig,
    deposits::DepositReconciler,
    provisioning::WalletProvisioner,
    state::AppState,
    storage::{StoragePaths, WalletDatabase},
    telemetry::init_tracing,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            process::exit(1);
        }
    };

    init_tracing(config.log_format);

    if config.auth.secret.is_none() {
        tracing::warn!(
            "AUTH_JWT_SECRET not set, authenticated endpoints will reject every request"
        );
    }

    // Storage
    let paths = StoragePaths::new(&config.data_dir);
    let db = match WalletDatabase::open(&paths.database()) {
        Ok(db) => Arc::new(db.with_start_index(config.start_index)),
        Err(e) => {
            tracing::error!(
                path = %paths.database().display(),
                error = %e,
                "Failed to open wallet database"
            );
            process::exit(1);
        }
    };
    tracing::info!(path = %paths.database().display(), "Wallet database opened");

    for user_id in &config.seed_user_ids {
        if let Err(e) = db.register_user(user_id) {
            tracing::error!(user_id = %user_id, error = %e, "Failed to seed user");
            process::exit(1);
        }
    }

    // Master key
    let master_key = match config.load_master_key() {
        Ok(Some(key)) => {
            tracing::info!(
                fingerprint = %key.fingerprint(),
                account_path = %key.account_path(),
                "Master key loaded"
            );
            Some(Arc::new(key))
        }
        Ok(None) => {
            tracing::error!("No master key configured, wallet provisioning is unavailable");
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load master key");
            process::exit(1);
        }
    };

    // User directory and ledger
    let (directory, ledger) = match &config.backend {
        Some(backend) => match BackendClient::new(&backend.url, &backend.service_key) {
            Ok(client) => {
                tracing::info!(url = %client.base_url(), "Using remote user directory and ledger");
                (Directory::Remote(client.clone()), Ledger::Remote(client))
            }
            Err(e) => {
                tracing::error!(error = %e, "Invalid backend configuration");
                process::exit(1);
            }
        },
        None => {
            tracing::warn!("No backend configured, using local user registry without a ledger");
            (Directory::Local(db.clone()), Ledger::Unconfigured)
        }
    };

    let provisioner = WalletProvisioner::new(db.clone(), directory, master_key);
    let mut state = AppState::new(paths, db.clone(), provisioner, ledger.clone())
        .with_auth_config(config.auth.clone());

    // Deposit reconciliation
    let shutdown = CancellationToken::new();
    match ChainClient::new(config.network.clone(), config.rpc_url.as_deref()) {
        Ok(chain) => {
            let reconciler = Arc::new(DepositReconciler::new(
                db,
                chain,
                ledger,
                config.network.clone(),
                config.token_contracts.clone(),
                config.confirmations,
                config.reconcile_interval.unwrap_or_default(),
            ));
            match reconciler.sync_tip().await {
                Ok(tip) => tracing::info!(tip = ?tip, "Confirmed chain tip recorded"),
                Err(e) => tracing::warn!(error = %e, "Could not read chain head at startup"),
            }
            if config.reconcile_interval.is_some() {
                tokio::spawn(reconciler.clone().run(shutdown.clone()));
            } else {
                tracing::info!("Background deposit sweeps disabled");
            }
            state = state.with_reconciler(reconciler);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Chain client unavailable, deposit reconciliation disabled");
        }
    }

    let app = router(state);
    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind");
            process::exit(1);
        }
    };

    tracing::info!(
        addr = %addr,
        network = %config.network.name,
        "Deposit wallet server listening (docs at /docs)"
    );

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;
    shutdown.cancel();

    if let Err(e) = result {
        tracing::error!(error = %e, "Server error");
        process::exit(1);
    }
    tracing::info!("Server stopped");
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
