// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end tests through the public router against a temp database.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use deposit_wallet_server::{
    api::router,
    auth::{AuthConfig, SessionClaims},
    backend::{Directory, Ledger},
    derivation::MasterKeyMaterial,
    provisioning::WalletProvisioner,
    state::AppState,
    storage::{StoragePaths, WalletDatabase},
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "integration-secret-0123456789abcdef";
const XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";

fn token(user_id: &str) -> String {
    let claims = SessionClaims {
        sub: user_id.to_string(),
        exp: chrono::Utc::now().timestamp() + 600,
        aud: Some(Value::String("authenticated".to_string())),
        session_id: None,
        email: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn app(dir: &TempDir, start_index: u32, users: &[&str]) -> (Router, Arc<WalletDatabase>) {
    let paths = StoragePaths::new(dir.path());
    let db = Arc::new(
        WalletDatabase::open(&paths.database())
            .unwrap()
            .with_start_index(start_index),
    );
    for user in users {
        db.register_user(user).unwrap();
    }

    let key = MasterKeyMaterial::parse(XPUB, "m").unwrap();
    let provisioner =
        WalletProvisioner::new(db.clone(), Directory::Local(db.clone()), Some(Arc::new(key)));
    let state = AppState::new(paths, db.clone(), provisioner, Ledger::Unconfigured)
        .with_auth_config(AuthConfig {
            secret: Some(SECRET.to_string()),
            audience: Some("authenticated".to_string()),
        });
    (router(state), db)
}

fn post_wallet(user_id: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/wallet")
        .header(header::AUTHORIZATION, format!("Bearer {}", token(user_id)))
        .body(Body::empty())
        .unwrap()
}

async fn json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn start_index_is_honoured_and_golden_address_returned() {
    let dir = TempDir::new().unwrap();
    let (app, db) = app(&dir, 101, &["alice", "bob"]);

    let alice = app.clone().oneshot(post_wallet("alice")).await.unwrap();
    assert_eq!(alice.status(), StatusCode::CREATED);
    let alice = json(alice).await;
    assert_eq!(alice["wallet"]["derivation_index"], 101);
    assert_eq!(alice["wallet"]["derivation_path"], "m/101");
    assert_eq!(
        alice["wallet"]["deposit_address"],
        "0xbc76B477FcD93a2aC779c26D22CC8f92292d35e8"
    );

    let bob = json(app.oneshot(post_wallet("bob")).await.unwrap()).await;
    assert_eq!(bob["wallet"]["derivation_index"], 102);
    assert_eq!(
        bob["wallet"]["deposit_address"],
        "0x148a8A3420AC5Dd6Af1acd2b1acF067AED5268fe"
    );

    let owner = db
        .user_for_address("0xBC76B477FCD93A2AC779C26D22CC8F92292D35E8")
        .unwrap();
    assert_eq!(owner.as_deref(), Some("alice"));
}

#[tokio::test]
async fn record_survives_reopen() {
    let dir = TempDir::new().unwrap();

    let first = {
        let (app, _db) = app(&dir, 0, &["carol"]);
        json(app.oneshot(post_wallet("carol")).await.unwrap()).await
    };

    let (app, _db) = app(&dir, 0, &["carol"]);
    let response = app.oneshot(post_wallet("carol")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let second = json(response).await;

    assert_eq!(first["wallet"], second["wallet"]);
}

#[tokio::test]
async fn concurrent_requests_for_one_user_share_a_record() {
    let dir = TempDir::new().unwrap();
    let (app, _db) = app(&dir, 0, &["dave"]);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let response = app.oneshot(post_wallet("dave")).await.unwrap();
            let status = response.status();
            (status, json(response).await)
        }));
    }

    let mut created = 0;
    let mut addresses = Vec::new();
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        if status == StatusCode::CREATED {
            created += 1;
        } else {
            assert_eq!(status, StatusCode::OK);
        }
        addresses.push(body["wallet"]["deposit_address"].clone());
    }

    assert_eq!(created, 1);
    assert!(addresses.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (app, _db) = app(&dir, 0, &["erin"]);

    let claims = SessionClaims {
        sub: "erin".to_string(),
        exp: chrono::Utc::now().timestamp() - 3600,
        aud: Some(Value::String("authenticated".to_string())),
        session_id: None,
        email: None,
    };
    let expired = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/v1/wallet")
        .header(header::AUTHORIZATION, format!("Bearer {expired}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response).await["code"], "token_expired");
}
