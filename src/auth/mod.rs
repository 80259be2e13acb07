// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Verification of session tokens issued by the hosted auth service. Token
//! issuance happens elsewhere.
//!
//! ## Auth Flow
//!
//! 1. Frontend signs the user in against the hosted auth service
//! 2. Frontend sends `Authorization: Bearer <JWT>`
//! 3. This server:
//!    - Verifies the HS256 signature with the shared secret
//!    - Verifies expiry and audience
//!    - Extracts `sub` → canonical `user_id`
//!
//! ## Security
//!
//! - All wallet endpoints require authentication
//! - Without a configured secret every token is rejected
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;

pub use claims::{AuthenticatedUser, SessionClaims};
pub use error::AuthError;
pub use extractor::Auth;

/// Token verification settings.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// HS256 shared secret
    pub secret: Option<String>,
    /// Expected `aud` claim (skipped when `None`)
    pub audience: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("audience", &self.audience)
            .finish()
    }
}
