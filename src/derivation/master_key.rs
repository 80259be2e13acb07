// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Master key material: the account-level extended public key.
//!
//! Loaded once at startup from the secret source and handed to the
//! provisioning service by value. There is no global and no way to mutate it
//! after construction.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use bip32::ExtendedPublicKey;
use k256::ecdsa::VerifyingKey;

use super::DeriveError;

/// Account path used when none is configured (BIP-44, Ethereum coin type,
/// first account, external chain).
pub const DEFAULT_ACCOUNT_PATH: &str = "m/44'/60'/0'/0";

/// Serialized prefixes of extended *private* keys. These are refused outright.
const PRIVATE_PREFIXES: [&str; 6] = ["xprv", "tprv", "yprv", "zprv", "uprv", "vprv"];

/// secp256k1 extended public key.
pub type AccountXPub = ExtendedPublicKey<VerifyingKey>;

/// Immutable, process-wide extended public key plus the path it sits at.
#[derive(Clone)]
pub struct MasterKeyMaterial {
    xpub: AccountXPub,
    account_path: String,
}

impl MasterKeyMaterial {
    /// Parse a base58check extended public key.
    ///
    /// `account_path` is the path of the key itself (e.g. `m/44'/60'/0'/0`);
    /// its depth must match the depth encoded in the key so that recorded
    /// derivation paths describe the real hierarchy.
    pub fn parse(encoded: &str, account_path: &str) -> Result<Self, DeriveError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(DeriveError::InvalidKeyMaterial(
                "extended public key is empty".to_string(),
            ));
        }

        if PRIVATE_PREFIXES.iter().any(|p| encoded.starts_with(p)) {
            return Err(DeriveError::InvalidKeyMaterial(
                "extended private keys are not accepted; configure the account xpub".to_string(),
            ));
        }

        let xpub = AccountXPub::from_str(encoded)
            .map_err(|e| DeriveError::InvalidKeyMaterial(format!("cannot parse xpub: {e}")))?;

        let account_path = account_path.trim().to_string();
        let depth = path_depth(&account_path)?;
        let key_depth = xpub.attrs().depth;
        if depth != usize::from(key_depth) {
            return Err(DeriveError::InvalidKeyMaterial(format!(
                "xpub depth {key_depth} does not match account path {account_path}"
            )));
        }

        Ok(Self { xpub, account_path })
    }

    /// Read the key from a mounted secret file (first non-empty line).
    pub fn from_file(path: impl AsRef<Path>, account_path: &str) -> Result<Self, DeriveError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            DeriveError::InvalidKeyMaterial(format!("cannot read {}: {e}", path.display()))
        })?;
        let line = contents
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default();
        Self::parse(line, account_path)
    }

    pub fn xpub(&self) -> &AccountXPub {
        &self.xpub
    }

    pub fn account_path(&self) -> &str {
        &self.account_path
    }

    /// Full path of the child at `index`.
    pub fn child_path(&self, index: u32) -> String {
        format!("{}/{}", self.account_path, index)
    }

    /// Hex fingerprint of the key, safe to log.
    pub fn fingerprint(&self) -> String {
        self.xpub
            .fingerprint()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

impl fmt::Debug for MasterKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKeyMaterial")
            .field("fingerprint", &self.fingerprint())
            .field("account_path", &self.account_path)
            .finish()
    }
}

/// Number of components below `m` in a path like `m/44'/60'/0'/0`.
fn path_depth(path: &str) -> Result<usize, DeriveError> {
    let invalid = || DeriveError::InvalidKeyMaterial(format!("invalid account path: {path}"));

    let mut parts = path.split('/');
    if parts.next() != Some("m") {
        return Err(invalid());
    }

    let mut depth = 0;
    for part in parts {
        let digits = part
            .strip_suffix('\'')
            .or_else(|| part.strip_suffix('h'))
            .unwrap_or(part);
        let value: u32 = digits.parse().map_err(|_| invalid())?;
        if value > super::MAX_CHILD_INDEX {
            return Err(invalid());
        }
        depth += 1;
    }

    Ok(depth)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// BIP-32 test vector 1 master public key (seed 000102...0f).
    pub(crate) const TEST_XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";

    const TEST_XPRV: &str = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";

    pub(crate) fn test_master_key() -> MasterKeyMaterial {
        MasterKeyMaterial::parse(TEST_XPUB, "m").expect("test xpub parses")
    }

    #[test]
    fn parses_master_xpub() {
        let key = test_master_key();
        assert_eq!(key.account_path(), "m");
        assert_eq!(key.child_path(7), "m/7");
        assert_eq!(key.fingerprint(), "3442193e");
    }

    #[test]
    fn rejects_extended_private_key() {
        let err = MasterKeyMaterial::parse(TEST_XPRV, "m").unwrap_err();
        assert!(matches!(err, DeriveError::InvalidKeyMaterial(_)));
        assert!(err.to_string().contains("private"));
    }

    #[test]
    fn rejects_garbage_and_empty_input() {
        assert!(matches!(
            MasterKeyMaterial::parse("xpub-not-a-key", "m"),
            Err(DeriveError::InvalidKeyMaterial(_))
        ));
        assert!(matches!(
            MasterKeyMaterial::parse("   ", "m"),
            Err(DeriveError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let mut corrupted = TEST_XPUB.to_string();
        corrupted.pop();
        corrupted.push('9');
        assert!(matches!(
            MasterKeyMaterial::parse(&corrupted, "m"),
            Err(DeriveError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn rejects_path_depth_mismatch() {
        let err = MasterKeyMaterial::parse(TEST_XPUB, DEFAULT_ACCOUNT_PATH).unwrap_err();
        assert!(err.to_string().contains("depth"));
    }

    #[test]
    fn path_depth_parsing() {
        assert_eq!(path_depth("m").unwrap(), 0);
        assert_eq!(path_depth(DEFAULT_ACCOUNT_PATH).unwrap(), 4);
        assert_eq!(path_depth("m/44h/60h/0h").unwrap(), 3);
        assert!(path_depth("44'/60'").is_err());
        assert!(path_depth("m/abc").is_err());
        assert!(path_depth("m/2147483648").is_err());
    }

    #[test]
    fn reads_key_from_secret_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.xpub");
        fs::write(&path, format!("\n{TEST_XPUB}\n")).unwrap();

        let key = MasterKeyMaterial::from_file(&path, "m").unwrap();
        assert_eq!(key.fingerprint(), test_master_key().fingerprint());

        let missing = MasterKeyMaterial::from_file(dir.path().join("nope"), "m");
        assert!(matches!(missing, Err(DeriveError::InvalidKeyMaterial(_))));
    }

    #[test]
    fn debug_output_does_not_contain_key() {
        let rendered = format!("{:?}", test_master_key());
        assert!(!rendered.contains(TEST_XPUB));
        assert!(rendered.contains("fingerprint"));
    }
}
