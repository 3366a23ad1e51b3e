//! Shared-secret verification
//!
//! The credential store is an external collaborator; `CredentialVerifier`
//! is its seam. `InMemoryCredentials` keeps SHA-256 digests only.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Checks a presented secret for an identity
pub trait CredentialVerifier: Send + Sync {
    /// `false` for unknown identities and wrong secrets alike
    fn verify(&self, identity_id: &str, secret: &str) -> bool;
}

/// SHA-256 digest of a secret, bound to its identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretDigest([u8; 32]);

impl SecretDigest {
    pub fn compute(identity_id: &str, secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"affect-guard/credential/v1\0");
        hasher.update(identity_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(secret.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Comparison without early exit
    pub fn constant_time_eq(&self, other: &Self) -> bool {
        let mut diff = 0u8;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

/// In-process credential store
#[derive(Debug, Default)]
pub struct InMemoryCredentials {
    digests: DashMap<String, SecretDigest>,
}

impl InMemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an identity's secret
    pub fn register(&self, identity_id: &str, secret: &str) {
        self.digests.insert(
            identity_id.to_string(),
            SecretDigest::compute(identity_id, secret),
        );
    }

    pub fn contains(&self, identity_id: &str) -> bool {
        self.digests.contains_key(identity_id)
    }

    pub fn remove(&self, identity_id: &str) -> bool {
        self.digests.remove(identity_id).is_some()
    }

    pub fn snapshot(&self) -> BTreeMap<String, SecretDigest> {
        self.digests
            .iter()
            .map(|item| (item.key().clone(), *item.value()))
            .collect()
    }

    pub fn restore(&self, digests: BTreeMap<String, SecretDigest>) {
        self.digests.clear();
        for (identity_id, digest) in digests {
            self.digests.insert(identity_id, digest);
        }
    }
}

impl CredentialVerifier for InMemoryCredentials {
    fn verify(&self, identity_id: &str, secret: &str) -> bool {
        let presented = SecretDigest::compute(identity_id, secret);
        match self.digests.get(identity_id) {
            Some(stored) => stored.value().constant_time_eq(&presented),
            None => false,
        }
    }
}
