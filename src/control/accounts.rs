//! Administrative account provisioning.
//!
//! Exactly one administrative account exists per storage namespace. The
//! bootstrap credentials are fixed, well-known values meant to be rotated
//! after install; they are a convenience, not a security boundary. The
//! singleton property rides on the store's uniqueness-constrained insert,
//! not on in-process locking, because multiple replicas may race on first
//! boot against shared storage.

use crate::storage::metadata::{InsertOutcome, MetadataStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Fixed identity of the administrative account.
pub const ROOT_IDENTITY: &str = "root";

/// Default bootstrap password, expected to be changed post-install.
pub const DEFAULT_ROOT_PASSWORD: &str = "meridian";

/// Default SDK/CLI connection token.
pub const DEFAULT_CONNECTION_TOKEN: &str = "meridian";

/// Singleton credential record for initial administrative access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub identity: String,
    pub password_digest: String,
    pub connection_token: String,
    pub created_at: DateTime<Utc>,
}

/// Hex SHA-256 digest of a password.
pub fn digest_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Outcome of [`ensure_root_account`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootAccountOutcome {
    Created,
    AlreadyExisted,
}

/// Idempotently provision the administrative account. Racing callers are
/// resolved by the store: one insert wins, the rest observe the existing
/// record and report success. Only store unreachability or a non-conflict
/// write rejection is an error.
pub fn ensure_root_account(
    store: &Arc<dyn MetadataStore>,
) -> Result<RootAccountOutcome, StoreError> {
    if store.load_account(ROOT_IDENTITY)?.is_some() {
        return Ok(RootAccountOutcome::AlreadyExisted);
    }
    let record = AccountRecord {
        identity: ROOT_IDENTITY.to_string(),
        password_digest: digest_password(DEFAULT_ROOT_PASSWORD),
        connection_token: DEFAULT_CONNECTION_TOKEN.to_string(),
        created_at: Utc::now(),
    };
    match store.insert_account(&record)? {
        InsertOutcome::Inserted => {
            crate::ops::audit::emit("account_created", ROOT_IDENTITY, "administrative account provisioned");
            Ok(RootAccountOutcome::Created)
        }
        InsertOutcome::AlreadyExists => Ok(RootAccountOutcome::AlreadyExisted),
    }
}
