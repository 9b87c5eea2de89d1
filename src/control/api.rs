//! Admin request handlers.
//!
//! Thin wiring between the external HTTP administrative server and the
//! broker-owned state: account lookup for login and a read-only view of
//! the connection table. The HTTP surface itself lives outside this crate.

use crate::control::accounts::{self, AccountRecord};
use crate::messaging::reaper::{ConnectionRecord, ConnectionTable};
use crate::storage::metadata::{MetadataStore, StoreError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("unknown account")]
    UnknownAccount,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Handlers bound against the metadata store and the live connection table.
#[derive(Clone)]
pub struct AdminHandlers {
    store: Arc<dyn MetadataStore>,
    connections: ConnectionTable,
}

impl AdminHandlers {
    pub fn new(store: Arc<dyn MetadataStore>, connections: ConnectionTable) -> Self {
        Self { store, connections }
    }

    /// Verify credentials against the stored digest.
    pub fn authenticate(&self, identity: &str, password: &str) -> Result<AccountRecord, AdminError> {
        let record = self
            .store
            .load_account(identity)?
            .ok_or(AdminError::UnknownAccount)?;
        if record.password_digest != accounts::digest_password(password) {
            return Err(AdminError::InvalidCredentials);
        }
        Ok(record)
    }

    /// Snapshot of broker-side connection state for the admin UI.
    pub fn connections(&self) -> Vec<ConnectionRecord> {
        self.connections.snapshot()
    }

    /// Number of dead-letter records currently held.
    pub fn poison_backlog(&self) -> Result<usize, AdminError> {
        Ok(self.store.poison_messages()?.len())
    }
}
