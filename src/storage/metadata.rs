//! Metadata store handle.
//!
//! The store itself is an external collaborator; the broker layer consumes
//! the [`MetadataStore`] surface only. Account creation is a first-writer-
//! wins insert so that replicas racing on first boot against shared storage
//! cannot both create the administrative account.

use crate::control::accounts::AccountRecord;
use crate::core::config::StorageConfig;
use crate::messaging::poison::PoisonMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("metadata store unreachable: {0}")]
    Unreachable(String),
    #[error("write rejected: {0}")]
    WriteRejected(String),
    #[error("corrupt record {0}")]
    CorruptRecord(String),
}

/// Outcome of a uniqueness-constrained insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Handle to durable broker metadata. Implementations are internally
/// synchronized; handles are shared freely across tasks.
pub trait MetadataStore: Send + Sync + 'static {
    /// Insert an account record, failing over to `AlreadyExists` when the
    /// identity is already taken. Exactly one concurrent caller wins.
    fn insert_account(&self, record: &AccountRecord) -> Result<InsertOutcome, StoreError>;

    fn load_account(&self, identity: &str) -> Result<Option<AccountRecord>, StoreError>;

    /// Durably record one poison message.
    fn append_poison_message(&self, message: &PoisonMessage) -> Result<(), StoreError>;

    fn poison_messages(&self) -> Result<Vec<PoisonMessage>, StoreError>;

    /// Release the handle. Idempotent.
    fn close(&self);
}

/// Open the configured store. Fails when the backing directory cannot be
/// prepared; bootstrap treats that as fatal.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn MetadataStore>, StoreError> {
    let store = FileStore::open(config.data_dir.clone())?;
    Ok(Arc::new(store))
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// JSON-file-backed store rooted at a data directory. Account uniqueness
/// rides on `O_EXCL` file creation, which holds across processes sharing
/// the directory.
pub struct FileStore {
    accounts_dir: PathBuf,
    poison_dir: PathBuf,
    closed: AtomicBool,
}

impl FileStore {
    pub fn open(root: PathBuf) -> Result<Self, StoreError> {
        if root.exists() && !root.is_dir() {
            return Err(StoreError::Unreachable(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        let accounts_dir = root.join("accounts");
        let poison_dir = root.join("poison");
        for dir in [&accounts_dir, &poison_dir] {
            fs::create_dir_all(dir)
                .map_err(|err| StoreError::Unreachable(format!("{}: {err}", dir.display())))?;
        }
        Ok(Self {
            accounts_dir,
            poison_dir,
            closed: AtomicBool::new(false),
        })
    }

    fn guard_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("store handle closed".into()));
        }
        Ok(())
    }

    fn account_path(&self, identity: &str) -> PathBuf {
        self.accounts_dir.join(format!("{identity}.json"))
    }
}

impl MetadataStore for FileStore {
    fn insert_account(&self, record: &AccountRecord) -> Result<InsertOutcome, StoreError> {
        self.guard_open()?;
        let path = self.account_path(&record.identity);
        let body = serde_json::to_vec_pretty(record)
            .map_err(|err| StoreError::WriteRejected(err.to_string()))?;
        // Stage the complete record before linking it into place, so the
        // account file can never be observed half-written after a crash.
        let staged = self.accounts_dir.join(format!(".{}.tmp", Uuid::new_v4()));
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged)
            .map_err(|err| StoreError::WriteRejected(format!("{}: {err}", staged.display())))?;
        file.write_all(&body)
            .and_then(|()| file.sync_all())
            .map_err(|err| StoreError::WriteRejected(format!("{}: {err}", staged.display())))?;
        drop(file);
        match fs::hard_link(&staged, &path) {
            Ok(()) => {
                let _ = fs::remove_file(&staged);
                Ok(InsertOutcome::Inserted)
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                // A torn record left by an interrupted writer must not veto
                // provisioning forever; replace it and report the insert.
                let existing_valid = fs::read(&path)
                    .ok()
                    .is_some_and(|data| serde_json::from_slice::<AccountRecord>(&data).is_ok());
                if existing_valid {
                    let _ = fs::remove_file(&staged);
                    Ok(InsertOutcome::AlreadyExists)
                } else {
                    fs::rename(&staged, &path).map_err(|err| {
                        StoreError::WriteRejected(format!("{}: {err}", path.display()))
                    })?;
                    Ok(InsertOutcome::Inserted)
                }
            }
            Err(err) => {
                let _ = fs::remove_file(&staged);
                Err(StoreError::WriteRejected(format!(
                    "{}: {err}",
                    path.display()
                )))
            }
        }
    }

    fn load_account(&self, identity: &str) -> Result<Option<AccountRecord>, StoreError> {
        self.guard_open()?;
        let path = self.account_path(identity);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StoreError::Unreachable(format!(
                    "{}: {err}",
                    path.display()
                )));
            }
        };
        let record = serde_json::from_slice(&data)
            .map_err(|_| StoreError::CorruptRecord(path.display().to_string()))?;
        Ok(Some(record))
    }

    fn append_poison_message(&self, message: &PoisonMessage) -> Result<(), StoreError> {
        self.guard_open()?;
        let path = self.poison_dir.join(format!("{}.json", Uuid::new_v4()));
        let body = serde_json::to_vec_pretty(message)
            .map_err(|err| StoreError::WriteRejected(err.to_string()))?;
        fs::write(&path, body)
            .map_err(|err| StoreError::WriteRejected(format!("{}: {err}", path.display())))
    }

    fn poison_messages(&self) -> Result<Vec<PoisonMessage>, StoreError> {
        self.guard_open()?;
        let entries = fs::read_dir(&self.poison_dir)
            .map_err(|err| StoreError::Unreachable(err.to_string()))?;
        let mut messages = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::Unreachable(err.to_string()))?;
            let data = fs::read(entry.path())
                .map_err(|err| StoreError::Unreachable(err.to_string()))?;
            let message = serde_json::from_slice(&data)
                .map_err(|_| StoreError::CorruptRecord(entry.path().display().to_string()))?;
            messages.push(message);
        }
        Ok(messages)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("metadata store handle closed");
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    accounts: Mutex<HashMap<String, AccountRecord>>,
    poison: Mutex<Vec<PoisonMessage>>,
    unreachable: AtomicBool,
    closed: AtomicBool,
}

/// In-memory store shared by cloning; used by tests and embeddings that do
/// not need durability. The `unreachable` switch simulates a storage outage.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn guard(&self) -> Result<(), StoreError> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("simulated storage outage".into()));
        }
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("store handle closed".into()));
        }
        Ok(())
    }
}

impl MetadataStore for MemoryStore {
    fn insert_account(&self, record: &AccountRecord) -> Result<InsertOutcome, StoreError> {
        self.guard()?;
        let mut accounts = self.inner.accounts.lock();
        if accounts.contains_key(&record.identity) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        accounts.insert(record.identity.clone(), record.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn load_account(&self, identity: &str) -> Result<Option<AccountRecord>, StoreError> {
        self.guard()?;
        Ok(self.inner.accounts.lock().get(identity).cloned())
    }

    fn append_poison_message(&self, message: &PoisonMessage) -> Result<(), StoreError> {
        self.guard()?;
        self.inner.poison.lock().push(message.clone());
        Ok(())
    }

    fn poison_messages(&self) -> Result<Vec<PoisonMessage>, StoreError> {
        self.guard()?;
        Ok(self.inner.poison.lock().clone())
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}
