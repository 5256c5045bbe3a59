use chrono::Duration;
use fs2::FileExt;
use log::debug;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;

use super::state::AccountState;
use crate::modules::auth::store::{
    Datastore, OutboxEntry, OutboxId, OutboxStore, StoreError, Transaction, User, UserStore,
    VerificationToken, VerificationTokenStore,
};
use crate::modules::email::NotificationEmail;

/// Account datastore kept in memory and, optionally, mirrored to a JSON file.
///
/// A transaction holds the mutex from `begin` until it is committed or
/// dropped. File-backed stores additionally hold an exclusive lock on
/// `<data file>.lock` for the same span and re-read the file under it, so
/// other processes sharing the file see each other's commits.
pub struct JsonDatastore {
    state: Mutex<AccountState>,
    path: Option<PathBuf>,
}

impl JsonDatastore {
    /// Datastore that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(AccountState::default()),
            path: None,
        }
    }

    /// Open (or start) a file-backed datastore. A missing file is an empty
    /// store; a corrupt one is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = Self {
            state: Mutex::new(AccountState::default()),
            path: Some(path.as_ref().to_path_buf()),
        };

        // Reject a corrupt file now rather than at the first transaction
        drop(store.acquire()?);
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy of the committed state
    pub fn snapshot(&self) -> Result<AccountState, StoreError> {
        let (guard, _file_lock) = self.acquire()?;
        Ok(guard.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, AccountState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Take the process-local mutex, then the file lock, and refresh the
    /// guarded state from disk. The file lock is released when the returned
    /// handle is dropped.
    fn acquire(&self) -> Result<(MutexGuard<'_, AccountState>, Option<File>), StoreError> {
        let mut guard = self.lock()?;
        let Some(path) = &self.path else {
            return Ok((guard, None));
        };

        let file_lock = lock_file(path)?;
        *guard = load_state(path)?;
        Ok((guard, Some(file_lock)))
    }

    /// Write the state next to its destination, then rename over it
    fn persist(&self, state: &AccountState) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut file = NamedTempFile::new_in(parent_dir(path))?;
        serde_json::to_writer_pretty(&mut file, state)?;
        file.flush()?;
        file.persist(path).map_err(|e| StoreError::Io(e.error))?;

        debug!("Datastore written to {}", path.display());
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("accounts"));
    name.push(".lock");
    path.with_file_name(name)
}

/// Block until this process holds the exclusive lock beside `path`
fn lock_file(path: &Path) -> Result<File, StoreError> {
    std::fs::create_dir_all(parent_dir(path))?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path(path))?;
    file.lock_exclusive()?;
    Ok(file)
}

fn load_state(path: &Path) -> Result<AccountState, StoreError> {
    match File::open(path) {
        Ok(file) => Ok(serde_json::from_reader(BufReader::new(file))?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No datastore at {}, starting empty", path.display());
            Ok(AccountState::default())
        }
        Err(e) => Err(StoreError::Io(e)),
    }
}

impl Datastore for JsonDatastore {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        let (guard, file_lock) = self.acquire()?;
        let staged = guard.clone();
        Ok(Box::new(JsonTransaction {
            store: self,
            guard,
            _file_lock: file_lock,
            staged,
        }))
    }
}

/// Writes go to `staged`; the committed state under `guard` is replaced
/// only once the file write (if any) succeeded.
struct JsonTransaction<'a> {
    store: &'a JsonDatastore,
    guard: MutexGuard<'a, AccountState>,
    _file_lock: Option<File>,
    staged: AccountState,
}

impl Transaction for JsonTransaction<'_> {
    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let JsonTransaction {
            store,
            mut guard,
            _file_lock,
            staged,
        } = *self;

        store.persist(&staged)?;
        *guard = staged;
        Ok(())
    }
}

impl UserStore for JsonTransaction<'_> {
    fn save_user(&mut self, user: User) -> Result<User, StoreError> {
        self.staged.save_user(user)
    }

    fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.staged.find_by_username(username)
    }

    fn delete_user(&mut self, username: &str) -> Result<bool, StoreError> {
        self.staged.delete_user(username)
    }
}

impl VerificationTokenStore for JsonTransaction<'_> {
    fn save_token(&mut self, token: VerificationToken) -> Result<VerificationToken, StoreError> {
        self.staged.save_token(token)
    }

    fn find_by_token(&self, token: &str) -> Result<Option<VerificationToken>, StoreError> {
        self.staged.find_by_token(token)
    }
}

impl OutboxStore for JsonTransaction<'_> {
    fn enqueue(&mut self, email: NotificationEmail) -> Result<OutboxId, StoreError> {
        self.staged.enqueue(email)
    }

    fn pending(&self) -> Result<Vec<OutboxEntry>, StoreError> {
        self.staged.pending()
    }

    fn claim(&mut self, id: OutboxId, stale_after: Duration) -> Result<bool, StoreError> {
        self.staged.claim(id, stale_after)
    }

    fn mark_delivered(&mut self, id: OutboxId) -> Result<(), StoreError> {
        self.staged.mark_delivered(id)
    }

    fn record_failure(&mut self, id: OutboxId, reason: &str) -> Result<(), StoreError> {
        self.staged.record_failure(id, reason)
    }
}
