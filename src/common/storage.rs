//! Store abstraction for the directory node
//!
//! Every component receives an `Arc<dyn DirectoryStore>` at construction.
//! Two backends exist: [`MemStore`] here (tests, ephemeral deployments) and
//! the RocksDB-backed `coordinator::metadata::MetadataStore`.
//!
//! Each call is atomic on its own. Nothing here spans calls.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use crate::common::{Error, Result};

pub type UserId = u64;
pub type ServerId = u64;
pub type FileId = u64;

/// Stored account. Password and salt are kept as the decoded text the
/// client produced; this service never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub password: String,
    pub salt: String,
}

/// Registered storage server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: ServerId,
    pub address: String,
    /// Monotonic registration sequence; orders servers into ranks
    pub registered_seq: u64,
}

/// File row as submitted by a client, before the store assigns an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFileRecord {
    pub user_id: UserId,
    pub server_id: ServerId,
    pub path: String,
    pub filename: String,
    pub is_backup: bool,
    pub file_hash: String,
    pub last_modified: i64,
}

impl NewFileRecord {
    pub fn with_id(self, id: FileId) -> FileRecord {
        FileRecord {
            id,
            user_id: self.user_id,
            server_id: self.server_id,
            path: self.path,
            filename: self.filename,
            is_backup: self.is_backup,
            file_hash: self.file_hash,
            last_modified: self.last_modified,
        }
    }
}

/// Stored file row: one replica (primary or backup) of a file on one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub user_id: UserId,
    pub server_id: ServerId,
    pub path: String,
    pub filename: String,
    pub is_backup: bool,
    pub file_hash: String,
    pub last_modified: i64,
}

impl FileRecord {
    pub(crate) fn same_replica(&self, row: &NewFileRecord) -> bool {
        self.user_id == row.user_id
            && self.server_id == row.server_id
            && self.path == row.path
            && self.filename == row.filename
    }
}

/// Outcome of removing a server together with its file rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub server_existed: bool,
    pub files_removed: usize,
}

/// Row counts, for status reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub users: usize,
    pub servers: usize,
    pub files: usize,
}

/// Persistent store capability consumed by the directory components.
pub trait DirectoryStore: Send + Sync {
    /// Backend name, for status output
    fn name(&self) -> &'static str;

    /// Cheap reachability check
    fn ping(&self) -> Result<()> {
        Ok(())
    }

    // === Users ===

    /// Insert an account; `AlreadyExists` if the username is taken.
    fn insert_user(&self, username: &str, password: &str, salt: &str) -> Result<UserId>;
    fn find_user(&self, username: &str) -> Result<Option<UserRecord>>;
    fn user_exists(&self, id: UserId) -> Result<bool>;

    // === Servers ===

    /// Insert a server with a caller-chosen id; `AlreadyExists` if the id is live.
    fn insert_server(&self, id: ServerId, address: &str) -> Result<()>;
    fn server(&self, id: ServerId) -> Result<Option<ServerRecord>>;
    fn server_count(&self) -> Result<usize>;
    /// Server at 1-indexed registration rank
    fn server_at_rank(&self, rank: usize) -> Result<Option<ServerRecord>>;
    /// All servers in registration order
    fn servers(&self) -> Result<Vec<ServerRecord>>;
    /// Delete the server's file rows and then the server, as one atomic write.
    fn remove_server(&self, id: ServerId) -> Result<CascadeReport>;

    // === Files ===

    /// Insert all rows or none. See [`check_batch`] for the rules.
    fn insert_files(&self, batch: &[NewFileRecord]) -> Result<()>;
    /// All rows of a user, in insertion order
    fn files_for_user(&self, user_id: UserId) -> Result<Vec<FileRecord>>;
    /// Delete every row of (user, path), primary and backups alike
    fn remove_files(&self, user_id: UserId, path: &str) -> Result<usize>;

    // === Maintenance ===

    /// Drop all servers and files; accounts survive.
    fn reset_fleet(&self) -> Result<()>;
    fn counts(&self) -> Result<StoreCounts>;
}

/// Validate a file batch before insertion.
///
/// Every row must reference an existing user and server, and no two rows
/// (stored or in the batch) may share (user, server, path, filename).
pub(crate) fn check_batch<U, S, D>(
    batch: &[NewFileRecord],
    mut user_exists: U,
    mut server_exists: S,
    mut already_stored: D,
) -> Result<()>
where
    U: FnMut(UserId) -> Result<bool>,
    S: FnMut(ServerId) -> Result<bool>,
    D: FnMut(&NewFileRecord) -> Result<bool>,
{
    let mut seen = HashSet::with_capacity(batch.len());

    for (i, row) in batch.iter().enumerate() {
        if !user_exists(row.user_id)? {
            return Err(Error::InvalidBatch(format!(
                "row {}: unknown user {}",
                i, row.user_id
            )));
        }
        if !server_exists(row.server_id)? {
            return Err(Error::InvalidBatch(format!(
                "row {}: unknown server {}",
                i, row.server_id
            )));
        }
        let key = (
            row.user_id,
            row.server_id,
            row.path.as_str(),
            row.filename.as_str(),
        );
        if !seen.insert(key) || already_stored(row)? {
            return Err(Error::InvalidBatch(format!(
                "row {}: {}/{} already recorded on server {}",
                i, row.path, row.filename, row.server_id
            )));
        }
    }

    Ok(())
}

#[derive(Default)]
struct Tables {
    users: Vec<UserRecord>,
    servers: Vec<ServerRecord>,
    files: Vec<FileRecord>,
    next_user_id: UserId,
    next_file_id: FileId,
    next_server_seq: u64,
}

/// In-memory store. One mutex over all tables serializes every call.
pub struct MemStore {
    tables: Mutex<Tables>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| Error::Backend("memory store lock poisoned".into()))
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryStore for MemStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn insert_user(&self, username: &str, password: &str, salt: &str) -> Result<UserId> {
        let mut t = self.lock()?;
        if t.users.iter().any(|u| u.username == username) {
            return Err(Error::AlreadyExists(format!("user {}", username)));
        }
        t.next_user_id += 1;
        let id = t.next_user_id;
        t.users.push(UserRecord {
            id,
            username: username.to_string(),
            password: password.to_string(),
            salt: salt.to_string(),
        });
        Ok(id)
    }

    fn find_user(&self, username: &str) -> Result<Option<UserRecord>> {
        let t = self.lock()?;
        Ok(t.users.iter().find(|u| u.username == username).cloned())
    }

    fn user_exists(&self, id: UserId) -> Result<bool> {
        Ok(self.lock()?.users.iter().any(|u| u.id == id))
    }

    fn insert_server(&self, id: ServerId, address: &str) -> Result<()> {
        let mut t = self.lock()?;
        if t.servers.iter().any(|s| s.id == id) {
            return Err(Error::AlreadyExists(format!("server {}", id)));
        }
        t.next_server_seq += 1;
        let registered_seq = t.next_server_seq;
        t.servers.push(ServerRecord {
            id,
            address: address.to_string(),
            registered_seq,
        });
        Ok(())
    }

    fn server(&self, id: ServerId) -> Result<Option<ServerRecord>> {
        Ok(self.lock()?.servers.iter().find(|s| s.id == id).cloned())
    }

    fn server_count(&self) -> Result<usize> {
        Ok(self.lock()?.servers.len())
    }

    fn server_at_rank(&self, rank: usize) -> Result<Option<ServerRecord>> {
        if rank == 0 {
            return Ok(None);
        }
        Ok(self.lock()?.servers.get(rank - 1).cloned())
    }

    fn servers(&self) -> Result<Vec<ServerRecord>> {
        Ok(self.lock()?.servers.clone())
    }

    fn remove_server(&self, id: ServerId) -> Result<CascadeReport> {
        let mut t = self.lock()?;
        let before = t.files.len();
        t.files.retain(|f| f.server_id != id);
        let files_removed = before - t.files.len();

        let servers_before = t.servers.len();
        t.servers.retain(|s| s.id != id);

        Ok(CascadeReport {
            server_existed: t.servers.len() != servers_before,
            files_removed,
        })
    }

    fn insert_files(&self, batch: &[NewFileRecord]) -> Result<()> {
        let mut t = self.lock()?;
        {
            let tables = &*t;
            check_batch(
                batch,
                |uid| Ok(tables.users.iter().any(|u| u.id == uid)),
                |sid| Ok(tables.servers.iter().any(|s| s.id == sid)),
                |row| Ok(tables.files.iter().any(|f| f.same_replica(row))),
            )?;
        }

        for row in batch {
            t.next_file_id += 1;
            let id = t.next_file_id;
            t.files.push(row.clone().with_id(id));
        }
        Ok(())
    }

    fn files_for_user(&self, user_id: UserId) -> Result<Vec<FileRecord>> {
        let t = self.lock()?;
        Ok(t.files
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect())
    }

    fn remove_files(&self, user_id: UserId, path: &str) -> Result<usize> {
        let mut t = self.lock()?;
        let before = t.files.len();
        t.files.retain(|f| !(f.user_id == user_id && f.path == path));
        Ok(before - t.files.len())
    }

    fn reset_fleet(&self) -> Result<()> {
        let mut t = self.lock()?;
        t.files.clear();
        t.servers.clear();
        Ok(())
    }

    fn counts(&self) -> Result<StoreCounts> {
        let t = self.lock()?;
        Ok(StoreCounts {
            users: t.users.len(),
            servers: t.servers.len(),
            files: t.files.len(),
        })
    }
}
