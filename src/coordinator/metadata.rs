//! Directory store using RocksDB
//!
//! Column families:
//! - `users`: username → UserRecord
//! - `user_ids`: user id → username (foreign-key checks)
//! - `servers`: server id → ServerRecord
//! - `files`: file id → FileRecord (big-endian ids, so iteration is insertion order)
//! - `config`: id counters
//!
//! Multi-row changes go through a single `WriteBatch`. A write mutex makes
//! each check-then-write sequence atomic with respect to other callers.

use crate::common::storage::check_batch;
use crate::common::{
    CascadeReport, DirectoryStore, Error, FileRecord, NewFileRecord, Result, ServerId,
    ServerRecord, StoreCounts, UserId, UserRecord,
};
use rocksdb::{ColumnFamily, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const CF_USERS: &str = "users";
const CF_USER_IDS: &str = "user_ids";
const CF_SERVERS: &str = "servers";
const CF_FILES: &str = "files";
const CF_CONFIG: &str = "config";

const NEXT_USER_ID: &[u8] = b"next_user_id";
const NEXT_FILE_ID: &[u8] = b"next_file_id";
const NEXT_SERVER_SEQ: &[u8] = b"next_server_seq";

/// RocksDB-backed directory store
pub struct MetadataStore {
    db: DB,
    write_lock: Mutex<()>,
}

impl MetadataStore {
    /// Open or create metadata store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(
            &opts,
            path,
            vec![CF_USERS, CF_USER_IDS, CF_SERVERS, CF_FILES, CF_CONFIG],
        )?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Internal(format!("missing column family {}", name)))
    }

    fn write_guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| Error::Backend("metadata write lock poisoned".into()))
    }

    fn counter(&self, key: &[u8]) -> Result<u64> {
        match self.db.get_cf(self.cf(CF_CONFIG)?, key)? {
            Some(bytes) => decode_id(&bytes),
            None => Ok(0),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<(Box<[u8]>, T)>> {
        let cf = self.cf(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let row: T = bincode::deserialize(&value)?;
            rows.push((key, row));
        }
        Ok(rows)
    }

    fn count(&self, cf_name: &str) -> Result<usize> {
        let cf = self.cf(cf_name)?;
        let mut n = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            n += 1;
        }
        Ok(n)
    }

    fn cascade(&self, id: ServerId) -> Result<CascadeReport> {
        let files_cf = self.cf(CF_FILES)?;
        let servers_cf = self.cf(CF_SERVERS)?;

        let mut batch = WriteBatch::default();
        let mut files_removed = 0;
        for (key, file) in self.scan::<FileRecord>(CF_FILES)? {
            if file.server_id == id {
                batch.delete_cf(files_cf, key);
                files_removed += 1;
            }
        }

        let server_key = id.to_be_bytes();
        let server_existed = self.db.get_cf(servers_cf, server_key)?.is_some();
        batch.delete_cf(servers_cf, server_key);

        self.db.write(batch)?;
        Ok(CascadeReport {
            server_existed,
            files_removed,
        })
    }

    /// Flush to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn decode_id(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::MetadataCorrupted(format!("bad id length {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

impl DirectoryStore for MetadataStore {
    fn name(&self) -> &'static str {
        "rocksdb"
    }

    fn ping(&self) -> Result<()> {
        self.counter(NEXT_USER_ID).map(|_| ())
    }

    // === User operations ===

    fn insert_user(&self, username: &str, password: &str, salt: &str) -> Result<UserId> {
        let _guard = self.write_guard()?;
        let users = self.cf(CF_USERS)?;

        if self.db.get_cf(users, username.as_bytes())?.is_some() {
            return Err(Error::AlreadyExists(format!("user {}", username)));
        }

        let id = self.counter(NEXT_USER_ID)? + 1;
        let record = UserRecord {
            id,
            username: username.to_string(),
            password: password.to_string(),
            salt: salt.to_string(),
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(users, username.as_bytes(), bincode::serialize(&record)?);
        batch.put_cf(self.cf(CF_USER_IDS)?, id.to_be_bytes(), username.as_bytes());
        batch.put_cf(self.cf(CF_CONFIG)?, NEXT_USER_ID, id.to_be_bytes());
        self.db.write(batch)?;

        Ok(id)
    }

    fn find_user(&self, username: &str) -> Result<Option<UserRecord>> {
        match self.db.get_cf(self.cf(CF_USERS)?, username.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn user_exists(&self, id: UserId) -> Result<bool> {
        Ok(self
            .db
            .get_cf(self.cf(CF_USER_IDS)?, id.to_be_bytes())?
            .is_some())
    }

    // === Server operations ===

    fn insert_server(&self, id: ServerId, address: &str) -> Result<()> {
        let _guard = self.write_guard()?;
        let servers = self.cf(CF_SERVERS)?;

        if self.db.get_cf(servers, id.to_be_bytes())?.is_some() {
            return Err(Error::AlreadyExists(format!("server {}", id)));
        }

        let registered_seq = self.counter(NEXT_SERVER_SEQ)? + 1;
        let record = ServerRecord {
            id,
            address: address.to_string(),
            registered_seq,
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(servers, id.to_be_bytes(), bincode::serialize(&record)?);
        batch.put_cf(
            self.cf(CF_CONFIG)?,
            NEXT_SERVER_SEQ,
            registered_seq.to_be_bytes(),
        );
        self.db.write(batch)?;
        Ok(())
    }

    fn server(&self, id: ServerId) -> Result<Option<ServerRecord>> {
        match self.db.get_cf(self.cf(CF_SERVERS)?, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn server_count(&self) -> Result<usize> {
        self.count(CF_SERVERS)
    }

    fn server_at_rank(&self, rank: usize) -> Result<Option<ServerRecord>> {
        if rank == 0 {
            return Ok(None);
        }
        Ok(self.servers()?.into_iter().nth(rank - 1))
    }

    fn servers(&self) -> Result<Vec<ServerRecord>> {
        let mut servers: Vec<ServerRecord> = self
            .scan::<ServerRecord>(CF_SERVERS)?
            .into_iter()
            .map(|(_, s)| s)
            .collect();
        servers.sort_by_key(|s| s.registered_seq);
        Ok(servers)
    }

    fn remove_server(&self, id: ServerId) -> Result<CascadeReport> {
        let _guard = self.write_guard()?;
        self.cascade(id).map_err(|e| Error::Cascade {
            server_id: id,
            reason: e.to_string(),
        })
    }

    // === File operations ===

    fn insert_files(&self, batch: &[NewFileRecord]) -> Result<()> {
        let _guard = self.write_guard()?;

        let stored: Vec<FileRecord> = self
            .scan::<FileRecord>(CF_FILES)?
            .into_iter()
            .map(|(_, f)| f)
            .collect();
        check_batch(
            batch,
            |uid| self.user_exists(uid),
            |sid| Ok(self.server(sid)?.is_some()),
            |row| Ok(stored.iter().any(|f| f.same_replica(row))),
        )?;

        let files = self.cf(CF_FILES)?;
        let mut next_id = self.counter(NEXT_FILE_ID)?;
        let mut write = WriteBatch::default();
        for row in batch {
            next_id += 1;
            let record = row.clone().with_id(next_id);
            write.put_cf(files, next_id.to_be_bytes(), bincode::serialize(&record)?);
        }
        write.put_cf(self.cf(CF_CONFIG)?, NEXT_FILE_ID, next_id.to_be_bytes());
        self.db.write(write)?;
        Ok(())
    }

    fn files_for_user(&self, user_id: UserId) -> Result<Vec<FileRecord>> {
        Ok(self
            .scan::<FileRecord>(CF_FILES)?
            .into_iter()
            .map(|(_, f)| f)
            .filter(|f| f.user_id == user_id)
            .collect())
    }

    fn remove_files(&self, user_id: UserId, path: &str) -> Result<usize> {
        let _guard = self.write_guard()?;
        let files = self.cf(CF_FILES)?;

        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for (key, file) in self.scan::<FileRecord>(CF_FILES)? {
            if file.user_id == user_id && file.path == path {
                batch.delete_cf(files, key);
                removed += 1;
            }
        }
        self.db.write(batch)?;
        Ok(removed)
    }

    // === Maintenance ===

    fn reset_fleet(&self) -> Result<()> {
        let _guard = self.write_guard()?;
        let mut batch = WriteBatch::default();
        for cf_name in [CF_FILES, CF_SERVERS] {
            let cf = self.cf(cf_name)?;
            for item in self.db.iterator_cf(cf, IteratorMode::Start) {
                let (key, _) = item?;
                batch.delete_cf(cf, key);
            }
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn counts(&self) -> Result<StoreCounts> {
        Ok(StoreCounts {
            users: self.count(CF_USERS)?,
            servers: self.count(CF_SERVERS)?,
            files: self.count(CF_FILES)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::storage::tests::{exercise_store, file};
    use tempfile::tempdir;

    #[test]
    fn test_metadata_store() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::open(dir.path().join("dir.db")).unwrap();
        exercise_store(&store);
    }

    #[test]
    fn test_reopen_keeps_accounts_and_counters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dir.db");

        let first = {
            let store = MetadataStore::open(&path).unwrap();
            let id = store.insert_user("alice", "hash", "salt").unwrap();
            store.insert_server(1, "10.0.0.1:9000").unwrap();
            store
                .insert_files(&[file(id, 1, "docs/a.txt", false, "h0")])
                .unwrap();
            store.flush().unwrap();
            id
        };

        let store = MetadataStore::open(&path).unwrap();
        let alice = store.find_user("alice").unwrap().unwrap();
        assert_eq!(alice.id, first);
        assert_eq!(alice.salt, "salt");
        assert_eq!(store.files_for_user(first).unwrap().len(), 1);

        let second = store.insert_user("bob", "hash", "salt").unwrap();
        assert_eq!(second, first + 1);

        // file ids continue after the reopen too
        store
            .insert_files(&[file(first, 1, "docs/b.txt", true, "h1")])
            .unwrap();
        let ids: Vec<u64> = store
            .files_for_user(first)
            .unwrap()
            .iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_remove_unknown_server() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::open(dir.path().join("dir.db")).unwrap();
        let report = store.remove_server(42).unwrap();
        assert!(!report.server_existed);
        assert_eq!(report.files_removed, 0);
    }
}
