//! Replica placement queries
//!
//! Joins file rows with the server registry to answer where a user's data
//! lives: which servers hold primaries, who else holds backups of a path,
//! and which content hashes each replica reports.
//!
//! Rows whose server is no longer registered are skipped, like an inner join.

use crate::common::{DirectoryStore, FileRecord, Result, ServerId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Content hash reported for one replica, with the server holding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaHash {
    pub hash: String,
    pub address: String,
}

pub struct PlacementCoordinator {
    store: Arc<dyn DirectoryStore>,
}

impl PlacementCoordinator {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    fn addresses(&self) -> Result<HashMap<ServerId, String>> {
        Ok(self
            .store
            .servers()?
            .into_iter()
            .map(|s| (s.id, s.address))
            .collect())
    }

    fn replicas_of(&self, user_id: UserId, path: &str) -> Result<Vec<FileRecord>> {
        Ok(self
            .store
            .files_for_user(user_id)?
            .into_iter()
            .filter(|f| f.path == path)
            .collect())
    }

    /// Distinct addresses of servers holding at least one primary of the
    /// user's files, sorted.
    pub fn active_servers_for(&self, user_id: UserId) -> Result<Vec<String>> {
        let addresses = self.addresses()?;
        let active: BTreeSet<String> = self
            .store
            .files_for_user(user_id)?
            .iter()
            .filter(|f| !f.is_backup)
            .filter_map(|f| addresses.get(&f.server_id).cloned())
            .collect();
        Ok(active.into_iter().collect())
    }

    /// Addresses of servers other than `requesting` holding a backup of the path.
    pub fn backup_servers_for(
        &self,
        requesting: ServerId,
        user_id: UserId,
        path: &str,
    ) -> Result<Vec<String>> {
        let addresses = self.addresses()?;
        Ok(self
            .replicas_of(user_id, path)?
            .iter()
            .filter(|f| f.is_backup && f.server_id != requesting)
            .filter_map(|f| addresses.get(&f.server_id).cloned())
            .collect())
    }

    /// One entry per replica of the path, backups before the primary.
    ///
    /// Clients reconcile against this order; among backups it is insertion order.
    pub fn hashes_for(&self, user_id: UserId, path: &str) -> Result<Vec<ReplicaHash>> {
        let addresses = self.addresses()?;
        let mut replicas = self.replicas_of(user_id, path)?;
        // stable: keeps insertion order within each group
        replicas.sort_by_key(|f| !f.is_backup);

        Ok(replicas
            .into_iter()
            .filter_map(|f| {
                addresses.get(&f.server_id).map(|address| ReplicaHash {
                    hash: f.file_hash,
                    address: address.clone(),
                })
            })
            .collect())
    }
}
