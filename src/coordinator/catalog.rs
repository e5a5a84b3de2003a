//! Per-user file metadata

use crate::common::{DirectoryStore, NewFileRecord, Result, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    pub filename: String,
    pub last_modified: i64,
}

pub struct FileCatalog {
    store: Arc<dyn DirectoryStore>,
}

impl FileCatalog {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    /// Insert a batch of rows, all or nothing.
    pub fn record_files(&self, batch: &[NewFileRecord]) -> Result<()> {
        self.store.insert_files(batch)?;
        tracing::debug!("Recorded {} file rows", batch.len());
        Ok(())
    }

    /// Primary files whose path starts with each prefix, one prefix after
    /// another in the order given. Overlapping prefixes repeat entries.
    pub fn list_files(&self, user_id: UserId, prefixes: &[String]) -> Result<Vec<FileListing>> {
        let primaries: Vec<_> = self
            .store
            .files_for_user(user_id)?
            .into_iter()
            .filter(|f| !f.is_backup)
            .collect();

        let mut listing = Vec::new();
        for prefix in prefixes {
            listing.extend(
                primaries
                    .iter()
                    .filter(|f| f.path.starts_with(prefix.as_str()))
                    .map(|f| FileListing {
                        filename: f.filename.clone(),
                        last_modified: f.last_modified,
                    }),
            );
        }
        Ok(listing)
    }

    /// Drop every replica of (user, path): the primary and all backups.
    ///
    /// There is no way to drop a single replica through this call.
    pub fn remove_file(&self, user_id: UserId, path: &str) -> Result<usize> {
        let removed = self.store.remove_files(user_id, path)?;
        tracing::debug!("Removed {} rows for user {} path {}", removed, user_id, path);
        Ok(removed)
    }
}
