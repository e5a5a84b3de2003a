//! Storage-server registry and round-robin placement

use crate::common::{CascadeReport, DirectoryStore, Result, ServerId, ServerRecord};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Round-robin cursor over registration ranks.
///
/// Starts at 0 on every process start and is never persisted.
#[derive(Debug, Default)]
pub struct PlacementCursor {
    position: AtomicUsize,
}

impl PlacementCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically set `position = (position + 1) % n` and return the new value.
    ///
    /// `n` must be non-zero.
    pub fn advance(&self, n: usize) -> usize {
        let prev = self
            .position
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| Some((p + 1) % n))
            .unwrap_or_else(|p| p);
        (prev + 1) % n
    }

    pub fn position(&self) -> usize {
        self.position.load(Ordering::SeqCst)
    }
}

pub struct ServerRegistry {
    store: Arc<dyn DirectoryStore>,
    cursor: PlacementCursor,
}

impl ServerRegistry {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self {
            store,
            cursor: PlacementCursor::new(),
        }
    }

    pub fn register_server(&self, id: ServerId, address: &str) -> Result<()> {
        self.store.insert_server(id, address)?;
        tracing::info!("Registered server {} at {}", id, address);
        Ok(())
    }

    /// Remove a server and every file row that points at it.
    ///
    /// Unlike the other operations, failure here is surfaced to the caller
    /// as an error rather than folded into a `false`.
    pub fn unregister_server(&self, id: ServerId) -> Result<CascadeReport> {
        let report = self.store.remove_server(id)?;
        if report.server_existed {
            tracing::info!(
                "Unregistered server {} ({} file rows dropped)",
                id,
                report.files_removed
            );
        } else {
            tracing::debug!("Unregister of unknown server {}", id);
        }
        Ok(report)
    }

    /// Address of the next server in round-robin order, `None` if the
    /// registry is empty.
    ///
    /// Count and rank lookup are separate reads. A registration change
    /// between them, or between two calls, can skip or repeat a server.
    pub fn next_server(&self) -> Result<Option<String>> {
        let n = self.store.server_count()?;
        if n == 0 {
            return Ok(None);
        }
        let position = self.cursor.advance(n);
        Ok(self
            .store
            .server_at_rank(position + 1)?
            .map(|server| server.address))
    }

    pub fn servers(&self) -> Result<Vec<ServerRecord>> {
        self.store.servers()
    }

    pub fn cursor_position(&self) -> usize {
        self.cursor.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Error, MemStore};

    fn registry() -> ServerRegistry {
        ServerRegistry::new(Arc::new(MemStore::new()))
    }

    #[test]
    fn test_round_robin_from_fresh_cursor() {
        let registry = registry();
        registry.register_server(1, "A").unwrap();
        registry.register_server(2, "B").unwrap();
        registry.register_server(3, "C").unwrap();

        let picks: Vec<String> = (0..6)
            .map(|_| registry.next_server().unwrap().unwrap())
            .collect();
        assert_eq!(picks, vec!["B", "C", "A", "B", "C", "A"]);
    }

    #[test]
    fn test_rank_follows_registration_order() {
        let registry = registry();
        registry.register_server(30, "first").unwrap();
        registry.register_server(10, "second").unwrap();

        assert_eq!(registry.next_server().unwrap().unwrap(), "second");
        assert_eq!(registry.next_server().unwrap().unwrap(), "first");
    }

    #[test]
    fn test_empty_registry() {
        let registry = registry();
        assert_eq!(registry.next_server().unwrap(), None);
        assert_eq!(registry.cursor_position(), 0);
    }

    #[test]
    fn test_duplicate_id_and_reuse_after_removal() {
        let registry = registry();
        registry.register_server(2, "old").unwrap();
        assert!(matches!(
            registry.register_server(2, "other"),
            Err(Error::AlreadyExists(_))
        ));

        registry.unregister_server(2).unwrap();
        registry.register_server(2, "new").unwrap();
        assert_eq!(registry.servers().unwrap()[0].address, "new");
    }

    #[test]
    fn test_empty_address_is_opaque() {
        let registry = registry();
        registry.register_server(1, "").unwrap();
        assert_eq!(registry.next_server().unwrap().as_deref(), Some(""));
        assert!(matches!(
            registry.register_server(1, "A"),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_cursor_wraps_when_fleet_shrinks() {
        let registry = registry();
        for (id, addr) in [(1, "A"), (2, "B"), (3, "C")] {
            registry.register_server(id, addr).unwrap();
        }
        assert_eq!(registry.next_server().unwrap().unwrap(), "B");
        assert_eq!(registry.next_server().unwrap().unwrap(), "C");
        // cursor is at 2; with two servers left it wraps to 1 -> rank 2
        registry.unregister_server(1).unwrap();
        assert_eq!(registry.next_server().unwrap().unwrap(), "C");
        assert_eq!(registry.next_server().unwrap().unwrap(), "B");
    }

    #[test]
    fn test_concurrent_advance_visits_every_rank() {
        let cursor = Arc::new(PlacementCursor::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cursor = cursor.clone();
                std::thread::spawn(move || (0..250).map(|_| cursor.advance(5)).collect::<Vec<_>>())
            })
            .collect();

        let mut counts = [0usize; 5];
        for handle in handles {
            for pos in handle.join().unwrap() {
                counts[pos] += 1;
            }
        }
        // 1000 advances over 5 slots: each slot exactly 200 times
        assert_eq!(counts, [200; 5]);
    }
}
