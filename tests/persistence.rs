//! Directory behavior on the RocksDB backend, including restarts

use backupdir::common::{Config, NewFileRecord, StoreBackend};
use backupdir::coordinator::http::create_router;
use backupdir::{Directory, DirectoryClient};
use tempfile::TempDir;

fn config(dir: &TempDir, reset_fleet_on_start: bool) -> Config {
    Config {
        backend: StoreBackend::Rocksdb,
        db_path: dir.path().join("directory"),
        reset_fleet_on_start,
        audit_log: Some(dir.path().join("audit.log")),
        ..Default::default()
    }
}

fn row(user_id: u64, server_id: u64, path: &str, is_backup: bool, hash: &str) -> NewFileRecord {
    NewFileRecord {
        user_id,
        server_id,
        path: path.to_string(),
        filename: path.rsplit('/').next().unwrap().to_string(),
        is_backup,
        file_hash: hash.to_string(),
        last_modified: 1_717_000_000,
    }
}

#[test]
fn test_replica_lifecycle_on_rocksdb() {
    let dir = TempDir::new().unwrap();
    let state = Directory::build_state(&config(&dir, true)).unwrap();

    let user = state
        .accounts
        .create_account("alice", "aGFzaA==", "c2FsdA==")
        .unwrap();
    for (id, addr) in [(1, "A"), (2, "B"), (3, "C")] {
        state.registry.register_server(id, addr).unwrap();
    }

    let picks: Vec<String> = (0..3)
        .map(|_| state.registry.next_server().unwrap().unwrap())
        .collect();
    assert_eq!(picks, vec!["B", "C", "A"]);

    state
        .catalog
        .record_files(&[
            row(user, 1, "docs/a.txt", false, "h0"),
            row(user, 2, "docs/a.txt", true, "h1"),
            row(user, 3, "docs/a.txt", true, "h2"),
        ])
        .unwrap();

    let hashes = state.placement.hashes_for(user, "docs/a.txt").unwrap();
    assert_eq!(hashes.last().unwrap().hash, "h0");
    assert_eq!(
        state.placement.backup_servers_for(3, user, "docs/a.txt").unwrap(),
        vec!["B"]
    );

    // losing one backup server drops only its replica
    let report = state.registry.unregister_server(2).unwrap();
    assert_eq!(report.files_removed, 1);
    assert_eq!(state.placement.hashes_for(user, "docs/a.txt").unwrap().len(), 2);

    assert_eq!(state.catalog.remove_file(user, "docs/a.txt").unwrap(), 2);
    assert!(state.placement.hashes_for(user, "docs/a.txt").unwrap().is_empty());

    let audit = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
    assert!(audit.contains("fleet_reset"));
}

#[test]
fn test_restart_resets_fleet_but_keeps_accounts() {
    let dir = TempDir::new().unwrap();
    {
        let state = Directory::build_state(&config(&dir, true)).unwrap();
        let user = state
            .accounts
            .create_account("alice", "aGFzaA==", "c2FsdA==")
            .unwrap();
        state.registry.register_server(1, "A").unwrap();
        state
            .catalog
            .record_files(&[row(user, 1, "docs/a.txt", false, "h0")])
            .unwrap();
    }

    let state = Directory::build_state(&config(&dir, true)).unwrap();
    let creds = state.accounts.lookup_credentials("alice").unwrap();
    assert_eq!(creds.password_hash, "hash");
    assert_eq!(creds.salt, "salt");
    assert_eq!(state.registry.next_server().unwrap(), None);
    assert!(state.placement.active_servers_for(creds.id).unwrap().is_empty());
}

#[test]
fn test_restart_keeping_fleet_restarts_cursor() {
    let dir = TempDir::new().unwrap();
    {
        let state = Directory::build_state(&config(&dir, false)).unwrap();
        state.registry.register_server(1, "A").unwrap();
        state.registry.register_server(2, "B").unwrap();
        assert_eq!(state.registry.next_server().unwrap().unwrap(), "B");
        assert_eq!(state.registry.next_server().unwrap().unwrap(), "A");
        assert_eq!(state.registry.next_server().unwrap().unwrap(), "B");
    }

    let state = Directory::build_state(&config(&dir, false)).unwrap();
    // fresh cursor: rank 2 first again
    assert_eq!(state.registry.next_server().unwrap().unwrap(), "B");
}

#[tokio::test]
async fn test_http_over_rocksdb() {
    let dir = TempDir::new().unwrap();
    let state = Directory::build_state(&config(&dir, true)).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, create_router(state, 1024 * 1024))
            .await
            .unwrap();
    });
    let client = DirectoryClient::new(base).unwrap();

    assert!(client.register_server(5, "10.0.0.5:9000").await.unwrap());
    assert!(client.create_account("bob", "h", "s").await.unwrap());
    let bob = client.lookup_credentials("bob").await.unwrap().unwrap().id;
    assert!(client
        .record_files(vec![row(bob, 5, "music/x.flac", false, "abc")])
        .await
        .unwrap());
    assert_eq!(
        client.active_servers_for(bob).await.unwrap(),
        vec!["10.0.0.5:9000"]
    );

    let status = client.status().await.unwrap();
    assert_eq!(status["backend"], "rocksdb");
    assert_eq!(status["servers"][0]["rank"], 1);
}
