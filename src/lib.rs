//! # backupdir
//!
//! Directory node of a distributed file-backup service. It stores no file
//! bytes. It tracks:
//! - user accounts (credential lookup for client-side login)
//! - the storage-server fleet, with round-robin placement of new data
//! - where every file of every user lives, primary and backup replicas
//!
//! ## Architecture
//!
//! ```text
//!   backup clients                 storage servers
//!        │  login, placement,          │  register, record files,
//!        │  listings, removal          │  backup peers, hashes
//!        └──────────────┬──────────────┘
//!                       │ HTTP/JSON
//!              ┌────────▼─────────┐
//!              │  Directory node  │
//!              │  accounts        │
//!              │  server registry │
//!              │  file catalog    │
//!              │  placement       │
//!              └────────┬─────────┘
//!                       │ DirectoryStore
//!               RocksDB │ or memory
//! ```
//!
//! ## Usage
//!
//! ### Start the directory
//! ```bash
//! backupdir-server serve --bind 0.0.0.0:8000 --db ./backupdir-data
//! ```
//!
//! ### Inspect it
//! ```bash
//! backupdir --server http://localhost:8000 status
//! backupdir next-server
//! backupdir hashes --user 1 --path docs/report.pdf
//! ```

pub mod client;
pub mod common;
pub mod coordinator;

// Re-export commonly used types
pub use client::DirectoryClient;
pub use common::{Config, Error, Result};
pub use coordinator::Directory;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
