//! Directory node implementation
//!
//! The directory node is responsible for:
//! - Account records (credential lookup for client login)
//! - Storage-server membership and round-robin placement
//! - File replica metadata (primary and backup rows per path)
//! - Replica queries used by clients and storage servers to reconcile

pub mod accounts;
pub mod catalog;
pub mod http;
pub mod metadata;
pub mod placement;
pub mod registry;
pub mod server;

pub use accounts::{AccountStore, Credentials};
pub use catalog::{FileCatalog, FileListing};
pub use placement::{PlacementCoordinator, ReplicaHash};
pub use registry::{PlacementCursor, ServerRegistry};
pub use server::Directory;
