//! Common utilities and types shared across backupdir

pub mod audit;
pub mod config;
pub mod error;
pub mod metrics;
pub mod storage;
pub mod utils;

pub use audit::{AuditEventType, AuditLogger};
pub use config::{Config, StoreBackend};
pub use error::{Error, ErrorKind, Result};
pub use metrics::MetricsRegistry;
pub use storage::{
    CascadeReport, DirectoryStore, FileId, FileRecord, MemStore, NewFileRecord, ServerId,
    ServerRecord, StoreCounts, UserId, UserRecord,
};
pub use utils::{decode_transport, encode_transport, timestamp_now};
