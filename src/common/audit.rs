//! Audit trail for membership and data-removal actions
//!
//! One JSON object per line, appended to an optional file and mirrored to
//! the `audit` tracing target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::common::Result;

/// Audit log event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AccountCreated,
    ServerRegistered,
    ServerUnregistered,
    FilesRemoved,
    FleetReset,
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub event: AuditEventType,
    pub target: String,
    pub message: String,
}

pub struct AuditLogger {
    file: Option<Mutex<File>>,
}

impl AuditLogger {
    /// Tracing-only logger
    pub fn disabled() -> Self {
        Self { file: None }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            file: Some(Mutex::new(file)),
        })
    }

    pub fn log(&self, event: AuditEventType, target: impl Into<String>, message: impl Into<String>) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            target: target.into(),
            message: message.into(),
        };
        let line = serde_json::to_string(&entry).unwrap_or_else(|_| "{}".to_string());
        tracing::info!(target: "audit", "{}", line);

        if let Some(file) = &self.file {
            if let Ok(mut f) = file.lock() {
                if let Err(e) = writeln!(f, "{}", line) {
                    tracing::warn!("Audit write failed: {}", e);
                }
            }
        }
    }
}
