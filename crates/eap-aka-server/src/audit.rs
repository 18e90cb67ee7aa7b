//! Audit logging for EAP-AKA authentication events
//!
//! Writes one JSON object per line for every authentication attempt and
//! outcome, PLMN rejection, vector source failure and timer eviction.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::error;

/// Audit event type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Identity received, authentication started
    AuthAttempt,
    /// EAP Success sent
    AuthSuccess,
    /// Authentication failed (MAC/RES mismatch, peer abort, Nak)
    AuthFailure,
    /// Subscriber's PLMN is not accepted
    PlmnRejected,
    /// Vector source returned an error
    VectorFetchFailed,
    /// Session removed by a timer
    SessionEvicted,
    /// Server started
    ServerStart,
    /// Server stopped
    ServerStop,
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Timestamp (Unix epoch seconds)
    pub timestamp: u64,
    /// ISO 8601 formatted timestamp
    pub timestamp_iso: String,
    /// Event type
    pub event_type: AuditEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imsi: Option<String>,
    /// EAP method number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<u8>,
    /// EAP identifier of the triggering packet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<u8>,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Server version
    pub server_version: String,
}

impl AuditEntry {
    /// Create a new audit entry
    pub fn new(event_type: AuditEventType) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        let timestamp = now.as_secs();
        let timestamp_iso = chrono::DateTime::from_timestamp(timestamp as i64, 0)
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        AuditEntry {
            timestamp,
            timestamp_iso,
            event_type,
            session_id: None,
            imsi: None,
            method: None,
            identifier: None,
            details: None,
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_imsi(mut self, imsi: impl Into<String>) -> Self {
        self.imsi = Some(imsi.into());
        self
    }

    pub fn with_method(mut self, method: u8) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_identifier(mut self, identifier: u8) -> Self {
        self.identifier = Some(identifier);
        self
    }

    /// Set details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Audit logger
pub struct AuditLogger {
    /// File path for audit log
    file_path: Option<String>,
    /// File handle (wrapped in Arc<Mutex> for thread safety)
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl AuditLogger {
    /// Create a new audit logger
    pub fn new(file_path: Option<String>) -> std::io::Result<Self> {
        let file = if let Some(ref path) = file_path {
            let f = OpenOptions::new().create(true).append(true).open(path)?;
            Some(Arc::new(Mutex::new(f)))
        } else {
            None
        };

        Ok(AuditLogger { file_path, file })
    }

    /// Logger that discards every entry
    pub fn disabled() -> Self {
        AuditLogger {
            file_path: None,
            file: None,
        }
    }

    /// Log an audit entry
    pub async fn log(&self, entry: AuditEntry) {
        if let Some(ref file) = self.file {
            match serde_json::to_string(&entry) {
                Ok(json) => {
                    let mut f = file.lock().await;
                    if let Err(e) = writeln!(f, "{}", json) {
                        error!("Failed to write audit log: {}", e);
                    }
                }
                Err(e) => {
                    error!("Failed to serialize audit entry: {}", e);
                }
            }
        }
    }

    /// Check if audit logging is enabled
    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Get the audit log file path
    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::NamedTempFile;

    #[test]
    fn test_audit_entry_creation() {
        let entry = AuditEntry::new(AuditEventType::AuthSuccess)
            .with_session_id("sess-1")
            .with_imsi("001010000000001")
            .with_method(23)
            .with_identifier(42);

        assert_eq!(entry.session_id.as_deref(), Some("sess-1"));
        assert_eq!(entry.imsi.as_deref(), Some("001010000000001"));
        assert_eq!(entry.method, Some(23));
        assert_eq!(entry.identifier, Some(42));
    }

    #[test]
    fn test_audit_entry_serialization() {
        let entry = AuditEntry::new(AuditEventType::PlmnRejected)
            .with_imsi("001011234567890")
            .with_details("PLMN not in allow-list");

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("plmn_rejected"));
        assert!(json.contains("001011234567890"));
        assert!(!json.contains("session_id"));
    }

    #[tokio::test]
    async fn test_audit_logger() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap().to_string();

        let logger = AuditLogger::new(Some(path.clone())).unwrap();
        assert!(logger.is_enabled());
        assert_eq!(logger.file_path(), Some(path.as_str()));

        logger
            .log(AuditEntry::new(AuditEventType::AuthSuccess).with_session_id("sess-1"))
            .await;
        logger
            .log(AuditEntry::new(AuditEventType::SessionEvicted).with_session_id("sess-2"))
            .await;

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: AuditEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.event_type, AuditEventType::AuthSuccess);
        assert!(lines[1].contains("session_evicted"));
    }

    #[test]
    fn test_audit_logger_disabled() {
        let logger = AuditLogger::new(None).unwrap();
        assert!(!logger.is_enabled());
        assert!(!AuditLogger::disabled().is_enabled());
    }
}
