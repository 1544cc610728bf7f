//! Hash-chained audit log for security events
//!
//! Login, logout, refresh and authorization denials are appended as JSON
//! lines. Each entry carries the hash of its predecessor so truncation or
//! edits anywhere in the file break the chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::error::{Result, UserError};

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A single entry in the audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique ID for this entry
    pub id: String,
    /// Timestamp of the event
    pub timestamp: DateTime<Utc>,
    /// Principal that triggered the event, None for system events
    pub principal_id: Option<String>,
    /// Event kind (login, logout, session_refreshed, access_denied, ...)
    pub action: String,
    /// Subject of the event (username, capability name, role name)
    pub subject: Option<String>,
    /// Additional structured detail
    pub details: Option<serde_json::Value>,
    /// Whether the event succeeded
    pub outcome: String,
    /// Hash of the previous entry
    pub previous_hash: String,
    /// Hash of this entry
    pub entry_hash: String,
}

impl AuditEntry {
    fn new(
        principal_id: Option<String>,
        action: String,
        subject: Option<String>,
        details: Option<serde_json::Value>,
        outcome: String,
        previous_hash: String,
    ) -> Self {
        let mut entry = Self {
            id: ulid::Ulid::new().to_string(),
            timestamp: Utc::now(),
            principal_id,
            action,
            subject,
            details,
            outcome,
            previous_hash,
            entry_hash: String::new(),
        };

        entry.entry_hash = entry.calculate_hash();
        entry
    }

    /// SHA-256 over every field except the entry hash itself
    fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update(self.id.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());

        if let Some(ref principal) = self.principal_id {
            hasher.update(principal.as_bytes());
        }

        hasher.update(self.action.as_bytes());

        if let Some(ref subject) = self.subject {
            hasher.update(subject.as_bytes());
        }

        if let Some(ref details) = self.details {
            hasher.update(details.to_string().as_bytes());
        }

        hasher.update(self.outcome.as_bytes());
        hasher.update(self.previous_hash.as_bytes());

        hex::encode(hasher.finalize())
    }

    /// Verify the hash of this entry
    pub fn verify_hash(&self) -> bool {
        self.entry_hash == self.calculate_hash()
    }
}

/// Configuration for the audit logger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogConfig {
    /// Path to the audit log file
    pub log_path: PathBuf,
    /// Maximum size of the log file before rotation (in MB)
    pub max_size_mb: u64,
    /// Number of rotated log files to keep
    pub max_rotations: u32,
    /// Whether to enable real-time hash verification
    pub enable_verification: bool,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("data/cadence/audit.log"),
            max_size_mb: 100,
            max_rotations: 10,
            enable_verification: true,
        }
    }
}

/// Append-only audit logger with cryptographic chain verification
pub struct AuditLogger {
    config: AuditLogConfig,
    last_hash: Arc<RwLock<String>>,
    file_lock: Arc<RwLock<()>>,
}

impl AuditLogger {
    /// Create a new audit logger, recovering the chain tip from an
    /// existing log file if present.
    pub fn new(config: AuditLogConfig) -> Result<Self> {
        if let Some(parent) = config.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let last_hash = if config.log_path.exists() {
            Self::recover_chain_tip(&config.log_path)?
        } else {
            String::from(GENESIS_HASH)
        };

        Ok(Self {
            config,
            last_hash: Arc::new(RwLock::new(last_hash)),
            file_lock: Arc::new(RwLock::new(())),
        })
    }

    /// Append a security event
    pub async fn log_event(
        &self,
        principal_id: Option<&str>,
        action: &str,
        subject: Option<String>,
        details: Option<serde_json::Value>,
        success: bool,
    ) -> Result<()> {
        let outcome = if success { "success" } else { "failure" };

        let previous_hash = {
            let hash_guard = self.last_hash.read().await;
            hash_guard.clone()
        };

        let entry = AuditEntry::new(
            principal_id.map(|s| s.to_string()),
            action.to_string(),
            subject,
            details,
            outcome.to_string(),
            previous_hash,
        );

        self.write_entry(&entry).await?;

        {
            let mut hash_guard = self.last_hash.write().await;
            *hash_guard = entry.entry_hash.clone();
        }

        debug!(
            "Audit entry appended: action={}, principal={:?}, outcome={}",
            action, principal_id, outcome
        );

        Ok(())
    }

    async fn write_entry(&self, entry: &AuditEntry) -> Result<()> {
        let _lock = self.file_lock.write().await;

        self.rotate_if_needed()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.log_path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        file.flush()?;

        Ok(())
    }

    fn rotate_if_needed(&self) -> Result<()> {
        if !self.config.log_path.exists() {
            return Ok(());
        }

        let metadata = std::fs::metadata(&self.config.log_path)?;
        let size_mb = metadata.len() / (1024 * 1024);

        if size_mb >= self.config.max_size_mb {
            self.rotate_logs()?;
        }

        Ok(())
    }

    fn rotate_logs(&self) -> Result<()> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let rotated_path = self
            .config
            .log_path
            .with_extension(format!("{}.log", timestamp));

        std::fs::rename(&self.config.log_path, &rotated_path)?;

        info!("Rotated audit log to: {:?}", rotated_path);

        self.cleanup_old_rotations()?;

        Ok(())
    }

    fn cleanup_old_rotations(&self) -> Result<()> {
        let Some(parent) = self.config.log_path.parent() else {
            return Ok(());
        };

        let base_name = self
            .config
            .log_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audit")
            .to_string();

        let current_name = self
            .config
            .log_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("audit.log")
            .to_string();

        let mut rotated_files: Vec<_> = std::fs::read_dir(parent)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                if let Some(name) = entry.file_name().to_str() {
                    name.starts_with(&base_name) && name != current_name
                } else {
                    false
                }
            })
            .collect();

        // Oldest first
        rotated_files.sort_by_key(|entry| {
            entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });

        while rotated_files.len() > self.config.max_rotations as usize {
            let old_file = rotated_files.remove(0);
            std::fs::remove_file(old_file.path())?;
            info!("Removed old audit rotation: {:?}", old_file.path());
        }

        Ok(())
    }

    /// Read the entry hash of the last line in an existing log file
    fn recover_chain_tip(path: &Path) -> Result<String> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut last_hash = String::from(GENESIS_HASH);

        for line in reader.lines().map_while(|r| r.ok()) {
            if let Ok(entry) = serde_json::from_str::<AuditEntry>(&line) {
                last_hash = entry.entry_hash;
            }
        }

        Ok(last_hash)
    }

    /// Verify the integrity of the entire log chain
    pub async fn verify_log_chain(&self) -> Result<bool> {
        if !self.config.log_path.exists() {
            return Ok(true); // Empty log is valid
        }

        let file = File::open(&self.config.log_path)?;
        let reader = BufReader::new(file);

        let mut expected_previous_hash = String::from(GENESIS_HASH);
        let mut line_number = 0;

        for line in reader.lines() {
            line_number += 1;
            let line = line?;

            let entry: AuditEntry = serde_json::from_str(&line).map_err(|e| {
                UserError::AuditLog(format!("Failed to parse line {}: {}", line_number, e))
            })?;

            if !entry.verify_hash() {
                error!(
                    "Hash verification failed at line {}: entry_id={}",
                    line_number, entry.id
                );
                return Ok(false);
            }

            if entry.previous_hash != expected_previous_hash {
                error!(
                    "Chain verification failed at line {}: expected_previous={}, got={}",
                    line_number, expected_previous_hash, entry.previous_hash
                );
                return Ok(false);
            }

            expected_previous_hash = entry.entry_hash;
        }

        info!(
            "Audit chain verification successful: {} entries verified",
            line_number
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> AuditLogConfig {
        AuditLogConfig {
            log_path: temp_dir.path().join("audit.log"),
            max_size_mb: 10,
            max_rotations: 5,
            enable_verification: true,
        }
    }

    #[tokio::test]
    async fn test_entry_hash_roundtrip() {
        let entry = AuditEntry::new(
            Some("01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string()),
            "login".to_string(),
            Some("alice".to_string()),
            None,
            "success".to_string(),
            GENESIS_HASH.to_string(),
        );

        assert!(entry.verify_hash());
    }

    #[tokio::test]
    async fn test_chain_verification() {
        let temp_dir = TempDir::new().unwrap();
        let logger = AuditLogger::new(test_config(&temp_dir)).unwrap();

        for i in 0..5 {
            logger
                .log_event(None, &format!("action_{}", i), None, None, true)
                .await
                .unwrap();
        }

        assert!(logger.verify_log_chain().await.unwrap());
    }

    #[tokio::test]
    async fn test_tampered_line_fails_verification() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        let logger = AuditLogger::new(config.clone()).unwrap();

        logger
            .log_event(Some("p1"), "login", Some("alice".to_string()), None, true)
            .await
            .unwrap();
        logger
            .log_event(Some("p1"), "logout", Some("alice".to_string()), None, true)
            .await
            .unwrap();

        // Flip the outcome of the first line without recomputing hashes
        let contents = std::fs::read_to_string(&config.log_path).unwrap();
        let tampered = contents.replacen("\"outcome\":\"success\"", "\"outcome\":\"failure\"", 1);
        std::fs::write(&config.log_path, tampered).unwrap();

        assert!(!logger.verify_log_chain().await.unwrap());
    }

    #[tokio::test]
    async fn test_chain_tip_recovery_across_restart() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        {
            let logger = AuditLogger::new(config.clone()).unwrap();
            logger
                .log_event(None, "first", None, None, true)
                .await
                .unwrap();
        }

        // A fresh logger must continue the chain, not restart it
        let logger = AuditLogger::new(config).unwrap();
        logger
            .log_event(None, "second", None, None, true)
            .await
            .unwrap();

        assert!(logger.verify_log_chain().await.unwrap());
    }
}
