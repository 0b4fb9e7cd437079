use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeltaError {
    /// Caller bug (e.g. a zero block size). Never retried.
    #[error("Contract violation: {message}")]
    ContractViolation { message: String },

    #[error("Read failed while {context}\nCause: {source}")]
    ReadFailure {
        context: String,
        source: std::io::Error,
    },

    #[error("Delta does not match the stored base: {message}\nRe-fetch the signature or upload the full file instead.")]
    StaleBaseVersion { message: String },

    #[error("Checksum mismatch after reconstruction\nExpected: {expected}\nActual:   {actual}\nThe reconstructed file was discarded.")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Item not found: {item_id}{version_fmt}", version_fmt = describe_version(version))]
    NotFound {
        item_id: String,
        version: Option<u64>,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DeltaError {
    pub fn contract(message: impl Into<String>) -> Self {
        Self::ContractViolation {
            message: message.into(),
        }
    }

    pub fn read(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::ReadFailure {
            context: context.into(),
            source,
        }
    }

    pub fn stale(message: impl Into<String>) -> Self {
        Self::StaleBaseVersion {
            message: message.into(),
        }
    }

    /// True when the client should give up on the delta and send the whole file.
    pub fn is_retryable_with_full_upload(&self) -> bool {
        matches!(
            self,
            Self::StaleBaseVersion { .. } | Self::ChecksumMismatch { .. }
        )
    }
}

fn describe_version(version: &Option<u64>) -> String {
    match version {
        Some(v) => format!(" (version {})", v),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, DeltaError>;

/// Format bytes for human-readable display in error messages and summaries
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_upload_fallback_kinds() {
        assert!(DeltaError::stale("block 9 missing").is_retryable_with_full_upload());
        assert!(DeltaError::ChecksumMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        }
        .is_retryable_with_full_upload());

        assert!(!DeltaError::contract("block size must be positive").is_retryable_with_full_upload());
        assert!(!DeltaError::InvalidRequest("bad".into()).is_retryable_with_full_upload());
    }

    #[test]
    fn test_not_found_message() {
        let err = DeltaError::NotFound {
            item_id: "doc".into(),
            version: Some(3),
        };
        assert_eq!(err.to_string(), "Item not found: doc (version 3)");

        let err = DeltaError::NotFound {
            item_id: "doc".into(),
            version: None,
        };
        assert_eq!(err.to_string(), "Item not found: doc");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }
}
