// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the in-memory job store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid job: {0}")]
    Validation(String),

    #[error("Job is not active: {id}")]
    NotActive { id: String },
}

/// Errors that can occur reading or writing snapshot and artifact files
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Validation("name is required".to_string());
        assert_eq!(err.to_string(), "Invalid job: name is required");

        let err = StoreError::NotActive {
            id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Job is not active: abc");
    }

    #[test]
    fn test_persist_error_keeps_path() {
        let err = PersistError::io(
            "/data/jobs.json",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/data/jobs.json"));
        assert!(msg.contains("disk full"));
    }
}
