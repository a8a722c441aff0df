//! Unified error handling for jcouch
//!
//! Errors raised by the wrapped cluster client are carried through unchanged
//! inside [`ClusterError`]. This layer adds only the failure points it owns:
//! configuration and bucket acquisition.

use thiserror::Error;

pub use crate::config::ConfigError;

/// Main error type for jcouch operations
#[derive(Debug, Error)]
pub enum JCouchError {
    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors returned by a bucket operation
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// The bucket handle could not be opened
    #[error("Failed to open bucket {bucket}: {source}")]
    BucketOpen {
        bucket: String,
        #[source]
        source: ClusterError,
    },
}

/// Errors reported by the underlying cluster client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("Cluster unreachable at {address}: {message}")]
    Unreachable { address: String, message: String },

    #[error("Bucket not found: {bucket}")]
    BucketNotFound { bucket: String },

    #[error("Document not found: {key}")]
    DocumentNotFound { key: String },

    #[error("Document already exists: {key}")]
    DocumentExists { key: String },

    #[error("Bucket {bucket} is disconnected")]
    Disconnected { bucket: String },

    #[error("View query error: {message}")]
    Query { message: String },

    #[error("Client error: {message}")]
    Client { message: String },
}

/// Result type alias for jcouch operations
pub type JCouchResult<T> = Result<T, JCouchError>;

impl JCouchError {
    /// Create a bucket open error
    pub fn bucket_open<S: Into<String>>(bucket: S, source: ClusterError) -> Self {
        JCouchError::BucketOpen {
            bucket: bucket.into(),
            source,
        }
    }

    /// The client error behind this failure, if the cluster produced one
    pub fn cluster_error(&self) -> Option<&ClusterError> {
        match self {
            JCouchError::Cluster(e) => Some(e),
            JCouchError::BucketOpen { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Check if the failure means the requested document does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.cluster_error(),
            Some(ClusterError::DocumentNotFound { .. })
        )
    }
}

/// Convenience methods for creating client errors
impl ClusterError {
    pub fn unreachable<S: Into<String>>(address: S, message: S) -> Self {
        ClusterError::Unreachable {
            address: address.into(),
            message: message.into(),
        }
    }

    pub fn bucket_not_found<S: Into<String>>(bucket: S) -> Self {
        ClusterError::BucketNotFound {
            bucket: bucket.into(),
        }
    }

    pub fn not_found<S: Into<String>>(key: S) -> Self {
        ClusterError::DocumentNotFound { key: key.into() }
    }

    pub fn exists<S: Into<String>>(key: S) -> Self {
        ClusterError::DocumentExists { key: key.into() }
    }

    pub fn disconnected<S: Into<String>>(bucket: S) -> Self {
        ClusterError::Disconnected {
            bucket: bucket.into(),
        }
    }

    pub fn query<S: Into<String>>(message: S) -> Self {
        ClusterError::Query {
            message: message.into(),
        }
    }

    pub fn client<S: Into<String>>(message: S) -> Self {
        ClusterError::Client {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = ClusterError::unreachable("10.0.0.1:8091", "connection closed");
        assert!(matches!(error, ClusterError::Unreachable { .. }));
        assert_eq!(
            error.to_string(),
            "Cluster unreachable at 10.0.0.1:8091: connection closed"
        );
    }

    #[test]
    fn test_bucket_open_keeps_source() {
        let error = JCouchError::bucket_open("orders", ClusterError::bucket_not_found("orders"));
        assert_eq!(
            error.to_string(),
            "Failed to open bucket orders: Bucket not found: orders"
        );
        assert_eq!(
            error.cluster_error(),
            Some(&ClusterError::bucket_not_found("orders"))
        );
    }

    #[test]
    fn test_cluster_error_conversion() {
        let error: JCouchError = ClusterError::not_found("doc1").into();
        assert!(matches!(error, JCouchError::Cluster(_)));
        assert!(error.is_not_found());

        let error: JCouchError = ClusterError::exists("doc1").into();
        assert!(!error.is_not_found());
    }

    #[test]
    fn test_config_error_conversion() {
        let error: JCouchError = ConfigError::ValidationError("port".to_string()).into();
        assert!(matches!(error, JCouchError::Config(_)));
        assert!(error.cluster_error().is_none());
    }
}
