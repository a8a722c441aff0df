/// Core abstractions over the wrapped cluster client
pub mod bucket_cache;
pub mod connection;
pub mod query;
pub mod result;

pub use bucket_cache::{BucketCache, CacheSettings};
pub use connection::ConnectionManager;
pub use query::{Stale, ViewQuery};
pub use result::{normalize, CouchResult};

use crate::config::ClusterConfig;
use crate::error::ClusterError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Shared handle to an open bucket
pub type BucketHandle = Arc<dyn Bucket>;

/// Builds cluster connections from a configuration.
///
/// Construction must not verify that the cluster is reachable; failures show
/// up on the first call made through the returned connection.
pub trait ClusterConnector: Send + Sync {
    fn connect(&self, config: &ClusterConfig) -> Arc<dyn Cluster>;
}

/// A connection to the cluster
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Open a handle to the named bucket
    async fn open_bucket(&self, name: &str) -> Result<BucketHandle, ClusterError>;

    /// Release the connection
    async fn close(&self) -> Result<(), ClusterError>;
}

/// An open bucket handle
#[async_trait]
pub trait Bucket: Send + Sync {
    fn name(&self) -> &str;

    async fn insert(&self, key: &str, doc: Value) -> Result<CouchResult, ClusterError>;

    async fn get(&self, key: &str) -> Result<CouchResult, ClusterError>;

    async fn get_multi(&self, keys: &[String]) -> Result<CouchResult, ClusterError>;

    async fn remove(&self, key: &str) -> Result<CouchResult, ClusterError>;

    async fn upsert(&self, key: &str, doc: Value) -> Result<CouchResult, ClusterError>;

    async fn replace(&self, key: &str, doc: Value) -> Result<CouchResult, ClusterError>;

    async fn query(&self, query: &ViewQuery) -> Result<CouchResult, ClusterError>;

    async fn disconnect(&self) -> Result<(), ClusterError>;
}
