pub mod config;
pub mod error;
/// jcouch - Bucket handle cache and document facade for clustered document databases
///
/// Every operation names a bucket. The bucket handle is taken from a cache
/// (opened on first use, evicted after sitting idle), the call is forwarded to
/// the cluster client, and read results are stripped down to plain JSON.
pub mod core;
pub mod memory;

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{ClusterConfig, Config};
use crate::core::{
    normalize, BucketCache, BucketHandle, CacheSettings, ClusterConnector, ConnectionManager,
    CouchResult, ViewQuery,
};
use crate::error::JCouchResult;

pub use crate::error::{ClusterError, JCouchError};

/// Document facade over a cluster connection and its bucket cache
#[derive(Clone)]
pub struct JCouch {
    connection: Arc<ConnectionManager>,
    buckets: BucketCache,
}

impl JCouch {
    /// Create a facade with default cluster and cache settings
    pub fn new(connector: Arc<dyn ClusterConnector>) -> Self {
        Self::with_settings(connector, CacheSettings::default())
    }

    pub fn with_settings(connector: Arc<dyn ClusterConnector>, settings: CacheSettings) -> Self {
        let connection = Arc::new(ConnectionManager::new(connector));
        Self::from_parts(connection, settings)
    }

    /// Create a facade from a loaded configuration file
    pub fn from_config(connector: Arc<dyn ClusterConnector>, config: &Config) -> Self {
        let connection = Arc::new(ConnectionManager::with_config(
            connector,
            config.cluster.clone(),
        ));
        Self::from_parts(connection, CacheSettings::from(&config.cache))
    }

    fn from_parts(connection: Arc<ConnectionManager>, settings: CacheSettings) -> Self {
        let buckets = BucketCache::new(Arc::clone(&connection), settings);
        Self {
            connection,
            buckets,
        }
    }

    /// Point the facade at a (possibly different) cluster.
    ///
    /// Cached bucket handles belong to the old connection, so they are all
    /// disconnected once the new connection is in place. The swap happens
    /// first: an open that picked up the old connection started before the
    /// clear and is discarded by it.
    pub async fn configure_connection(
        &self,
        host: Option<&str>,
        port: Option<u16>,
    ) -> ClusterConfig {
        let config = self.connection.configure(host, port).await;
        let released = self.buckets.clear().await;
        if released > 0 {
            debug!("Dropped {} cached buckets after reconfiguring", released);
        }
        config
    }

    /// Insert a new document; fails if the name is taken
    pub async fn insert(
        &self,
        bucket: &str,
        doc_name: &str,
        doc: Value,
    ) -> JCouchResult<CouchResult> {
        let handle = self.bucket(bucket).await?;
        Ok(handle.insert(doc_name, doc).await?)
    }

    /// Get a document as plain JSON
    pub async fn get(&self, bucket: &str, doc_name: &str) -> JCouchResult<Value> {
        let handle = self.bucket(bucket).await?;
        let result = handle.get(doc_name).await?;
        Ok(normalize(&result))
    }

    /// Get several documents as a JSON object keyed by document name
    pub async fn get_multi<S: AsRef<str>>(
        &self,
        bucket: &str,
        doc_names: &[S],
    ) -> JCouchResult<Value> {
        let handle = self.bucket(bucket).await?;
        let keys: Vec<String> = doc_names.iter().map(|n| n.as_ref().to_string()).collect();
        let result = handle.get_multi(&keys).await?;
        Ok(normalize(&result))
    }

    pub async fn remove(&self, bucket: &str, doc_name: &str) -> JCouchResult<CouchResult> {
        let handle = self.bucket(bucket).await?;
        Ok(handle.remove(doc_name).await?)
    }

    /// Insert or overwrite a document
    pub async fn upsert(
        &self,
        bucket: &str,
        doc_name: &str,
        doc: Value,
    ) -> JCouchResult<CouchResult> {
        let handle = self.bucket(bucket).await?;
        Ok(handle.upsert(doc_name, doc).await?)
    }

    /// Overwrite an existing document
    pub async fn replace(
        &self,
        bucket: &str,
        doc_name: &str,
        doc: Value,
    ) -> JCouchResult<CouchResult> {
        let handle = self.bucket(bucket).await?;
        Ok(handle.replace(doc_name, doc).await?)
    }

    /// Run a view query against a bucket
    pub async fn query(&self, bucket: &str, query: &ViewQuery) -> JCouchResult<CouchResult> {
        let handle = self.bucket(bucket).await?;
        Ok(handle.query(query).await?)
    }

    /// Release every cached bucket and close the cluster connection
    pub async fn shutdown(&self) {
        let released = self.buckets.clear().await;
        self.connection.close().await;
        info!("jcouch shut down, released {} buckets", released);
    }

    pub fn buckets(&self) -> &BucketCache {
        &self.buckets
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    async fn bucket(&self, name: &str) -> JCouchResult<BucketHandle> {
        self.buckets.acquire(name).await
    }
}
