//! Process-local cluster backend
//!
//! Implements the client traits over an in-memory document store so the cache
//! and facade can run without a cluster. Buckets have to be declared up front;
//! documents survive reconnects because every connection built by one
//! connector shares the same store.

use crate::config::ClusterConfig;
use crate::core::{Bucket, BucketHandle, Cluster, ClusterConnector, CouchResult, ViewQuery};
use crate::error::ClusterError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

type Documents = HashMap<String, BTreeMap<String, StoredDoc>>;

#[derive(Debug, Clone)]
struct StoredDoc {
    value: Value,
    cas: u64,
}

/// Operation counters shared by every connection of a connector
#[derive(Debug, Default)]
struct MemoryStats {
    connects: AtomicUsize,
    opens: AtomicUsize,
    disconnects: AtomicUsize,
    closes: AtomicUsize,
}

#[derive(Default)]
struct MemoryStore {
    buckets: RwLock<Documents>,
    next_cas: AtomicU64,
    stats: MemoryStats,
    /// (bucket, cluster address) for every successful open
    opened_on: Mutex<Vec<(String, String)>>,
    open_delay: Mutex<Duration>,
    disconnect_delay: Mutex<Duration>,
    fail_disconnect: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    fn next_cas(&self) -> u64 {
        self.next_cas.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn read_docs(&self) -> RwLockReadGuard<'_, Documents> {
        self.buckets
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_docs(&self) -> RwLockWriteGuard<'_, Documents> {
        self.buckets
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Builds [`MemoryCluster`] connections over one shared store
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    addresses: Mutex<Vec<String>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::default()),
            addresses: Mutex::new(Vec::new()),
        }
    }

    /// Declare a bucket that can be opened
    pub fn with_bucket<S: Into<String>>(self, name: S) -> Self {
        self.store.write_docs().entry(name.into()).or_default();
        self
    }

    /// Delay every bucket open, to widen races in tests
    pub fn with_open_delay(self, delay: Duration) -> Self {
        *lock(&self.store.open_delay) = delay;
        self
    }

    /// Delay every bucket disconnect
    pub fn with_disconnect_delay(self, delay: Duration) -> Self {
        *lock(&self.store.disconnect_delay) = delay;
        self
    }

    /// Make every bucket disconnect report an error
    pub fn with_failing_disconnect(self) -> Self {
        self.store.fail_disconnect.store(true, Ordering::Relaxed);
        self
    }

    pub fn connect_count(&self) -> usize {
        self.store.stats.connects.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.store.stats.opens.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.store.stats.disconnects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.store.stats.closes.load(Ordering::SeqCst)
    }

    /// Addresses of every connection built so far, oldest first
    pub fn addresses(&self) -> Vec<String> {
        lock(&self.addresses).clone()
    }

    /// Address of the connection each bucket was opened on, oldest first
    pub fn opened_on(&self) -> Vec<(String, String)> {
        lock(&self.store.opened_on).clone()
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterConnector for MemoryConnector {
    fn connect(&self, config: &ClusterConfig) -> Arc<dyn Cluster> {
        let address = config.address();
        self.store.stats.connects.fetch_add(1, Ordering::SeqCst);
        lock(&self.addresses).push(address.clone());

        Arc::new(MemoryCluster {
            address,
            store: Arc::clone(&self.store),
            closed: AtomicBool::new(false),
        })
    }
}

/// One connection to the in-memory store
pub struct MemoryCluster {
    address: String,
    store: Arc<MemoryStore>,
    closed: AtomicBool,
}

impl MemoryCluster {
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Cluster for MemoryCluster {
    async fn open_bucket(&self, name: &str) -> Result<BucketHandle, ClusterError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClusterError::unreachable(
                self.address.as_str(),
                "connection closed",
            ));
        }

        let delay = *lock(&self.store.open_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if !self.store.read_docs().contains_key(name) {
            return Err(ClusterError::bucket_not_found(name));
        }

        self.store.stats.opens.fetch_add(1, Ordering::SeqCst);
        lock(&self.store.opened_on).push((name.to_string(), self.address.clone()));
        Ok(Arc::new(MemoryBucket {
            name: name.to_string(),
            store: Arc::clone(&self.store),
            connected: AtomicBool::new(true),
        }))
    }

    async fn close(&self) -> Result<(), ClusterError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.store.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Handle to one bucket of the in-memory store
pub struct MemoryBucket {
    name: String,
    store: Arc<MemoryStore>,
    connected: AtomicBool,
}

fn mutation_result(cas: u64) -> CouchResult {
    CouchResult::from(json!({ "cas": cas }))
}

impl MemoryBucket {
    fn ensure_connected(&self) -> Result<(), ClusterError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClusterError::disconnected(self.name.as_str()))
        }
    }

    /// Store `doc` under `key`; `must_exist` selects insert (false) or replace (true),
    /// `None` always writes.
    async fn write_doc(
        &self,
        key: &str,
        doc: Value,
        must_exist: Option<bool>,
    ) -> Result<CouchResult, ClusterError> {
        self.ensure_connected()?;
        let mut buckets = self.store.write_docs();
        let docs = buckets
            .get_mut(&self.name)
            .ok_or_else(|| ClusterError::bucket_not_found(self.name.as_str()))?;

        match (must_exist, docs.contains_key(key)) {
            (Some(false), true) => return Err(ClusterError::exists(key)),
            (Some(true), false) => return Err(ClusterError::not_found(key)),
            _ => {}
        }

        let cas = self.store.next_cas();
        docs.insert(key.to_string(), StoredDoc { value: doc, cas });
        Ok(mutation_result(cas))
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, key: &str, doc: Value) -> Result<CouchResult, ClusterError> {
        self.write_doc(key, doc, Some(false)).await
    }

    async fn get(&self, key: &str) -> Result<CouchResult, ClusterError> {
        self.ensure_connected()?;
        let buckets = self.store.read_docs();
        buckets
            .get(&self.name)
            .and_then(|docs| docs.get(key))
            .map(|doc| CouchResult::wrapped(doc.value.clone(), doc.cas))
            .ok_or_else(|| ClusterError::not_found(key))
    }

    async fn get_multi(&self, keys: &[String]) -> Result<CouchResult, ClusterError> {
        self.ensure_connected()?;
        let buckets = self.store.read_docs();
        let docs = buckets
            .get(&self.name)
            .ok_or_else(|| ClusterError::bucket_not_found(self.name.as_str()))?;

        let results = keys
            .iter()
            .map(|key| {
                let result = match docs.get(key) {
                    Some(doc) => CouchResult::wrapped(doc.value.clone(), doc.cas),
                    None => CouchResult::from(json!({
                        "error": ClusterError::not_found(key.as_str()).to_string()
                    })),
                };
                (key.clone(), result)
            })
            .collect();
        Ok(CouchResult::Map(results))
    }

    async fn remove(&self, key: &str) -> Result<CouchResult, ClusterError> {
        self.ensure_connected()?;
        let mut buckets = self.store.write_docs();
        let removed = buckets
            .get_mut(&self.name)
            .and_then(|docs| docs.remove(key))
            .ok_or_else(|| ClusterError::not_found(key))?;
        Ok(mutation_result(removed.cas))
    }

    async fn upsert(&self, key: &str, doc: Value) -> Result<CouchResult, ClusterError> {
        self.write_doc(key, doc, None).await
    }

    async fn replace(&self, key: &str, doc: Value) -> Result<CouchResult, ClusterError> {
        self.write_doc(key, doc, Some(true)).await
    }

    /// Every view lists the bucket's documents ordered by id; `key` matches the id.
    async fn query(&self, query: &ViewQuery) -> Result<CouchResult, ClusterError> {
        self.ensure_connected()?;
        if query.design_doc.is_empty() || query.view.is_empty() {
            return Err(ClusterError::query("design document and view are required"));
        }

        let buckets = self.store.read_docs();
        let docs = buckets
            .get(&self.name)
            .ok_or_else(|| ClusterError::bucket_not_found(self.name.as_str()))?;

        let rows = docs
            .iter()
            .filter(|(id, _)| match &query.key {
                Some(Value::String(key)) => key == *id,
                Some(_) => false,
                None => true,
            })
            .skip(query.skip.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(id, doc)| {
                let mut row = BTreeMap::new();
                row.insert("id".to_string(), CouchResult::Scalar(json!(id)));
                row.insert("key".to_string(), CouchResult::Scalar(json!(id)));
                row.insert("value".to_string(), CouchResult::from(doc.value.clone()));
                CouchResult::Map(row)
            })
            .collect();
        Ok(CouchResult::Seq(rows))
    }

    async fn disconnect(&self) -> Result<(), ClusterError> {
        let delay = *lock(&self.store.disconnect_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.connected.store(false, Ordering::SeqCst);
        self.store.stats.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.store.fail_disconnect.load(Ordering::Relaxed) {
            return Err(ClusterError::client(format!(
                "failed to disconnect bucket {}",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open(connector: &MemoryConnector, name: &str) -> BucketHandle {
        connector
            .connect(&ClusterConfig::default())
            .open_bucket(name)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_undeclared_bucket_fails_to_open() {
        let connector = MemoryConnector::new().with_bucket("orders");
        let cluster = connector.connect(&ClusterConfig::default());

        let result = cluster.open_bucket("users").await;
        assert!(matches!(result, Err(ClusterError::BucketNotFound { .. })));
        assert_eq!(connector.open_count(), 0);
    }

    #[tokio::test]
    async fn test_insert_and_replace_semantics() {
        let connector = MemoryConnector::new().with_bucket("orders");
        let bucket = open(&connector, "orders").await;

        bucket.insert("doc1", json!({"id": 1})).await.unwrap();
        let again = bucket.insert("doc1", json!({"id": 2})).await;
        assert_eq!(again, Err(ClusterError::exists("doc1")));

        let missing = bucket.replace("doc2", json!({})).await;
        assert_eq!(missing, Err(ClusterError::not_found("doc2")));

        bucket.replace("doc1", json!({"id": 3})).await.unwrap();
        let fetched = bucket.get("doc1").await.unwrap();
        assert!(matches!(
            fetched,
            CouchResult::Wrapped { ref value, .. } if value == &json!({"id": 3})
        ));
    }

    #[tokio::test]
    async fn test_cas_changes_on_every_write() {
        let connector = MemoryConnector::new().with_bucket("orders");
        let bucket = open(&connector, "orders").await;

        bucket.upsert("doc1", json!(1)).await.unwrap();
        let first = bucket.get("doc1").await.unwrap().cas();
        bucket.upsert("doc1", json!(2)).await.unwrap();
        let second = bucket.get("doc1").await.unwrap().cas();

        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_documents_survive_reconnect() {
        let connector = MemoryConnector::new().with_bucket("orders");
        let bucket = open(&connector, "orders").await;
        bucket.upsert("doc1", json!("kept")).await.unwrap();
        bucket.disconnect().await.unwrap();

        let result = bucket.get("doc1").await;
        assert_eq!(result, Err(ClusterError::disconnected("orders")));

        let reopened = open(&connector, "orders").await;
        assert!(reopened.get("doc1").await.is_ok());
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(connector.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_view_query_paging() {
        let connector = MemoryConnector::new().with_bucket("orders");
        let bucket = open(&connector, "orders").await;
        for id in ["a", "b", "c", "d"] {
            bucket.upsert(id, json!({ "id": id })).await.unwrap();
        }

        let page = bucket
            .query(&ViewQuery::new("orders", "all").skip(1).limit(2))
            .await
            .unwrap();
        match page {
            CouchResult::Seq(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(crate::core::normalize(&rows[0])["id"], json!("b"));
            }
            other => panic!("unexpected query result: {:?}", other),
        }

        let keyed = bucket
            .query(&ViewQuery::new("orders", "all").key(json!("d")))
            .await
            .unwrap();
        assert!(matches!(keyed, CouchResult::Seq(ref rows) if rows.len() == 1));
    }

    #[tokio::test]
    async fn test_closed_cluster_refuses_opens() {
        let connector = MemoryConnector::new().with_bucket("orders");
        let cluster = connector.connect(&ClusterConfig::new(Some("10.1.1.1"), None));
        cluster.close().await.unwrap();
        cluster.close().await.unwrap();

        let result = cluster.open_bucket("orders").await;
        assert!(matches!(result, Err(ClusterError::Unreachable { .. })));
        assert_eq!(connector.close_count(), 1);
        assert_eq!(connector.addresses(), vec!["10.1.1.1:8091".to_string()]);
    }

    #[tokio::test]
    async fn test_opens_record_cluster_address() {
        let connector = MemoryConnector::new().with_bucket("orders");
        let first = connector.connect(&ClusterConfig::default());
        let second = connector.connect(&ClusterConfig::new(Some("10.1.1.2"), Some(9000)));

        first.open_bucket("orders").await.unwrap();
        second.open_bucket("orders").await.unwrap();

        assert_eq!(
            connector.opened_on(),
            vec![
                ("orders".to_string(), "52.4.120.251:8091".to_string()),
                ("orders".to_string(), "10.1.1.2:9000".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_delay_is_honoured() {
        let connector = MemoryConnector::new()
            .with_bucket("orders")
            .with_disconnect_delay(Duration::from_millis(100));
        let bucket = open(&connector, "orders").await;

        let started = tokio::time::Instant::now();
        bucket.disconnect().await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(connector.disconnect_count(), 1);
    }
}
