/// Bucket handle cache with idle eviction
///
/// Handles are opened on first use and reused while they stay busy. A single
/// sweep task evicts handles idle past the timeout; it is started by the first
/// insert and stops itself once the cache is empty.
use crate::config::CacheConfig;
use crate::core::{BucketHandle, ConnectionManager};
use crate::error::{ClusterError, JCouchError, JCouchResult};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Timing of the bucket cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Idle time after which a handle is evicted
    pub bucket_timeout: Duration,
    /// Period of the idle sweep
    pub bucket_interval: Duration,
}

impl CacheSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket_timeout(mut self, timeout: Duration) -> Self {
        self.bucket_timeout = timeout;
        self
    }

    pub fn with_bucket_interval(mut self, interval: Duration) -> Self {
        self.bucket_interval = interval;
        self
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CacheSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            bucket_timeout: config.bucket_timeout(),
            bucket_interval: config.bucket_interval(),
        }
    }
}

struct BucketEntry {
    handle: BucketHandle,
    last_access: Instant,
}

impl BucketEntry {
    fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_access) > timeout
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, BucketEntry>,
    /// One gate per bucket name with an open in progress
    opening: HashMap<String, Arc<Mutex<()>>>,
    sweeper: Option<JoinHandle<()>>,
    /// Bumped by every clear, so opens started before it are not cached
    generation: u64,
}

impl CacheState {
    /// Drop the gate for `name` unless another caller is still waiting on it.
    fn release_gate(&mut self, name: &str, gate: &Arc<Mutex<()>>) {
        let ours = self
            .opening
            .get(name)
            .map_or(false, |current| Arc::ptr_eq(current, gate));
        if ours && Arc::strong_count(gate) <= 2 {
            self.opening.remove(name);
        }
    }
}

struct CacheInner {
    connection: Arc<ConnectionManager>,
    settings: CacheSettings,
    state: Mutex<CacheState>,
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        if let Some(sweeper) = self.state.get_mut().sweeper.take() {
            sweeper.abort();
        }
    }
}

/// Cache of open bucket handles keyed by bucket name
#[derive(Clone)]
pub struct BucketCache {
    inner: Arc<CacheInner>,
}

impl BucketCache {
    pub fn new(connection: Arc<ConnectionManager>, settings: CacheSettings) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                connection,
                settings,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Get a handle to the named bucket, opening it if it is not cached.
    ///
    /// Concurrent callers asking for the same uncached bucket share a single
    /// open. A failed open caches nothing.
    pub async fn acquire(&self, name: &str) -> JCouchResult<BucketHandle> {
        let timeout = self.inner.settings.bucket_timeout;

        let (gate, stale) = {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            let now = Instant::now();

            if let Some(entry) = state.entries.get_mut(name) {
                if !entry.is_idle(now, timeout) {
                    entry.last_access = now;
                    debug!("Bucket cache hit for {}", name);
                    return Ok(Arc::clone(&entry.handle));
                }
            }

            // Anything still cached here is idle and the sweep has not run yet.
            let stale = state.entries.remove(name);
            let gate = Arc::clone(
                state
                    .opening
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            );
            (gate, stale)
        };

        if let Some(entry) = stale {
            info!("Evicting idle bucket {} on access", name);
            disconnect_handle(name, entry.handle).await;
        }

        let _opening = gate.lock().await;

        let generation = {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            if let Some(entry) = state.entries.get_mut(name) {
                // Opened while we waited on the gate.
                entry.last_access = Instant::now();
                let handle = Arc::clone(&entry.handle);
                state.release_gate(name, &gate);
                return Ok(handle);
            }
            state.generation
        };

        debug!("Bucket cache miss for {}, opening", name);
        let cluster = self.inner.connection.current_connection().await;
        let opened = cluster.open_bucket(name).await;

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        state.release_gate(name, &gate);

        let handle = match opened {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to open bucket {}: {}", name, e);
                return Err(JCouchError::bucket_open(name, e));
            }
        };

        if state.generation != generation {
            drop(guard);
            info!(
                "Bucket cache cleared while {} was opening, discarding handle",
                name
            );
            disconnect_handle(name, handle).await;
            return Err(JCouchError::bucket_open(
                name,
                ClusterError::disconnected(name),
            ));
        }

        state.entries.insert(
            name.to_string(),
            BucketEntry {
                handle: Arc::clone(&handle),
                last_access: Instant::now(),
            },
        );
        if state.sweeper.is_none() {
            state.sweeper = Some(self.spawn_sweeper());
            debug!("Bucket sweep armed");
        }
        info!("Opened bucket {} ({} cached)", name, state.entries.len());

        Ok(handle)
    }

    /// Disconnect and drop every cached handle and stop the sweep.
    ///
    /// Returns the number of handles released.
    pub async fn clear(&self) -> usize {
        let (entries, sweeper) = {
            let mut state = self.inner.state.lock().await;
            state.generation += 1;
            let entries: Vec<(String, BucketEntry)> = state.entries.drain().collect();
            (entries, state.sweeper.take())
        };

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        let released = entries.len();
        join_all(
            entries
                .into_iter()
                .map(|(name, entry)| async move { disconnect_handle(&name, entry.handle).await }),
        )
        .await;

        if released > 0 {
            info!("Released {} cached buckets", released);
        }
        released
    }

    /// Number of cached handles
    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.state.lock().await.entries.is_empty()
    }

    /// Check whether a handle for `name` is cached
    pub async fn contains(&self, name: &str) -> bool {
        self.inner.state.lock().await.entries.contains_key(name)
    }

    /// Check whether the idle sweep is armed
    pub async fn is_sweeping(&self) -> bool {
        self.inner.state.lock().await.sweeper.is_some()
    }

    pub fn settings(&self) -> CacheSettings {
        self.inner.settings
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.inner.connection
    }

    fn spawn_sweeper(&self) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        // tokio intervals reject a zero period
        let period = self.inner.settings.bucket_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if !sweep_idle(&inner).await {
                    break;
                }
            }
        })
    }
}

/// Evict idle handles once. Returns false when the sweep should stop.
async fn sweep_idle(inner: &Weak<CacheInner>) -> bool {
    let inner = match inner.upgrade() {
        Some(inner) => inner,
        None => return false,
    };

    let now = Instant::now();
    let timeout = inner.settings.bucket_timeout;
    let mut expired = Vec::new();

    let keep_running = {
        let mut state = inner.state.lock().await;
        state.entries.retain(|name, entry| {
            if entry.is_idle(now, timeout) {
                expired.push((name.clone(), Arc::clone(&entry.handle)));
                false
            } else {
                true
            }
        });

        if state.entries.is_empty() {
            state.sweeper = None;
            false
        } else {
            true
        }
    };

    if !expired.is_empty() {
        // Evicted handles are out of the map, so their release must outlive an
        // abort of this task by `clear`.
        let release = tokio::spawn(async move {
            join_all(expired.into_iter().map(|(name, handle)| async move {
                info!("Evicting idle bucket {}", name);
                disconnect_handle(&name, handle).await;
            }))
            .await;
        });
        if let Err(e) = release.await {
            warn!("Idle bucket release task failed: {}", e);
        }
    }

    if !keep_running {
        debug!("Bucket cache empty, sweep disarmed");
    }
    keep_running
}

async fn disconnect_handle(name: &str, handle: BucketHandle) {
    if let Err(e) = handle.disconnect().await {
        warn!("Failed to disconnect bucket {}: {}", name, e);
    }
}
