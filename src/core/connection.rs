/// Cluster connection management
///
/// Holds at most one live cluster connection. The connection is built lazily
/// from the current [`ClusterConfig`] on first use and replaced only by an
/// explicit [`ConnectionManager::configure`].
use crate::config::ClusterConfig;
use crate::core::{Cluster, ClusterConnector};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

struct ConnectionState {
    config: ClusterConfig,
    cluster: Option<Arc<dyn Cluster>>,
}

/// Owner of the shared cluster connection
pub struct ConnectionManager {
    connector: Arc<dyn ClusterConnector>,
    state: RwLock<ConnectionState>,
}

impl ConnectionManager {
    /// Create a manager using the default cluster configuration
    pub fn new(connector: Arc<dyn ClusterConnector>) -> Self {
        Self::with_config(connector, ClusterConfig::default())
    }

    /// Create a manager that connects with `config` on first use
    pub fn with_config(connector: Arc<dyn ClusterConnector>, config: ClusterConfig) -> Self {
        Self {
            connector,
            state: RwLock::new(ConnectionState {
                config,
                cluster: None,
            }),
        }
    }

    /// Set the cluster endpoint and connect to it right away.
    ///
    /// Omitted or unusable values fall back to the defaults. The connection
    /// being replaced is closed.
    pub async fn configure(&self, host: Option<&str>, port: Option<u16>) -> ClusterConfig {
        let config = ClusterConfig::new(host, port);
        let cluster = self.connector.connect(&config);

        let previous = {
            let mut state = self.state.write().await;
            state.config = config.clone();
            state.cluster.replace(cluster)
        };
        info!("Cluster connection configured for {}", config.address());

        if let Some(previous) = previous {
            if let Err(e) = previous.close().await {
                warn!("Failed to close previous cluster connection: {}", e);
            }
        }

        config
    }

    /// Get the live connection, connecting with the current config if needed
    pub async fn current_connection(&self) -> Arc<dyn Cluster> {
        {
            let state = self.state.read().await;
            if let Some(cluster) = &state.cluster {
                return Arc::clone(cluster);
            }
        }

        let mut state = self.state.write().await;
        if let Some(cluster) = &state.cluster {
            return Arc::clone(cluster);
        }

        debug!("Connecting to cluster at {}", state.config.address());
        let cluster = self.connector.connect(&state.config);
        state.cluster = Some(Arc::clone(&cluster));
        cluster
    }

    /// Get the effective cluster configuration
    pub async fn config(&self) -> ClusterConfig {
        self.state.read().await.config.clone()
    }

    /// Check whether a connection has been built
    pub async fn is_connected(&self) -> bool {
        self.state.read().await.cluster.is_some()
    }

    /// Close and drop the live connection, if any
    pub async fn close(&self) {
        let cluster = self.state.write().await.cluster.take();
        if let Some(cluster) = cluster {
            match cluster.close().await {
                Ok(()) => debug!("Cluster connection closed"),
                Err(e) => warn!("Failed to close cluster connection: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnector;

    fn create_test_manager() -> (Arc<MemoryConnector>, ConnectionManager) {
        let connector = Arc::new(MemoryConnector::new().with_bucket("orders"));
        let manager = ConnectionManager::new(connector.clone());
        (connector, manager)
    }

    #[tokio::test]
    async fn test_lazy_connection_uses_defaults() {
        let (connector, manager) = create_test_manager();
        assert!(!manager.is_connected().await);
        assert_eq!(connector.connect_count(), 0);

        manager.current_connection().await;

        assert!(manager.is_connected().await);
        assert_eq!(connector.addresses(), vec!["52.4.120.251:8091".to_string()]);
    }

    #[tokio::test]
    async fn test_current_connection_is_idempotent() {
        let (connector, manager) = create_test_manager();

        let first = manager.current_connection().await;
        let second = manager.current_connection().await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_configure_without_arguments() {
        let (connector, manager) = create_test_manager();

        let config = manager.configure(None, None).await;

        assert_eq!(config.host, "52.4.120.251");
        assert_eq!(config.port, 8091);
        assert_eq!(connector.connect_count(), 1);
        assert!(manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_configure_replaces_and_closes_connection() {
        let (connector, manager) = create_test_manager();
        let original = manager.current_connection().await;

        let config = manager.configure(Some("10.0.0.7"), Some(18091)).await;
        let replaced = manager.current_connection().await;

        assert!(!Arc::ptr_eq(&original, &replaced));
        assert_eq!(config.address(), "10.0.0.7:18091");
        assert_eq!(manager.config().await, config);
        assert_eq!(connector.close_count(), 1);
        assert!(original.open_bucket("orders").await.is_err());
        assert!(replaced.open_bucket("orders").await.is_ok());
    }

    #[tokio::test]
    async fn test_configure_defaults_invalid_values() {
        let (connector, manager) = create_test_manager();

        let config = manager.configure(Some(""), Some(0)).await;

        assert_eq!(config, ClusterConfig::default());
        assert_eq!(connector.addresses(), vec!["52.4.120.251:8091".to_string()]);
    }

    #[tokio::test]
    async fn test_close_then_reconnect_with_last_config() {
        let (connector, manager) = create_test_manager();
        manager.configure(Some("10.0.0.9"), None).await;

        manager.close().await;
        assert!(!manager.is_connected().await);
        assert_eq!(connector.close_count(), 1);

        manager.current_connection().await;
        assert_eq!(
            connector.addresses(),
            vec!["10.0.0.9:8091".to_string(), "10.0.0.9:8091".to_string()]
        );
    }
}
