//! Top-level service wiring.
//!
//! One [`Service`] value owns every component; nothing lives in process
//! globals. The embedder supplies the three external collaborators (the
//! metadata register, the cluster-info source, and the producer
//! supervisor) and receives handles to the coordinator and the function
//! store.

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::functions::FunctionStore;
use crate::manager::{DeployedFunctions, ServiceManager};
use crate::metakv::{MetadataRegister, MetakvClient, KEEP_NODES_PATH};
use crate::retry::FixedBackoff;
use crate::supervisor::ProducerSupervisor;
use crate::topology::{ClusterInfoSource, SnapshotStore};
use crate::validation::Validator;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The assembled control plane for one node.
pub struct Service {
    config: ServiceConfig,
    manager: Arc<ServiceManager>,
    functions: Arc<FunctionStore>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service").field("config", &self.config).finish()
    }
}

impl Service {
    /// Assemble and start the control plane.
    ///
    /// Blocks until the metadata register answers a probe read (a
    /// register still warming up after process start must not feed stale
    /// emptiness into placement), then runs bootstrap recovery before
    /// returning.
    pub async fn start(
        config: ServiceConfig,
        register: Arc<dyn MetadataRegister>,
        cluster_info: Arc<dyn ClusterInfoSource>,
        supervisor: Arc<dyn ProducerSupervisor>,
    ) -> Result<Self> {
        let shutdown = CancellationToken::new();
        let backoff = FixedBackoff::new(config.retry_interval);

        let metakv = MetakvClient::new(register, backoff);
        let snapshots = Arc::new(SnapshotStore::new(cluster_info, backoff));

        Self::wait_metakv_ready(&metakv, &shutdown).await?;

        let functions = Arc::new(FunctionStore::new(
            metakv.clone(),
            Validator::new(Arc::clone(&snapshots)),
            Arc::clone(&supervisor),
            shutdown.clone(),
        ));

        let manager = ServiceManager::new(
            config.uuid.clone(),
            config.num_vbuckets,
            config.progress_poll_interval,
            backoff,
            metakv,
            snapshots,
            supervisor,
            Arc::clone(&functions) as Arc<dyn DeployedFunctions>,
            shutdown.clone(),
        );

        manager.bootstrap_recover(&shutdown).await?;

        info!(node_id = %config.uuid, "control plane started");
        Ok(Self {
            config,
            manager,
            functions,
            shutdown,
        })
    }

    /// `start` from the flat config map handed to the process.
    pub async fn from_map(
        map: &HashMap<String, String>,
        register: Arc<dyn MetadataRegister>,
        cluster_info: Arc<dyn ClusterInfoSource>,
        supervisor: Arc<dyn ProducerSupervisor>,
    ) -> Result<Self> {
        let config = ServiceConfig::from_map(map)?;
        Self::start(config, register, cluster_info, supervisor).await
    }

    /// Probe the register until it serves reads. The retry inside the
    /// client is unbounded; only the shutdown token ends the wait.
    async fn wait_metakv_ready(metakv: &MetakvClient, cancel: &CancellationToken) -> Result<()> {
        metakv.get(KEEP_NODES_PATH, cancel).await?;
        info!("metadata register is ready");
        Ok(())
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The rebalance coordinator, exposed to the cluster-manager RPC
    /// layer.
    pub fn manager(&self) -> &Arc<ServiceManager> {
        &self.manager
    }

    /// The validated function/config store, exposed to the admin surface.
    pub fn functions(&self) -> &Arc<FunctionStore> {
        &self.functions
    }

    /// Token every background task of this service observes.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cooperative shutdown: cancels every task spawned by the service.
    pub fn shutdown(&self) {
        info!("shutting down control plane");
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::metakv::MemoryRegister;
    use crate::topology::TopologySnapshot;
    use crate::types::{NodeAddr, Vbucket, EVENTING_SERVICE};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct FixedTopology {
        snapshot: TopologySnapshot,
    }

    #[async_trait]
    impl ClusterInfoSource for FixedTopology {
        async fn fetch(&self) -> Result<TopologySnapshot> {
            Ok(self.snapshot.clone())
        }
    }

    struct NoopSupervisor;

    #[async_trait]
    impl ProducerSupervisor for NoopSupervisor {
        async fn apply_placement(
            &self,
            _owners: &std::collections::HashMap<Vbucket, NodeAddr>,
            _workers: &BTreeMap<String, Vec<Vbucket>>,
        ) -> Result<()> {
            Ok(())
        }

        async fn pause(&self) -> Result<()> {
            Ok(())
        }

        async fn resume(&self) -> Result<()> {
            Ok(())
        }

        async fn deploy(&self, _function: &str) -> Result<()> {
            Ok(())
        }

        async fn undeploy(&self, _function: &str) -> Result<()> {
            Ok(())
        }

        async fn local_progress(&self) -> Result<f64> {
            Ok(1.0)
        }
    }

    fn config_map() -> HashMap<String, String> {
        [
            ("uuid", "node-self"),
            ("rest_port", "8091"),
            ("eventing_admin_http_port", "8096"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn topology() -> Arc<FixedTopology> {
        Arc::new(FixedTopology {
            snapshot: TopologySnapshot::builder()
                .node("node-self", EVENTING_SERVICE, "self:1")
                .build(),
        })
    }

    #[tokio::test]
    async fn test_start_from_map() {
        let service = Service::from_map(
            &config_map(),
            Arc::new(MemoryRegister::new()),
            topology(),
            Arc::new(NoopSupervisor),
        )
        .await
        .unwrap();

        assert_eq!(service.config().uuid, "node-self");
        assert_eq!(service.manager().get_node_info().node_id, "node-self");
        service.shutdown();
    }

    #[tokio::test]
    async fn test_missing_config_key_fails_startup() {
        let mut map = config_map();
        map.remove("rest_port");

        let err = Service::from_map(
            &map,
            Arc::new(MemoryRegister::new()),
            topology(),
            Arc::new(NoopSupervisor),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_bootstrap_adopts_persisted_keep_set() {
        let register = Arc::new(MemoryRegister::new());
        let client = MetakvClient::new(
            register.clone(),
            FixedBackoff::new(Duration::from_millis(5)),
        );
        let cancel = CancellationToken::new();
        client
            .set(
                KEEP_NODES_PATH,
                Bytes::from(r#"["node-x","node-y","node-self"]"#),
                &cancel,
            )
            .await
            .unwrap();

        let service = Service::from_map(
            &config_map(),
            register,
            topology(),
            Arc::new(NoopSupervisor),
        )
        .await
        .unwrap();

        assert_eq!(
            service.manager().current_state().servers,
            vec!["node-x", "node-y", "node-self"]
        );
        service.shutdown();
    }
}
