//! Function-definition and config store.
//!
//! CRUD over the metadata register's function subtrees, plus import and
//! export. Every write is gated by the validator first: a definition that
//! fails validation is rejected synchronously and never reaches the
//! producer supervisor.

use crate::error::Result;
use crate::manager::{DeployedFunctions, FunctionShard};
use crate::metakv::{MetakvClient, APPS_PATH, SETTINGS_CONFIG_PATH, TEMP_APPS_PATH};
use crate::supervisor::ProducerSupervisor;
use crate::validation::Validator;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One alias binding: a bucket made visible to the handler under a
/// script-level name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketAlias {
    pub bucket_name: String,
    pub alias: String,
}

/// Buckets a function reads from and writes its bookkeeping to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub source_bucket: String,
    pub metadata_bucket: String,
    #[serde(default)]
    pub buckets: Vec<BucketAlias>,
}

/// A complete function definition as submitted by an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub handler_source: String,
    pub deployment_config: DeploymentConfig,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl FunctionDefinition {
    fn bool_setting(&self, key: &str) -> bool {
        self.settings
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or_default()
    }

    /// Whether the operator asked for this function to run.
    pub fn is_deployed(&self) -> bool {
        self.bool_setting("deployment_status")
    }

    /// Worker count for sharding, defaulting like the settings table.
    pub fn worker_count(&self) -> usize {
        self.settings
            .get("worker_count")
            .and_then(Value::as_u64)
            .unwrap_or(3) as usize
    }
}

/// Validated store for function definitions and the global config.
pub struct FunctionStore {
    metakv: MetakvClient,
    validator: Validator,
    supervisor: Arc<dyn ProducerSupervisor>,
    shutdown: CancellationToken,
}

impl FunctionStore {
    pub fn new(
        metakv: MetakvClient,
        validator: Validator,
        supervisor: Arc<dyn ProducerSupervisor>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            metakv,
            validator,
            supervisor,
            shutdown,
        }
    }

    /// Persist a definition into the primary store and hand it to the
    /// supervisor when its settings ask for deployment. Validation gates
    /// the write; nothing invalid gets persisted or deployed.
    pub async fn save(&self, def: &FunctionDefinition, cancel: &CancellationToken) -> Result<()> {
        self.validator.validate_function(def).await?;

        let raw = serde_json::to_vec(def)?;
        let path = format!("{}{}", APPS_PATH, def.name);
        self.metakv.set(&path, Bytes::from(raw), cancel).await?;
        info!(function = %def.name, "saved function definition");

        if def.is_deployed() {
            self.supervisor.deploy(&def.name).await?;
        }
        Ok(())
    }

    /// Persist a draft into the temp store. Drafts are validated the same
    /// way but never deployed.
    pub async fn save_draft(
        &self,
        def: &FunctionDefinition,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.validator.validate_function(def).await?;

        let raw = serde_json::to_vec(def)?;
        let path = format!("{}{}", TEMP_APPS_PATH, def.name);
        self.metakv.set(&path, Bytes::from(raw), cancel).await
    }

    /// Read a definition from the primary store.
    pub async fn get(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<FunctionDefinition>> {
        let path = format!("{}{}", APPS_PATH, name);
        match self.metakv.get(&path, cancel).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Read a draft from the temp store.
    pub async fn get_draft(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<FunctionDefinition>> {
        let path = format!("{}{}", TEMP_APPS_PATH, name);
        match self.metakv.get(&path, cancel).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Undeploy and remove a function from both stores.
    pub async fn delete(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        self.supervisor.undeploy(name).await?;
        self.metakv
            .delete_subtree(&format!("{}{}", APPS_PATH, name), cancel)
            .await?;
        self.metakv
            .delete_subtree(&format!("{}{}", TEMP_APPS_PATH, name), cancel)
            .await?;
        info!(function = %name, "deleted function definition");
        Ok(())
    }

    /// All definitions in the primary store. Corrupt blobs are skipped
    /// with a warning rather than failing the listing.
    pub async fn list(&self, cancel: &CancellationToken) -> Result<Vec<FunctionDefinition>> {
        let blobs = self.metakv.list(APPS_PATH, cancel).await?;
        let mut defs = Vec::with_capacity(blobs.len());
        for (path, raw) in blobs {
            match serde_json::from_slice(&raw) {
                Ok(def) => defs.push(def),
                Err(err) => warn!(%path, %err, "skipping corrupt function blob"),
            }
        }
        Ok(defs)
    }

    /// Export every stored definition.
    pub async fn export(&self, cancel: &CancellationToken) -> Result<Vec<FunctionDefinition>> {
        self.list(cancel).await
    }

    /// Import definitions. Each is validated before anything is written,
    /// so a bad entry rejects the whole batch.
    pub async fn import(
        &self,
        defs: &[FunctionDefinition],
        cancel: &CancellationToken,
    ) -> Result<()> {
        for def in defs {
            self.validator.validate_function(def).await?;
        }
        for def in defs {
            self.save(def, cancel).await?;
        }
        Ok(())
    }

    /// Persist the global config, gated by the config validator.
    pub async fn save_config(
        &self,
        config: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.validator.validate_config(config).await?;
        let raw = serde_json::to_vec(config)?;
        self.metakv
            .set(SETTINGS_CONFIG_PATH, Bytes::from(raw), cancel)
            .await
    }

    /// Read the global config. Missing blob decodes to an empty map.
    pub async fn get_config(&self, cancel: &CancellationToken) -> Result<Map<String, Value>> {
        match self.metakv.get(SETTINGS_CONFIG_PATH, cancel).await? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Ok(Map::new()),
        }
    }
}

#[async_trait]
impl DeployedFunctions for FunctionStore {
    async fn deployed(&self) -> Result<Vec<FunctionShard>> {
        let defs = self.list(&self.shutdown).await?;
        Ok(defs
            .into_iter()
            .filter(FunctionDefinition::is_deployed)
            .map(|def| FunctionShard {
                worker_count: def.worker_count(),
                name: def.name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metakv::MemoryRegister;
    use crate::retry::FixedBackoff;
    use crate::topology::{ClusterInfoSource, SnapshotStore, TopologySnapshot};
    use crate::types::{NodeAddr, NodeVersion, Vbucket, EVENTING_SERVICE};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};
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

    #[derive(Default)]
    struct LifecycleSupervisor {
        deploys: Mutex<Vec<String>>,
        undeploys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProducerSupervisor for LifecycleSupervisor {
        async fn apply_placement(
            &self,
            _owners: &HashMap<Vbucket, NodeAddr>,
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

        async fn deploy(&self, function: &str) -> Result<()> {
            self.deploys.lock().push(function.to_string());
            Ok(())
        }

        async fn undeploy(&self, function: &str) -> Result<()> {
            self.undeploys.lock().push(function.to_string());
            Ok(())
        }

        async fn local_progress(&self) -> Result<f64> {
            Ok(0.0)
        }
    }

    struct Fixture {
        store: FunctionStore,
        supervisor: Arc<LifecycleSupervisor>,
    }

    fn fixture() -> Fixture {
        let snapshot = TopologySnapshot::builder()
            .node("n1", EVENTING_SERVICE, "10.0.0.1:8096")
            .version("n1", NodeVersion::new(6, 5, 0, true))
            .bucket("travel", "uuid-1", false)
            .bucket("meta", "uuid-2", false)
            .build();

        let backoff = FixedBackoff::new(Duration::from_millis(5));
        let snapshots = Arc::new(SnapshotStore::new(
            Arc::new(FixedTopology { snapshot }),
            backoff,
        ));
        let supervisor = Arc::new(LifecycleSupervisor::default());

        Fixture {
            store: FunctionStore::new(
                MetakvClient::new(Arc::new(MemoryRegister::new()), backoff),
                Validator::new(snapshots),
                supervisor.clone(),
                CancellationToken::new(),
            ),
            supervisor,
        }
    }

    fn definition(name: &str, deployed: bool) -> FunctionDefinition {
        let settings = match json!({
            "deployment_status": deployed,
            "worker_count": 4,
        }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };

        FunctionDefinition {
            name: name.into(),
            handler_source: "function OnUpdate(doc, meta) {}".into(),
            deployment_config: DeploymentConfig {
                source_bucket: "travel".into(),
                metadata_bucket: "meta".into(),
                buckets: Vec::new(),
            },
            settings,
        }
    }

    #[tokio::test]
    async fn test_save_get_round_trip() {
        let fix = fixture();
        let cancel = CancellationToken::new();
        let def = definition("enrich", false);

        fix.store.save(&def, &cancel).await.unwrap();
        let loaded = fix.store.get("enrich", &cancel).await.unwrap().unwrap();
        assert_eq!(loaded, def);

        assert_eq!(fix.store.get("ghost", &cancel).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_definition_never_reaches_supervisor() {
        let fix = fixture();
        let cancel = CancellationToken::new();

        let mut def = definition("enrich", true);
        def.deployment_config.source_bucket = String::new();

        let err = fix.store.save(&def, &cancel).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid config: Source bucket name should not be empty"
        );

        assert!(fix.supervisor.deploys.lock().is_empty());
        assert_eq!(fix.store.get("enrich", &cancel).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_deploys_when_requested() {
        let fix = fixture();
        let cancel = CancellationToken::new();

        fix.store
            .save(&definition("running", true), &cancel)
            .await
            .unwrap();
        fix.store
            .save(&definition("parked", false), &cancel)
            .await
            .unwrap();

        assert_eq!(*fix.supervisor.deploys.lock(), vec!["running"]);
    }

    #[tokio::test]
    async fn test_delete_undeploys_and_clears_both_stores() {
        let fix = fixture();
        let cancel = CancellationToken::new();
        let def = definition("enrich", false);

        fix.store.save(&def, &cancel).await.unwrap();
        fix.store.save_draft(&def, &cancel).await.unwrap();

        fix.store.delete("enrich", &cancel).await.unwrap();
        assert_eq!(*fix.supervisor.undeploys.lock(), vec!["enrich"]);
        assert_eq!(fix.store.get("enrich", &cancel).await.unwrap(), None);
        assert_eq!(fix.store.get_draft("enrich", &cancel).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_import_rejects_whole_batch_on_one_bad_entry() {
        let fix = fixture();
        let cancel = CancellationToken::new();

        let good = definition("good", false);
        let mut bad = definition("bad", false);
        bad.handler_source = String::new();

        assert!(fix.store.import(&[good, bad], &cancel).await.is_err());
        assert!(fix.store.list(&cancel).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_round_trips_import() {
        let fix = fixture();
        let cancel = CancellationToken::new();

        fix.store
            .import(&[definition("a1", false), definition("b2", false)], &cancel)
            .await
            .unwrap();

        let exported = fix.store.export(&cancel).await.unwrap();
        let names: Vec<&str> = exported.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a1", "b2"]);
    }

    #[tokio::test]
    async fn test_deployed_functions_listing() {
        let fix = fixture();
        let cancel = CancellationToken::new();

        fix.store
            .save(&definition("running", true), &cancel)
            .await
            .unwrap();
        fix.store
            .save(&definition("parked", false), &cancel)
            .await
            .unwrap();

        let shards = fix.store.deployed().await.unwrap();
        assert_eq!(
            shards,
            vec![FunctionShard {
                name: "running".into(),
                worker_count: 4,
            }]
        );
    }

    #[tokio::test]
    async fn test_config_write_is_gated() {
        let fix = fixture();
        let cancel = CancellationToken::new();

        let bad = match json!({ "ram_quota": -5 }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        assert!(fix.store.save_config(&bad, &cancel).await.is_err());
        assert!(fix.store.get_config(&cancel).await.unwrap().is_empty());

        let good = match json!({ "ram_quota": 512 }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        fix.store.save_config(&good, &cancel).await.unwrap();
        assert_eq!(fix.store.get_config(&cancel).await.unwrap(), good);
    }
}
