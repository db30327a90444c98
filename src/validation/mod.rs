//! Structural and semantic validation of function definitions and the
//! global config.
//!
//! Everything that can reach the deployment path passes through here
//! first. Validation is total: it fails on the first offending rule and
//! reports a human-readable reason as [`Error::InvalidConfig`]. Settings
//! validation is pure (map in, typed record out); deployment-config
//! validation consults a fresh topology snapshot for bucket existence and
//! type.

mod settings;

pub use settings::{
    default_settings, fill_missing_with_defaults, validate_settings, DcpStreamBoundary, LogLevel,
    ValidatedSettings, MAX_PREFIX_LENGTH, MIN_FORCE_COMPRESS_VERSION, TIMER_CONTEXT_MAX,
    TIMER_CONTEXT_MIN,
};

use crate::error::{Error, Result};
use crate::functions::{DeploymentConfig, FunctionDefinition};
use crate::topology::{SnapshotStore, TopologySnapshot};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Longest allowed function name.
pub const MAX_APPLICATION_NAME_LENGTH: usize = 100;

/// Longest allowed alias name.
pub const MAX_ALIAS_LENGTH: usize = 20;

/// Alias names must not shadow the host script language's keywords.
const JS_RESERVED_WORDS: &[&str] = &[
    "abstract",
    "await",
    "boolean",
    "break",
    "byte",
    "case",
    "catch",
    "char",
    "class",
    "const",
    "continue",
    "debugger",
    "default",
    "delete",
    "do",
    "double",
    "enum",
    "else",
    "export",
    "extends",
    "final",
    "finally",
    "float",
    "for",
    "function",
    "goto",
    "if",
    "implements",
    "import",
    "interface",
    "in",
    "instanceof",
    "int",
    "let",
    "long",
    "native",
    "new",
    "package",
    "private",
    "protected",
    "public",
    "return",
    "short",
    "static",
    "super",
    "switch",
    "synchronized",
    "this",
    "throw",
    "throws",
    "transient",
    "try",
    "typeof",
    "var",
    "void",
    "volatile",
    "while",
    "with",
    "yield",
];

/// Subset of query-language keywords aliases must avoid, matched
/// case-insensitively.
const QUERY_RESERVED_WORDS: &[&str] = &[
    "alter", "build", "create", "delete", "drop", "execute", "explain", "from", "grant", "infer",
    "insert", "merge", "prepare", "rename", "select", "revoke", "update", "upsert",
];

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidConfig(reason.into())
}

fn validate_non_empty(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(invalid(format!("{what} should not be empty")));
    }
    Ok(())
}

fn validate_name(name: &str, what: &str, max_length: usize) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(format!("{what} name should not be empty")));
    }
    if name.len() > max_length {
        return Err(invalid(format!(
            "{what} name length must be less than {max_length}"
        )));
    }
    Ok(())
}

/// Function names: `^[A-Za-z0-9][A-Za-z0-9_-]*$`, bounded length.
pub fn validate_function_name(name: &str) -> Result<()> {
    validate_name(name, "Function", MAX_APPLICATION_NAME_LENGTH)?;

    let mut chars = name.chars();
    let head_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !head_ok || !tail_ok {
        return Err(invalid(
            "Function name can only contain characters in range A-Z, a-z, 0-9 and underscore, hyphen",
        ));
    }
    Ok(())
}

/// Alias names: a valid script identifier (`^[A-Za-z_$][A-Za-z0-9_]*$`)
/// that is neither a script keyword nor, case-insensitively, a
/// query-language keyword.
pub fn validate_alias_name(alias: &str) -> Result<()> {
    validate_name(alias, "Alias", MAX_ALIAS_LENGTH)?;

    let mut chars = alias.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !head_ok || !tail_ok {
        return Err(invalid("Alias must be a valid JavaScript variable"));
    }

    if JS_RESERVED_WORDS.contains(&alias) {
        return Err(invalid("Alias must not be a JavaScript reserved word"));
    }
    if QUERY_RESERVED_WORDS
        .iter()
        .any(|w| alias.eq_ignore_ascii_case(w))
    {
        return Err(invalid("Alias must not be a N1QL reserved word"));
    }
    Ok(())
}

/// Deployment-config rules, checked against a topology snapshot.
pub fn validate_deployment_config(
    config: &DeploymentConfig,
    snapshot: &TopologySnapshot,
) -> Result<()> {
    validate_non_empty(&config.source_bucket, "Source bucket name")?;
    validate_bucket_exists(&config.source_bucket, snapshot)?;
    if snapshot.is_memcached_bucket(&config.source_bucket) == Some(true) {
        return Err(invalid(format!(
            "Bucket {} is memcached, should be either couchbase or ephemeral",
            config.source_bucket
        )));
    }

    validate_non_empty(&config.metadata_bucket, "Metadata bucket name")?;
    validate_bucket_exists(&config.metadata_bucket, snapshot)?;

    for binding in &config.buckets {
        validate_non_empty(&binding.bucket_name, "Alias bucket name")?;
        validate_alias_name(&binding.alias)?;
    }
    Ok(())
}

fn validate_bucket_exists(bucket: &str, snapshot: &TopologySnapshot) -> Result<()> {
    if snapshot.bucket_uuid(bucket).is_none() {
        return Err(invalid(format!("Bucket {bucket} does not exist")));
    }
    Ok(())
}

/// Gatekeeper for every function-definition and config mutation.
pub struct Validator {
    snapshots: Arc<SnapshotStore>,
}

impl Validator {
    pub fn new(snapshots: Arc<SnapshotStore>) -> Self {
        Self { snapshots }
    }

    /// Validate a full function definition: name, deployment config,
    /// handler source, settings. Consults a fresh topology snapshot for
    /// the bucket and version rules.
    pub async fn validate_function(&self, def: &FunctionDefinition) -> Result<ValidatedSettings> {
        validate_function_name(&def.name)?;

        let snapshot = self.snapshots.refresh().await?;
        validate_deployment_config(&def.deployment_config, &snapshot)?;
        validate_non_empty(&def.handler_source, "Function handler")?;

        let validated = validate_settings(&def.settings, &snapshot.node_versions())?;
        debug!(function = %def.name, "function definition validated");
        Ok(validated)
    }

    /// Validate the global config map: the service-level subset of the
    /// settings table.
    pub async fn validate_config(&self, config: &Map<String, Value>) -> Result<()> {
        settings::check_bool(config, "enable_debugger")?;
        settings::check_positive_integer(config, "ram_quota")?;
        settings::check_bool(config, "enable_lifecycle_ops_during_rebalance")?;

        let snapshot = self.snapshots.refresh().await?;
        settings::check_force_compress(config, &snapshot.node_versions())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::BucketAlias;
    use crate::retry::FixedBackoff;
    use crate::topology::ClusterInfoSource;
    use crate::types::{NodeVersion, EVENTING_SERVICE};
    use async_trait::async_trait;
    use serde_json::json;
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

    fn snapshot() -> TopologySnapshot {
        TopologySnapshot::builder()
            .node("n1", EVENTING_SERVICE, "10.0.0.1:8096")
            .version("n1", NodeVersion::new(6, 5, 0, true))
            .bucket("travel", "uuid-1", false)
            .bucket("meta", "uuid-2", false)
            .bucket("sessioncache", "uuid-3", true)
            .build()
    }

    fn validator() -> Validator {
        Validator::new(Arc::new(SnapshotStore::new(
            Arc::new(FixedTopology {
                snapshot: snapshot(),
            }),
            FixedBackoff::new(Duration::from_millis(5)),
        )))
    }

    fn definition() -> FunctionDefinition {
        FunctionDefinition {
            name: "enrich_bookings".into(),
            handler_source: "function OnUpdate(doc, meta) {}".into(),
            deployment_config: DeploymentConfig {
                source_bucket: "travel".into(),
                metadata_bucket: "meta".into(),
                buckets: vec![BucketAlias {
                    bucket_name: "travel".into(),
                    alias: "src".into(),
                }],
            },
            settings: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_function_name_shape() {
        validate_function_name("fn1").unwrap();
        validate_function_name("9starts-with-digit").unwrap();

        assert!(validate_function_name("").is_err());
        assert!(validate_function_name("_leading_underscore").is_err());
        assert!(validate_function_name("has space").is_err());
        assert!(validate_function_name(&"x".repeat(MAX_APPLICATION_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_alias_identifier_shape() {
        validate_alias_name("src").unwrap();
        validate_alias_name("_private").unwrap();
        validate_alias_name("$cache").unwrap();

        assert!(validate_alias_name("9lives").is_err());
        assert!(validate_alias_name("has-hyphen").is_err());
        assert!(validate_alias_name("").is_err());
    }

    #[test]
    fn test_alias_reserved_words() {
        let err = validate_alias_name("delete").unwrap_err();
        assert!(err.to_string().contains("JavaScript reserved word"));

        // Query keywords are matched case-insensitively.
        let err = validate_alias_name("SELECT").unwrap_err();
        assert!(err.to_string().contains("N1QL reserved word"));
        assert!(validate_alias_name("Upsert").is_err());

        validate_alias_name("selection").unwrap();
    }

    #[tokio::test]
    async fn test_valid_definition_passes() {
        let validated = validator().validate_function(&definition()).await.unwrap();
        assert_eq!(validated.worker_count, 3);
    }

    #[tokio::test]
    async fn test_empty_source_bucket_rejected() {
        let mut def = definition();
        def.deployment_config.source_bucket = String::new();

        let err = validator().validate_function(&def).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid config: Source bucket name should not be empty"
        );
    }

    #[tokio::test]
    async fn test_missing_bucket_rejected() {
        let mut def = definition();
        def.deployment_config.metadata_bucket = "ghost".into();

        let err = validator().validate_function(&def).await.unwrap_err();
        assert!(err.to_string().contains("Bucket ghost does not exist"));
    }

    #[tokio::test]
    async fn test_memcached_source_rejected() {
        let mut def = definition();
        def.deployment_config.source_bucket = "sessioncache".into();

        let err = validator().validate_function(&def).await.unwrap_err();
        assert!(err.to_string().contains("memcached"));
    }

    #[tokio::test]
    async fn test_empty_handler_rejected() {
        let mut def = definition();
        def.handler_source = String::new();

        let err = validator().validate_function(&def).await.unwrap_err();
        assert!(err.to_string().contains("Function handler"));
    }

    #[tokio::test]
    async fn test_bad_alias_in_binding_rejected() {
        let mut def = definition();
        def.deployment_config.buckets[0].alias = "class".into();

        assert!(validator().validate_function(&def).await.is_err());
    }

    #[tokio::test]
    async fn test_settings_failures_propagate() {
        let mut def = definition();
        def.settings = match json!({ "worker_count": -1 }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };

        assert!(validator().validate_function(&def).await.is_err());
    }

    #[tokio::test]
    async fn test_global_config_subset() {
        let validator = validator();

        let ok = match json!({ "ram_quota": 512, "enable_debugger": false }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        validator.validate_config(&ok).await.unwrap();

        let bad = match json!({ "ram_quota": 0 }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        assert!(validator.validate_config(&bad).await.is_err());
    }
}
