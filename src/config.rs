//! Configuration types for the control plane.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Number of vbuckets a cluster is sharded into unless configured
/// otherwise.
pub const DEFAULT_NUM_VBUCKETS: u16 = 1024;

/// Main configuration for the control-plane service, assembled from the
/// flat key-value map handed to the process at start.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// This node's stable identifier.
    pub uuid: String,

    /// Port of the cluster-info endpoint on the local cluster manager.
    pub rest_port: String,

    /// Port for the admin HTTP surface.
    pub admin_http_port: String,

    /// Port for the admin TLS surface.
    pub admin_ssl_port: String,

    /// TLS certificate path for the admin surface.
    pub ssl_cert_path: PathBuf,

    /// TLS key path for the admin surface.
    pub ssl_key_path: PathBuf,

    /// Cluster-wide vbucket count.
    pub num_vbuckets: u16,

    /// Fixed interval between retries against external collaborators.
    pub retry_interval: Duration,

    /// Coarse read/write deadlines for the admin surface.
    pub http_timeout: Duration,

    /// Interval between progress polls while a rebalance runs.
    pub progress_poll_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            uuid: String::new(),
            rest_port: "8091".into(),
            admin_http_port: "8096".into(),
            admin_ssl_port: String::new(),
            ssl_cert_path: PathBuf::new(),
            ssl_key_path: PathBuf::new(),
            num_vbuckets: DEFAULT_NUM_VBUCKETS,
            retry_interval: Duration::from_secs(1),
            http_timeout: Duration::from_secs(60),
            progress_poll_interval: Duration::from_secs(3),
        }
    }
}

impl ServiceConfig {
    /// Build a config from the flat map supplied at process start.
    ///
    /// Missing required keys are fatal; the process has nothing sensible
    /// to fall back to without its identity and ports.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            map.get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| Error::Config(format!("missing required config key: {key}")))
        };

        let num_vbuckets = match map.get("num_vbuckets") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("num_vbuckets is not a number: {raw}")))?,
            None => DEFAULT_NUM_VBUCKETS,
        };

        Ok(Self {
            uuid: required("uuid")?,
            rest_port: required("rest_port")?,
            admin_http_port: required("eventing_admin_http_port")?,
            admin_ssl_port: map
                .get("eventing_admin_ssl_port")
                .cloned()
                .unwrap_or_default(),
            ssl_cert_path: map
                .get("eventing_admin_ssl_cert")
                .map(PathBuf::from)
                .unwrap_or_default(),
            ssl_key_path: map
                .get("eventing_admin_ssl_key")
                .map(PathBuf::from)
                .unwrap_or_default(),
            num_vbuckets,
            ..Default::default()
        })
    }

    /// Set the vbucket count.
    pub fn with_num_vbuckets(mut self, n: u16) -> Self {
        self.num_vbuckets = n;
        self
    }

    /// Set the fixed retry interval.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the progress poll interval.
    pub fn with_progress_poll_interval(mut self, interval: Duration) -> Self {
        self.progress_poll_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_map() -> HashMap<String, String> {
        [
            ("uuid", "f6a2c0"),
            ("rest_port", "8091"),
            ("eventing_admin_http_port", "8096"),
            ("eventing_admin_ssl_port", "18096"),
            ("eventing_admin_ssl_cert", "/etc/certs/chain.pem"),
            ("eventing_admin_ssl_key", "/etc/certs/pkey.pem"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_from_map() {
        let cfg = ServiceConfig::from_map(&full_map()).unwrap();
        assert_eq!(cfg.uuid, "f6a2c0");
        assert_eq!(cfg.rest_port, "8091");
        assert_eq!(cfg.num_vbuckets, DEFAULT_NUM_VBUCKETS);
        assert_eq!(cfg.ssl_cert_path, PathBuf::from("/etc/certs/chain.pem"));
    }

    #[test]
    fn test_missing_required_key_is_fatal() {
        let mut map = full_map();
        map.remove("uuid");

        let err = ServiceConfig::from_map(&map).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("uuid"));
    }

    #[test]
    fn test_ssl_keys_are_optional() {
        let mut map = full_map();
        map.remove("eventing_admin_ssl_port");
        map.remove("eventing_admin_ssl_cert");
        map.remove("eventing_admin_ssl_key");

        let cfg = ServiceConfig::from_map(&map).unwrap();
        assert!(cfg.admin_ssl_port.is_empty());
    }

    #[test]
    fn test_num_vbuckets_override() {
        let mut map = full_map();
        map.insert("num_vbuckets".into(), "64".into());
        assert_eq!(ServiceConfig::from_map(&map).unwrap().num_vbuckets, 64);

        map.insert("num_vbuckets".into(), "lots".into());
        assert!(ServiceConfig::from_map(&map).is_err());
    }
}
