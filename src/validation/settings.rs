//! Settings-map validation: the per-key type/range table, cross-field
//! rules, and the typed record produced on success.

use crate::error::{Error, Result};
use crate::types::NodeVersion;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

/// Longest allowed `user_prefix`.
pub const MAX_PREFIX_LENGTH: usize = 16;

/// Inclusive bounds for `timer_context_size`, in bytes.
pub const TIMER_CONTEXT_MIN: u64 = 20;
pub const TIMER_CONTEXT_MAX: u64 = 19 * 1024 * 1024;

/// `force_compress = true` requires every node at or above this release.
pub const MIN_FORCE_COMPRESS_VERSION: NodeVersion = NodeVersion::new(6, 0, 3, true);

const BOOL_KEYS: &[&str] = &[
    "processing_status",
    "deployment_status",
    "cleanup_timers",
    "breakpad_on",
    "enable_applog_rotation",
    "enable_debugger",
    "enable_lifecycle_ops_during_rebalance",
];

const POSITIVE_INT_KEYS: &[&str] = &[
    "checkpoint_interval",
    "curl_timeout",
    "deadline_timeout",
    "execution_timeout",
    "worker_count",
    "cpp_worker_thread_count",
    "lcb_inst_capacity",
    "poll_bucket_interval",
    "sock_batch_size",
    "tick_duration",
    "feedback_batch_size",
    "feedback_read_buffer_size",
    "idle_checkpoint_interval",
    "worker_feedback_queue_cap",
    "worker_queue_cap",
    "worker_queue_mem_cap",
    "worker_response_timeout",
    "execute_timer_routine_count",
    "timer_storage_routine_count",
    "timer_storage_chan_size",
    "timer_queue_mem_cap",
    "timer_queue_size",
    "undeploy_routine_count",
    "vb_ownership_giveup_routine_count",
    "vb_ownership_takeover_routine_count",
    "app_log_max_size",
    "app_log_max_files",
    "agg_dcp_feed_mem_cap",
    "data_chan_size",
    "dcp_gen_chan_size",
    "dcp_num_connections",
    "ram_quota",
    "timer_context_size",
];

const DCP_STREAM_BOUNDARY_VALUES: &[&str] = &["everything", "from_now"];
const LOG_LEVEL_VALUES: &[&str] = &["INFO", "ERROR", "WARNING", "DEBUG", "TRACE"];

/// Where a handler starts consuming the data-change stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcpStreamBoundary {
    Everything,
    FromNow,
}

impl DcpStreamBoundary {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "everything" => Some(Self::Everything),
            "from_now" => Some(Self::FromNow),
            _ => None,
        }
    }
}

/// Handler log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
    Warning,
    Debug,
    Trace,
}

impl LogLevel {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "INFO" => Some(Self::Info),
            "ERROR" => Some(Self::Error),
            "WARNING" => Some(Self::Warning),
            "DEBUG" => Some(Self::Debug),
            "TRACE" => Some(Self::Trace),
            _ => None,
        }
    }
}

/// The typed settings record produced by a successful validation.
///
/// Unrecognised keys are not an error; they ride along in `unknown` so a
/// newer node's settings survive a round trip through an older one.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSettings {
    pub processing_status: bool,
    pub deployment_status: bool,
    pub cleanup_timers: bool,
    pub breakpad_on: bool,
    pub enable_applog_rotation: bool,
    pub enable_debugger: bool,
    pub enable_lifecycle_ops_during_rebalance: bool,
    pub force_compress: bool,

    pub checkpoint_interval: u64,
    pub curl_timeout: u64,
    pub deadline_timeout: u64,
    pub execution_timeout: u64,
    pub worker_count: u64,
    pub cpp_worker_thread_count: u64,
    pub lcb_inst_capacity: u64,
    pub poll_bucket_interval: u64,
    pub sock_batch_size: u64,
    pub tick_duration: u64,
    pub feedback_batch_size: u64,
    pub feedback_read_buffer_size: u64,
    pub idle_checkpoint_interval: u64,
    pub worker_feedback_queue_cap: u64,
    pub worker_queue_cap: u64,
    pub worker_queue_mem_cap: u64,
    pub worker_response_timeout: u64,
    pub execute_timer_routine_count: u64,
    pub timer_storage_routine_count: u64,
    pub timer_storage_chan_size: u64,
    pub timer_queue_mem_cap: u64,
    pub timer_queue_size: u64,
    pub undeploy_routine_count: u64,
    pub vb_ownership_giveup_routine_count: u64,
    pub vb_ownership_takeover_routine_count: u64,
    pub app_log_max_size: u64,
    pub app_log_max_files: u64,
    pub agg_dcp_feed_mem_cap: u64,
    pub data_chan_size: u64,
    pub dcp_gen_chan_size: u64,
    pub dcp_num_connections: u64,
    pub ram_quota: u64,
    pub timer_context_size: u64,

    pub dcp_stream_boundary: DcpStreamBoundary,
    pub log_level: LogLevel,
    pub user_prefix: String,
    pub app_log_dir: Option<PathBuf>,
    pub handler_headers: Vec<String>,
    pub handler_footers: Vec<String>,

    pub unknown: Map<String, Value>,
}

/// Defaults applied before validation so every cross-field rule sees both
/// of its operands.
pub fn default_settings() -> Map<String, Value> {
    let defaults = json!({
        "processing_status": false,
        "deployment_status": false,
        "cleanup_timers": false,
        "breakpad_on": true,
        "enable_applog_rotation": true,
        "enable_debugger": false,
        "enable_lifecycle_ops_during_rebalance": false,
        "force_compress": false,

        "checkpoint_interval": 60000,
        "curl_timeout": 5,
        "deadline_timeout": 62000,
        "execution_timeout": 60000,
        "worker_count": 3,
        "cpp_worker_thread_count": 2,
        "lcb_inst_capacity": 5,
        "poll_bucket_interval": 10,
        "sock_batch_size": 1,
        "tick_duration": 60000,
        "feedback_batch_size": 100,
        "feedback_read_buffer_size": 65536,
        "idle_checkpoint_interval": 1800,
        "worker_feedback_queue_cap": 500,
        "worker_queue_cap": 100000,
        "worker_queue_mem_cap": 1024,
        "worker_response_timeout": 3600,
        "execute_timer_routine_count": 3,
        "timer_storage_routine_count": 3,
        "timer_storage_chan_size": 10000,
        "timer_queue_mem_cap": 50,
        "timer_queue_size": 10000,
        "undeploy_routine_count": 6,
        "vb_ownership_giveup_routine_count": 3,
        "vb_ownership_takeover_routine_count": 3,
        "app_log_max_size": 41943040,
        "app_log_max_files": 10,
        "agg_dcp_feed_mem_cap": 1024,
        "data_chan_size": 50,
        "dcp_gen_chan_size": 10000,
        "dcp_num_connections": 1,
        "ram_quota": 256,
        "timer_context_size": 1024,

        "dcp_stream_boundary": "everything",
        "log_level": "INFO",
        "user_prefix": "eventing",
        "handler_headers": ["'use strict';"],
        "handler_footers": [],
    });
    match defaults {
        Value::Object(map) => map,
        _ => unreachable!("default settings literal is an object"),
    }
}

/// Copy defaults into `settings` for every key the caller left out.
pub fn fill_missing_with_defaults(settings: &mut Map<String, Value>) {
    for (key, value) in default_settings() {
        settings.entry(key).or_insert(value);
    }
}

fn invalid(reason: String) -> Error {
    Error::InvalidConfig(reason)
}

/// Reject non-boolean values for `field` when present.
pub(super) fn check_bool(settings: &Map<String, Value>, field: &str) -> Result<()> {
    match settings.get(field) {
        Some(v) if !v.is_boolean() => Err(invalid(format!("{field} must be a boolean"))),
        _ => Ok(()),
    }
}

/// Reject values that are not strictly positive integers. Non-integral
/// numbers (e.g. `2.5`) are rejected, not truncated.
pub(super) fn check_positive_integer(settings: &Map<String, Value>, field: &str) -> Result<()> {
    let Some(v) = settings.get(field) else {
        return Ok(());
    };
    let Some(n) = v.as_f64() else {
        return Err(invalid(format!("{field} must be a number")));
    };
    if n <= 0.0 {
        return Err(invalid(format!("{field} can not be zero or negative")));
    }
    if n.trunc() != n {
        return Err(invalid(format!("{field} must be a positive integer")));
    }
    Ok(())
}

fn check_possible_values(
    settings: &Map<String, Value>,
    field: &str,
    possible: &[&str],
) -> Result<()> {
    if let Some(v) = settings.get(field) {
        let ok = v.as_str().is_some_and(|s| possible.contains(&s));
        if !ok {
            return Err(invalid(format!(
                "Invalid value for {field}, possible values are {}",
                possible.join(", ")
            )));
        }
    }
    Ok(())
}

fn check_string_array(settings: &Map<String, Value>, field: &str) -> Result<()> {
    let Some(v) = settings.get(field) else {
        return Ok(());
    };
    let Some(values) = v.as_array() else {
        return Err(invalid(format!("{field} must be a list of strings")));
    };
    for (i, value) in values.iter().enumerate() {
        if !value.is_string() {
            return Err(invalid(format!(
                "In {field} element at index {i} must be a string"
            )));
        }
    }
    Ok(())
}

fn check_string_bounded(settings: &Map<String, Value>, field: &str, max: usize) -> Result<()> {
    let Some(v) = settings.get(field) else {
        return Ok(());
    };
    let Some(s) = v.as_str() else {
        return Err(invalid(format!("{field} must be a string")));
    };
    if s.is_empty() {
        return Err(invalid(format!("{field} must not be empty")));
    }
    if s.len() > max {
        return Err(invalid(format!(
            "{field} must have no more than {max} characters"
        )));
    }
    Ok(())
}

fn check_dir_path(settings: &Map<String, Value>, field: &str) -> Result<()> {
    let Some(v) = settings.get(field) else {
        return Ok(());
    };
    let Some(path) = v.as_str() else {
        return Err(invalid(format!("{field} must be a string")));
    };

    let meta = std::fs::metadata(Path::new(path))
        .map_err(|_| invalid(format!("{field} path does not exist")))?;
    if !meta.is_dir() {
        return Err(invalid(format!("{field} must be a directory")));
    }
    if meta.permissions().readonly() {
        return Err(invalid(format!("{field} must be writable")));
    }
    Ok(())
}

fn check_timer_context_size(settings: &Map<String, Value>, field: &str) -> Result<()> {
    if let Some(n) = settings.get(field).and_then(Value::as_f64) {
        if n > TIMER_CONTEXT_MAX as f64 {
            return Err(invalid(format!("{field} value can not be more than 19MB")));
        }
        if n < TIMER_CONTEXT_MIN as f64 {
            return Err(invalid(format!(
                "{field} value can not be less than 20 bytes"
            )));
        }
    }
    Ok(())
}

/// `field1 * multiplier < field2`, both operands guaranteed present after
/// defaults.
fn check_less_than(
    settings: &Map<String, Value>,
    field1: &str,
    field2: &str,
    multiplier: f64,
) -> Result<()> {
    let Some(a) = settings.get(field1).and_then(Value::as_f64) else {
        return Err(invalid(format!("{field1} does not exist")));
    };
    let Some(b) = settings.get(field2).and_then(Value::as_f64) else {
        return Err(invalid(format!("{field2} does not exist")));
    };
    if a * multiplier >= b {
        return Err(invalid(format!("{field1} must be less than {field2}")));
    }
    Ok(())
}

/// The version gate on compression: every node in the cluster must be at
/// or above [`MIN_FORCE_COMPRESS_VERSION`] before it may be forced on.
pub(super) fn check_force_compress(
    settings: &Map<String, Value>,
    node_versions: &[NodeVersion],
) -> Result<()> {
    let field = "force_compress";
    match settings.get(field) {
        None => Ok(()),
        Some(Value::Bool(false)) => Ok(()),
        Some(Value::Bool(true)) => {
            if node_versions
                .iter()
                .all(|v| v.at_least(&MIN_FORCE_COMPRESS_VERSION))
            {
                Ok(())
            } else {
                Err(invalid(format!(
                    "All nodes must be at or above version {MIN_FORCE_COMPRESS_VERSION} to use {field}"
                )))
            }
        }
        Some(_) => Err(invalid(format!("{field} must be a boolean"))),
    }
}

fn bool_of(settings: &Map<String, Value>, field: &str) -> bool {
    settings.get(field).and_then(Value::as_bool).unwrap_or_default()
}

fn u64_of(settings: &Map<String, Value>, field: &str) -> u64 {
    settings
        .get(field)
        .and_then(Value::as_f64)
        .unwrap_or_default() as u64
}

fn string_of(settings: &Map<String, Value>, field: &str) -> String {
    settings
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn strings_of(settings: &Map<String, Value>, field: &str) -> Vec<String> {
    settings
        .get(field)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn is_recognized(key: &str) -> bool {
    BOOL_KEYS.contains(&key)
        || POSITIVE_INT_KEYS.contains(&key)
        || matches!(
            key,
            "force_compress"
                | "dcp_stream_boundary"
                | "log_level"
                | "user_prefix"
                | "app_log_dir"
                | "handler_headers"
                | "handler_footers"
        )
}

/// Validate a settings map against the full rule table.
///
/// Pure: the caller's map is not modified; defaults are applied to a copy.
/// Fails on the first offending rule with a human-readable reason.
pub fn validate_settings(
    settings: &Map<String, Value>,
    node_versions: &[NodeVersion],
) -> Result<ValidatedSettings> {
    let mut filled = settings.clone();
    fill_missing_with_defaults(&mut filled);

    for field in BOOL_KEYS {
        check_bool(&filled, field)?;
    }
    check_force_compress(&filled, node_versions)?;

    for field in POSITIVE_INT_KEYS {
        check_positive_integer(&filled, field)?;
    }
    check_timer_context_size(&filled, "timer_context_size")?;

    check_possible_values(&filled, "dcp_stream_boundary", DCP_STREAM_BOUNDARY_VALUES)?;
    check_possible_values(&filled, "log_level", LOG_LEVEL_VALUES)?;

    check_string_bounded(&filled, "user_prefix", MAX_PREFIX_LENGTH)?;
    check_string_array(&filled, "handler_headers")?;
    check_string_array(&filled, "handler_footers")?;
    check_dir_path(&filled, "app_log_dir")?;

    check_less_than(&filled, "curl_timeout", "deadline_timeout", 1000.0)?;
    check_less_than(&filled, "curl_timeout", "execution_timeout", 1000.0)?;
    check_less_than(&filled, "execution_timeout", "deadline_timeout", 1.0)?;

    let unknown: Map<String, Value> = settings
        .iter()
        .filter(|(key, _)| !is_recognized(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(ValidatedSettings {
        processing_status: bool_of(&filled, "processing_status"),
        deployment_status: bool_of(&filled, "deployment_status"),
        cleanup_timers: bool_of(&filled, "cleanup_timers"),
        breakpad_on: bool_of(&filled, "breakpad_on"),
        enable_applog_rotation: bool_of(&filled, "enable_applog_rotation"),
        enable_debugger: bool_of(&filled, "enable_debugger"),
        enable_lifecycle_ops_during_rebalance: bool_of(
            &filled,
            "enable_lifecycle_ops_during_rebalance",
        ),
        force_compress: bool_of(&filled, "force_compress"),

        checkpoint_interval: u64_of(&filled, "checkpoint_interval"),
        curl_timeout: u64_of(&filled, "curl_timeout"),
        deadline_timeout: u64_of(&filled, "deadline_timeout"),
        execution_timeout: u64_of(&filled, "execution_timeout"),
        worker_count: u64_of(&filled, "worker_count"),
        cpp_worker_thread_count: u64_of(&filled, "cpp_worker_thread_count"),
        lcb_inst_capacity: u64_of(&filled, "lcb_inst_capacity"),
        poll_bucket_interval: u64_of(&filled, "poll_bucket_interval"),
        sock_batch_size: u64_of(&filled, "sock_batch_size"),
        tick_duration: u64_of(&filled, "tick_duration"),
        feedback_batch_size: u64_of(&filled, "feedback_batch_size"),
        feedback_read_buffer_size: u64_of(&filled, "feedback_read_buffer_size"),
        idle_checkpoint_interval: u64_of(&filled, "idle_checkpoint_interval"),
        worker_feedback_queue_cap: u64_of(&filled, "worker_feedback_queue_cap"),
        worker_queue_cap: u64_of(&filled, "worker_queue_cap"),
        worker_queue_mem_cap: u64_of(&filled, "worker_queue_mem_cap"),
        worker_response_timeout: u64_of(&filled, "worker_response_timeout"),
        execute_timer_routine_count: u64_of(&filled, "execute_timer_routine_count"),
        timer_storage_routine_count: u64_of(&filled, "timer_storage_routine_count"),
        timer_storage_chan_size: u64_of(&filled, "timer_storage_chan_size"),
        timer_queue_mem_cap: u64_of(&filled, "timer_queue_mem_cap"),
        timer_queue_size: u64_of(&filled, "timer_queue_size"),
        undeploy_routine_count: u64_of(&filled, "undeploy_routine_count"),
        vb_ownership_giveup_routine_count: u64_of(&filled, "vb_ownership_giveup_routine_count"),
        vb_ownership_takeover_routine_count: u64_of(&filled, "vb_ownership_takeover_routine_count"),
        app_log_max_size: u64_of(&filled, "app_log_max_size"),
        app_log_max_files: u64_of(&filled, "app_log_max_files"),
        agg_dcp_feed_mem_cap: u64_of(&filled, "agg_dcp_feed_mem_cap"),
        data_chan_size: u64_of(&filled, "data_chan_size"),
        dcp_gen_chan_size: u64_of(&filled, "dcp_gen_chan_size"),
        dcp_num_connections: u64_of(&filled, "dcp_num_connections"),
        ram_quota: u64_of(&filled, "ram_quota"),
        timer_context_size: u64_of(&filled, "timer_context_size"),

        dcp_stream_boundary: DcpStreamBoundary::from_str(&string_of(
            &filled,
            "dcp_stream_boundary",
        ))
        .unwrap_or(DcpStreamBoundary::Everything),
        log_level: LogLevel::from_str(&string_of(&filled, "log_level")).unwrap_or(LogLevel::Info),
        user_prefix: string_of(&filled, "user_prefix"),
        app_log_dir: filled
            .get("app_log_dir")
            .and_then(Value::as_str)
            .map(PathBuf::from),
        handler_headers: strings_of(&filled, "handler_headers"),
        handler_footers: strings_of(&filled, "handler_footers"),

        unknown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: Value) -> Map<String, Value> {
        match entries {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn modern_cluster() -> Vec<NodeVersion> {
        vec![
            NodeVersion::new(6, 5, 0, true),
            NodeVersion::new(6, 0, 3, true),
        ]
    }

    #[test]
    fn test_empty_settings_validate_with_defaults() {
        let settings = map(json!({}));
        let validated = validate_settings(&settings, &modern_cluster()).unwrap();

        assert_eq!(validated.worker_count, 3);
        assert_eq!(validated.dcp_stream_boundary, DcpStreamBoundary::Everything);
        assert_eq!(validated.log_level, LogLevel::Info);
        assert_eq!(validated.user_prefix, "eventing");
        assert!(validated.unknown.is_empty());
    }

    #[test]
    fn test_validation_is_idempotent() {
        let settings = map(json!({
            "worker_count": 8,
            "log_level": "DEBUG",
            "custom_key": "opaque",
        }));

        let first = validate_settings(&settings, &modern_cluster()).unwrap();
        let second = validate_settings(&settings.clone(), &modern_cluster()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let settings = map(json!({
            "some_future_knob": 17,
            "worker_count": 2,
        }));

        let validated = validate_settings(&settings, &modern_cluster()).unwrap();
        assert_eq!(validated.unknown.len(), 1);
        assert_eq!(validated.unknown["some_future_knob"], json!(17));
        assert_eq!(validated.worker_count, 2);
    }

    #[test]
    fn test_non_integral_number_rejected() {
        let settings = map(json!({ "worker_count": 2.5 }));
        let err = validate_settings(&settings, &modern_cluster()).unwrap_err();
        assert!(err.to_string().contains("worker_count"));
    }

    #[test]
    fn test_zero_and_negative_rejected() {
        for bad in [json!(0), json!(-3)] {
            let settings = map(json!({ "checkpoint_interval": bad }));
            assert!(validate_settings(&settings, &modern_cluster()).is_err());
        }
    }

    #[test]
    fn test_bool_type_enforced() {
        let settings = map(json!({ "cleanup_timers": "yes" }));
        let err = validate_settings(&settings, &modern_cluster()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid config: cleanup_timers must be a boolean"
        );
    }

    #[test]
    fn test_enum_values() {
        let settings = map(json!({ "dcp_stream_boundary": "from_now" }));
        let validated = validate_settings(&settings, &modern_cluster()).unwrap();
        assert_eq!(validated.dcp_stream_boundary, DcpStreamBoundary::FromNow);

        let settings = map(json!({ "dcp_stream_boundary": "yesterday" }));
        assert!(validate_settings(&settings, &modern_cluster()).is_err());

        let settings = map(json!({ "log_level": "verbose" }));
        assert!(validate_settings(&settings, &modern_cluster()).is_err());
    }

    #[test]
    fn test_handler_headers_must_be_strings() {
        let settings = map(json!({ "handler_headers": ["a", 3] }));
        let err = validate_settings(&settings, &modern_cluster()).unwrap_err();
        assert!(err.to_string().contains("index 1"));

        let settings = map(json!({ "handler_footers": "not-a-list" }));
        assert!(validate_settings(&settings, &modern_cluster()).is_err());
    }

    #[test]
    fn test_timer_context_size_bounds() {
        for (value, ok) in [
            (json!(19), false),
            (json!(20), true),
            (json!(19 * 1024 * 1024), true),
            (json!(19 * 1024 * 1024 + 1), false),
        ] {
            let settings = map(json!({ "timer_context_size": value.clone() }));
            let result = validate_settings(&settings, &modern_cluster());
            assert_eq!(result.is_ok(), ok, "timer_context_size = {value}");
        }
    }

    #[test]
    fn test_user_prefix_bounds() {
        let settings = map(json!({ "user_prefix": "" }));
        assert!(validate_settings(&settings, &modern_cluster()).is_err());

        let settings = map(json!({ "user_prefix": "x".repeat(MAX_PREFIX_LENGTH + 1) }));
        assert!(validate_settings(&settings, &modern_cluster()).is_err());

        let settings = map(json!({ "user_prefix": "tenant_a" }));
        assert!(validate_settings(&settings, &modern_cluster()).is_ok());
    }

    #[test]
    fn test_cross_field_timeouts() {
        // curl_timeout * 1000 must stay below execution_timeout.
        let settings = map(json!({ "curl_timeout": 5, "execution_timeout": 5000 }));
        let err = validate_settings(&settings, &modern_cluster()).unwrap_err();
        assert!(err.to_string().contains("curl_timeout"));

        let settings = map(json!({ "curl_timeout": 5, "execution_timeout": 5001 }));
        assert!(validate_settings(&settings, &modern_cluster()).is_ok());

        // execution_timeout must stay below deadline_timeout.
        let settings = map(json!({ "execution_timeout": 62000 }));
        assert!(validate_settings(&settings, &modern_cluster()).is_err());

        let settings = map(json!({ "execution_timeout": 9000, "deadline_timeout": 9001 }));
        assert!(validate_settings(&settings, &modern_cluster()).is_ok());
    }

    #[test]
    fn test_force_compress_version_gate() {
        let settings = map(json!({ "force_compress": true }));
        assert!(validate_settings(&settings, &modern_cluster()).is_ok());

        let mixed = vec![
            NodeVersion::new(6, 5, 0, true),
            NodeVersion::new(6, 0, 2, true),
        ];
        let err = validate_settings(&settings, &mixed).unwrap_err();
        assert!(err.to_string().contains("6.0.3"));

        // Off is always fine, whatever the cluster runs.
        let settings = map(json!({ "force_compress": false }));
        assert!(validate_settings(&settings, &mixed).is_ok());
    }

    #[test]
    fn test_app_log_dir_rules() {
        let dir = tempfile::tempdir().unwrap();
        let settings = map(json!({ "app_log_dir": dir.path().to_str().unwrap() }));
        assert!(validate_settings(&settings, &modern_cluster()).is_ok());

        let settings = map(json!({ "app_log_dir": "/definitely/not/a/real/path" }));
        let err = validate_settings(&settings, &modern_cluster()).unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let file = dir.path().join("plain-file");
        std::fs::write(&file, b"x").unwrap();
        let settings = map(json!({ "app_log_dir": file.to_str().unwrap() }));
        let err = validate_settings(&settings, &modern_cluster()).unwrap_err();
        assert!(err.to_string().contains("directory"));
    }

    #[test]
    fn test_validated_ranges_hold() {
        let settings = map(json!({
            "worker_count": 16,
            "timer_context_size": 4096,
            "curl_timeout": 2,
        }));
        let validated = validate_settings(&settings, &modern_cluster()).unwrap();

        assert!(validated.worker_count > 0);
        assert!(
            validated.timer_context_size >= TIMER_CONTEXT_MIN
                && validated.timer_context_size <= TIMER_CONTEXT_MAX
        );
        assert!(validated.curl_timeout * 1000 < validated.execution_timeout);
        assert!(validated.execution_timeout < validated.deadline_timeout);
    }
}
