//! aqc-config
//!
//! Layered YAML configuration.
//!
//! - Documents merge in order: earlier docs are base, later docs override.
//! - The merged tree is canonicalised (sorted keys, compact JSON) and hashed
//!   with SHA-256 so every run can log which config it ran under.
//! - Leaf strings that look like credentials abort loading. YAML names the
//!   env vars that hold venue keys; [`secrets`] resolves them.
//! - [`DeskSettings`] is the typed view; unknown keys are rejected.

pub mod secrets;
mod settings;

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use sha2::{Digest, Sha256};

pub use settings::{
    DeskSettings, ExecutionSettings, KeysEnv, PoolSettings, PositionSettings, RiskSettings,
    RuntimeSettings, VenueSettings,
};

/// Known secret-like prefixes. A leaf string starting with one of these
/// aborts loading with `CONFIG_SECRET_DETECTED`.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // OpenAI style
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "gho_",       // GitHub OAuth
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "xoxp-",      // Slack user token
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("config json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CONFIG_SECRET_DETECTED leaf={pointer} value=REDACTED")]
    SecretDetected { pointer: String },
    #[error("SECRETS_MISSING: required env var '{var}' ({what}) is not set or empty")]
    SecretMissing { var: String, what: &'static str },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed, validated settings.
    pub fn settings(&self) -> Result<DeskSettings, ConfigError> {
        DeskSettings::from_json(&self.config_json)
    }
}

pub fn load_layered_yaml<P: AsRef<Path>>(paths: &[P]) -> Result<LoadedConfig, ConfigError> {
    let mut docs = Vec::with_capacity(paths.len());
    for p in paths {
        let p = p.as_ref();
        let raw = fs::read_to_string(p).map_err(|source| ConfigError::Read {
            path: p.to_path_buf(),
            source,
        })?;
        docs.push(raw);
    }
    let doc_refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig, ConfigError> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw)?;
        // An empty document parses as null; treat it as an empty layer.
        if v_yaml.is_null() {
            continue;
        }
        let v_json = serde_json::to_value(v_yaml)?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    // serde_json::Map is a BTreeMap here (no `preserve_order`), so keys
    // serialize sorted and the output is canonical.
    let canonical_json = serde_json::to_string(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Paths from a comma-separated list such as `AQC_CONFIG`.
pub fn split_config_paths(list: &str) -> Vec<PathBuf> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<(), ConfigError> {
    let mut leaves = Vec::new();
    collect_string_leaves(v, "", &mut leaves);
    match leaves.into_iter().find(|(_, s)| looks_like_secret(s)) {
        Some((pointer, _)) => Err(ConfigError::SecretDetected { pointer }),
        None => Ok(()),
    }
}

fn collect_string_leaves<'a>(v: &'a Value, prefix: &str, out: &mut Vec<(String, &'a str)>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map {
                let next = format!("{}/{}", prefix, k.replace('~', "~0").replace('/', "~1"));
                collect_string_leaves(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                collect_string_leaves(vv, &format!("{prefix}/{i}"), out);
            }
        }
        Value::String(s) => out.push((
            if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            },
            s.as_str(),
        )),
        _ => {}
    }
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layers_override_and_nested_maps_merge() {
        let cfg = load_layered_yaml_from_strings(&[
            "runtime:\n  cycle_interval_secs: 60\n  hash_chain: true\n",
            "runtime:\n  cycle_interval_secs: 15\n",
        ])
        .unwrap();
        assert_eq!(cfg.config_json.pointer("/runtime/cycle_interval_secs").unwrap(), 15);
        assert_eq!(cfg.config_json.pointer("/runtime/hash_chain").unwrap(), true);
    }

    #[test]
    fn secret_literal_aborts_with_pointer_only() {
        let err = load_layered_yaml_from_strings(&[
            "venue:\n  keys_env:\n    api_key: \"sk-live-abcdefghijklmnop\"\n",
        ])
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("/venue/keys_env/api_key"));
        assert!(!msg.contains("abcdefghijklmnop"));
    }

    #[test]
    fn empty_layers_are_ignored() {
        let a = load_layered_yaml_from_strings(&["", "{}"]).unwrap();
        let b = load_layered_yaml_from_strings(&["{}"]).unwrap();
        assert_eq!(a.config_hash, b.config_hash);
    }

    #[test]
    fn splits_path_lists() {
        assert_eq!(
            split_config_paths("config/base.yaml, config/prod.yaml,,"),
            vec![
                PathBuf::from("config/base.yaml"),
                PathBuf::from("config/prod.yaml")
            ]
        );
    }
}
