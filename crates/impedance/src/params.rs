//! Decay parameters from a nested impedance configuration
//!
//! Impedance configuration files group stressors under arbitrary sections,
//! for example:
//!
//! ```yaml
//! roads:
//!   motorway:
//!     decline_type: exp_decline
//!     exp_decline:
//!       lambda_decay: 500
//!     prop_decline:
//!       k_value: 0.1
//! lulc:
//!   stressor_lulc_20_2015:
//!     decline_type: prop_decline
//!     prop_decline:
//!       k_value: 2
//! ```
//!
//! Stressors are looked up by name at any depth.

use std::fmt;
use std::path::Path;

use serde_yaml::Value;
use tracing::debug;

use crate::decay::{DecayProfile, DeclineType};
use habiscape_core::{Error, Result};

/// Leaf value of a configuration tree
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl ScalarValue {
    /// Numeric view; numeric strings are accepted
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Integer(i) => Some(*i as f64),
            ScalarValue::Float(f) => Some(*f),
            ScalarValue::String(s) => s.trim().parse().ok(),
            ScalarValue::Null | ScalarValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("null"),
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::Integer(i) => write!(f, "{}", i),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::String(s) => f.write_str(s),
        }
    }
}

/// An order-preserving configuration tree
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    Scalar(ScalarValue),
    Sequence(Vec<ConfigNode>),
    Mapping(Vec<(String, ConfigNode)>),
}

impl ConfigNode {
    /// Parse YAML text
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)
            .map_err(|e| Error::Config(format!("invalid impedance configuration: {}", e)))?;
        Ok(Self::from(value))
    }

    /// Read and parse a YAML file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let node = Self::from_yaml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "impedance configuration loaded");
        Ok(node)
    }

    /// Direct child of a mapping
    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        match self {
            ConfigNode::Mapping(entries) => entries
                .iter()
                .find(|(k, v)| k == key && !v.is_null())
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Search for `key` at any depth, shallowest match first.
    ///
    /// All keys of a mapping are checked before any of its children is
    /// entered; children are then searched in document order. Null values
    /// count as absent. Sequences are not searched.
    pub fn find(&self, key: &str) -> Option<&ConfigNode> {
        let ConfigNode::Mapping(entries) = self else {
            return None;
        };
        self.get(key)
            .or_else(|| entries.iter().find_map(|(_, child)| child.find(key)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigNode::Scalar(ScalarValue::Null))
    }

    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            ConfigNode::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().and_then(ScalarValue::as_f64)
    }
}

impl From<Value> for ConfigNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ConfigNode::Scalar(ScalarValue::Null),
            Value::Bool(b) => ConfigNode::Scalar(ScalarValue::Bool(b)),
            Value::Number(n) => ConfigNode::Scalar(match n.as_i64() {
                Some(i) => ScalarValue::Integer(i),
                None => ScalarValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Value::String(s) => ConfigNode::Scalar(ScalarValue::String(s)),
            Value::Sequence(items) => {
                ConfigNode::Sequence(items.into_iter().map(ConfigNode::from).collect())
            }
            Value::Mapping(map) => ConfigNode::Mapping(
                map.into_iter()
                    .map(|(k, v)| (key_to_string(k), ConfigNode::from(v)))
                    .collect(),
            ),
            Value::Tagged(tagged) => ConfigNode::from(tagged.value),
        }
    }
}

fn key_to_string(key: Value) -> String {
    match ConfigNode::from(key) {
        ConfigNode::Scalar(s) => s.to_string(),
        other => format!("{:?}", other),
    }
}

/// Raw decay parameters found for one stressor
#[derive(Debug, Clone, PartialEq)]
pub struct StressorParams {
    pub stressor: String,
    pub decline_type: Option<String>,
    pub lambda_decay: Option<f64>,
    pub k_value: Option<f64>,
}

impl StressorParams {
    /// Locate the subtree for `stressor` and read its decay parameters.
    ///
    /// Returns `None` when the stressor does not appear in `config`.
    pub fn resolve(config: &ConfigNode, stressor: &str) -> Option<Self> {
        let subtree = config.find(stressor)?;
        let field = |key: &str| subtree.find(key);

        Some(Self {
            stressor: stressor.to_string(),
            decline_type: field("decline_type").and_then(|n| n.as_scalar()).map(|s| s.to_string()),
            lambda_decay: field("lambda_decay").and_then(ConfigNode::as_f64),
            k_value: field("k_value").and_then(ConfigNode::as_f64),
        })
    }

    /// Turn the raw parameters into a validated profile
    pub fn profile(&self) -> Result<DecayProfile> {
        let not_configured = |reason: String| Error::StressorNotConfigured {
            stressor: self.stressor.clone(),
            reason,
        };

        let raw = self
            .decline_type
            .as_deref()
            .ok_or_else(|| not_configured("decline_type is missing".into()))?;
        let decline_type: DeclineType = raw.parse().map_err(|_| {
            not_configured(format!(
                "unknown decline_type '{}', expected exp_decline or prop_decline",
                raw
            ))
        })?;

        match decline_type {
            DeclineType::Exponential => {
                let lambda = self
                    .lambda_decay
                    .ok_or_else(|| not_configured("lambda_decay is missing for exp_decline".into()))?;
                DecayProfile::exponential(lambda)
            }
            DeclineType::Proportional => {
                let k = self
                    .k_value
                    .ok_or_else(|| not_configured("k_value is missing for prop_decline".into()))?;
                DecayProfile::proportional(k)
            }
        }
    }
}

/// Resolve the decay profile configured for `stressor`
pub fn resolve_decay_profile(config: &ConfigNode, stressor: &str) -> Result<DecayProfile> {
    StressorParams::resolve(config, stressor)
        .ok_or_else(|| Error::StressorNotConfigured {
            stressor: stressor.to_string(),
            reason: "not found in the impedance configuration".into(),
        })?
        .profile()
}
