//! Shared types used by both the Tortoise and VerticalPodAutoscaler CRDs

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Compute resource tracked by Tortoise
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum ResourceName {
    /// CPU, in cores or millicores
    Cpu,
    /// Memory, in bytes with binary or decimal suffixes
    Memory,
}

impl ResourceName {
    /// Key used for this resource in a resource list
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for ResourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource quantities keyed by resource name (e.g. `cpu: "100m"`, `memory: "128Mi"`)
pub type ResourceList = BTreeMap<String, String>;

/// Reference to a scaled workload, valid across API versions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrossVersionObjectReference {
    /// Kind of the referent (e.g. Deployment)
    pub kind: String,

    /// Name of the referent
    pub name: String,

    /// API version of the referent (e.g. apps/v1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// Status of a Kubernetes-style condition
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

const QUANTITY_SUFFIXES: [&str; 14] = [
    "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "n", "u", "m", "k", "M", "G", "T", "P",
];

/// Whether a resource quantity is absent or numerically zero.
///
/// Suffixes are ignored because they only scale the value. A quantity that
/// cannot be parsed is reported as zero: it cannot be trusted either.
pub fn quantity_is_zero(quantity: Option<&str>) -> bool {
    let Some(qty) = quantity.map(str::trim) else {
        return true;
    };
    let number = QUANTITY_SUFFIXES
        .iter()
        .find_map(|suffix| qty.strip_suffix(suffix))
        .or_else(|| qty.strip_suffix('E'))
        .unwrap_or(qty);

    match number.parse::<f64>() {
        Ok(value) => value == 0.0,
        Err(_) => true,
    }
}
