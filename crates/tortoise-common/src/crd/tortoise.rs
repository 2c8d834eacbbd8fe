//! Tortoise CRD types
//!
//! Only the fields that VPA lifecycle management reads or writes are modelled
//! here; the rest of the Tortoise API is owned by the Tortoise controller.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{CrossVersionObjectReference, ResourceList, ResourceName};

// =============================================================================
// Spec
// =============================================================================

/// What happens to managed resources when a Tortoise is deleted
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// Delete every VPA and HPA created for this Tortoise
    #[default]
    DeleteAll,
    /// Leave managed resources in place
    NoDelete,
}

/// Workloads targeted by a Tortoise
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetRefs {
    /// The workload whose containers are autoscaled
    pub scale_target_ref: CrossVersionObjectReference,
}

/// Per-container resource policy declared on a Tortoise
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResourcePolicy {
    /// Name of the container
    pub container_name: String,

    /// Lower bound for recommendations on this container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_allocated_resources: Option<ResourceList>,
}

/// Autoscaling configuration for a single workload
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "autoscaling.mercari.com",
    version = "v1beta3",
    kind = "Tortoise",
    plural = "tortoises",
    namespaced,
    status = "TortoiseStatus",
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.targetRefs.scaleTargetRef.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TortoiseSpec {
    /// Workload targeted by this Tortoise
    pub target_refs: TargetRefs,

    /// Per-container minimum resources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_policy: Vec<ContainerResourcePolicy>,

    /// Whether managed resources are removed when the Tortoise is deleted
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

// =============================================================================
// Status
// =============================================================================

/// Role a VPA plays for its Tortoise
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum VerticalPodAutoscalerRole {
    /// Observe-only VPA used to collect recommendations
    Monitor,
    /// VPA whose recommendation is applied to the workload
    Updater,
}

impl VerticalPodAutoscalerRole {
    /// Lowercase label value for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monitor => "monitor",
            Self::Updater => "updater",
        }
    }
}

impl std::fmt::Display for VerticalPodAutoscalerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A VPA recorded as belonging to a Tortoise
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct TargetStatusVerticalPodAutoscaler {
    /// Name of the VPA
    pub name: String,
    /// What the VPA is used for
    pub role: VerticalPodAutoscalerRole,
}

/// Resources created for a Tortoise
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetsStatus {
    /// VPAs created for this Tortoise
    #[serde(default)]
    pub vertical_pod_autoscalers: Vec<TargetStatusVerticalPodAutoscaler>,
}

/// How a resource dimension of a container is autoscaled
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum AutoscalingType {
    /// Not autoscaled
    #[default]
    Off,
    /// Scaled by replica count
    Horizontal,
    /// Scaled by resizing the container
    Vertical,
}

/// Autoscaling type of each resource for a container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerAutoscalingPolicy {
    /// Name of the container
    pub container_name: String,
    /// Autoscaling type per resource
    #[serde(default)]
    pub policy: BTreeMap<ResourceName, AutoscalingType>,
}

/// Lifecycle phase of one resource of one container
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ContainerResourcePhase {
    /// Recommendations are still being collected
    #[default]
    GatheringData,
    /// Autoscaling is actively governing this resource
    Working,
    /// Autoscaling is disabled for this resource
    Off,
}

/// Phase of one resource plus when it was entered
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePhase {
    /// Current phase
    pub phase: ContainerResourcePhase,
    /// When the phase last changed
    pub last_transition_time: DateTime<Utc>,
}

impl ResourcePhase {
    /// A phase entered at `now`
    pub fn new(phase: ContainerResourcePhase, now: DateTime<Utc>) -> Self {
        Self {
            phase,
            last_transition_time: now,
        }
    }
}

/// Per-resource phases of a container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResourcePhases {
    /// Name of the container
    pub container_name: String,
    /// Phase per resource
    #[serde(default)]
    pub resource_phases: BTreeMap<ResourceName, ResourcePhase>,
}

/// Observed state of a Tortoise
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TortoiseStatus {
    /// Resources created for this Tortoise
    #[serde(default)]
    pub targets: TargetsStatus,

    /// Autoscaling type per container and resource
    #[serde(default)]
    pub autoscaling_policy: Vec<ContainerAutoscalingPolicy>,

    /// Lifecycle phase per container and resource
    #[serde(default)]
    pub container_resource_phases: Vec<ContainerResourcePhases>,
}

impl Tortoise {
    /// Status, created empty if the Tortoise has none yet
    pub fn status_mut(&mut self) -> &mut TortoiseStatus {
        self.status.get_or_insert_with(TortoiseStatus::default)
    }
}

// =============================================================================
// Tests
// =============================================================================
