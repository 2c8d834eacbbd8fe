//! VerticalPodAutoscaler (autoscaling.k8s.io/v1) types
//!
//! Mirrors the upstream VPA API closely enough to read recommendations and
//! write the fields Tortoise manages. Quantities are kept as strings.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ConditionStatus, CrossVersionObjectReference, ResourceList, ResourceName};

/// Condition type set by the VPA recommender once it has produced a recommendation
pub const CONDITION_RECOMMENDATION_PROVIDED: &str = "RecommendationProvided";

/// How the VPA applies its recommendation
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum UpdateMode {
    /// Only compute recommendations
    Off,
    /// Apply recommendations when pods are created
    Initial,
    /// Apply recommendations by evicting pods
    Recreate,
    /// Let the VPA choose the update mechanism
    Auto,
    /// A mode introduced by a newer VPA release
    #[serde(other)]
    Unknown,
}

/// Update behaviour of a VPA
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodUpdatePolicy {
    /// Update mode; the VPA defaults to Auto when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_mode: Option<UpdateMode>,
}

/// Per-container bounds for recommendations
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VpaContainerResourcePolicy {
    /// Container the policy applies to
    pub container_name: String,

    /// Lower bound for recommendations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_allowed: Option<ResourceList>,
}

/// Resource policies of all containers in the pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodResourcePolicy {
    /// Policies per container
    #[serde(default)]
    pub container_policies: Vec<VpaContainerResourcePolicy>,
}

/// Desired state of a VerticalPodAutoscaler
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "autoscaling.k8s.io",
    version = "v1",
    kind = "VerticalPodAutoscaler",
    plural = "verticalpodautoscalers",
    shortname = "vpa",
    namespaced,
    status = "VerticalPodAutoscalerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VerticalPodAutoscalerSpec {
    /// Workload whose pods are controlled by this VPA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<CrossVersionObjectReference>,

    /// How recommendations are applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_policy: Option<PodUpdatePolicy>,

    /// Per-container recommendation bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_policy: Option<PodResourcePolicy>,
}

/// Recommendation for a single container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedContainerResources {
    /// Name of the container
    pub container_name: String,

    /// Recommended amount of resources
    #[serde(default)]
    pub target: ResourceList,

    /// Minimum recommended amount of resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<ResourceList>,

    /// Maximum recommended amount of resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<ResourceList>,

    /// Recommendation before the resource policy bounds were applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncapped_target: Option<ResourceList>,
}

impl RecommendedContainerResources {
    /// Target quantity for a resource, if recommended
    pub fn target_for(&self, resource: ResourceName) -> Option<&str> {
        self.target.get(resource.as_str()).map(String::as_str)
    }
}

/// Recommendations for all containers in the pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedPodResources {
    /// Recommendations per container
    #[serde(default)]
    pub container_recommendations: Vec<RecommendedContainerResources>,
}

/// Condition reported by the VPA recommender
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerticalPodAutoscalerCondition {
    /// Condition type (e.g. RecommendationProvided)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition
    pub status: ConditionStatus,

    /// Last time the condition transitioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    /// Machine-readable reason for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Observed state of a VerticalPodAutoscaler
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerticalPodAutoscalerStatus {
    /// Most recent recommendation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<RecommendedPodResources>,

    /// Conditions reported by the recommender
    #[serde(default)]
    pub conditions: Vec<VerticalPodAutoscalerCondition>,
}

impl VerticalPodAutoscaler {
    /// Container recommendations, empty when the VPA has none
    pub fn container_recommendations(&self) -> &[RecommendedContainerResources] {
        self.status
            .as_ref()
            .and_then(|s| s.recommendation.as_ref())
            .map(|r| r.container_recommendations.as_slice())
            .unwrap_or_default()
    }

    /// Whether a condition of the given type is currently True
    pub fn has_true_condition(&self, condition_type: &str) -> bool {
        self.status.as_ref().is_some_and(|s| {
            s.conditions
                .iter()
                .any(|c| c.type_ == condition_type && c.status == ConditionStatus::True)
        })
    }

    /// Whether the VPA carries `annotation` with the value `"true"`
    pub fn has_true_annotation(&self, annotation: &str) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(annotation))
            .is_some_and(|v| v == "true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vpa_from(value: serde_json::Value) -> VerticalPodAutoscaler {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parses_upstream_status_shape() {
        let vpa = vpa_from(serde_json::json!({
            "apiVersion": "autoscaling.k8s.io/v1",
            "kind": "VerticalPodAutoscaler",
            "metadata": {"name": "tortoise-monitor-app", "namespace": "default"},
            "spec": {"updatePolicy": {"updateMode": "Off"}},
            "status": {
                "conditions": [{"type": "RecommendationProvided", "status": "True"}],
                "recommendation": {"containerRecommendations": [
                    {"containerName": "app", "target": {"cpu": "100m", "memory": "100Mi"}}
                ]}
            }
        }));

        assert!(vpa.has_true_condition(CONDITION_RECOMMENDATION_PROVIDED));
        let recs = vpa.container_recommendations();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].target_for(ResourceName::Cpu), Some("100m"));
        assert_eq!(
            vpa.spec.update_policy.and_then(|p| p.update_mode),
            Some(UpdateMode::Off)
        );
    }

    #[test]
    fn false_condition_is_not_true() {
        let vpa = vpa_from(serde_json::json!({
            "apiVersion": "autoscaling.k8s.io/v1",
            "kind": "VerticalPodAutoscaler",
            "metadata": {"name": "v"},
            "spec": {},
            "status": {"conditions": [{"type": "RecommendationProvided", "status": "False"}]}
        }));
        assert!(!vpa.has_true_condition(CONDITION_RECOMMENDATION_PROVIDED));
    }

    #[test]
    fn newer_update_mode_still_parses() {
        let vpa = vpa_from(serde_json::json!({
            "apiVersion": "autoscaling.k8s.io/v1",
            "kind": "VerticalPodAutoscaler",
            "metadata": {"name": "tortoise-updater-app"},
            "spec": {"updatePolicy": {"updateMode": "InPlaceOrRecreate"}}
        }));
        assert_eq!(
            vpa.spec.update_policy.and_then(|p| p.update_mode),
            Some(UpdateMode::Unknown)
        );
    }

    #[test]
    fn missing_status_yields_no_recommendations() {
        let vpa = VerticalPodAutoscaler::new("v", VerticalPodAutoscalerSpec::default());
        assert!(vpa.container_recommendations().is_empty());
        assert!(!vpa.has_true_condition(CONDITION_RECOMMENDATION_PROVIDED));
        assert!(!vpa.has_true_annotation("anything"));
    }
}
