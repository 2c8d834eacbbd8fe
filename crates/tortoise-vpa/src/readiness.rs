//! Readiness of a monitor VPA's recommendation
//!
//! A monitor VPA is ready when the recommender says it has produced a
//! recommendation, every recommended target is non-zero, and the set of
//! recommended containers is exactly the set of containers the Tortoise
//! autoscales.

use std::collections::BTreeSet;

use tortoise_common::crd::{
    quantity_is_zero, ResourceName, Tortoise, VerticalPodAutoscaler,
    CONDITION_RECOMMENDATION_PROVIDED,
};
use tracing::debug;

/// Whether the monitor VPA's recommendation can be trusted for this Tortoise
pub fn is_monitor_vpa_ready(vpa: &VerticalPodAutoscaler, tortoise: &Tortoise) -> bool {
    if !vpa.has_true_condition(CONDITION_RECOMMENDATION_PROVIDED) {
        return false;
    }

    let in_tortoise: BTreeSet<&str> = tortoise
        .status
        .iter()
        .flat_map(|s| s.autoscaling_policy.iter())
        .map(|p| p.container_name.as_str())
        .collect();

    let mut in_vpa = BTreeSet::new();
    for rec in vpa.container_recommendations() {
        if quantity_is_zero(rec.target_for(ResourceName::Cpu))
            || quantity_is_zero(rec.target_for(ResourceName::Memory))
        {
            debug!(
                vpa = vpa.metadata.name.as_deref().unwrap_or_default(),
                container = %rec.container_name,
                "recommendation has a zero target"
            );
            return false;
        }
        in_vpa.insert(rec.container_name.as_str());
    }

    in_tortoise == in_vpa
}
