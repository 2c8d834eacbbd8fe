//! Container resource phase tracking
//!
//! Once vertical autoscaling is confirmed active, every (container, resource)
//! pair the Tortoise scales vertically moves to `Working`. Pairs scaled any
//! other way are never touched, and no phase is ever moved backwards here.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tortoise_common::crd::{
    AutoscalingType, ContainerResourcePhase, ContainerResourcePhases, ResourceName, ResourcePhase,
    Tortoise,
};

/// Mark every vertically scaled container resource as `Working` at `now`.
///
/// Containers without a phase entry get a new entry holding just the
/// vertically scaled resources.
pub fn set_all_vertical_container_resource_phase_working(
    tortoise: &mut Tortoise,
    now: DateTime<Utc>,
) {
    let status = tortoise.status_mut();

    let vertical: BTreeSet<(String, ResourceName)> = status
        .autoscaling_policy
        .iter()
        .flat_map(|p| {
            p.policy
                .iter()
                .filter(|(_, ty)| **ty == AutoscalingType::Vertical)
                .map(|(resource, _)| (p.container_name.clone(), *resource))
        })
        .collect();

    for (container, resource) in vertical {
        let working = ResourcePhase::new(ContainerResourcePhase::Working, now);

        match status
            .container_resource_phases
            .iter_mut()
            .find(|p| p.container_name == container)
        {
            Some(phases) => {
                phases.resource_phases.insert(resource, working);
            }
            None => status
                .container_resource_phases
                .push(ContainerResourcePhases {
                    container_name: container,
                    resource_phases: [(resource, working)].into(),
                }),
        }
    }
}
