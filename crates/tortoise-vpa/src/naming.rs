//! Names of the VPAs Tortoise manages

use tortoise_common::crd::VerticalPodAutoscalerRole;

/// Prefix of the observe-only VPA created for every Tortoise
pub const MONITOR_VPA_NAME_PREFIX: &str = "tortoise-monitor-";

/// Prefix of the VPA whose recommendation is applied to the workload
pub const UPDATER_VPA_NAME_PREFIX: &str = "tortoise-updater-";

/// Name of the monitor VPA for a Tortoise
pub fn monitor_vpa_name(tortoise_name: &str) -> String {
    format!("{}{}", MONITOR_VPA_NAME_PREFIX, tortoise_name)
}

/// Name of the updater VPA for a Tortoise
pub fn updater_vpa_name(tortoise_name: &str) -> String {
    format!("{}{}", UPDATER_VPA_NAME_PREFIX, tortoise_name)
}

/// Name of the VPA playing `role` for a Tortoise
pub fn vpa_name(role: VerticalPodAutoscalerRole, tortoise_name: &str) -> String {
    match role {
        VerticalPodAutoscalerRole::Monitor => monitor_vpa_name(tortoise_name),
        VerticalPodAutoscalerRole::Updater => updater_vpa_name(tortoise_name),
    }
}

/// Role implied by a VPA's name, if it carries one of the managed prefixes
pub fn role_from_name(vpa_name: &str) -> Option<VerticalPodAutoscalerRole> {
    if vpa_name.starts_with(MONITOR_VPA_NAME_PREFIX) {
        Some(VerticalPodAutoscalerRole::Monitor)
    } else if vpa_name.starts_with(UPDATER_VPA_NAME_PREFIX) {
        Some(VerticalPodAutoscalerRole::Updater)
    } else {
        None
    }
}
