//! Lifecycle management for the VPAs a Tortoise owns
//!
//! Every Tortoise gets a monitor VPA that only collects recommendations and,
//! once vertical scaling is enabled, an updater VPA whose recommendation is
//! applied to the workload. This crate names, creates, inspects, disables and
//! deletes those VPAs, and decides when their recommendations can be trusted.

pub mod client;
pub mod config;
pub mod naming;
pub mod phase;
pub mod readiness;
pub mod service;

pub use client::{KubeVpaClient, VpaClient};

#[cfg(test)]
pub use client::MockVpaClient;

pub use config::VpaServiceConfig;
pub use naming::{monitor_vpa_name, updater_vpa_name, vpa_name};
pub use phase::set_all_vertical_container_resource_phase_working;
pub use readiness::is_monitor_vpa_ready;
pub use service::VpaService;
