//! Custom Resource Definitions used by Tortoise VPA management
//!
//! `Tortoise` is the parent object; `VerticalPodAutoscaler` is the upstream
//! VPA kind that Tortoise creates and manages.

mod tortoise;
mod types;
mod vpa;

pub use tortoise::{
    AutoscalingType, ContainerAutoscalingPolicy, ContainerResourcePhase, ContainerResourcePhases,
    ContainerResourcePolicy, DeletionPolicy, ResourcePhase, TargetRefs,
    TargetStatusVerticalPodAutoscaler, TargetsStatus, Tortoise, TortoiseSpec, TortoiseStatus,
    VerticalPodAutoscalerRole,
};
pub use types::{
    quantity_is_zero, ConditionStatus, CrossVersionObjectReference, ResourceList, ResourceName,
};
pub use vpa::{
    PodResourcePolicy, PodUpdatePolicy, RecommendedContainerResources, RecommendedPodResources,
    UpdateMode, VerticalPodAutoscaler, VerticalPodAutoscalerCondition, VerticalPodAutoscalerSpec,
    VerticalPodAutoscalerStatus, VpaContainerResourcePolicy, CONDITION_RECOMMENDATION_PROVIDED,
};
