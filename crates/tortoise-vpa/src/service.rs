//! VPA lifecycle orchestration
//!
//! `VpaService` creates, inspects, disables and deletes the monitor and
//! updater VPAs owned by a Tortoise. It performs all I/O through a
//! [`VpaClient`] and leaves the decision of when to call each operation to
//! the Tortoise reconciler.
//!
//! Every write to an existing VPA runs under [`retry_on_conflict`] as a whole
//! read-modify-write unit, so a conflicting writer forces a fresh read before
//! the mutation is reapplied.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, warn};

use tortoise_common::crd::{
    CrossVersionObjectReference, DeletionPolicy, PodResourcePolicy, PodUpdatePolicy,
    TargetStatusVerticalPodAutoscaler, Tortoise, UpdateMode, VerticalPodAutoscaler,
    VerticalPodAutoscalerRole, VerticalPodAutoscalerSpec, VpaContainerResourcePolicy,
};
use tortoise_common::events::{actions, reasons, vpa_created_note, EventPublisher};
use tortoise_common::metrics::{self, OperationResult};
use tortoise_common::retry::retry_on_conflict;
use tortoise_common::{Error, Result, MANAGED_BY_TORTOISE_ANNOTATION, TORTOISE_NAME_ANNOTATION};

use crate::client::VpaClient;
use crate::config::VpaServiceConfig;
use crate::naming::{role_from_name, vpa_name};
use crate::readiness::is_monitor_vpa_ready;

/// Kind written into the target reference of every created VPA
const TARGET_KIND: &str = "Deployment";
/// API version written into the target reference of every created VPA
const TARGET_API_VERSION: &str = "apps/v1";

/// Orchestrates the VPAs owned by Tortoises
pub struct VpaService {
    client: Arc<dyn VpaClient>,
    events: Arc<dyn EventPublisher>,
    config: VpaServiceConfig,
}

impl VpaService {
    /// Create a service over the given store client and event sink
    pub fn new(
        client: Arc<dyn VpaClient>,
        events: Arc<dyn EventPublisher>,
        config: VpaServiceConfig,
    ) -> Self {
        Self {
            client,
            events,
            config,
        }
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Create the observe-only monitor VPA for a Tortoise.
    ///
    /// The VPA is recorded in the Tortoise's status before the create call is
    /// issued, so `tortoise` keeps that entry even when this returns an error.
    /// Persisting it is left to the caller.
    pub async fn create_monitor_vpa(
        &self,
        tortoise: &mut Tortoise,
    ) -> Result<VerticalPodAutoscaler> {
        self.create_vpa(tortoise, VerticalPodAutoscalerRole::Monitor)
            .await
    }

    /// Create the updater VPA for a Tortoise.
    ///
    /// Same contract as [`VpaService::create_monitor_vpa`], with recommendations
    /// applied when pods are created.
    pub async fn create_updater_vpa(
        &self,
        tortoise: &mut Tortoise,
    ) -> Result<VerticalPodAutoscaler> {
        self.create_vpa(tortoise, VerticalPodAutoscalerRole::Updater)
            .await
    }

    async fn create_vpa(
        &self,
        tortoise: &mut Tortoise,
        role: VerticalPodAutoscalerRole,
    ) -> Result<VerticalPodAutoscaler> {
        let desired = desired_vpa(tortoise, role);
        let name = desired.name_any();

        tortoise
            .status_mut()
            .targets
            .vertical_pod_autoscalers
            .push(TargetStatusVerticalPodAutoscaler {
                name: name.clone(),
                role,
            });

        let created = match self.client.create(&desired).await {
            Ok(vpa) => vpa,
            Err(e) => {
                warn!(
                    tortoise = %tortoise.name_any(),
                    vpa = %name,
                    role = %role,
                    error = %e,
                    "failed to create VPA"
                );
                metrics::record_vpa_operation("create", role.as_str(), OperationResult::Error);
                return Err(e);
            }
        };

        let namespace = created.namespace().unwrap_or_default();
        info!(
            tortoise = %tortoise.name_any(),
            namespace = %namespace,
            vpa = %created.name_any(),
            role = %role,
            "created VPA"
        );
        metrics::record_vpa_operation("create", role.as_str(), OperationResult::Success);

        self.events
            .publish(
                &tortoise.object_ref(&()),
                EventType::Normal,
                reasons::VPA_CREATED,
                actions::CREATE,
                Some(vpa_created_note(role, &namespace, &created.name_any())),
            )
            .await;

        Ok(created)
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Fetch the monitor VPA and whether its recommendation is ready to use.
    ///
    /// A missing VPA is an error, not an unready one.
    pub async fn get_monitor_vpa(
        &self,
        tortoise: &Tortoise,
    ) -> Result<(VerticalPodAutoscaler, bool)> {
        let vpa = self
            .get_vpa(tortoise, VerticalPodAutoscalerRole::Monitor)
            .await
            .map_err(|e| Error::operation("get monitor VPA", e))?;

        let ready = is_monitor_vpa_ready(&vpa, tortoise);
        metrics::set_monitor_vpa_ready(
            &format!(
                "{}/{}",
                tortoise.namespace().unwrap_or_default(),
                tortoise.name_any()
            ),
            ready,
        );
        debug!(tortoise = %tortoise.name_any(), ready, "evaluated monitor VPA readiness");

        Ok((vpa, ready))
    }

    /// Fetch the updater VPA. A missing VPA is an error.
    pub async fn get_updater_vpa(&self, tortoise: &Tortoise) -> Result<VerticalPodAutoscaler> {
        self.get_vpa(tortoise, VerticalPodAutoscalerRole::Updater)
            .await
            .map_err(|e| Error::operation("get updater VPA", e))
    }

    async fn get_vpa(
        &self,
        tortoise: &Tortoise,
        role: VerticalPodAutoscalerRole,
    ) -> Result<VerticalPodAutoscaler> {
        let namespace = tortoise.namespace().unwrap_or_default();
        self.client
            .get(&namespace, &vpa_name(role, &tortoise.name_any()))
            .await
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Drop the updater VPA's recommendation without deleting the VPA.
    ///
    /// Consumers of the recommendation see none rather than a stale one.
    /// An updater VPA that no longer exists is already disabled.
    pub async fn disable_updater_vpa(&self, tortoise: &Tortoise) -> Result<()> {
        let namespace = tortoise.namespace().unwrap_or_default();
        let name = vpa_name(VerticalPodAutoscalerRole::Updater, &tortoise.name_any());
        let (ns, nm) = (namespace.as_str(), name.as_str());

        let result = retry_on_conflict(
            &self.config.conflict_retry,
            "disable updater VPA",
            move || self.clear_recommendation(ns, nm),
        )
        .await;

        match result {
            Ok(true) => {
                info!(namespace = %namespace, vpa = %name, "disabled updater VPA");
                metrics::record_vpa_operation("disable", "updater", OperationResult::Success);
                Ok(())
            }
            Ok(false) => {
                metrics::record_vpa_operation("disable", "updater", OperationResult::Skipped);
                Ok(())
            }
            Err(e) => {
                metrics::record_vpa_operation("disable", "updater", OperationResult::Error);
                Err(Error::operation("update VPA status", e))
            }
        }
    }

    /// One read-modify-write pass of [`VpaService::disable_updater_vpa`].
    ///
    /// Returns false when there was nothing to disable or the VPA is not ours.
    async fn clear_recommendation(&self, namespace: &str, name: &str) -> Result<bool> {
        let mut current = match self.client.get(namespace, name).await {
            Ok(vpa) => vpa,
            Err(e) if e.is_not_found() => {
                debug!(namespace, vpa = name, "updater VPA not found, nothing to disable");
                return Ok(false);
            }
            Err(e) => return Err(Error::operation("get tortoise VPA", e)),
        };

        if !current.has_true_annotation(MANAGED_BY_TORTOISE_ANNOTATION) {
            warn!(
                namespace,
                vpa = name,
                "VPA is not managed by tortoise, leaving its recommendation in place"
            );
            return Ok(false);
        }

        current
            .status
            .get_or_insert_with(Default::default)
            .recommendation
            .get_or_insert_with(Default::default)
            .container_recommendations
            .clear();

        // On clusters whose VPA CRD predates the status subresource this
        // write carries the status as well.
        let mut updated = self.client.update(&current).await?;
        updated.status = current.status;

        match self.client.update_status(&updated).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => {
                debug!(namespace, vpa = name, "VPA has no status subresource");
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Rewrite a VPA's per-container minimums from the Tortoise's resource policy.
    ///
    /// Unlike creation, containers without a declared minimum keep an entry
    /// with no `minAllowed`. The first attempt writes over `vpa` as given;
    /// attempts after a conflict start from a fresh read.
    pub async fn update_container_resource_policy(
        &self,
        tortoise: &Tortoise,
        vpa: VerticalPodAutoscaler,
    ) -> Result<VerticalPodAutoscaler> {
        let policy = PodResourcePolicy {
            container_policies: tortoise
                .spec
                .resource_policy
                .iter()
                .map(|p| VpaContainerResourcePolicy {
                    container_name: p.container_name.clone(),
                    min_allowed: p.min_allocated_resources.clone(),
                })
                .collect(),
        };

        let namespace = vpa.namespace().unwrap_or_default();
        let name = vpa.name_any();
        let role = role_from_name(&name).map_or("unmanaged", |r| r.as_str());
        let first = AtomicBool::new(true);
        let (ns, nm) = (namespace.as_str(), name.as_str());
        let (given, first, policy) = (&vpa, &first, &policy);

        let result = retry_on_conflict(
            &self.config.conflict_retry,
            "update VPA container resource policy",
            move || async move {
                let mut current = if first.swap(false, Ordering::SeqCst) {
                    given.clone()
                } else {
                    self.client.get(ns, nm).await?
                };
                current.spec.resource_policy = Some(policy.clone());
                self.client.update(&current).await
            },
        )
        .await;

        match result {
            Ok(updated) => {
                debug!(namespace = %namespace, vpa = %name, "updated VPA container resource policy");
                metrics::record_vpa_operation("set_policy", role, OperationResult::Success);
                Ok(updated)
            }
            Err(e) => {
                metrics::record_vpa_operation("set_policy", role, OperationResult::Error);
                Err(Error::operation("update VPA container resource policy", e))
            }
        }
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete the monitor VPA, honouring the deletion policy and ownership
    pub async fn delete_monitor_vpa(&self, tortoise: &Tortoise) -> Result<()> {
        self.delete_vpa(tortoise, VerticalPodAutoscalerRole::Monitor)
            .await
    }

    /// Delete the updater VPA, honouring the deletion policy and ownership
    pub async fn delete_updater_vpa(&self, tortoise: &Tortoise) -> Result<()> {
        self.delete_vpa(tortoise, VerticalPodAutoscalerRole::Updater)
            .await
    }

    async fn delete_vpa(&self, tortoise: &Tortoise, role: VerticalPodAutoscalerRole) -> Result<()> {
        if tortoise.spec.deletion_policy == DeletionPolicy::NoDelete {
            debug!(tortoise = %tortoise.name_any(), role = %role, "deletion policy keeps VPA");
            metrics::record_vpa_operation("delete", role.as_str(), OperationResult::Skipped);
            return Ok(());
        }

        let vpa = match self.get_vpa(tortoise, role).await {
            Ok(vpa) => vpa,
            Err(e) if e.is_not_found() => {
                debug!(tortoise = %tortoise.name_any(), role = %role, "VPA already deleted");
                metrics::record_vpa_operation("delete", role.as_str(), OperationResult::Skipped);
                return Ok(());
            }
            Err(e) => {
                metrics::record_vpa_operation("delete", role.as_str(), OperationResult::Error);
                return Err(Error::operation("get VPA", e));
            }
        };

        if !vpa.has_true_annotation(MANAGED_BY_TORTOISE_ANNOTATION) {
            warn!(
                tortoise = %tortoise.name_any(),
                vpa = %vpa.name_any(),
                "VPA is not managed by tortoise, leaving it in place"
            );
            metrics::record_vpa_operation("delete", role.as_str(), OperationResult::Skipped);
            return Ok(());
        }

        let namespace = vpa.namespace().unwrap_or_default();
        match self.client.delete(&namespace, &vpa.name_any()).await {
            Ok(()) => {
                info!(namespace = %namespace, vpa = %vpa.name_any(), role = %role, "deleted VPA");
                metrics::record_vpa_operation("delete", role.as_str(), OperationResult::Success);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                metrics::record_vpa_operation("delete", role.as_str(), OperationResult::Skipped);
                Ok(())
            }
            Err(e) => {
                metrics::record_vpa_operation("delete", role.as_str(), OperationResult::Error);
                Err(Error::operation("delete VPA", e))
            }
        }
    }
}

/// The VPA a Tortoise should own for `role`, before it is stored.
///
/// Containers without a declared minimum are left out of the resource policy.
fn desired_vpa(tortoise: &Tortoise, role: VerticalPodAutoscalerRole) -> VerticalPodAutoscaler {
    let tortoise_name = tortoise.name_any();
    let update_mode = match role {
        VerticalPodAutoscalerRole::Monitor => UpdateMode::Off,
        VerticalPodAutoscalerRole::Updater => UpdateMode::Initial,
    };

    let container_policies = tortoise
        .spec
        .resource_policy
        .iter()
        .filter_map(|p| {
            p.min_allocated_resources
                .as_ref()
                .map(|min| VpaContainerResourcePolicy {
                    container_name: p.container_name.clone(),
                    min_allowed: Some(min.clone()),
                })
        })
        .collect();

    VerticalPodAutoscaler {
        metadata: ObjectMeta {
            name: Some(vpa_name(role, &tortoise_name)),
            namespace: tortoise.namespace(),
            annotations: Some(BTreeMap::from([
                (MANAGED_BY_TORTOISE_ANNOTATION.to_string(), "true".to_string()),
                (TORTOISE_NAME_ANNOTATION.to_string(), tortoise_name),
            ])),
            ..Default::default()
        },
        spec: VerticalPodAutoscalerSpec {
            target_ref: Some(CrossVersionObjectReference {
                kind: TARGET_KIND.to_string(),
                name: tortoise.spec.target_refs.scale_target_ref.name.clone(),
                api_version: Some(TARGET_API_VERSION.to_string()),
            }),
            update_policy: Some(PodUpdatePolicy {
                update_mode: Some(update_mode),
            }),
            resource_policy: Some(PodResourcePolicy { container_policies }),
        },
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockVpaClient;
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::ObjectReference;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use std::time::Duration;
    use tortoise_common::crd::{
        ConditionStatus, ContainerAutoscalingPolicy, ContainerResourcePolicy,
        RecommendedContainerResources,
        RecommendedPodResources, ResourceList, TargetRefs, TortoiseSpec,
        VerticalPodAutoscalerCondition, VerticalPodAutoscalerStatus,
        CONDITION_RECOMMENDATION_PROVIDED,
    };
    use tortoise_common::events::NoopEventPublisher;
    use tortoise_common::retry::RetryConfig;

    // =========================================================================
    // Fixtures
    // =========================================================================

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} error", reason),
            reason: reason.to_string(),
            code,
        })
    }

    fn not_found(name: &str) -> Error {
        Error::api("get", "default", name, api_error(404, "NotFound"))
    }

    fn conflict(name: &str) -> Error {
        Error::api("update", "default", name, api_error(409, "Conflict"))
    }

    fn min(cpu: &str, memory: &str) -> ResourceList {
        BTreeMap::from([
            ("cpu".to_string(), cpu.to_string()),
            ("memory".to_string(), memory.to_string()),
        ])
    }

    fn sample_tortoise() -> Tortoise {
        let mut tortoise = Tortoise::new(
            "app",
            TortoiseSpec {
                target_refs: TargetRefs {
                    scale_target_ref: CrossVersionObjectReference {
                        kind: "Deployment".to_string(),
                        name: "app-deployment".to_string(),
                        api_version: Some("apps/v1".to_string()),
                    },
                },
                resource_policy: vec![
                    ContainerResourcePolicy {
                        container_name: "app".to_string(),
                        min_allocated_resources: Some(min("100m", "128Mi")),
                    },
                    ContainerResourcePolicy {
                        container_name: "sidecar".to_string(),
                        min_allocated_resources: None,
                    },
                ],
                deletion_policy: DeletionPolicy::DeleteAll,
            },
        );
        tortoise.metadata.namespace = Some("default".to_string());
        tortoise
    }

    fn stored_vpa(name: &str, managed: bool) -> VerticalPodAutoscaler {
        let mut vpa = VerticalPodAutoscaler::new(name, VerticalPodAutoscalerSpec::default());
        vpa.metadata.namespace = Some("default".to_string());
        vpa.metadata.resource_version = Some("1".to_string());
        if managed {
            vpa.metadata.annotations = Some(BTreeMap::from([(
                MANAGED_BY_TORTOISE_ANNOTATION.to_string(),
                "true".to_string(),
            )]));
        }
        vpa.status = Some(VerticalPodAutoscalerStatus {
            recommendation: Some(RecommendedPodResources {
                container_recommendations: vec![RecommendedContainerResources {
                    container_name: "app".to_string(),
                    target: min("120m", "200Mi"),
                    ..Default::default()
                }],
            }),
            conditions: vec![VerticalPodAutoscalerCondition {
                type_: CONDITION_RECOMMENDATION_PROVIDED.to_string(),
                status: ConditionStatus::True,
                ..Default::default()
            }],
        });
        vpa
    }

    fn fast_config(attempts: u32) -> VpaServiceConfig {
        VpaServiceConfig {
            conflict_retry: RetryConfig {
                max_attempts: attempts,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                backoff_multiplier: 2.0,
            },
            ..Default::default()
        }
    }

    fn service(mock: MockVpaClient) -> VpaService {
        VpaService::new(Arc::new(mock), Arc::new(NoopEventPublisher), fast_config(5))
    }

    /// Publisher that remembers every event note it was handed
    #[derive(Default)]
    struct RecordingPublisher {
        notes: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(
            &self,
            _resource_ref: &ObjectReference,
            _type_: EventType,
            reason: &str,
            _action: &str,
            note: Option<String>,
        ) {
            self.notes
                .lock()
                .unwrap()
                .push((reason.to_string(), note));
        }
    }

    // =========================================================================
    // Create
    // =========================================================================

    #[tokio::test]
    async fn create_monitor_builds_observe_only_vpa_and_records_target() {
        let mut mock = MockVpaClient::new();
        mock.expect_create()
            .times(1)
            .returning(|vpa| Ok(vpa.clone()));

        let events = Arc::new(RecordingPublisher::default());
        let svc = VpaService::new(Arc::new(mock), events.clone(), fast_config(5));
        let mut tortoise = sample_tortoise();

        let vpa = svc.create_monitor_vpa(&mut tortoise).await.unwrap();

        assert_eq!(vpa.name_any(), "tortoise-monitor-app");
        assert!(vpa.has_true_annotation(MANAGED_BY_TORTOISE_ANNOTATION));
        assert_eq!(
            vpa.annotations().get(TORTOISE_NAME_ANNOTATION).map(String::as_str),
            Some("app")
        );
        assert_eq!(
            vpa.spec.update_policy.as_ref().and_then(|p| p.update_mode),
            Some(UpdateMode::Off)
        );
        let target = vpa.spec.target_ref.as_ref().unwrap();
        assert_eq!(target.kind, "Deployment");
        assert_eq!(target.name, "app-deployment");
        assert_eq!(target.api_version.as_deref(), Some("apps/v1"));

        // sidecar has no declared minimum and is left out
        let policies = &vpa.spec.resource_policy.as_ref().unwrap().container_policies;
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].container_name, "app");
        assert_eq!(policies[0].min_allowed, Some(min("100m", "128Mi")));

        let targets = &tortoise.status.as_ref().unwrap().targets.vertical_pod_autoscalers;
        assert_eq!(
            targets,
            &vec![TargetStatusVerticalPodAutoscaler {
                name: "tortoise-monitor-app".to_string(),
                role: VerticalPodAutoscalerRole::Monitor,
            }]
        );

        let notes = events.notes.lock().unwrap();
        assert_eq!(
            *notes,
            vec![(
                reasons::VPA_CREATED.to_string(),
                Some("Initialized a monitor VPA default/tortoise-monitor-app".to_string())
            )]
        );
    }

    #[tokio::test]
    async fn create_updater_uses_initial_mode_and_updater_role() {
        let mut mock = MockVpaClient::new();
        mock.expect_create()
            .times(1)
            .returning(|vpa| Ok(vpa.clone()));

        let events = Arc::new(RecordingPublisher::default());
        let svc = VpaService::new(Arc::new(mock), events.clone(), fast_config(5));
        let mut tortoise = sample_tortoise();

        let vpa = svc.create_updater_vpa(&mut tortoise).await.unwrap();

        assert_eq!(vpa.name_any(), "tortoise-updater-app");
        assert_eq!(
            vpa.spec.update_policy.as_ref().and_then(|p| p.update_mode),
            Some(UpdateMode::Initial)
        );
        assert_eq!(
            tortoise.status.as_ref().unwrap().targets.vertical_pod_autoscalers[0].role,
            VerticalPodAutoscalerRole::Updater
        );
        assert_eq!(
            events.notes.lock().unwrap()[0].1.as_deref(),
            Some("Initialized an updater VPA default/tortoise-updater-app")
        );
    }

    /// Story: a failed create still leaves the status entry for the caller to persist
    #[tokio::test]
    async fn story_create_failure_keeps_partial_progress() {
        let mut mock = MockVpaClient::new();
        mock.expect_create().times(1).returning(|_| {
            Err(Error::api(
                "create",
                "default",
                "tortoise-monitor-app",
                api_error(500, "InternalError"),
            ))
        });

        let events = Arc::new(RecordingPublisher::default());
        let svc = VpaService::new(Arc::new(mock), events.clone(), fast_config(5));
        let mut tortoise = sample_tortoise();

        let err = svc.create_monitor_vpa(&mut tortoise).await.unwrap_err();

        assert_eq!(err.status_code(), Some(500));
        assert_eq!(
            tortoise.status.as_ref().unwrap().targets.vertical_pod_autoscalers.len(),
            1
        );
        assert!(events.notes.lock().unwrap().is_empty());
    }

    // =========================================================================
    // Read
    // =========================================================================

    #[tokio::test]
    async fn get_monitor_reports_readiness() {
        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .withf(|ns, name| ns == "default" && name == "tortoise-monitor-app")
            .times(1)
            .returning(|_, name| Ok(stored_vpa(name, true)));

        let mut tortoise = sample_tortoise();
        tortoise.status_mut().autoscaling_policy = vec![ContainerAutoscalingPolicy {
            container_name: "app".to_string(),
            ..Default::default()
        }];

        let (vpa, ready) = service(mock).get_monitor_vpa(&tortoise).await.unwrap();
        assert_eq!(vpa.name_any(), "tortoise-monitor-app");
        assert!(ready);
    }

    #[tokio::test]
    async fn get_monitor_surfaces_not_found_as_error() {
        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .times(1)
            .returning(|_, name| Err(not_found(name)));

        let err = service(mock)
            .get_monitor_vpa(&sample_tortoise())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn get_updater_surfaces_not_found_as_error() {
        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .withf(|_, name| name == "tortoise-updater-app")
            .times(1)
            .returning(|_, name| Err(not_found(name)));

        let err = service(mock)
            .get_updater_vpa(&sample_tortoise())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("get updater VPA: "));
    }

    // =========================================================================
    // Disable
    // =========================================================================

    #[tokio::test]
    async fn disable_updater_clears_recommendation_and_writes_status() {
        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .withf(|_, name| name == "tortoise-updater-app")
            .times(1)
            .returning(|_, name| Ok(stored_vpa(name, true)));
        mock.expect_update().times(1).returning(|vpa| {
            let mut stored = vpa.clone();
            stored.metadata.resource_version = Some("2".to_string());
            stored.status = None;
            Ok(stored)
        });
        mock.expect_update_status()
            .withf(|vpa| {
                vpa.metadata.resource_version.as_deref() == Some("2")
                    && vpa.container_recommendations().is_empty()
                    && vpa.has_true_condition(CONDITION_RECOMMENDATION_PROVIDED)
            })
            .times(1)
            .returning(|vpa| Ok(vpa.clone()));

        service(mock)
            .disable_updater_vpa(&sample_tortoise())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn disable_updater_on_missing_vpa_is_a_no_op() {
        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .times(1)
            .returning(|_, name| Err(not_found(name)));
        mock.expect_update().never();
        mock.expect_update_status().never();

        service(mock)
            .disable_updater_vpa(&sample_tortoise())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn disable_updater_tolerates_missing_status_subresource() {
        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .times(1)
            .returning(|_, name| Ok(stored_vpa(name, true)));
        mock.expect_update()
            .times(1)
            .returning(|vpa| Ok(vpa.clone()));
        mock.expect_update_status()
            .times(1)
            .returning(|vpa| Err(not_found(&vpa.name_any())));

        service(mock)
            .disable_updater_vpa(&sample_tortoise())
            .await
            .unwrap();
    }

    /// Story: a conflicting writer forces a fresh read before the retry
    #[tokio::test]
    async fn story_disable_updater_refetches_after_conflict() {
        let gets = Arc::new(AtomicU32::new(0));
        let updates = Arc::new(AtomicU32::new(0));

        let mut mock = MockVpaClient::new();
        let g = gets.clone();
        mock.expect_get().times(2).returning(move |_, name| {
            g.fetch_add(1, Ordering::SeqCst);
            Ok(stored_vpa(name, true))
        });
        let u = updates.clone();
        mock.expect_update().times(2).returning(move |vpa| {
            if u.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(conflict(&vpa.name_any()))
            } else {
                Ok(vpa.clone())
            }
        });
        mock.expect_update_status()
            .times(1)
            .returning(|vpa| Ok(vpa.clone()));

        service(mock)
            .disable_updater_vpa(&sample_tortoise())
            .await
            .unwrap();

        assert_eq!(gets.load(Ordering::SeqCst), 2);
        assert_eq!(updates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disable_updater_fails_once_conflict_budget_is_spent() {
        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .times(3)
            .returning(|_, name| Ok(stored_vpa(name, true)));
        mock.expect_update()
            .times(3)
            .returning(|vpa| Err(conflict(&vpa.name_any())));
        mock.expect_update_status().never();

        let svc = VpaService::new(Arc::new(mock), Arc::new(NoopEventPublisher), fast_config(3));
        let err = svc
            .disable_updater_vpa(&sample_tortoise())
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert!(err.to_string().starts_with("update VPA status: "));
    }

    #[tokio::test]
    async fn disable_updater_does_not_retry_other_errors() {
        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .times(1)
            .returning(|_, name| Ok(stored_vpa(name, true)));
        mock.expect_update().times(1).returning(|vpa| {
            Err(Error::api(
                "update",
                "default",
                vpa.name_any(),
                api_error(403, "Forbidden"),
            ))
        });

        let err = service(mock)
            .disable_updater_vpa(&sample_tortoise())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(403));
    }

    #[tokio::test]
    async fn disable_updater_leaves_unmanaged_vpa_in_place() {
        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .times(1)
            .returning(|_, name| Ok(stored_vpa(name, false)));
        mock.expect_update().never();
        mock.expect_update_status().never();

        service(mock)
            .disable_updater_vpa(&sample_tortoise())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn disable_updater_fills_in_missing_status_before_clearing() {
        let mut mock = MockVpaClient::new();
        mock.expect_get().times(1).returning(|_, name| {
            let mut vpa = stored_vpa(name, true);
            vpa.status = None;
            Ok(vpa)
        });
        mock.expect_update()
            .times(1)
            .returning(|vpa| Ok(vpa.clone()));
        mock.expect_update_status()
            .withf(|vpa| {
                vpa.status
                    .as_ref()
                    .and_then(|s| s.recommendation.as_ref())
                    .is_some_and(|r| r.container_recommendations.is_empty())
            })
            .times(1)
            .returning(|vpa| Ok(vpa.clone()));

        service(mock)
            .disable_updater_vpa(&sample_tortoise())
            .await
            .unwrap();
    }

    /// Story: a conflict on the status write reruns the whole unit from a fresh read
    #[tokio::test]
    async fn story_status_conflict_reruns_from_fresh_read() {
        let status_writes = Arc::new(AtomicU32::new(0));

        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .times(2)
            .returning(|_, name| Ok(stored_vpa(name, true)));
        mock.expect_update()
            .times(2)
            .returning(|vpa| Ok(vpa.clone()));
        let w = status_writes.clone();
        mock.expect_update_status().times(2).returning(move |vpa| {
            if w.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(conflict(&vpa.name_any()))
            } else {
                Ok(vpa.clone())
            }
        });

        service(mock)
            .disable_updater_vpa(&sample_tortoise())
            .await
            .unwrap();

        assert_eq!(status_writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disable_updater_wraps_fetch_failure_without_retrying() {
        let mut mock = MockVpaClient::new();
        mock.expect_get().times(1).returning(|_, name| {
            Err(Error::api(
                "get",
                "default",
                name,
                api_error(503, "ServiceUnavailable"),
            ))
        });
        mock.expect_update().never();

        let err = service(mock)
            .disable_updater_vpa(&sample_tortoise())
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(503));
        assert!(err
            .to_string()
            .starts_with("update VPA status: get tortoise VPA: "));
    }

    #[tokio::test]
    async fn zero_conflict_budget_gives_up_after_one_attempt() {
        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .times(1)
            .returning(|_, name| Ok(stored_vpa(name, true)));
        mock.expect_update()
            .times(1)
            .returning(|vpa| Err(conflict(&vpa.name_any())));

        let svc = VpaService::new(
            Arc::new(mock),
            Arc::new(NoopEventPublisher),
            VpaServiceConfig::default().with_conflict_attempts(0),
        );
        let err = tokio::time::timeout(
            Duration::from_secs(2),
            svc.disable_updater_vpa(&sample_tortoise()),
        )
        .await
        .expect("conflict budget must be bounded")
        .unwrap_err();

        assert!(err.is_conflict());
    }

    // =========================================================================
    // Set policy
    // =========================================================================

    #[tokio::test]
    async fn set_policy_keeps_containers_without_minimum() {
        let mut mock = MockVpaClient::new();
        mock.expect_get().never();
        mock.expect_update()
            .times(1)
            .returning(|vpa| Ok(vpa.clone()));

        let vpa = stored_vpa("tortoise-monitor-app", true);
        let updated = service(mock)
            .update_container_resource_policy(&sample_tortoise(), vpa)
            .await
            .unwrap();

        let policies = &updated.spec.resource_policy.unwrap().container_policies;
        assert_eq!(
            policies,
            &vec![
                VpaContainerResourcePolicy {
                    container_name: "app".to_string(),
                    min_allowed: Some(min("100m", "128Mi")),
                },
                VpaContainerResourcePolicy {
                    container_name: "sidecar".to_string(),
                    min_allowed: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn set_policy_refetches_and_reapplies_after_conflict() {
        let updates = Arc::new(AtomicU32::new(0));

        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .times(1)
            .returning(|_, name| {
                let mut fresh = stored_vpa(name, true);
                fresh.metadata.resource_version = Some("7".to_string());
                Ok(fresh)
            });
        let u = updates.clone();
        mock.expect_update().times(2).returning(move |vpa| {
            if u.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(conflict(&vpa.name_any()))
            } else {
                Ok(vpa.clone())
            }
        });

        let updated = service(mock)
            .update_container_resource_policy(
                &sample_tortoise(),
                stored_vpa("tortoise-monitor-app", true),
            )
            .await
            .unwrap();

        assert_eq!(updated.metadata.resource_version.as_deref(), Some("7"));
        assert_eq!(
            updated.spec.resource_policy.unwrap().container_policies.len(),
            2
        );
    }

    // =========================================================================
    // Delete
    // =========================================================================

    #[tokio::test]
    async fn delete_removes_managed_vpa() {
        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .times(1)
            .returning(|_, name| Ok(stored_vpa(name, true)));
        mock.expect_delete()
            .withf(|ns, name| ns == "default" && name == "tortoise-monitor-app")
            .times(1)
            .returning(|_, _| Ok(()));

        service(mock)
            .delete_monitor_vpa(&sample_tortoise())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_of_absent_vpa_succeeds() {
        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .times(1)
            .returning(|_, name| Err(not_found(name)));
        mock.expect_delete().never();

        service(mock)
            .delete_updater_vpa(&sample_tortoise())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_leaves_unmanaged_vpa_in_place() {
        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .times(1)
            .returning(|_, name| Ok(stored_vpa(name, false)));
        mock.expect_delete().never();

        service(mock)
            .delete_monitor_vpa(&sample_tortoise())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_leaves_vpa_with_false_marker_in_place() {
        let mut mock = MockVpaClient::new();
        mock.expect_get().times(1).returning(|_, name| {
            let mut vpa = stored_vpa(name, true);
            vpa.annotations_mut()
                .insert(MANAGED_BY_TORTOISE_ANNOTATION.to_string(), "false".to_string());
            Ok(vpa)
        });
        mock.expect_delete().never();

        service(mock)
            .delete_updater_vpa(&sample_tortoise())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn no_delete_policy_skips_every_call() {
        let mut mock = MockVpaClient::new();
        mock.expect_get().never();
        mock.expect_delete().never();

        let mut tortoise = sample_tortoise();
        tortoise.spec.deletion_policy = DeletionPolicy::NoDelete;

        let svc = service(mock);
        svc.delete_monitor_vpa(&tortoise).await.unwrap();
        svc.delete_updater_vpa(&tortoise).await.unwrap();
    }

    #[tokio::test]
    async fn delete_race_with_not_found_succeeds() {
        let mut mock = MockVpaClient::new();
        mock.expect_get()
            .times(1)
            .returning(|_, name| Ok(stored_vpa(name, true)));
        mock.expect_delete()
            .times(1)
            .returning(|_, name| Err(not_found(name)));

        service(mock)
            .delete_monitor_vpa(&sample_tortoise())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_propagates_transport_errors() {
        let mut mock = MockVpaClient::new();
        mock.expect_get().times(1).returning(|_, name| {
            Err(Error::api("get", "default", name, api_error(503, "ServiceUnavailable")))
        });

        let err = service(mock)
            .delete_monitor_vpa(&sample_tortoise())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(503));
    }
}
