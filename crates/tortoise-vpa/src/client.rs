//! VPA store client
//!
//! Trait-based abstraction over the VerticalPodAutoscaler API so that tests
//! can mock the cluster while production code talks to the API server.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use tortoise_common::crd::VerticalPodAutoscaler;
use tortoise_common::Error;

/// Trait abstracting VPA store operations
///
/// Every error is reported with the operation and the namespace/name it was
/// issued against, so callers can classify NotFound and Conflict without
/// caring about the transport.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VpaClient: Send + Sync {
    /// Fetch a VPA by namespace and name
    async fn get(&self, namespace: &str, name: &str) -> Result<VerticalPodAutoscaler, Error>;

    /// Create a VPA, returning the object as stored
    async fn create(&self, vpa: &VerticalPodAutoscaler) -> Result<VerticalPodAutoscaler, Error>;

    /// Replace a VPA's spec and metadata
    ///
    /// Fails with a conflict when `vpa` carries a stale resourceVersion.
    async fn update(&self, vpa: &VerticalPodAutoscaler) -> Result<VerticalPodAutoscaler, Error>;

    /// Replace a VPA's status subresource
    async fn update_status(
        &self,
        vpa: &VerticalPodAutoscaler,
    ) -> Result<VerticalPodAutoscaler, Error>;

    /// Delete a VPA
    ///
    /// Deleting an object that does not exist succeeds.
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// Real VPA client backed by the Kubernetes API
pub struct KubeVpaClient {
    client: Client,
}

impl KubeVpaClient {
    /// Create a new KubeVpaClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<VerticalPodAutoscaler> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Namespace and name of an object that is about to be written
fn key(vpa: &VerticalPodAutoscaler) -> (String, String) {
    (vpa.namespace().unwrap_or_default(), vpa.name_any())
}

#[async_trait]
impl VpaClient for KubeVpaClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<VerticalPodAutoscaler, Error> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|e| Error::api("get", namespace, name, e))
    }

    async fn create(&self, vpa: &VerticalPodAutoscaler) -> Result<VerticalPodAutoscaler, Error> {
        let (namespace, name) = key(vpa);
        debug!(namespace = %namespace, vpa = %name, "creating VPA");
        self.api(&namespace)
            .create(&PostParams::default(), vpa)
            .await
            .map_err(|e| Error::api("create", &namespace, &name, e))
    }

    async fn update(&self, vpa: &VerticalPodAutoscaler) -> Result<VerticalPodAutoscaler, Error> {
        let (namespace, name) = key(vpa);
        self.api(&namespace)
            .replace(&name, &PostParams::default(), vpa)
            .await
            .map_err(|e| Error::api("update", &namespace, &name, e))
    }

    async fn update_status(
        &self,
        vpa: &VerticalPodAutoscaler,
    ) -> Result<VerticalPodAutoscaler, Error> {
        let (namespace, name) = key(vpa);
        let body = serde_json::to_vec(vpa)
            .map_err(|e| Error::serialization_for_kind("VerticalPodAutoscaler", e.to_string()))?;
        self.api(&namespace)
            .replace_status(&name, &PostParams::default(), body)
            .await
            .map_err(|e| Error::api("update status", &namespace, &name, e))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(namespace, vpa = name, "VPA already deleted");
                Ok(())
            }
            Err(e) => Err(Error::api("delete", namespace, name, e)),
        }
    }
}
