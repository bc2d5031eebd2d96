//! Clients for the Azure DevOps REST APIs used by the resources.
//!
//! Resources never talk HTTP directly. They go through the [`ServiceEndpointApi`]
//! and [`SecurityApi`] traits bundled in an [`AggregatedClient`], which is backed
//! by [`HttpClient`] in production and [`MemoryClient`] in tests.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::error::ProviderError;

mod http;
mod memory;
pub mod models;

pub use http::HttpClient;
pub use memory::{MemoryClient, CONFIDENTIAL_PARAMETERS, IDENTITY_PREFIX};
pub use models::{
    AccessControlEntry, AccessControlList, ActionDefinition, EndpointAuthorization,
    ProjectReference, ServiceEndpoint, ServiceEndpointProjectReference,
};

/// Operations on `_apis/serviceendpoint/endpoints`.
#[async_trait]
pub trait ServiceEndpointApi: Send + Sync {
    /// Create an endpoint and return it as stored by the service.
    async fn create_service_endpoint(
        &self,
        endpoint: &ServiceEndpoint,
    ) -> Result<ServiceEndpoint, ProviderError>;

    /// Fetch an endpoint. Missing endpoints yield [`ProviderError::NotFound`].
    async fn get_service_endpoint(
        &self,
        project_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<ServiceEndpoint, ProviderError>;

    /// List the endpoints of a project carrying the given name.
    async fn find_service_endpoints_by_name(
        &self,
        project_id: Uuid,
        name: &str,
    ) -> Result<Vec<ServiceEndpoint>, ProviderError>;

    /// Replace an endpoint.
    async fn update_service_endpoint(
        &self,
        endpoint_id: Uuid,
        endpoint: &ServiceEndpoint,
    ) -> Result<ServiceEndpoint, ProviderError>;

    /// Delete an endpoint from the given projects.
    async fn delete_service_endpoint(
        &self,
        endpoint_id: Uuid,
        project_ids: &[Uuid],
    ) -> Result<(), ProviderError>;
}

/// Operations on security namespaces, ACLs and identities.
#[async_trait]
pub trait SecurityApi: Send + Sync {
    /// Actions (named permission bits) of a namespace.
    async fn action_definitions(
        &self,
        namespace_id: Uuid,
    ) -> Result<Vec<ActionDefinition>, ProviderError>;

    /// ACLs for a token, restricted to the given identity descriptors.
    async fn access_control_lists(
        &self,
        namespace_id: Uuid,
        token: &str,
        descriptors: &[String],
    ) -> Result<Vec<AccessControlList>, ProviderError>;

    /// Write access control entries for a token.
    async fn set_access_control_entries(
        &self,
        namespace_id: Uuid,
        token: &str,
        entries: &[AccessControlEntry],
        merge: bool,
    ) -> Result<(), ProviderError>;

    /// Resolve a graph subject descriptor (`vssgp.…`, `aad.…`) to the identity
    /// descriptor the security APIs expect.
    async fn identity_descriptor(&self, subject_descriptor: &str) -> Result<String, ProviderError>;
}

/// The set of API clients handed to every resource callback.
#[derive(Clone)]
pub struct AggregatedClient {
    /// Service endpoint API.
    pub service_endpoints: Arc<dyn ServiceEndpointApi>,
    /// Security API.
    pub security: Arc<dyn SecurityApi>,
}

impl AggregatedClient {
    /// Build HTTP clients for the configured organization.
    pub fn connect(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = Arc::new(HttpClient::new(config)?);
        Ok(Self {
            service_endpoints: http.clone(),
            security: http,
        })
    }

    /// Use one in-memory backend for every API.
    pub fn in_memory(memory: Arc<MemoryClient>) -> Self {
        Self {
            service_endpoints: memory.clone(),
            security: memory,
        }
    }
}

impl std::fmt::Debug for AggregatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatedClient").finish_non_exhaustive()
    }
}
