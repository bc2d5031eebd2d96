//! In-memory Azure DevOps backend.
//!
//! Behaves like the real service where the resources depend on it: ids are
//! assigned on create, confidential authorization parameters are never echoed
//! back, unknown endpoints are `NotFound`, and ACL entries merge or replace per
//! descriptor.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use super::models::{AccessControlEntry, AccessControlList, ActionDefinition, ServiceEndpoint};
use super::{SecurityApi, ServiceEndpointApi};
use crate::error::ProviderError;

/// Authorization parameters the service treats as confidential.
pub const CONFIDENTIAL_PARAMETERS: &[&str] = &["apitoken", "username", "password", "secret"];

/// Prefix used to derive identity descriptors from subject descriptors.
pub const IDENTITY_PREFIX: &str = "Microsoft.TeamFoundation.Identity;";

#[derive(Default)]
struct State {
    endpoints: HashMap<Uuid, ServiceEndpoint>,
    namespaces: HashMap<Uuid, Vec<ActionDefinition>>,
    acls: HashMap<(Uuid, String), BTreeMap<String, AccessControlEntry>>,
}

/// Thread-safe in-memory implementation of every client trait.
#[derive(Default)]
pub struct MemoryClient {
    state: Mutex<State>,
}

impl MemoryClient {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the actions of a security namespace.
    pub fn with_namespace(self, namespace_id: Uuid, actions: Vec<ActionDefinition>) -> Self {
        self.lock().namespaces.insert(namespace_id, actions);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The endpoint exactly as stored, secrets included.
    pub fn stored_endpoint(&self, endpoint_id: Uuid) -> Option<ServiceEndpoint> {
        self.lock().endpoints.get(&endpoint_id).cloned()
    }

    /// Number of stored endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.lock().endpoints.len()
    }

    /// The stored entry for an identity descriptor on a token.
    pub fn stored_entry(
        &self,
        namespace_id: Uuid,
        token: &str,
        descriptor: &str,
    ) -> Option<AccessControlEntry> {
        self.lock()
            .acls
            .get(&(namespace_id, token.to_string()))
            .and_then(|entries| entries.get(descriptor))
            .cloned()
    }
}

impl std::fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryClient")
            .field("endpoints", &state.endpoints.len())
            .field("acls", &state.acls.len())
            .finish()
    }
}

fn redacted(endpoint: &ServiceEndpoint) -> ServiceEndpoint {
    let mut endpoint = endpoint.clone();
    endpoint
        .authorization
        .parameters
        .retain(|name, _| !CONFIDENTIAL_PARAMETERS.contains(&name.as_str()));
    endpoint
}

fn in_project(endpoint: &ServiceEndpoint, project_id: Uuid) -> bool {
    endpoint
        .service_endpoint_project_references
        .iter()
        .any(|r| r.project_reference.id == project_id)
}

#[async_trait]
impl ServiceEndpointApi for MemoryClient {
    async fn create_service_endpoint(
        &self,
        endpoint: &ServiceEndpoint,
    ) -> Result<ServiceEndpoint, ProviderError> {
        let mut stored = endpoint.clone();
        let id = Uuid::new_v4();
        stored.id = Some(id);
        stored.is_ready = true;

        let mut state = self.lock();
        state.endpoints.insert(id, stored.clone());
        Ok(redacted(&stored))
    }

    async fn get_service_endpoint(
        &self,
        project_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<ServiceEndpoint, ProviderError> {
        self.lock()
            .endpoints
            .get(&endpoint_id)
            .filter(|e| in_project(e, project_id))
            .map(redacted)
            .ok_or_else(|| {
                ProviderError::NotFound(format!(
                    "service endpoint {} not found in project {}",
                    endpoint_id, project_id
                ))
            })
    }

    async fn find_service_endpoints_by_name(
        &self,
        project_id: Uuid,
        name: &str,
    ) -> Result<Vec<ServiceEndpoint>, ProviderError> {
        Ok(self
            .lock()
            .endpoints
            .values()
            .filter(|e| in_project(e, project_id) && e.name.eq_ignore_ascii_case(name))
            .map(redacted)
            .collect())
    }

    async fn update_service_endpoint(
        &self,
        endpoint_id: Uuid,
        endpoint: &ServiceEndpoint,
    ) -> Result<ServiceEndpoint, ProviderError> {
        let mut state = self.lock();
        if !state.endpoints.contains_key(&endpoint_id) {
            return Err(ProviderError::NotFound(format!(
                "service endpoint {} not found",
                endpoint_id
            )));
        }

        let mut stored = endpoint.clone();
        stored.id = Some(endpoint_id);
        stored.is_ready = true;
        state.endpoints.insert(endpoint_id, stored.clone());
        Ok(redacted(&stored))
    }

    async fn delete_service_endpoint(
        &self,
        endpoint_id: Uuid,
        project_ids: &[Uuid],
    ) -> Result<(), ProviderError> {
        let mut state = self.lock();
        let Some(endpoint) = state.endpoints.get_mut(&endpoint_id) else {
            return Err(ProviderError::NotFound(format!(
                "service endpoint {} not found",
                endpoint_id
            )));
        };

        endpoint
            .service_endpoint_project_references
            .retain(|r| !project_ids.contains(&r.project_reference.id));
        if endpoint.service_endpoint_project_references.is_empty() {
            state.endpoints.remove(&endpoint_id);
        }
        Ok(())
    }
}

#[async_trait]
impl SecurityApi for MemoryClient {
    async fn action_definitions(
        &self,
        namespace_id: Uuid,
    ) -> Result<Vec<ActionDefinition>, ProviderError> {
        self.lock()
            .namespaces
            .get(&namespace_id)
            .cloned()
            .ok_or_else(|| {
                ProviderError::NotFound(format!("security namespace {} not found", namespace_id))
            })
    }

    async fn access_control_lists(
        &self,
        namespace_id: Uuid,
        token: &str,
        descriptors: &[String],
    ) -> Result<Vec<AccessControlList>, ProviderError> {
        let state = self.lock();
        let Some(entries) = state.acls.get(&(namespace_id, token.to_string())) else {
            return Ok(Vec::new());
        };

        let aces_dictionary: BTreeMap<_, _> = entries
            .iter()
            .filter(|(descriptor, _)| descriptors.is_empty() || descriptors.contains(descriptor))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if aces_dictionary.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![AccessControlList {
            token: token.to_string(),
            inherit_permissions: true,
            aces_dictionary,
        }])
    }

    async fn set_access_control_entries(
        &self,
        namespace_id: Uuid,
        token: &str,
        entries: &[AccessControlEntry],
        merge: bool,
    ) -> Result<(), ProviderError> {
        let mut state = self.lock();
        let acl = state
            .acls
            .entry((namespace_id, token.to_string()))
            .or_default();

        for entry in entries {
            let stored = acl
                .entry(entry.descriptor.clone())
                .or_insert_with(|| AccessControlEntry::empty(&entry.descriptor));
            if merge {
                stored.allow = (stored.allow | entry.allow) & !entry.deny;
                stored.deny = (stored.deny | entry.deny) & !entry.allow;
            } else {
                stored.allow = entry.allow;
                stored.deny = entry.deny;
            }
        }

        acl.retain(|_, e| e.allow != 0 || e.deny != 0);
        if acl.is_empty() {
            state.acls.remove(&(namespace_id, token.to_string()));
        }
        Ok(())
    }

    async fn identity_descriptor(&self, subject_descriptor: &str) -> Result<String, ProviderError> {
        if subject_descriptor.trim().is_empty() {
            return Err(ProviderError::NotFound(
                "no identity found for an empty subject descriptor".to_string(),
            ));
        }
        Ok(format!("{}{}", IDENTITY_PREFIX, subject_descriptor))
    }
}
