//! Managed resource types.
//!
//! Each resource implements [`Resource`]: a schema, configuration checks,
//! and CRUD callbacks driven through an [`AggregatedClient`]. The provider
//! looks resources up by type name in a [`ResourceRegistry`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::client::AggregatedClient;
use crate::error::ProviderError;
use crate::plan::SecretField;
use crate::schema::{has_errors, Diagnostic, Schema};
use crate::validation;

pub mod permissions;
pub mod serviceendpoint;

/// A resource type managed by the provider.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Type name, e.g. `azuredevops_serviceendpoint_argocd`.
    fn type_name(&self) -> &'static str;

    /// Schema of the resource.
    fn schema(&self) -> Schema;

    /// Write-only secrets tracked through hash memos.
    fn secrets(&self) -> &'static [SecretField] {
        &[]
    }

    /// Checks beyond the schema walk.
    fn validate_values(&self, config: &Value) -> Vec<Diagnostic> {
        let _ = config;
        Vec::new()
    }

    /// Validate a configuration: schema walk first, then value checks.
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = validation::validate(&self.schema(), config);
        if !has_errors(&diagnostics) {
            diagnostics.extend(self.validate_values(config));
        }
        diagnostics
    }

    /// Create the remote object and return the new state.
    async fn create(&self, client: &AggregatedClient, planned: Value) -> Result<Value, ProviderError>;

    /// Refresh state from the remote object. `Value::Null` means it is gone.
    async fn read(&self, client: &AggregatedClient, state: Value) -> Result<Value, ProviderError>;

    /// Apply the planned state to an existing object.
    async fn update(
        &self,
        client: &AggregatedClient,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the remote object.
    async fn delete(&self, client: &AggregatedClient, state: Value) -> Result<(), ProviderError>;

    /// Build state for an existing object from an import id.
    async fn import(&self, client: &AggregatedClient, id: &str) -> Result<Value, ProviderError> {
        let _ = (client, id);
        Err(ProviderError::InvalidRequest(format!(
            "import is not supported for {}",
            self.type_name()
        )))
    }
}

/// Resources by type name.
#[derive(Clone)]
pub struct ResourceRegistry {
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
}

impl ResourceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            resources: BTreeMap::new(),
        }
    }

    /// Add a resource.
    pub fn with(mut self, resource: impl Resource + 'static) -> Self {
        self.resources.insert(resource.type_name(), Arc::new(resource));
        self
    }

    /// Look up a resource by type name.
    pub fn get(&self, type_name: &str) -> Result<&Arc<dyn Resource>, ProviderError> {
        self.resources
            .get(type_name)
            .ok_or_else(|| ProviderError::UnknownResource(type_name.to_string()))
    }

    /// All registered resources, ordered by type name.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Resource>> {
        self.resources.values()
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
            .with(serviceendpoint::ServiceEndpointResource::<serviceendpoint::argocd::ArgoCd>::new())
            .with(serviceendpoint::ServiceEndpointResource::<
                serviceendpoint::incoming_webhook::IncomingWebhook,
            >::new())
            .with(permissions::git::GitPermissions)
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.resources.keys()).finish()
    }
}

/// Decode a state or configuration value into a typed struct.
pub(crate) fn decode<T: DeserializeOwned>(value: &Value, what: &str) -> Result<T, ProviderError> {
    serde_json::from_value(value.clone())
        .map_err(|e| ProviderError::Validation(format!("invalid {}: {}", what, e)))
}

/// Turn an object value into its map, rejecting anything else.
pub(crate) fn into_object(value: Value, what: &str) -> Result<Map<String, Value>, ProviderError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ProviderError::InvalidRequest(format!(
            "{} must be an object, got {}",
            what, other
        ))),
    }
}

/// Fail with the first error diagnostic, if any.
pub(crate) fn ensure_valid(diagnostics: Vec<Diagnostic>) -> Result<(), ProviderError> {
    match diagnostics.into_iter().find(Diagnostic::is_error) {
        Some(d) => Err(ProviderError::Validation(match d.attribute {
            Some(attribute) => format!("{}: {}", attribute, d.summary),
            None => d.summary,
        })),
        None => Ok(()),
    }
}

/// String attribute of a state object, empty when absent.
pub(crate) fn string_attr<'a>(state: &'a Map<String, Value>, name: &str) -> &'a str {
    state.get(name).and_then(Value::as_str).unwrap_or_default()
}
