//! Service endpoint resources.
//!
//! Every endpoint resource shares the base attributes and the CRUD flow below.
//! A concrete endpoint type plugs in through [`EndpointKind`], which expands
//! its configuration into a [`ServiceEndpoint`] and flattens the service's
//! answer back into state.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{decode, ensure_valid, into_object, string_attr, Resource};
use crate::client::{
    AggregatedClient, ProjectReference, ServiceEndpoint, ServiceEndpointProjectReference,
};
use crate::error::ProviderError;
use crate::plan::SecretField;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};
use crate::validation;

pub mod argocd;
pub mod incoming_webhook;

/// Description given to endpoints that do not set one.
pub const DEFAULT_DESCRIPTION: &str = "Managed by Terraform";

/// Owner of user-managed endpoints.
pub const OWNER_LIBRARY: &str = "library";

/// Attributes shared by every service endpoint resource.
pub fn base_schema() -> Schema {
    Schema::v0()
        .with_attribute(
            "id",
            Attribute::computed_string().with_description("The ID of the service endpoint."),
        )
        .with_attribute(
            "project_id",
            Attribute::required_string()
                .with_force_new()
                .with_description("The ID of the project."),
        )
        .with_attribute(
            "service_endpoint_name",
            Attribute::required_string().with_description("The service endpoint name."),
        )
        .with_attribute(
            "description",
            Attribute::optional_string()
                .with_default(json!(DEFAULT_DESCRIPTION))
                .with_description("The service endpoint description."),
        )
        .with_attribute(
            "authorization",
            Attribute::new(
                AttributeType::map(AttributeType::String),
                AttributeFlags::computed(),
            )
            .with_description("The authorization scheme reported by the service."),
        )
}

/// Base attributes of an endpoint configuration or state.
#[derive(Debug, Clone, Deserialize)]
pub struct BaseConfig {
    /// Endpoint id, set once the endpoint exists.
    #[serde(default)]
    pub id: Option<String>,
    /// Owning project.
    pub project_id: String,
    /// Endpoint name.
    pub service_endpoint_name: String,
    /// Endpoint description.
    #[serde(default)]
    pub description: Option<String>,
}

impl BaseConfig {
    /// Check the base attribute values.
    pub fn validate(&self) -> Vec<Diagnostic> {
        [
            validation::uuid("project_id", &self.project_id),
            validation::not_blank("service_endpoint_name", &self.service_endpoint_name),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// The project id as a UUID.
    pub fn project_id(&self) -> Result<Uuid, ProviderError> {
        parse_uuid("project_id", &self.project_id)
    }

    /// The endpoint id, if the endpoint exists.
    pub fn endpoint_id(&self) -> Result<Option<Uuid>, ProviderError> {
        match self.id.as_deref() {
            None | Some("") => Ok(None),
            Some(id) => parse_uuid("id", id).map(Some),
        }
    }

    /// Expand the base attributes into an endpoint with one project reference.
    pub fn expand(&self) -> Result<(ServiceEndpoint, Uuid), ProviderError> {
        let project_id = self.project_id()?;
        let description = self
            .description
            .clone()
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

        let endpoint = ServiceEndpoint {
            id: self.endpoint_id()?,
            name: self.service_endpoint_name.clone(),
            description: description.clone(),
            owner: OWNER_LIBRARY.to_string(),
            service_endpoint_project_references: vec![ServiceEndpointProjectReference {
                project_reference: ProjectReference {
                    id: project_id,
                    name: String::new(),
                },
                name: self.service_endpoint_name.clone(),
                description,
            }],
            ..Default::default()
        };
        Ok((endpoint, project_id))
    }
}

fn parse_uuid(attribute: &str, value: &str) -> Result<Uuid, ProviderError> {
    Uuid::parse_str(value).map_err(|e| {
        ProviderError::Validation(format!("{} must be a UUID, got {:?}: {}", attribute, value, e))
    })
}

/// Write the base attributes of `endpoint` into `state`.
pub fn flatten_base(state: &mut Map<String, Value>, endpoint: &ServiceEndpoint, project_id: Uuid) {
    if let Some(id) = endpoint.id {
        state.insert("id".to_string(), json!(id.to_string()));
    }
    state.insert("service_endpoint_name".to_string(), json!(endpoint.name));
    state.insert("project_id".to_string(), json!(project_id.to_string()));
    state.insert("description".to_string(), json!(endpoint.description));
    state.insert(
        "authorization".to_string(),
        json!({"scheme": endpoint.authorization.scheme}),
    );
}

/// One concrete endpoint type.
pub trait EndpointKind: Send + Sync + 'static {
    /// Resource type name.
    const TYPE_NAME: &'static str;

    /// Secrets tracked through hash memos.
    const SECRETS: &'static [SecretField];

    /// Extend the base schema with the type's own attributes and blocks.
    fn schema(base: Schema) -> Schema;

    /// Type-specific value checks, run after the schema walk.
    fn validate(config: &Value) -> Vec<Diagnostic>;

    /// Build the endpoint to send to the service.
    fn expand(config: &Value) -> Result<(ServiceEndpoint, Uuid), ProviderError>;

    /// Merge the service's answer into `state`.
    ///
    /// Secrets are never returned by the service, so the values already in
    /// `state` are kept and only their memos refreshed.
    fn flatten(
        state: &mut Map<String, Value>,
        endpoint: &ServiceEndpoint,
        project_id: Uuid,
    ) -> Result<(), ProviderError>;
}

/// A service endpoint resource of kind `K`.
pub struct ServiceEndpointResource<K> {
    kind: PhantomData<K>,
}

impl<K: EndpointKind> ServiceEndpointResource<K> {
    /// Create the resource.
    pub fn new() -> Self {
        Self { kind: PhantomData }
    }

    fn ids(state: &Map<String, Value>) -> Result<(Uuid, Uuid), ProviderError> {
        let project_id = parse_uuid("project_id", string_attr(state, "project_id"))?;
        let endpoint_id = parse_uuid("id", string_attr(state, "id"))?;
        Ok((project_id, endpoint_id))
    }

    async fn ensure_name_available(
        client: &AggregatedClient,
        endpoint: &ServiceEndpoint,
        project_id: Uuid,
    ) -> Result<(), ProviderError> {
        let existing = client
            .service_endpoints
            .find_service_endpoints_by_name(project_id, &endpoint.name)
            .await?;

        if let Some(found) = existing
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(&endpoint.name))
        {
            let id = found.id.map(|id| id.to_string()).unwrap_or_default();
            return Err(ProviderError::AlreadyExists(format!(
                "a service endpoint named {:?} already exists in project {} (id {}); \
                 import it with {}/{} to manage it",
                endpoint.name, project_id, id, project_id, id
            )));
        }
        Ok(())
    }

    /// Remove an endpoint whose create response could not be stored.
    ///
    /// No state records the endpoint, so leaving it would make the next apply
    /// fail on the duplicate name.
    async fn discard_created(client: &AggregatedClient, project_id: Uuid, endpoint_id: Uuid) {
        match client
            .service_endpoints
            .delete_service_endpoint(endpoint_id, &[project_id])
            .await
        {
            Ok(()) => warn!(%endpoint_id, "Deleted service endpoint after a failed create"),
            Err(e) => error!(
                %endpoint_id,
                %project_id,
                error = %e,
                "Failed to delete service endpoint after a failed create; import it with {}/{}",
                project_id,
                endpoint_id
            ),
        }
    }
}

impl<K: EndpointKind> Default for ServiceEndpointResource<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: EndpointKind> Resource for ServiceEndpointResource<K> {
    fn type_name(&self) -> &'static str {
        K::TYPE_NAME
    }

    fn schema(&self) -> Schema {
        K::schema(base_schema())
    }

    fn secrets(&self) -> &'static [SecretField] {
        K::SECRETS
    }

    fn validate_values(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = match decode::<BaseConfig>(config, "configuration") {
            Ok(base) => base.validate(),
            Err(e) => vec![Diagnostic::error(e.to_string())],
        };
        diagnostics.extend(K::validate(config));
        diagnostics
    }

    async fn create(&self, client: &AggregatedClient, planned: Value) -> Result<Value, ProviderError> {
        ensure_valid(self.validate(&planned))?;
        let (endpoint, project_id) = K::expand(&planned)?;
        Self::ensure_name_available(client, &endpoint, project_id).await?;

        debug!(endpoint_type = %endpoint.endpoint_type, name = %endpoint.name, %project_id, "Creating service endpoint");
        let created = client.service_endpoints.create_service_endpoint(&endpoint).await?;
        let Some(endpoint_id) = created.id else {
            return Err(ProviderError::Internal(
                "service endpoint created without an id".to_string(),
            ));
        };

        let mut state = into_object(planned, "planned state")?;
        if let Err(e) = K::flatten(&mut state, &created, project_id) {
            Self::discard_created(client, project_id, endpoint_id).await;
            return Err(e);
        }
        info!(id = %endpoint_id, "Created service endpoint");
        Ok(Value::Object(state))
    }

    async fn read(&self, client: &AggregatedClient, state: Value) -> Result<Value, ProviderError> {
        let mut state = into_object(state, "state")?;
        let (project_id, endpoint_id) = Self::ids(&state)?;

        let endpoint = match client
            .service_endpoints
            .get_service_endpoint(project_id, endpoint_id)
            .await
        {
            Ok(endpoint) if endpoint.id.is_some() => endpoint,
            Ok(_) => {
                warn!(%endpoint_id, %project_id, "Service endpoint returned without an id");
                return Ok(Value::Null);
            },
            Err(e) if e.is_not_found() => {
                warn!(%endpoint_id, %project_id, "Service endpoint no longer exists");
                return Ok(Value::Null);
            },
            Err(e) => return Err(e),
        };

        K::flatten(&mut state, &endpoint, project_id)?;
        Ok(Value::Object(state))
    }

    async fn update(
        &self,
        client: &AggregatedClient,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        ensure_valid(self.validate(&planned))?;
        let prior = into_object(prior, "prior state")?;
        let (_, endpoint_id) = Self::ids(&prior)?;

        let mut planned = into_object(planned, "planned state")?;
        planned.insert("id".to_string(), json!(endpoint_id.to_string()));
        let planned = Value::Object(planned);

        let (endpoint, project_id) = K::expand(&planned)?;
        debug!(%endpoint_id, %project_id, "Updating service endpoint");
        let updated = client
            .service_endpoints
            .update_service_endpoint(endpoint_id, &endpoint)
            .await?;

        let mut state = into_object(planned, "planned state")?;
        K::flatten(&mut state, &updated, project_id)?;
        Ok(Value::Object(state))
    }

    async fn delete(&self, client: &AggregatedClient, state: Value) -> Result<(), ProviderError> {
        let state = into_object(state, "state")?;
        let (project_id, endpoint_id) = Self::ids(&state)?;

        match client
            .service_endpoints
            .delete_service_endpoint(endpoint_id, &[project_id])
            .await
        {
            Ok(()) => {
                info!(%endpoint_id, "Deleted service endpoint");
                Ok(())
            },
            Err(e) if e.is_not_found() => {
                warn!(%endpoint_id, "Service endpoint already deleted");
                Ok(())
            },
            Err(e) => Err(e),
        }
    }

    async fn import(&self, client: &AggregatedClient, id: &str) -> Result<Value, ProviderError> {
        let (project_id, endpoint_id) = parse_import_id(id)?;
        let endpoint = client
            .service_endpoints
            .get_service_endpoint(project_id, endpoint_id)
            .await?;

        let mut state = Map::new();
        K::flatten(&mut state, &endpoint, project_id)?;
        Ok(Value::Object(state))
    }
}

/// Parse an import id of the form `<project_id>/<service_endpoint_id>`.
pub fn parse_import_id(id: &str) -> Result<(Uuid, Uuid), ProviderError> {
    let invalid = || {
        ProviderError::InvalidRequest(format!(
            "invalid import id {:?}, expected <project_id>/<service_endpoint_id>",
            id
        ))
    };

    let (project, endpoint) = id.split_once('/').ok_or_else(invalid)?;
    let project_id = Uuid::parse_str(project).map_err(|_| invalid())?;
    let endpoint_id = Uuid::parse_str(endpoint).map_err(|_| invalid())?;
    Ok((project_id, endpoint_id))
}
