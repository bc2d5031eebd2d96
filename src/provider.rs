//! The Azure DevOps provider.

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::AggregatedClient;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::plan;
use crate::resources::ResourceRegistry;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// Provider serving the Azure DevOps resources over the provider protocol.
pub struct AzureDevOpsProvider {
    registry: ResourceRegistry,
    client: RwLock<Option<AggregatedClient>>,
}

impl AzureDevOpsProvider {
    /// An unconfigured provider; `configure` connects it.
    pub fn new() -> Self {
        Self {
            registry: ResourceRegistry::default(),
            client: RwLock::new(None),
        }
    }

    /// A provider already connected to `client`.
    pub fn with_client(client: AggregatedClient) -> Self {
        Self {
            registry: ResourceRegistry::default(),
            client: RwLock::new(Some(client)),
        }
    }

    /// The resources this provider serves.
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    async fn client(&self) -> Result<AggregatedClient, ProviderError> {
        self.client.read().await.clone().ok_or_else(|| {
            ProviderError::FailedPrecondition("provider has not been configured".to_string())
        })
    }
}

impl Default for AzureDevOpsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProviderService for AzureDevOpsProvider {
    fn schema(&self) -> ProviderSchema {
        self.registry.iter().fold(
            ProviderSchema::new().with_provider_config(ProviderConfig::schema()),
            |schema, resource| schema.with_resource(resource.type_name(), resource.schema()),
        )
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        match ProviderConfig::from_value(&config) {
            Ok(config) => Ok(config.validate()),
            Err(ProviderError::Configuration(message)) => Ok(vec![Diagnostic::error(message)]),
            Err(e) => Err(e),
        }
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = ProviderConfig::from_value(&config)?;
        let client = AggregatedClient::connect(&config)?;
        info!(organization = %config.org_service_url, "Connected to Azure DevOps");
        *self.client.write().await = Some(client);
        Ok(vec![])
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.client.write().await.take();
        debug!("Provider client released");
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(self.registry.get(resource_type)?.validate(&config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.registry.get(resource_type)?;
        plan::plan(
            &resource.schema(),
            resource.secrets(),
            prior_state.as_ref(),
            proposed_state,
        )
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.registry.get(resource_type)?;
        resource.create(&self.client().await?, planned_state).await
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let resource = self.registry.get(resource_type)?;
        if current_state.is_null() {
            return Ok(Value::Null);
        }
        resource.read(&self.client().await?, current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.registry.get(resource_type)?;
        resource
            .update(&self.client().await?, prior_state, planned_state)
            .await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.registry.get(resource_type)?;
        if current_state.is_null() {
            return Ok(());
        }
        resource.delete(&self.client().await?, current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.registry.get(resource_type)?;
        let state = resource.import(&self.client().await?, id).await?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }
}
