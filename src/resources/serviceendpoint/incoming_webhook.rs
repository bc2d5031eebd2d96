//! `azuredevops_serviceendpoint_incomingwebhook`: endpoint receiving webhook calls.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{flatten_base, BaseConfig, EndpointKind};
use crate::client::{EndpointAuthorization, ServiceEndpoint};
use crate::error::ProviderError;
use crate::plan::SecretField;
use crate::resources::decode;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::secret;
use crate::validation;

const ENDPOINT_TYPE: &str = "incomingwebhook";
const ENDPOINT_URL: &str = "https://dev.azure.com";
const SCHEME: &str = "None";

#[derive(Debug, Clone, Deserialize)]
struct IncomingWebhookConfig {
    #[serde(flatten)]
    base: BaseConfig,
    #[serde(default)]
    webhook_name: String,
    #[serde(default)]
    http_header: Option<String>,
    #[serde(default)]
    secret: Option<String>,
}

/// The incoming webhook endpoint kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncomingWebhook;

impl EndpointKind for IncomingWebhook {
    const TYPE_NAME: &'static str = "azuredevops_serviceendpoint_incomingwebhook";

    const SECRETS: &'static [SecretField] = &[SecretField::top_level("secret")];

    fn schema(base: Schema) -> Schema {
        base.with_attribute(
            "webhook_name",
            Attribute::required_string().with_description("The name of the webhook being created."),
        )
        .with_attribute(
            "http_header",
            Attribute::optional_string()
                .with_description("Http header name on which checksum will be sent."),
        )
        .with_attribute(
            "secret",
            Attribute::optional_string().sensitive().with_description(
                "Optional secret for the webhook. WebHook service will use this secret to calculate the payload checksum.",
            ),
        )
        .with_attribute(&secret::hash_key("secret"), Attribute::secret_memo("secret"))
    }

    fn validate(config: &Value) -> Vec<Diagnostic> {
        let config: IncomingWebhookConfig = match decode(config, "configuration") {
            Ok(config) => config,
            Err(e) => return vec![Diagnostic::error(e.to_string())],
        };

        let mut diagnostics: Vec<Diagnostic> =
            validation::not_empty("webhook_name", &config.webhook_name)
                .into_iter()
                .collect();
        if let Some(header) = &config.http_header {
            diagnostics.extend(validation::not_empty("http_header", header));
        }
        diagnostics
    }

    fn expand(config: &Value) -> Result<(ServiceEndpoint, Uuid), ProviderError> {
        let config: IncomingWebhookConfig = decode(config, "configuration")?;
        let (mut endpoint, project_id) = config.base.expand()?;

        endpoint.endpoint_type = ENDPOINT_TYPE.to_string();
        endpoint.url = ENDPOINT_URL.to_string();
        endpoint.authorization = EndpointAuthorization::new(
            SCHEME,
            [
                ("webhookname", config.webhook_name),
                ("secret", config.secret.unwrap_or_default()),
                ("header", config.http_header.unwrap_or_default()),
            ],
        );
        Ok((endpoint, project_id))
    }

    fn flatten(
        state: &mut Map<String, Value>,
        endpoint: &ServiceEndpoint,
        project_id: Uuid,
    ) -> Result<(), ProviderError> {
        flatten_base(state, endpoint, project_id);

        let parameters = &endpoint.authorization;
        state.insert("webhook_name".to_string(), json!(parameters.parameter("webhookname")));
        match parameters.parameter("header") {
            "" => {
                state.remove("http_header");
            },
            header => {
                state.insert("http_header".to_string(), json!(header));
            },
        }
        secret::refresh(state, "secret");
        Ok(())
    }
}
