//! reqwest-backed client for the Azure DevOps REST APIs.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use super::models::{
    AccessControlEntry, AccessControlList, ActionDefinition, Identity, ListResponse,
    SecurityNamespaceDescription, ServiceEndpoint, SetAccessControlEntries,
};
use super::{SecurityApi, ServiceEndpointApi};
use crate::config::ProviderConfig;
use crate::error::ProviderError;

const SERVICE_ENDPOINT_API_VERSION: &str = "6.0-preview.4";
const SECURITY_API_VERSION: &str = "6.0";
const IDENTITY_API_VERSION: &str = "6.0";

/// Maximum length of response body to log.
const MAX_LOG_BODY_LENGTH: usize = 200;

fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };
    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Pull the `message` field out of an Azure DevOps error body.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("request failed with status {}", status))
}

/// Base URL of the identity service for an organization.
///
/// Cloud organizations serve identities from `vssps.dev.azure.com`; on-premises
/// servers and anything else use the organization URL itself.
pub(crate) fn identity_base_url(organization_url: &Url) -> String {
    let org = organization_url.as_str().trim_end_matches('/');
    match organization_url.host_str() {
        Some("dev.azure.com") => org.replacen("://dev.azure.com", "://vssps.dev.azure.com", 1),
        Some(host) if host.ends_with(".visualstudio.com") && !host.contains(".vssps.") => {
            let account = host.trim_end_matches(".visualstudio.com");
            format!("{}://{}.vssps.visualstudio.com", organization_url.scheme(), account)
        },
        _ => org.to_string(),
    }
}

/// Client for one Azure DevOps organization, authenticated with a personal access token.
#[derive(Clone)]
pub struct HttpClient {
    http: Client,
    organization_url: String,
    identity_url: String,
    token: String,
}

impl HttpClient {
    /// Create a client for the configured organization.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let parsed = Url::parse(&config.org_service_url).map_err(|e| {
            ProviderError::Configuration(format!("invalid org_service_url: {}", e))
        })?;

        let http = Client::builder()
            .user_agent(concat!("hemmer-provider-azuredevops/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            organization_url: parsed.as_str().trim_end_matches('/').to_string(),
            identity_url: identity_base_url(&parsed),
            token: config.personal_access_token.clone(),
        })
    }

    fn org(&self, path: &str) -> String {
        format!("{}/{}", self.organization_url, path)
    }

    /// Send a request and return the raw response body.
    async fn send<B>(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<String, ProviderError>
    where
        B: Serialize + ?Sized,
    {
        tracing::debug!(%method, url, "Azure DevOps request");

        let mut request = self
            .http
            .request(method, url)
            .basic_auth("", Some(&self.token))
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::warn!(%status, body = %sanitize_for_log(&text), "Azure DevOps API error");
            return Err(ProviderError::from_status(
                status.as_u16(),
                error_message(status, &text),
            ));
        }
        Ok(text)
    }

    /// Send a request and decode the body. Empty and `null` bodies decode to `None`.
    async fn send_json<B, T>(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<Option<T>, ProviderError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.send(method, url, query, body).await?;
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(trimmed)?))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ProviderError> {
        self.send_json::<(), T>(Method::GET, url, query, None).await
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("organization_url", &self.organization_url)
            .field("identity_url", &self.identity_url)
            .finish_non_exhaustive()
    }
}

fn missing(what: &str) -> ProviderError {
    ProviderError::Internal(format!("empty response from {}", what))
}

#[async_trait]
impl ServiceEndpointApi for HttpClient {
    async fn create_service_endpoint(
        &self,
        endpoint: &ServiceEndpoint,
    ) -> Result<ServiceEndpoint, ProviderError> {
        let url = self.org("_apis/serviceendpoint/endpoints");
        self.send_json(
            Method::POST,
            &url,
            &[("api-version", SERVICE_ENDPOINT_API_VERSION)],
            Some(endpoint),
        )
        .await?
        .ok_or_else(|| missing("service endpoint create"))
    }

    async fn get_service_endpoint(
        &self,
        project_id: Uuid,
        endpoint_id: Uuid,
    ) -> Result<ServiceEndpoint, ProviderError> {
        let url = self.org(&format!(
            "{}/_apis/serviceendpoint/endpoints/{}",
            project_id, endpoint_id
        ));
        let endpoint: Option<ServiceEndpoint> = self
            .get_json(&url, &[("api-version", SERVICE_ENDPOINT_API_VERSION)])
            .await?;

        // The service answers 200 with an empty body for unknown endpoints.
        match endpoint {
            Some(endpoint) if endpoint.id.is_some() => Ok(endpoint),
            _ => Err(ProviderError::NotFound(format!(
                "service endpoint {} not found in project {}",
                endpoint_id, project_id
            ))),
        }
    }

    async fn find_service_endpoints_by_name(
        &self,
        project_id: Uuid,
        name: &str,
    ) -> Result<Vec<ServiceEndpoint>, ProviderError> {
        let url = self.org(&format!("{}/_apis/serviceendpoint/endpoints", project_id));
        let list: Option<ListResponse<ServiceEndpoint>> = self
            .get_json(
                &url,
                &[
                    ("endpointNames", name),
                    ("api-version", SERVICE_ENDPOINT_API_VERSION),
                ],
            )
            .await?;
        Ok(list.map(|l| l.value).unwrap_or_default())
    }

    async fn update_service_endpoint(
        &self,
        endpoint_id: Uuid,
        endpoint: &ServiceEndpoint,
    ) -> Result<ServiceEndpoint, ProviderError> {
        let url = self.org(&format!("_apis/serviceendpoint/endpoints/{}", endpoint_id));
        self.send_json(
            Method::PUT,
            &url,
            &[("api-version", SERVICE_ENDPOINT_API_VERSION)],
            Some(endpoint),
        )
        .await?
        .ok_or_else(|| missing("service endpoint update"))
    }

    async fn delete_service_endpoint(
        &self,
        endpoint_id: Uuid,
        project_ids: &[Uuid],
    ) -> Result<(), ProviderError> {
        let url = self.org(&format!("_apis/serviceendpoint/endpoints/{}", endpoint_id));
        let projects = project_ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.send::<()>(
            Method::DELETE,
            &url,
            &[
                ("projectIds", projects.as_str()),
                ("api-version", SERVICE_ENDPOINT_API_VERSION),
            ],
            None,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SecurityApi for HttpClient {
    async fn action_definitions(
        &self,
        namespace_id: Uuid,
    ) -> Result<Vec<ActionDefinition>, ProviderError> {
        let url = self.org(&format!("_apis/securitynamespaces/{}", namespace_id));
        let list: Option<ListResponse<SecurityNamespaceDescription>> = self
            .get_json(&url, &[("api-version", SECURITY_API_VERSION)])
            .await?;

        list.and_then(|l| l.value.into_iter().next())
            .map(|ns| ns.actions)
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
        let url = self.org(&format!("_apis/accesscontrollists/{}", namespace_id));
        let descriptors = descriptors.join(",");
        let list: Option<ListResponse<AccessControlList>> = self
            .get_json(
                &url,
                &[
                    ("token", token),
                    ("descriptors", descriptors.as_str()),
                    ("includeExtendedInfo", "false"),
                    ("api-version", SECURITY_API_VERSION),
                ],
            )
            .await?;
        Ok(list.map(|l| l.value).unwrap_or_default())
    }

    async fn set_access_control_entries(
        &self,
        namespace_id: Uuid,
        token: &str,
        entries: &[AccessControlEntry],
        merge: bool,
    ) -> Result<(), ProviderError> {
        let url = self.org(&format!("_apis/accesscontrolentries/{}", namespace_id));
        let body = SetAccessControlEntries {
            token: token.to_string(),
            merge,
            access_control_entries: entries.to_vec(),
        };
        self.send(
            Method::POST,
            &url,
            &[("api-version", SECURITY_API_VERSION)],
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn identity_descriptor(&self, subject_descriptor: &str) -> Result<String, ProviderError> {
        let url = format!("{}/_apis/identities", self.identity_url);
        let list: Option<ListResponse<Identity>> = self
            .get_json(
                &url,
                &[
                    ("subjectDescriptors", subject_descriptor),
                    ("queryMembership", "None"),
                    ("api-version", IDENTITY_API_VERSION),
                ],
            )
            .await?;

        list.and_then(|l| l.value.into_iter().next())
            .map(|identity| identity.descriptor)
            .ok_or_else(|| {
                ProviderError::NotFound(format!(
                    "no identity found for subject descriptor {}",
                    subject_descriptor
                ))
            })
    }
}
