//! Provider configuration.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::validation;

/// Environment variable consulted when `org_service_url` is not configured.
pub const ORG_SERVICE_URL_ENV: &str = "AZDO_ORG_SERVICE_URL";

/// Environment variable consulted when `personal_access_token` is not configured.
pub const PERSONAL_ACCESS_TOKEN_ENV: &str = "AZDO_PERSONAL_ACCESS_TOKEN";

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    org_service_url: Option<String>,
    #[serde(default)]
    personal_access_token: Option<String>,
}

/// Connection settings for an Azure DevOps organization.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Organization URL, e.g. `https://dev.azure.com/contoso`.
    pub org_service_url: String,
    /// Personal access token used for basic authentication.
    pub personal_access_token: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("org_service_url", &self.org_service_url)
            .field("personal_access_token", &"(sensitive value)")
            .finish()
    }
}

impl ProviderConfig {
    /// Schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "org_service_url",
                Attribute::optional_string().with_description(
                    "The URL of the Azure DevOps organization. Falls back to AZDO_ORG_SERVICE_URL.",
                ),
            )
            .with_attribute(
                "personal_access_token",
                Attribute::optional_string().sensitive().with_description(
                    "Personal access token. Falls back to AZDO_PERSONAL_ACCESS_TOKEN.",
                ),
            )
    }

    /// Decode the provider block, filling gaps from the environment.
    pub fn from_value(config: &Value) -> Result<Self, ProviderError> {
        Self::from_value_with_env(config, |name| std::env::var(name).ok())
    }

    /// Decode the provider block with a custom environment lookup.
    pub fn from_value_with_env<F>(config: &Value, env: F) -> Result<Self, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = match config {
            Value::Null => RawConfig::default(),
            other => serde_json::from_value(other.clone())?,
        };

        let pick = |configured: Option<String>, var: &str| {
            configured
                .filter(|v| !v.trim().is_empty())
                .or_else(|| env(var).filter(|v| !v.trim().is_empty()))
        };

        let org_service_url = pick(raw.org_service_url, ORG_SERVICE_URL_ENV).ok_or_else(|| {
            ProviderError::Configuration(format!(
                "org_service_url is required (or set {})",
                ORG_SERVICE_URL_ENV
            ))
        })?;
        let personal_access_token = pick(raw.personal_access_token, PERSONAL_ACCESS_TOKEN_ENV)
            .ok_or_else(|| {
                ProviderError::Configuration(format!(
                    "personal_access_token is required (or set {})",
                    PERSONAL_ACCESS_TOKEN_ENV
                ))
            })?;

        let config = Self {
            org_service_url: org_service_url.trim_end_matches('/').to_string(),
            personal_access_token,
        };

        let diagnostics = config.validate();
        if let Some(first) = diagnostics.first() {
            return Err(ProviderError::Configuration(first.summary.clone()));
        }
        Ok(config)
    }

    /// Check the resolved values.
    pub fn validate(&self) -> Vec<Diagnostic> {
        validation::http_url("org_service_url", &self.org_service_url)
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_from_value() {
        let config = ProviderConfig::from_value_with_env(
            &json!({
                "org_service_url": "https://dev.azure.com/contoso/",
                "personal_access_token": "pat"
            }),
            no_env,
        )
        .unwrap();

        assert_eq!(config.org_service_url, "https://dev.azure.com/contoso");
        assert_eq!(config.personal_access_token, "pat");
    }

    #[test]
    fn test_env_fallback() {
        let env = |name: &str| match name {
            ORG_SERVICE_URL_ENV => Some("https://dev.azure.com/fabrikam".to_string()),
            PERSONAL_ACCESS_TOKEN_ENV => Some("from-env".to_string()),
            _ => None,
        };

        let config = ProviderConfig::from_value_with_env(&Value::Null, env).unwrap();
        assert_eq!(config.org_service_url, "https://dev.azure.com/fabrikam");
        assert_eq!(config.personal_access_token, "from-env");

        let config = ProviderConfig::from_value_with_env(
            &json!({"personal_access_token": "explicit"}),
            env,
        )
        .unwrap();
        assert_eq!(config.personal_access_token, "explicit");
    }

    #[test]
    fn test_missing_values() {
        let err = ProviderConfig::from_value_with_env(&json!({}), no_env).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(err.to_string().contains("org_service_url"));

        let err = ProviderConfig::from_value_with_env(
            &json!({"org_service_url": "https://dev.azure.com/contoso"}),
            no_env,
        )
        .unwrap_err();
        assert!(err.to_string().contains("personal_access_token"));
    }

    #[test]
    fn test_invalid_url() {
        let err = ProviderConfig::from_value_with_env(
            &json!({"org_service_url": "ftp://example.com", "personal_access_token": "pat"}),
            no_env,
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_debug_hides_token() {
        let config = ProviderConfig {
            org_service_url: "https://dev.azure.com/contoso".to_string(),
            personal_access_token: "super-secret".to_string(),
        };
        assert!(!format!("{:?}", config).contains("super-secret"));
    }

    #[test]
    fn test_schema() {
        let schema = ProviderConfig::schema();
        assert!(schema.block.attributes["personal_access_token"].flags.sensitive);
    }
}
