//! `azuredevops_serviceendpoint_argocd`: connection to an ArgoCD server.

use std::str::FromStr;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{flatten_base, BaseConfig, EndpointKind};
use crate::client::{EndpointAuthorization, ServiceEndpoint};
use crate::error::ProviderError;
use crate::plan::SecretField;
use crate::resources::decode;
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};
use crate::secret;
use crate::validation;

const ENDPOINT_TYPE: &str = "argocd";
const TOKEN_BLOCK: &str = "authentication_token";
const BASIC_BLOCK: &str = "authentication_basic";

/// Authorization schemes an ArgoCD endpoint can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgoCdScheme {
    /// API token, parameter `apitoken`.
    Token,
    /// Basic auth, parameters `username` and `password`.
    UsernamePassword,
}

impl ArgoCdScheme {
    /// Wire name of the scheme.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Token => "Token",
            Self::UsernamePassword => "UsernamePassword",
        }
    }
}

impl FromStr for ArgoCdScheme {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(Self::Token.as_str()) {
            Ok(Self::Token)
        } else if s.eq_ignore_ascii_case(Self::UsernamePassword.as_str()) {
            Ok(Self::UsernamePassword)
        } else {
            Err(ProviderError::InconsistentAuthorization {
                expected: "Token, UsernamePassword".to_string(),
                actual: s.to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TokenBlock {
    #[serde(default)]
    token: String,
}

#[derive(Debug, Clone, Deserialize)]
struct BasicBlock {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ArgoCdConfig {
    #[serde(flatten)]
    base: BaseConfig,
    #[serde(default)]
    url: String,
    #[serde(default)]
    authentication_token: Option<Vec<TokenBlock>>,
    #[serde(default)]
    authentication_basic: Option<Vec<BasicBlock>>,
}

/// Credentials of an ArgoCD endpoint. Exactly one form is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgoCdAuth {
    /// API token.
    Token {
        /// The token.
        token: String,
    },
    /// User name and password.
    Basic {
        /// The user name.
        username: String,
        /// The password.
        password: String,
    },
}

impl ArgoCdAuth {
    /// The scheme the service uses for these credentials.
    pub fn scheme(&self) -> ArgoCdScheme {
        match self {
            Self::Token { .. } => ArgoCdScheme::Token,
            Self::Basic { .. } => ArgoCdScheme::UsernamePassword,
        }
    }

    fn into_authorization(self) -> EndpointAuthorization {
        let scheme = self.scheme().as_str();
        match self {
            Self::Token { token } => EndpointAuthorization::new(scheme, [("apitoken", token)]),
            Self::Basic { username, password } => EndpointAuthorization::new(
                scheme,
                [("username", username), ("password", password)],
            ),
        }
    }
}

impl ArgoCdConfig {
    fn token_block(&self) -> Option<&TokenBlock> {
        self.authentication_token.as_ref().and_then(|b| b.first())
    }

    fn basic_block(&self) -> Option<&BasicBlock> {
        self.authentication_basic.as_ref().and_then(|b| b.first())
    }

    fn auth(&self) -> Result<ArgoCdAuth, ProviderError> {
        match (self.token_block(), self.basic_block()) {
            (Some(t), None) => Ok(ArgoCdAuth::Token {
                token: t.token.clone(),
            }),
            (None, Some(b)) => Ok(ArgoCdAuth::Basic {
                username: b.username.clone(),
                password: b.password.clone(),
            }),
            _ => Err(ProviderError::Validation(format!(
                "exactly one of {} or {} must be set",
                TOKEN_BLOCK, BASIC_BLOCK
            ))),
        }
    }
}

/// The ArgoCD endpoint kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgoCd;

impl EndpointKind for ArgoCd {
    const TYPE_NAME: &'static str = "azuredevops_serviceendpoint_argocd";

    const SECRETS: &'static [SecretField] = &[
        SecretField::nested(TOKEN_BLOCK, "token"),
        SecretField::nested(BASIC_BLOCK, "username"),
        SecretField::nested(BASIC_BLOCK, "password"),
    ];

    fn schema(base: Schema) -> Schema {
        let token = Block::new()
            .with_attribute(
                "token",
                Attribute::required_string()
                    .sensitive()
                    .with_description("The ArgoCD access token."),
            )
            .with_attribute(&secret::hash_key("token"), Attribute::secret_memo("token"));

        // The ArgoCD extension declares the user name confidential too.
        let basic = Block::new()
            .with_attribute(
                "username",
                Attribute::required_string()
                    .sensitive()
                    .with_description("The ArgoCD user name."),
            )
            .with_attribute(&secret::hash_key("username"), Attribute::secret_memo("username"))
            .with_attribute(
                "password",
                Attribute::required_string()
                    .sensitive()
                    .with_description("The ArgoCD password."),
            )
            .with_attribute(&secret::hash_key("password"), Attribute::secret_memo("password"));

        base.with_attribute(
            "url",
            Attribute::required_string().with_description("Url for the ArgoCD Server"),
        )
        .with_block(TOKEN_BLOCK, NestedBlock::list(token).with_max_items(1))
        .with_block(BASIC_BLOCK, NestedBlock::list(basic).with_max_items(1))
    }

    fn validate(config: &Value) -> Vec<Diagnostic> {
        let config: ArgoCdConfig = match decode(config, "configuration") {
            Ok(config) => config,
            Err(e) => return vec![Diagnostic::error(e.to_string())],
        };

        let mut diagnostics: Vec<Diagnostic> = validation::no_trailing_slash("url", &config.url)
            .or_else(|| validation::http_url("url", &config.url))
            .into_iter()
            .collect();

        diagnostics.extend(validation::exactly_one_of(&[
            (BASIC_BLOCK, config.basic_block().is_some()),
            (TOKEN_BLOCK, config.token_block().is_some()),
        ]));

        if let Some(t) = config.token_block() {
            diagnostics.extend(validation::not_blank("authentication_token.0.token", &t.token));
        }
        if let Some(b) = config.basic_block() {
            diagnostics.extend(validation::not_blank("authentication_basic.0.username", &b.username));
            diagnostics.extend(validation::not_blank("authentication_basic.0.password", &b.password));
        }
        diagnostics
    }

    fn expand(config: &Value) -> Result<(ServiceEndpoint, Uuid), ProviderError> {
        let config: ArgoCdConfig = decode(config, "configuration")?;
        let (mut endpoint, project_id) = config.base.expand()?;

        endpoint.endpoint_type = ENDPOINT_TYPE.to_string();
        endpoint.url = config.url.clone();
        endpoint.authorization = config.auth()?.into_authorization();
        Ok((endpoint, project_id))
    }

    fn flatten(
        state: &mut Map<String, Value>,
        endpoint: &ServiceEndpoint,
        project_id: Uuid,
    ) -> Result<(), ProviderError> {
        let scheme: ArgoCdScheme = endpoint.authorization.scheme.parse()?;
        flatten_base(state, endpoint, project_id);

        let (keep, drop, secrets): (&str, &str, &[&str]) = match scheme {
            ArgoCdScheme::Token => (TOKEN_BLOCK, BASIC_BLOCK, &["token"]),
            ArgoCdScheme::UsernamePassword => (BASIC_BLOCK, TOKEN_BLOCK, &["username", "password"]),
        };

        let mut block = prior_block(state, keep);
        for name in secrets {
            if !block.contains_key(*name) {
                block.insert(name.to_string(), json!(""));
            }
            secret::refresh(&mut block, name);
        }

        state.insert(keep.to_string(), json!([block]));
        state.remove(drop);
        state.insert("url".to_string(), json!(endpoint.url));
        Ok(())
    }
}

/// First item of a list block in state, or an empty object.
fn prior_block(state: &Map<String, Value>, name: &str) -> Map<String, Value> {
    state
        .get(name)
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}
