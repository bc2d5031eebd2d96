//! Wire types of the Azure DevOps service endpoint and security APIs.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A stored connection profile used by pipelines to reach an external system.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    /// Identifier assigned by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Display name, unique per project.
    #[serde(default)]
    pub name: String,
    /// Endpoint type such as `argocd` or `incomingwebhook`.
    #[serde(rename = "type", default)]
    pub endpoint_type: String,
    /// Address of the external system.
    #[serde(default)]
    pub url: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Owner of the endpoint, `library` for user-managed connections.
    #[serde(default)]
    pub owner: String,
    /// How the endpoint authenticates against the external system.
    #[serde(default)]
    pub authorization: EndpointAuthorization,
    /// Projects the endpoint is shared with.
    #[serde(default)]
    pub service_endpoint_project_references: Vec<ServiceEndpointProjectReference>,
    /// Whether the endpoint finished provisioning.
    #[serde(default)]
    pub is_ready: bool,
}

/// Authorization scheme and its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EndpointAuthorization {
    /// Scheme name, for example `Token`, `UsernamePassword` or `None`.
    #[serde(default)]
    pub scheme: String,
    /// Scheme-specific parameters. The service answers confidential ones with
    /// `null`, which are dropped on decode.
    #[serde(default, deserialize_with = "non_null_parameters")]
    pub parameters: BTreeMap<String, String>,
}

impl EndpointAuthorization {
    /// Create an authorization with the given scheme and parameters.
    pub fn new<I, K, V>(scheme: impl Into<String>, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            scheme: scheme.into(),
            parameters: parameters
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// A parameter value, or the empty string when absent.
    pub fn parameter(&self, name: &str) -> &str {
        self.parameters.get(name).map(String::as_str).unwrap_or_default()
    }
}

fn non_null_parameters<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<String>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect())
}

/// Link between an endpoint and a project.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpointProjectReference {
    /// The project.
    pub project_reference: ProjectReference,
    /// Endpoint name within the project.
    #[serde(default)]
    pub name: String,
    /// Endpoint description within the project.
    #[serde(default)]
    pub description: String,
}

/// Reference to a project by id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectReference {
    /// Project identifier.
    pub id: Uuid,
    /// Project name, may be empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

/// A named permission bit of a security namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    /// Bit mask of the action.
    pub bit: i32,
    /// Programmatic name, for example `GenericRead`.
    pub name: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,
}

impl ActionDefinition {
    /// Create an action definition.
    pub fn new(bit: i32, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            bit,
            display_name: name.clone(),
            name,
        }
    }
}

/// Security namespace description as returned by `_apis/securitynamespaces`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityNamespaceDescription {
    /// Namespace identifier.
    pub namespace_id: Uuid,
    /// Namespace name.
    #[serde(default)]
    pub name: String,
    /// Actions defined in the namespace.
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
}

/// Allow and deny masks for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlEntry {
    /// Identity descriptor the entry applies to.
    pub descriptor: String,
    /// Allowed permission bits.
    #[serde(default)]
    pub allow: i32,
    /// Denied permission bits.
    #[serde(default)]
    pub deny: i32,
}

impl AccessControlEntry {
    /// An entry granting and denying nothing.
    pub fn empty(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            allow: 0,
            deny: 0,
        }
    }
}

/// Access control list for one token.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlList {
    /// The ACL token.
    pub token: String,
    /// Whether permissions are inherited from the parent token.
    #[serde(default)]
    pub inherit_permissions: bool,
    /// Entries keyed by identity descriptor.
    #[serde(default)]
    pub aces_dictionary: BTreeMap<String, AccessControlEntry>,
}

/// Identity as returned by `_apis/identities`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Identity descriptor used by the security APIs.
    pub descriptor: String,
    /// Subject descriptor used by the graph APIs.
    #[serde(default)]
    pub subject_descriptor: String,
}

/// Standard `{ count, value }` list envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse<T> {
    /// Number of items.
    #[serde(default)]
    pub count: usize,
    /// The items.
    pub value: Vec<T>,
}

/// Body of `POST _apis/accesscontrolentries/{namespace}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAccessControlEntries {
    /// The ACL token.
    pub token: String,
    /// Merge with existing entries instead of replacing them.
    pub merge: bool,
    /// Entries to write.
    pub access_control_entries: Vec<AccessControlEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_service_endpoint_wire_format() {
        let project_id = Uuid::parse_str("5a4c3b2a-1d0e-4f9a-8b7c-6d5e4f3a2b1c").unwrap();
        let endpoint = ServiceEndpoint {
            name: "hook".to_string(),
            endpoint_type: "incomingwebhook".to_string(),
            url: "https://dev.azure.com".to_string(),
            owner: "library".to_string(),
            authorization: EndpointAuthorization::new("None", [("webhookname", "hook")]),
            service_endpoint_project_references: vec![ServiceEndpointProjectReference {
                project_reference: ProjectReference {
                    id: project_id,
                    name: String::new(),
                },
                name: "hook".to_string(),
                description: String::new(),
            }],
            ..Default::default()
        };

        let value = serde_json::to_value(&endpoint).unwrap();
        assert_eq!(value["type"], "incomingwebhook");
        assert!(value.get("id").is_none());
        assert_eq!(value["authorization"]["scheme"], "None");
        assert_eq!(
            value["serviceEndpointProjectReferences"][0]["projectReference"]["id"],
            "5a4c3b2a-1d0e-4f9a-8b7c-6d5e4f3a2b1c"
        );
    }

    #[test]
    fn test_null_parameters_are_dropped() {
        let endpoint: ServiceEndpoint = serde_json::from_value(json!({
            "id": "0f4e9d2c-7b6a-4c5d-9e8f-1a2b3c4d5e6f",
            "name": "argo",
            "type": "argocd",
            "url": "https://argocd.example.com",
            "authorization": {
                "scheme": "Token",
                "parameters": {"apitoken": null}
            },
            "isReady": true
        }))
        .unwrap();

        assert!(endpoint.authorization.parameters.is_empty());
        assert_eq!(endpoint.authorization.parameter("apitoken"), "");
        assert!(endpoint.is_ready);
    }

    #[test]
    fn test_acl_wire_format() {
        let acl: AccessControlList = serde_json::from_value(json!({
            "inheritPermissions": true,
            "token": "repoV2/p",
            "acesDictionary": {
                "Microsoft.TeamFoundation.Identity;S-1": {
                    "descriptor": "Microsoft.TeamFoundation.Identity;S-1",
                    "allow": 2,
                    "deny": 8
                }
            }
        }))
        .unwrap();

        assert_eq!(acl.token, "repoV2/p");
        let ace = &acl.aces_dictionary["Microsoft.TeamFoundation.Identity;S-1"];
        assert_eq!((ace.allow, ace.deny), (2, 8));
    }
}
