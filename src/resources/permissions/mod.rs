//! Permission resources backed by Azure DevOps security namespaces.
//!
//! A permission resource manages the access control entry of one principal on
//! one ACL token. The shared pieces live here: the schema attributes every
//! permission resource carries, the allow/deny bit arithmetic, and
//! [`SecurityNamespace`], which talks to the security API for one token.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::client::{AccessControlEntry, AggregatedClient};
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};
use crate::validation;

pub mod git;

/// Setting of one permission for one principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionType {
    /// The allow bit is set.
    Allow,
    /// The deny bit is set.
    Deny,
    /// Neither bit is set; the permission is inherited.
    NotSet,
}

impl PermissionType {
    /// Every value, in display order.
    pub const ALL: [PermissionType; 3] = [Self::Allow, Self::Deny, Self::NotSet];

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "Allow",
            Self::Deny => "Deny",
            Self::NotSet => "NotSet",
        }
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                ProviderError::Validation(format!(
                    "invalid permission {:?}, expected one of Allow, Deny, NotSet",
                    s
                ))
            })
    }
}

/// Schema with the attributes shared by every permission resource added.
pub fn permission_schema(schema: Schema) -> Schema {
    schema
        .with_attribute(
            "id",
            Attribute::computed_string().with_description("ACL token and principal."),
        )
        .with_attribute(
            "principal",
            Attribute::required_string()
                .with_force_new()
                .with_description("The subject descriptor of the group or user."),
        )
        .with_attribute(
            "permissions",
            Attribute::new(
                AttributeType::map(AttributeType::String),
                AttributeFlags::required(),
            )
            .with_description("Action name to Allow, Deny or NotSet."),
        )
        .with_attribute(
            "replace",
            Attribute::optional_bool()
                .with_default(json!(true))
                .with_description("Replace the principal's existing permissions."),
        )
}

/// Shared attributes of a permission resource configuration or state.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionConfig {
    /// Subject descriptor of the principal.
    pub principal: String,
    /// Action name to permission value.
    #[serde(default)]
    pub permissions: BTreeMap<String, String>,
    /// Whether the principal's entry is rebuilt from scratch.
    #[serde(default)]
    pub replace: Option<bool>,
}

impl PermissionConfig {
    /// Whether to replace the existing entry. Defaults to `true`.
    pub fn replace(&self) -> bool {
        self.replace.unwrap_or(true)
    }

    /// Parsed permission values keyed by action name.
    pub fn parsed_permissions(&self) -> Result<BTreeMap<String, PermissionType>, ProviderError> {
        self.permissions
            .iter()
            .map(|(name, value)| Ok((name.clone(), value.parse()?)))
            .collect()
    }

    /// Whether every configured value is `NotSet`.
    pub fn all_not_set(&self) -> bool {
        self.permissions
            .values()
            .all(|v| v.parse::<PermissionType>().ok() == Some(PermissionType::NotSet))
    }

    /// Check the principal and each permission value.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics: Vec<Diagnostic> = validation::not_blank("principal", &self.principal)
            .into_iter()
            .collect();
        for (name, value) in &self.permissions {
            if value.parse::<PermissionType>().is_err() {
                let allowed: Vec<&str> = PermissionType::ALL.iter().map(|p| p.as_str()).collect();
                diagnostics.extend(validation::one_of(
                    &format!("permissions.{}", name),
                    value,
                    &allowed,
                ));
            }
        }
        diagnostics
    }
}

/// Apply `permissions` (bit, value) to `entry`.
///
/// With `replace` the entry starts from no bits at all, otherwise from its
/// current masks.
pub fn apply_permissions(
    mut entry: AccessControlEntry,
    permissions: &[(i32, PermissionType)],
    replace: bool,
) -> AccessControlEntry {
    if replace {
        entry.allow = 0;
        entry.deny = 0;
    }
    for (bit, permission) in permissions {
        match permission {
            PermissionType::Allow => {
                entry.allow |= bit;
                entry.deny &= !bit;
            },
            PermissionType::Deny => {
                entry.deny |= bit;
                entry.allow &= !bit;
            },
            PermissionType::NotSet => {
                entry.allow &= !bit;
                entry.deny &= !bit;
            },
        }
    }
    entry
}

/// The permission value `entry` holds for `bit`.
pub fn permission_of(entry: &AccessControlEntry, bit: i32) -> PermissionType {
    if entry.deny & bit != 0 {
        PermissionType::Deny
    } else if entry.allow & bit != 0 {
        PermissionType::Allow
    } else {
        PermissionType::NotSet
    }
}

/// One ACL token inside a security namespace.
pub struct SecurityNamespace<'a> {
    client: &'a AggregatedClient,
    namespace_id: Uuid,
    token: String,
}

impl<'a> SecurityNamespace<'a> {
    /// Bind a token of a namespace to a client.
    pub fn new(client: &'a AggregatedClient, namespace_id: Uuid, token: impl Into<String>) -> Self {
        Self {
            client,
            namespace_id,
            token: token.into(),
        }
    }

    /// The ACL token.
    pub fn token(&self) -> &str {
        &self.token
    }

    async fn action_bits(&self) -> Result<HashMap<String, i32>, ProviderError> {
        let actions = self.client.security.action_definitions(self.namespace_id).await?;
        Ok(actions
            .into_iter()
            .map(|a| (a.name.to_ascii_lowercase(), a.bit))
            .collect())
    }

    fn resolve<'n>(
        bits: &HashMap<String, i32>,
        names: impl IntoIterator<Item = &'n String>,
    ) -> Result<Vec<(&'n String, i32)>, ProviderError> {
        names
            .into_iter()
            .map(|name| {
                bits.get(&name.to_ascii_lowercase())
                    .map(|bit| (name, *bit))
                    .ok_or_else(|| {
                        ProviderError::Validation(format!(
                            "unknown permission {:?} {}",
                            name,
                            known_actions_hint(bits)
                        ))
                    })
            })
            .collect()
    }

    async fn current_entry(&self, descriptor: &str) -> Result<Option<AccessControlEntry>, ProviderError> {
        let acls = self
            .client
            .security
            .access_control_lists(self.namespace_id, &self.token, &[descriptor.to_string()])
            .await?;
        Ok(acls
            .into_iter()
            .find(|acl| acl.token.eq_ignore_ascii_case(&self.token))
            .and_then(|acl| acl.aces_dictionary.get(descriptor).cloned()))
    }

    /// Write `permissions` for `principal` (a subject descriptor).
    pub async fn set_principal_permissions(
        &self,
        principal: &str,
        permissions: &BTreeMap<String, PermissionType>,
        replace: bool,
    ) -> Result<(), ProviderError> {
        let bits = self.action_bits().await?;
        let resolved = Self::resolve(&bits, permissions.keys())?;
        let descriptor = self.client.security.identity_descriptor(principal).await?;

        let current = if replace {
            AccessControlEntry::empty(&descriptor)
        } else {
            self.current_entry(&descriptor)
                .await?
                .unwrap_or_else(|| AccessControlEntry::empty(&descriptor))
        };

        let updates: Vec<(i32, PermissionType)> = resolved
            .iter()
            .map(|(name, bit)| (*bit, permissions[name.as_str()]))
            .collect();
        let entry = apply_permissions(current, &updates, replace);

        debug!(
            token = %self.token,
            allow = entry.allow,
            deny = entry.deny,
            replace,
            "Setting access control entry"
        );
        self.client
            .security
            .set_access_control_entries(self.namespace_id, &self.token, &[entry], false)
            .await
    }

    /// Read the permissions named in `names` for `principal`.
    ///
    /// Returns `None` when the token has no entry for the principal. Only the
    /// requested names are reported.
    pub async fn get_principal_permissions<'n>(
        &self,
        principal: &str,
        names: impl IntoIterator<Item = &'n String>,
    ) -> Result<Option<BTreeMap<String, PermissionType>>, ProviderError> {
        let bits = self.action_bits().await?;
        let resolved = Self::resolve(&bits, names)?;
        let descriptor = self.client.security.identity_descriptor(principal).await?;

        let Some(entry) = self.current_entry(&descriptor).await? else {
            return Ok(None);
        };
        Ok(Some(
            resolved
                .into_iter()
                .map(|(name, bit)| (name.clone(), permission_of(&entry, bit)))
                .collect(),
        ))
    }
}

fn known_actions_hint(bits: &HashMap<String, i32>) -> String {
    let mut known: Vec<&str> = bits.keys().map(String::as_str).collect();
    known.sort_unstable();
    format!("(known actions: {})", known.join(", "))
}

/// Permission map for state, keeping the configured spelling of values that
/// did not change.
pub fn permissions_to_state(
    configured: &BTreeMap<String, String>,
    actual: &BTreeMap<String, PermissionType>,
) -> Value {
    let map: serde_json::Map<String, Value> = actual
        .iter()
        .map(|(name, permission)| {
            let value = match configured.get(name) {
                Some(spelling) if spelling.parse::<PermissionType>().ok() == Some(*permission) => {
                    spelling.clone()
                },
                _ => permission.as_str().to_string(),
            };
            (name.clone(), Value::String(value))
        })
        .collect();
    Value::Object(map)
}
