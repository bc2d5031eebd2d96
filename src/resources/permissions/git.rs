//! `azuredevops_git_permissions`: permissions of a principal on Git repositories.
//!
//! ACL tokens in the Git Repositories namespace have the shapes:
//!
//! - `repoV2/{project}`: all repositories of a project
//! - `repoV2/{project}/{repository}`: one repository
//! - `repoV2/{project}/{repository}/refs/heads/{branch}`: one branch, where
//!   `{branch}` is the UTF-16LE hex encoding of the last path segment

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    permission_schema, permissions_to_state, PermissionConfig, PermissionType, SecurityNamespace,
};
use crate::client::{ActionDefinition, AggregatedClient};
use crate::error::ProviderError;
use crate::resources::{decode, ensure_valid, into_object, Resource};
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::validation;

/// Id of the Git Repositories security namespace.
pub const GIT_NAMESPACE_ID: Uuid = Uuid::from_u128(0x2e9eb7ed_3c0a_47d4_87c1_0ffdd275fd87);

/// Actions of the Git Repositories namespace and their bits.
pub const GIT_ACTIONS: &[(&str, i32)] = &[
    ("Administer", 1),
    ("GenericRead", 2),
    ("GenericContribute", 4),
    ("ForcePush", 8),
    ("CreateBranch", 16),
    ("CreateTag", 32),
    ("ManageNote", 64),
    ("PolicyExempt", 128),
    ("CreateRepository", 256),
    ("DeleteRepository", 512),
    ("RenameRepository", 1024),
    ("EditPolicies", 2048),
    ("RemoveOthersLocks", 4096),
    ("ManagePermissions", 8192),
    ("PullRequestContribute", 16384),
    ("PullRequestBypassPolicy", 32768),
];

/// [`GIT_ACTIONS`] as action definitions.
pub fn git_action_definitions() -> Vec<ActionDefinition> {
    GIT_ACTIONS
        .iter()
        .map(|(name, bit)| ActionDefinition::new(*bit, *name))
        .collect()
}

/// Hex encoding of the UTF-16LE bytes of `value`.
pub fn encode_utf16_hex(value: &str) -> String {
    let bytes: Vec<u8> = value.encode_utf16().flat_map(u16::to_le_bytes).collect();
    hex::encode(bytes)
}

#[derive(Debug, Clone, Deserialize)]
struct GitPermissionsConfig {
    #[serde(flatten)]
    permission: PermissionConfig,
    project_id: String,
    #[serde(default)]
    repository_id: Option<String>,
    #[serde(default)]
    branch_name: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Build the ACL token for a project, repository and branch.
pub fn create_git_token(
    project_id: &str,
    repository_id: Option<&str>,
    branch_name: Option<&str>,
) -> Result<String, ProviderError> {
    let mut token = format!("repoV2/{}", project_id);
    if let Some(repository_id) = repository_id {
        token.push('/');
        token.push_str(repository_id);
    }
    if let Some(branch_name) = branch_name {
        if repository_id.is_none() {
            return Err(ProviderError::Validation(format!(
                "Unable to create ACL token for branch {}, because no repository is specified",
                branch_name
            )));
        }
        let leaf = branch_name.rsplit('/').next().unwrap_or(branch_name);
        token.push_str("/refs/heads/");
        token.push_str(&encode_utf16_hex(leaf));
    }
    Ok(token)
}

/// Every configured action reported as `NotSet`.
fn not_set_state(config: &PermissionConfig) -> Value {
    Value::Object(
        config
            .permissions
            .keys()
            .map(|name| (name.clone(), json!(PermissionType::NotSet.as_str())))
            .collect::<Map<String, Value>>(),
    )
}

impl GitPermissionsConfig {
    fn token(&self) -> Result<String, ProviderError> {
        create_git_token(
            &self.project_id,
            non_empty(&self.repository_id),
            non_empty(&self.branch_name),
        )
    }
}

/// The Git permissions resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitPermissions;

impl GitPermissions {
    async fn read_permissions(
        client: &AggregatedClient,
        config: &GitPermissionsConfig,
    ) -> Result<Option<Value>, ProviderError> {
        let token = config.token()?;
        let namespace = SecurityNamespace::new(client, GIT_NAMESPACE_ID, token);
        let actual = namespace
            .get_principal_permissions(
                &config.permission.principal,
                config.permission.permissions.keys(),
            )
            .await?;

        if actual.is_none() {
            info!(token = %namespace.token(), "Permissions for ACL token not found");
        }
        Ok(actual.map(|actual| permissions_to_state(&config.permission.permissions, &actual)))
    }

    async fn apply(&self, client: &AggregatedClient, planned: Value) -> Result<Value, ProviderError> {
        ensure_valid(self.validate(&planned))?;
        let config: GitPermissionsConfig = decode(&planned, "configuration")?;
        let token = config.token()?;
        let permissions = config.permission.parsed_permissions()?;

        SecurityNamespace::new(client, GIT_NAMESPACE_ID, token.clone())
            .set_principal_permissions(
                &config.permission.principal,
                &permissions,
                config.permission.replace(),
            )
            .await?;

        let permissions_state = match Self::read_permissions(client, &config).await? {
            Some(state) => state,
            None => not_set_state(&config.permission),
        };

        let mut state = into_object(planned, "planned state")?;
        state.insert(
            "id".to_string(),
            json!(format!("{}/{}", token, config.permission.principal)),
        );
        state.insert("permissions".to_string(), permissions_state);
        state
            .entry("replace")
            .or_insert_with(|| json!(config.permission.replace()));
        Ok(Value::Object(state))
    }
}

#[async_trait]
impl Resource for GitPermissions {
    fn type_name(&self) -> &'static str {
        "azuredevops_git_permissions"
    }

    fn schema(&self) -> Schema {
        permission_schema(Schema::v0())
            .with_attribute(
                "project_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The ID of the project."),
            )
            .with_attribute(
                "repository_id",
                Attribute::optional_string()
                    .with_force_new()
                    .with_description("The ID of the Git repository."),
            )
            .with_attribute(
                "branch_name",
                Attribute::optional_string()
                    .with_force_new()
                    .with_description("The name of the branch. Requires repository_id."),
            )
    }

    fn validate_values(&self, config: &Value) -> Vec<Diagnostic> {
        let config: GitPermissionsConfig = match decode(config, "configuration") {
            Ok(config) => config,
            Err(e) => return vec![Diagnostic::error(e.to_string())],
        };

        let mut diagnostics = config.permission.validate();
        diagnostics.extend(validation::uuid("project_id", &config.project_id));
        if let Some(repository_id) = &config.repository_id {
            diagnostics.extend(validation::uuid("repository_id", repository_id));
        }
        if let Some(branch_name) = &config.branch_name {
            diagnostics.extend(validation::not_blank("branch_name", branch_name));
        }
        diagnostics.extend(validation::required_with(
            "branch_name",
            config.branch_name.is_some(),
            "repository_id",
            config.repository_id.is_some(),
        ));
        diagnostics
    }

    async fn create(&self, client: &AggregatedClient, planned: Value) -> Result<Value, ProviderError> {
        self.apply(client, planned).await
    }

    async fn read(&self, client: &AggregatedClient, state: Value) -> Result<Value, ProviderError> {
        let config: GitPermissionsConfig = decode(&state, "state")?;
        let permissions = match Self::read_permissions(client, &config).await? {
            Some(permissions) => permissions,
            // The service drops an entry holding nothing but NotSet.
            None if config.permission.all_not_set() => not_set_state(&config.permission),
            None => {
                warn!(principal = %config.permission.principal, "Removing permissions from state");
                return Ok(Value::Null);
            },
        };

        let mut state = into_object(state, "state")?;
        state.insert("permissions".to_string(), permissions);
        Ok(Value::Object(state))
    }

    async fn update(
        &self,
        client: &AggregatedClient,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        self.apply(client, planned).await
    }

    async fn delete(&self, client: &AggregatedClient, state: Value) -> Result<(), ProviderError> {
        let config: GitPermissionsConfig = decode(&state, "state")?;
        let not_set: BTreeMap<String, PermissionType> = config
            .permission
            .permissions
            .keys()
            .map(|name| (name.clone(), PermissionType::NotSet))
            .collect();

        SecurityNamespace::new(client, GIT_NAMESPACE_ID, config.token()?)
            .set_principal_permissions(&config.permission.principal, &not_set, true)
            .await?;
        info!(principal = %config.permission.principal, "Cleared Git permissions");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MemoryClient, IDENTITY_PREFIX};
    use std::sync::Arc;

    const PROJECT: &str = "9d1f3c2e-4b5a-4c6d-8e7f-0a1b2c3d4e5f";
    const REPOSITORY: &str = "1b2c3d4e-5f60-4718-8293-a4b5c6d7e8f9";
    const PRINCIPAL: &str = "vssgp.Uy0xLTktMTU1MTM3NDI0NQ";

    fn client() -> (Arc<MemoryClient>, AggregatedClient) {
        let memory =
            Arc::new(MemoryClient::new().with_namespace(GIT_NAMESPACE_ID, git_action_definitions()));
        (memory.clone(), AggregatedClient::in_memory(memory))
    }

    fn config(permissions: Value) -> Value {
        json!({
            "project_id": PROJECT,
            "repository_id": REPOSITORY,
            "principal": PRINCIPAL,
            "permissions": permissions,
            "replace": true
        })
    }

    #[test]
    fn test_encode_utf16_hex() {
        assert_eq!(encode_utf16_hex("master"), "6d0061007300740065007200");
        assert_eq!(encode_utf16_hex(""), "");
    }

    #[test]
    fn test_namespace_id() {
        assert_eq!(GIT_NAMESPACE_ID.to_string(), "2e9eb7ed-3c0a-47d4-87c1-0ffdd275fd87");
    }

    #[test]
    fn test_create_git_token() {
        assert_eq!(create_git_token("p", None, None).unwrap(), "repoV2/p");
        assert_eq!(create_git_token("p", Some("r"), None).unwrap(), "repoV2/p/r");
        assert_eq!(
            create_git_token("p", Some("r"), Some("refs/heads/master")).unwrap(),
            "repoV2/p/r/refs/heads/6d0061007300740065007200"
        );
        assert_eq!(
            create_git_token("p", Some("r"), Some("master")).unwrap(),
            "repoV2/p/r/refs/heads/6d0061007300740065007200"
        );

        let err = create_git_token("p", None, Some("master")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: Unable to create ACL token for branch master, because no repository is specified"
        );
    }

    #[test]
    fn test_validate() {
        let resource = GitPermissions;
        assert!(resource.validate(&config(json!({"GenericRead": "Allow"}))).is_empty());

        let mut branch_only = config(json!({"GenericRead": "Allow"}));
        branch_only.as_object_mut().unwrap().remove("repository_id");
        branch_only["branch_name"] = json!("main");
        let diagnostics = resource.validate(&branch_only);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("branch_name"));

        let mut bad_project = config(json!({"GenericRead": "Allow"}));
        bad_project["project_id"] = json!("not-a-uuid");
        assert_eq!(
            resource.validate(&bad_project)[0].attribute.as_deref(),
            Some("project_id")
        );

        let missing = json!({"project_id": PROJECT, "permissions": {}});
        assert!(resource
            .validate(&missing)
            .iter()
            .any(|d| d.attribute.as_deref() == Some("principal")));
    }

    #[tokio::test]
    async fn test_create_read_delete() {
        let (memory, client) = client();
        let resource = GitPermissions;
        let token = format!("repoV2/{}/{}", PROJECT, REPOSITORY);
        let descriptor = format!("{}{}", IDENTITY_PREFIX, PRINCIPAL);

        let state = resource
            .create(
                &client,
                config(json!({"GenericRead": "Allow", "ForcePush": "Deny", "ManageNote": "NotSet"})),
            )
            .await
            .unwrap();

        assert_eq!(state["id"], json!(format!("{}/{}", token, PRINCIPAL)));
        assert_eq!(
            state["permissions"],
            json!({"GenericRead": "Allow", "ForcePush": "Deny", "ManageNote": "NotSet"})
        );
        let entry = memory.stored_entry(GIT_NAMESPACE_ID, &token, &descriptor).unwrap();
        assert_eq!((entry.allow, entry.deny), (2, 8));

        let read = resource.read(&client, state.clone()).await.unwrap();
        assert_eq!(read["permissions"], state["permissions"]);

        resource.delete(&client, state.clone()).await.unwrap();
        assert!(memory.stored_entry(GIT_NAMESPACE_ID, &token, &descriptor).is_none());
        assert!(resource.read(&client, state).await.unwrap().is_null());
    }

    #[tokio::test]
    async fn test_all_not_set_survives_read() {
        let (memory, client) = client();
        let resource = GitPermissions;
        let token = format!("repoV2/{}/{}", PROJECT, REPOSITORY);
        let descriptor = format!("{}{}", IDENTITY_PREFIX, PRINCIPAL);

        let state = resource
            .create(&client, config(json!({"GenericRead": "NotSet"})))
            .await
            .unwrap();
        assert_eq!(state["permissions"], json!({"GenericRead": "NotSet"}));
        assert!(memory.stored_entry(GIT_NAMESPACE_ID, &token, &descriptor).is_none());

        let read = resource.read(&client, state.clone()).await.unwrap();
        assert_eq!(read["permissions"], json!({"GenericRead": "NotSet"}));
        assert_eq!(read["id"], state["id"]);
    }

    #[tokio::test]
    async fn test_missing_entry_with_allow_is_gone() {
        let (_, client) = client();
        let state = json!({
            "id": format!("repoV2/{}/{}/{}", PROJECT, REPOSITORY, PRINCIPAL),
            "project_id": PROJECT,
            "repository_id": REPOSITORY,
            "principal": PRINCIPAL,
            "permissions": {"GenericRead": "Allow", "ForcePush": "NotSet"},
            "replace": true
        });
        assert!(GitPermissions.read(&client, state).await.unwrap().is_null());
    }

    #[tokio::test]
    async fn test_read_reports_only_configured_actions() {
        let (_, client) = client();
        let resource = GitPermissions;

        resource
            .create(&client, config(json!({"GenericRead": "Allow", "CreateTag": "Allow"})))
            .await
            .unwrap();

        let narrow = config(json!({"GenericRead": "Allow"}));
        let read = resource.read(&client, narrow).await.unwrap();
        assert_eq!(read["permissions"], json!({"GenericRead": "Allow"}));
    }

    #[tokio::test]
    async fn test_merge_keeps_unmanaged_bits() {
        let (memory, client) = client();
        let resource = GitPermissions;
        let token = format!("repoV2/{}/{}", PROJECT, REPOSITORY);
        let descriptor = format!("{}{}", IDENTITY_PREFIX, PRINCIPAL);

        resource
            .create(&client, config(json!({"GenericRead": "Allow"})))
            .await
            .unwrap();

        let mut merge = config(json!({"CreateBranch": "Allow"}));
        merge["replace"] = json!(false);
        resource.create(&client, merge).await.unwrap();

        let entry = memory.stored_entry(GIT_NAMESPACE_ID, &token, &descriptor).unwrap();
        assert_eq!(entry.allow, 2 | 16);
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let (_, client) = client();
        let err = GitPermissions
            .create(&client, config(json!({"FlyToTheMoon": "Allow"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(err.to_string().contains("FlyToTheMoon"));
    }
}
