//! Plan, import and metadata types exchanged with the host.
//!
//! These wrap the raw protobuf types with `serde_json::Value` payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder shown instead of the value of a sensitive attribute.
pub const SENSITIVE_PLACEHOLDER: &str = "(sensitive value)";

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Dotted path to the attribute that changed.
    pub path: String,
    /// The value before the change (None if creating).
    pub before: Option<Value>,
    /// The value after the change (None if deleting).
    pub after: Option<Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// Create a change for a new attribute.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// Create a change for a removed attribute.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// Create a change for a modified attribute.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(path, Some(before), Some(after))
    }

    /// Replace both sides of the change with [`SENSITIVE_PLACEHOLDER`].
    pub fn redacted(self) -> Self {
        let mask = |v: Option<Value>| v.map(|_| Value::String(SENSITIVE_PLACEHOLDER.to_string()));
        Self {
            path: self.path,
            before: mask(self.before),
            after: mask(self.after),
        }
    }
}

impl From<crate::generated::AttributeChange> for AttributeChange {
    fn from(proto: crate::generated::AttributeChange) -> Self {
        Self {
            path: proto.path,
            before: decode_optional(&proto.before),
            after: decode_optional(&proto.after),
        }
    }
}

impl From<AttributeChange> for crate::generated::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        Self {
            path: change.path,
            before: encode_optional(change.before.as_ref()),
            after: encode_optional(change.after.as_ref()),
        }
    }
}

fn decode_optional(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice(bytes).ok()
    }
}

fn encode_optional(value: Option<&Value>) -> Vec<u8> {
    value
        .map(|v| serde_json::to_vec(v).unwrap_or_default())
        .unwrap_or_default()
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation (`null` when destroying).
    pub planned_state: Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource requires replacement.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Create a plan result with no changes.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// Create a plan result with changes.
    pub fn with_changes(
        planned_state: Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }

    /// Whether applying this plan would touch the remote object.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty() || self.requires_replace
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Provider metadata returned by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// List of resource type names.
    pub resources: Vec<String>,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
}

/// Server capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Whether the provider supports planning destroy operations.
    pub plan_destroy: bool,
}

/// The protocol version for the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// The handshake prefix output by providers.
pub const HANDSHAKE_PREFIX: &str = "HEMMER_PROVIDER";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("webhook_name", json!("hook"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("hook")));

        let removed = AttributeChange::removed("http_header", json!("X-Checksum"));
        assert_eq!(removed.before, Some(json!("X-Checksum")));
        assert!(removed.after.is_none());

        let modified = AttributeChange::modified("description", json!("a"), json!("b"));
        assert_eq!(modified.before, Some(json!("a")));
        assert_eq!(modified.after, Some(json!("b")));
    }

    #[test]
    fn test_redacted_change_hides_values() {
        let change = AttributeChange::modified("secret", json!("old"), json!("new")).redacted();
        assert_eq!(change.path, "secret");
        assert_eq!(change.before, Some(json!(SENSITIVE_PLACEHOLDER)));
        assert_eq!(change.after, Some(json!(SENSITIVE_PLACEHOLDER)));

        let added = AttributeChange::added("secret", json!("new")).redacted();
        assert!(added.before.is_none());
    }

    #[test]
    fn test_attribute_change_proto_conversion() {
        let change = AttributeChange::modified("url", json!("https://a"), json!("https://b"));

        let proto: crate::generated::AttributeChange = change.clone().into();
        assert_eq!(proto.path, "url");

        let back: AttributeChange = proto.into();
        assert_eq!(back, change);

        let proto: crate::generated::AttributeChange =
            AttributeChange::added("id", json!("x")).into();
        assert!(proto.before.is_empty());
    }

    #[test]
    fn test_plan_result() {
        let no_change = PlanResult::no_change(json!({"id": "123"}));
        assert!(!no_change.has_changes());

        let replace = PlanResult::with_changes(
            json!({"project_id": "p2"}),
            vec![AttributeChange::modified("project_id", json!("p1"), json!("p2"))],
            true,
        );
        assert!(replace.has_changes());
        assert_eq!(replace.changes.len(), 1);
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new(
            "azuredevops_serviceendpoint_argocd",
            json!({"id": "endpoint-id"}),
        );
        assert_eq!(imported.resource_type, "azuredevops_serviceendpoint_argocd");
        assert_eq!(imported.state["id"], "endpoint-id");
    }

    #[test]
    fn test_protocol_constants() {
        assert_eq!(PROTOCOL_VERSION, 1);
        assert_eq!(HANDSHAKE_PREFIX, "HEMMER_PROVIDER");
    }
}
