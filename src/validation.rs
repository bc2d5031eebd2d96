//! Configuration validation.
//!
//! Two layers live here:
//!
//! - [`validate`] walks a `serde_json::Value` against a [`Schema`] and reports
//!   missing required attributes, type mismatches and block count violations.
//! - Value validators ([`uuid`], [`not_blank`], [`http_url`], ...) check the
//!   content of individual attributes. Resources call them from their typed
//!   configuration structs.
//!
//! Every problem is reported as a [`Diagnostic`] carrying the dotted attribute path.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_azuredevops::schema::{Attribute, Schema};
//! use hemmer_provider_azuredevops::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0().with_attribute("webhook_name", Attribute::required_string());
//!
//! assert!(validate(&schema, &json!({"webhook_name": "hook"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"webhook_name": 42}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("webhook_name".to_string()));
//! ```

use crate::schema::{
    Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema,
};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// Returns an empty list when the value is valid.
///
/// - Required attributes must be present and non-null
/// - Computed-only attributes are skipped (the provider sets these)
/// - Attribute types must match the schema
/// - Nested blocks are validated recursively with min/max item constraints
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Validate a JSON value against a schema, returning the diagnostics as an error.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            let diagnostic =
                Diagnostic::error("Expected object").with_detail(format!("Got {}", type_name(value)));
            diagnostics.push(if path.is_empty() {
                diagnostic
            } else {
                diagnostic.with_attribute(path)
            });
            return;
        },
    };

    for (name, attr) in &block.attributes {
        validate_attribute(attr, obj.get(name), &join_path(path, name), diagnostics);
    }

    for (name, nested) in &block.blocks {
        validate_nested_block(nested, obj.get(name), &join_path(path, name), diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => validate_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if value.as_i64().is_none() {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) => match value.as_array() {
            Some(arr) => {
                for (i, elem) in arr.iter().enumerate() {
                    validate_type(element_type, elem, &format!("{}.{}", path, i), diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "list", value)),
        },
        AttributeType::Map(value_type) => match value.as_object() {
            Some(obj) => {
                for (key, val) in obj {
                    validate_type(value_type, val, &format!("{}.{}", path, key), diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "map", value)),
        },
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (nested.nesting_mode, value) {
        (_, None | Some(Value::Null)) => {
            if nested.min_items > 0 {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s)",
                        path, nested.min_items
                    ))
                    .with_attribute(path),
                );
            }
        },
        (BlockNestingMode::Single, Some(v)) => {
            validate_block(&nested.block, v, path, diagnostics);
        },
        (BlockNestingMode::List, Some(Value::Array(arr))) => {
            let len = arr.len() as u32;

            if len < nested.min_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s), got {}",
                        path, nested.min_items, len
                    ))
                    .with_attribute(path),
                );
            }

            // max_items of 0 means unlimited
            if nested.max_items > 0 && len > nested.max_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' allows at most {} item(s), got {}",
                        path, nested.max_items, len
                    ))
                    .with_attribute(path),
                );
            }

            for (i, item) in arr.iter().enumerate() {
                validate_block(&nested.block, item, &format!("{}.{}", path, i), diagnostics);
            }
        },
        (BlockNestingMode::List, Some(v)) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", type_name(v)))
                    .with_attribute(path),
            );
        },
    }
}

// Value validators

/// The value must parse as a UUID.
pub fn uuid(path: &str, value: &str) -> Option<Diagnostic> {
    match ::uuid::Uuid::parse_str(value) {
        Ok(_) => None,
        Err(_) => Some(
            Diagnostic::error(format!("Expected '{}' to be a valid UUID", path))
                .with_detail(format!("Got {:?}", value))
                .with_attribute(path),
        ),
    }
}

/// The value must not be the empty string.
pub fn not_empty(path: &str, value: &str) -> Option<Diagnostic> {
    if value.is_empty() {
        Some(
            Diagnostic::error(format!("Expected '{}' not to be an empty string", path))
                .with_attribute(path),
        )
    } else {
        None
    }
}

/// The value must contain at least one non-whitespace character.
pub fn not_blank(path: &str, value: &str) -> Option<Diagnostic> {
    if value.trim().is_empty() {
        Some(
            Diagnostic::error(format!(
                "Expected '{}' not to be an empty string or whitespace",
                path
            ))
            .with_attribute(path),
        )
    } else {
        None
    }
}

/// The value must be an absolute `http` or `https` URL with a host.
pub fn http_url(path: &str, value: &str) -> Option<Diagnostic> {
    let error = |detail: String| {
        Some(
            Diagnostic::error(format!(
                "Expected '{}' to be a valid URL with an http or https scheme",
                path
            ))
            .with_detail(detail)
            .with_attribute(path),
        )
    };

    match url::Url::parse(value) {
        Ok(parsed) if !matches!(parsed.scheme(), "http" | "https") => {
            error(format!("Unsupported scheme {:?} in {:?}", parsed.scheme(), value))
        },
        Ok(parsed) if parsed.host_str().is_none_or(str::is_empty) => {
            error(format!("Missing host in {:?}", value))
        },
        Ok(_) => None,
        Err(e) => error(format!("{:?} could not be parsed: {}", value, e)),
    }
}

/// The value must not end with `/`.
pub fn no_trailing_slash(path: &str, value: &str) -> Option<Diagnostic> {
    if value.ends_with('/') {
        Some(
            Diagnostic::error(format!("'{}' should not end with slash", path))
                .with_detail(format!("Got {:?}", value))
                .with_attribute(path),
        )
    } else {
        None
    }
}

/// The value must be one of `allowed`.
pub fn one_of(path: &str, value: &str, allowed: &[&str]) -> Option<Diagnostic> {
    if allowed.contains(&value) {
        None
    } else {
        Some(
            Diagnostic::error(format!(
                "Expected '{}' to be one of [{}]",
                path,
                allowed.join(", ")
            ))
            .with_detail(format!("Got {:?}", value))
            .with_attribute(path),
        )
    }
}

/// Exactly one of the named attributes must be set.
///
/// `present` pairs each attribute name with whether the configuration sets it.
pub fn exactly_one_of(present: &[(&str, bool)]) -> Option<Diagnostic> {
    let set: Vec<&str> = present
        .iter()
        .filter(|(_, is_set)| *is_set)
        .map(|(name, _)| *name)
        .collect();
    if set.len() == 1 {
        return None;
    }

    let names: Vec<&str> = present.iter().map(|(name, _)| *name).collect();
    let detail = if set.is_empty() {
        "None of them is set".to_string()
    } else {
        format!("Found: {}", set.join(", "))
    };
    Some(
        Diagnostic::error(format!("Exactly one of [{}] must be set", names.join(", ")))
            .with_detail(detail)
            .with_attribute(names[0]),
    )
}

/// When `path` is set, `required` must be set too.
pub fn required_with(path: &str, is_set: bool, required: &str, required_set: bool) -> Option<Diagnostic> {
    if is_set && !required_set {
        Some(
            Diagnostic::error(format!(
                "'{}' requires '{}' to be set",
                path, required
            ))
            .with_attribute(path),
        )
    } else {
        None
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeFlags, Block, NestedBlock, Schema};
    use serde_json::json;

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("principal", Attribute::required_string());

        assert!(validate(&schema, &json!({"principal": "vssgp.abc"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("principal".to_string()));

        let diagnostics = validate(&schema, &json!({"principal": null}));
        assert_eq!(diagnostics.len(), 1);

        let diagnostics = validate(&schema, &json!({"principal": 123}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = Schema::v0().with_attribute("id", Attribute::computed_string());

        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"id": 123})).is_empty());
    }

    #[test]
    fn test_validate_bool() {
        let schema = Schema::v0().with_attribute("replace", Attribute::optional_bool());

        assert!(validate(&schema, &json!({"replace": false})).is_empty());
        assert!(validate(&schema, &json!({})).is_empty());
        assert_eq!(validate(&schema, &json!({"replace": "true"})).len(), 1);
    }

    #[test]
    fn test_validate_map() {
        let schema = Schema::v0().with_attribute(
            "permissions",
            Attribute::new(
                AttributeType::map(AttributeType::String),
                AttributeFlags::required(),
            ),
        );

        let diagnostics = validate(
            &schema,
            &json!({"permissions": {"GenericRead": "Allow", "ForcePush": "Deny"}}),
        );
        assert!(diagnostics.is_empty());

        let diagnostics = validate(&schema, &json!({"permissions": {"GenericRead": true}}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some("permissions.GenericRead".to_string())
        );

        let diagnostics = validate(&schema, &json!({"permissions": ["GenericRead"]}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_validate_list_block_bounds() {
        let schema = Schema::v0().with_block(
            "authentication_token",
            NestedBlock::list(Block::new().with_attribute("token", Attribute::required_string()))
                .with_max_items(1),
        );

        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"authentication_token": [{"token": "t"}]})).is_empty());

        let diagnostics = validate(
            &schema,
            &json!({"authentication_token": [{"token": "a"}, {"token": "b"}]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at most 1"));

        let diagnostics = validate(&schema, &json!({"authentication_token": [{}]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some("authentication_token.0.token".to_string())
        );

        let diagnostics = validate(&schema, &json!({"authentication_token": {"token": "t"}}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected list"));
    }

    #[test]
    fn test_validate_single_block() {
        let schema = Schema::v0().with_block(
            "features",
            NestedBlock::single(Block::new().with_attribute("enabled", Attribute::optional_bool()))
                .with_min_items(1),
        );

        assert!(validate(&schema, &json!({"features": {"enabled": true}})).is_empty());
        assert_eq!(validate(&schema, &json!({})).len(), 1);
        assert_eq!(
            validate(&schema, &json!({"features": {"enabled": "yes"}}))[0].attribute,
            Some("features.enabled".to_string())
        );
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = Schema::v0().with_attribute("url", Attribute::required_string());

        let diagnostics = validate(&schema, &json!("https://argocd.example.com"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
        assert!(diagnostics[0].attribute.is_none());
    }

    #[test]
    fn test_validate_result_helper() {
        let schema = Schema::v0().with_attribute("url", Attribute::required_string());

        assert!(validate_result(&schema, &json!({"url": "https://x"})).is_ok());
        assert_eq!(validate_result(&schema, &json!({})).unwrap_err().len(), 1);
    }

    #[test]
    fn test_uuid_validator() {
        assert!(uuid("project_id", "5a4c3b2a-1d0e-4f9a-8b7c-6d5e4f3a2b1c").is_none());
        let diagnostic = uuid("project_id", "not-a-uuid").unwrap();
        assert_eq!(diagnostic.attribute.as_deref(), Some("project_id"));
    }

    #[test]
    fn test_string_validators() {
        assert!(not_empty("webhook_name", "hook").is_none());
        assert!(not_empty("webhook_name", "").is_some());
        assert!(not_empty("webhook_name", " ").is_none());

        assert!(not_blank("branch_name", "main").is_none());
        assert!(not_blank("branch_name", "   ").is_some());
        assert!(not_blank("branch_name", "").is_some());
    }

    #[test]
    fn test_http_url_validator() {
        assert!(http_url("url", "https://example.com").is_none());
        assert!(http_url("url", "http://argocd.local:8080/api").is_none());
        assert!(http_url("url", "ftp://example.com").is_some());
        assert!(http_url("url", "example.com").is_some());
        assert!(http_url("url", "").is_some());
    }

    #[test]
    fn test_trailing_slash_validator() {
        assert!(no_trailing_slash("url", "https://example.com").is_none());
        let diagnostic = no_trailing_slash("url", "https://example.com/").unwrap();
        assert!(diagnostic.summary.contains("should not end with slash"));
    }

    #[test]
    fn test_one_of_validator() {
        let allowed = ["Allow", "Deny", "NotSet"];
        assert!(one_of("permissions.GenericRead", "Deny", &allowed).is_none());
        let diagnostic = one_of("permissions.GenericRead", "allow", &allowed).unwrap();
        assert!(diagnostic.summary.contains("Allow, Deny, NotSet"));
    }

    #[test]
    fn test_exactly_one_of() {
        let both = exactly_one_of(&[("authentication_token", true), ("authentication_basic", true)]);
        assert!(both.is_some_and(|d| d.detail.unwrap().contains("authentication_basic")));

        let neither =
            exactly_one_of(&[("authentication_token", false), ("authentication_basic", false)]);
        assert!(neither.is_some());

        let one = exactly_one_of(&[("authentication_token", false), ("authentication_basic", true)]);
        assert!(one.is_none());
    }

    #[test]
    fn test_required_with() {
        assert!(required_with("branch_name", true, "repository_id", false).is_some());
        assert!(required_with("branch_name", true, "repository_id", true).is_none());
        assert!(required_with("branch_name", false, "repository_id", false).is_none());
    }
}
