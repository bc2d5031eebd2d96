//! Plan computation.
//!
//! Turns a prior state and a proposed state into a [`PlanResult`]: schema
//! defaults are applied, computed attributes are carried forward, secrets whose
//! hash memo still matches are not reported as changed, and any change to a
//! force-new attribute marks the plan as a replacement.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::schema::{Block, Schema};
use crate::secret;
use crate::types::{AttributeChange, PlanResult};

/// A write-only secret attribute, optionally nested in a single-item block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretField {
    /// Enclosing block, `None` for a top-level attribute.
    pub block: Option<&'static str>,
    /// Attribute name of the secret.
    pub name: &'static str,
}

impl SecretField {
    /// A top-level secret attribute.
    pub const fn top_level(name: &'static str) -> Self {
        Self { block: None, name }
    }

    /// A secret attribute inside `block`.
    pub const fn nested(block: &'static str, name: &'static str) -> Self {
        Self {
            block: Some(block),
            name,
        }
    }
}

/// Compute the plan for one resource instance.
pub fn plan(
    schema: &Schema,
    secrets: &[SecretField],
    prior: Option<&Value>,
    proposed: Value,
) -> Result<PlanResult, ProviderError> {
    let prior = prior.filter(|p| !p.is_null());
    match (prior, proposed) {
        (None, Value::Null) => Ok(PlanResult::no_change(Value::Null)),
        (Some(prior), Value::Null) => Ok(plan_delete(schema, object(prior, "prior state")?)),
        (None, proposed) => plan_create(schema, proposed),
        (Some(prior), proposed) => plan_update(schema, secrets, object(prior, "prior state")?, proposed),
    }
}

fn object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, ProviderError> {
    value
        .as_object()
        .ok_or_else(|| ProviderError::InvalidRequest(format!("{} must be an object", what)))
}

fn plan_create(schema: &Schema, mut proposed: Value) -> Result<PlanResult, ProviderError> {
    schema.apply_defaults(&mut proposed);
    let mut changes = Vec::new();
    diff(&schema.block, &Map::new(), object(&proposed, "proposed state")?, &mut changes);
    Ok(PlanResult::with_changes(proposed, changes, false))
}

fn plan_delete(schema: &Schema, prior: &Map<String, Value>) -> PlanResult {
    let mut changes = Vec::new();
    diff(&schema.block, prior, &Map::new(), &mut changes);
    PlanResult::with_changes(Value::Null, changes, false)
}

fn plan_update(
    schema: &Schema,
    secrets: &[SecretField],
    prior: &Map<String, Value>,
    mut proposed: Value,
) -> Result<PlanResult, ProviderError> {
    schema.apply_defaults(&mut proposed);
    let Value::Object(mut planned) = proposed else {
        return Err(ProviderError::InvalidRequest(
            "proposed state must be an object".to_string(),
        ));
    };

    carry_computed(&schema.block, prior, &mut planned);

    let mut baseline = prior.clone();
    for field in secrets {
        let Some(prior_container) = container(prior, field) else {
            continue;
        };
        let prior_container = prior_container.clone();
        let Some(planned_container) = container_mut(&mut planned, field) else {
            continue;
        };

        let memo_key = secret::hash_key(field.name);
        if secret::changed(&prior_container, planned_container, field.name) {
            planned_container.remove(&memo_key);
            continue;
        }

        let proposed_secret = planned_container.get(field.name).cloned().unwrap_or(Value::Null);
        if let Some(memo) = prior_container.get(&memo_key) {
            planned_container.insert(memo_key, memo.clone());
        }
        if let Some(base) = container_mut(&mut baseline, field) {
            base.insert(field.name.to_string(), proposed_secret);
        }
    }

    let mut changes = Vec::new();
    diff(&schema.block, &baseline, &planned, &mut changes);

    let requires_replace = changes.iter().any(|c| {
        let top = c.path.split('.').next().unwrap_or_default();
        schema.forces_new(top)
    });

    Ok(PlanResult::with_changes(
        Value::Object(planned),
        changes,
        requires_replace,
    ))
}

/// Copy computed-only attributes from `prior` where `planned` leaves them unset.
fn carry_computed(block: &Block, prior: &Map<String, Value>, planned: &mut Map<String, Value>) {
    for name in block.computed_attributes() {
        let unset = planned.get(name).is_none_or(Value::is_null);
        if let (true, Some(value)) = (unset, prior.get(name)) {
            planned.insert(name.to_string(), value.clone());
        }
    }

    for (name, nested) in &block.blocks {
        let prior_items = items(prior.get(name));
        let Some(planned_value) = planned.get_mut(name) else {
            continue;
        };
        for (index, planned_item) in items_mut(planned_value).into_iter().enumerate() {
            if let Some(prior_item) = prior_items.get(index) {
                carry_computed(&nested.block, prior_item, planned_item);
            }
        }
    }
}

fn items(value: Option<&Value>) -> Vec<&Map<String, Value>> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
        Some(Value::Object(item)) => vec![item],
        _ => Vec::new(),
    }
}

fn items_mut(value: &mut Value) -> Vec<&mut Map<String, Value>> {
    match value {
        Value::Array(items) => items.iter_mut().filter_map(Value::as_object_mut).collect(),
        Value::Object(item) => vec![item],
        _ => Vec::new(),
    }
}

fn container<'a>(root: &'a Map<String, Value>, field: &SecretField) -> Option<&'a Map<String, Value>> {
    match field.block {
        None => Some(root),
        Some(block) => items(root.get(block)).into_iter().next(),
    }
}

fn container_mut<'a>(
    root: &'a mut Map<String, Value>,
    field: &SecretField,
) -> Option<&'a mut Map<String, Value>> {
    match field.block {
        None => Some(root),
        Some(block) => items_mut(root.get_mut(block)?).into_iter().next(),
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn change(path: String, before: Option<&Value>, after: Option<&Value>, sensitive: bool) -> Option<AttributeChange> {
    let change = match (present(before), present(after)) {
        (None, None) => return None,
        (Some(b), Some(a)) if b == a => return None,
        (None, Some(a)) => AttributeChange::added(path, a.clone()),
        (Some(b), None) => AttributeChange::removed(path, b.clone()),
        (Some(b), Some(a)) => AttributeChange::modified(path, b.clone(), a.clone()),
    };
    Some(if sensitive { change.redacted() } else { change })
}

/// Collect attribute changes between two objects described by `block`.
///
/// Computed-only attributes are skipped. Nested blocks are compared item by
/// item with paths of the form `block.index.attribute`.
fn diff(
    block: &Block,
    before: &Map<String, Value>,
    after: &Map<String, Value>,
    changes: &mut Vec<AttributeChange>,
) {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();

    for key in keys {
        if let Some(nested) = block.blocks.get(key.as_str()) {
            let before_items = items(before.get(key));
            let after_items = items(after.get(key));
            let empty = Map::new();
            for index in 0..before_items.len().max(after_items.len()) {
                let b = before_items.get(index).copied().unwrap_or(&empty);
                let a = after_items.get(index).copied().unwrap_or(&empty);
                let mut nested_changes = Vec::new();
                diff(&nested.block, b, a, &mut nested_changes);
                changes.extend(nested_changes.into_iter().map(|c| {
                    AttributeChange::new(format!("{}.{}.{}", key, index, c.path), c.before, c.after)
                }));
            }
            continue;
        }

        let attribute = block.attributes.get(key.as_str());
        if attribute.is_some_and(|a| a.flags.is_computed_only()) {
            continue;
        }
        let sensitive = attribute.is_some_and(|a| a.flags.sensitive);
        if let Some(c) = change(key.clone(), before.get(key), after.get(key), sensitive) {
            changes.push(c);
        }
    }
}
