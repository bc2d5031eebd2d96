//! Hash memos for write-only secrets.
//!
//! Azure DevOps never returns the plaintext of tokens, passwords or webhook
//! secrets. The provider keeps the configured secret in state, and next to each
//! secret `<name>` it stores a computed `<name>_hash` attribute with the
//! hex-encoded SHA-256 of the value. The planner compares a proposed secret
//! against that memo instead of against what the service reports.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Suffix appended to a secret attribute name to form its memo attribute.
pub const HASH_SUFFIX: &str = "_hash";

/// Name of the memo attribute for `secret`.
pub fn hash_key(secret: &str) -> String {
    format!("{}{}", secret, HASH_SUFFIX)
}

/// Hex-encoded SHA-256 of `secret`.
pub fn hash(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Whether `memo` is the hash of `secret`.
pub fn matches(memo: &str, secret: &str) -> bool {
    memo == hash(secret)
}

/// Refresh the memo for `secret` inside `block`.
///
/// The plaintext in `block` is taken as authoritative. An existing memo is
/// kept when it still matches, otherwise it is recomputed. Returns the memo
/// now stored in the block.
pub fn refresh(block: &mut Map<String, Value>, secret: &str) -> String {
    let key = hash_key(secret);
    let plaintext = block
        .get(secret)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let memo = match block.get(&key).and_then(Value::as_str) {
        Some(existing) if matches(existing, &plaintext) => existing.to_string(),
        _ => hash(&plaintext),
    };
    block.insert(key, Value::String(memo.clone()));
    memo
}

/// Whether the secret in `proposed` differs from the one recorded in `prior`.
///
/// The prior memo is consulted first; the prior plaintext is only used when no
/// memo was recorded (for example right after an import).
pub fn changed(prior: &Map<String, Value>, proposed: &Map<String, Value>, secret: &str) -> bool {
    let proposed_value = proposed.get(secret).and_then(Value::as_str).unwrap_or_default();

    match prior.get(&hash_key(secret)).and_then(Value::as_str) {
        Some(memo) if !memo.is_empty() => !matches(memo, proposed_value),
        _ => {
            let prior_value = prior.get(secret).and_then(Value::as_str).unwrap_or_default();
            prior_value != proposed_value
        },
    }
}
