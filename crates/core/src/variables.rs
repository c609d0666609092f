//! Entity variables and sensitive-value redaction.
//!
//! Every variable-owning entity (project, host, group, inventory, periodic
//! task) stores a flat string map. Keys listed in [`SENSITIVE_KEYS`] are
//! never returned as-is from a read path; they render as
//! [`REDACTED_MARKER`].

use std::collections::BTreeMap;

use crate::error::CoreError;

/// Flat key/value variable map. Ordered so rendered output is stable.
pub type Variables = BTreeMap<String, String>;

/// Replacement text for sensitive values on every read path.
pub const REDACTED_MARKER: &str = "[~~ENCRYPTED~~]";

/// Keys whose values are secrets.
pub const SENSITIVE_KEYS: &[&str] = &[
    // Project repository credentials.
    "repo_password",
    "repo_key",
    // Inventory connection secrets.
    "ansible_ssh_pass",
    "ansible_ssh_private_key_file",
    "ansible_become_pass",
    // ansible command line secrets.
    "private-key",
    "key-file",
    "vault-password-file",
    "new-vault-password-file",
];

/// Keys whose value may hold inline key material that must be written to a
/// file before ansible can use it.
pub const KEY_FILE_KEYS: &[&str] = &["ansible_ssh_private_key_file", "private-key", "key-file"];

/// Maximum length of a variable key.
const MAX_KEY_LEN: usize = 256;

/// Whether `key` names a secret.
pub fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.contains(&key)
}

/// Render a single value for display.
pub fn redact_value<'a>(key: &str, value: &'a str) -> &'a str {
    if is_sensitive(key) {
        REDACTED_MARKER
    } else {
        value
    }
}

/// Copy of `vars` with every sensitive value replaced by the marker.
pub fn redacted(vars: &Variables) -> Variables {
    vars.iter()
        .map(|(k, v)| (k.clone(), redact_value(k, v).to_string()))
        .collect()
}

/// Whether a value holds PEM key material rather than a path.
pub fn is_key_material(value: &str) -> bool {
    value.trim_start().starts_with("-----BEGIN")
}

/// Interpret a variable value as a boolean flag.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "on" | "1"
    )
}

/// Merge variable layers. Later layers win.
pub fn merge<'a>(layers: impl IntoIterator<Item = &'a Variables>) -> Variables {
    let mut merged = Variables::new();
    for layer in layers {
        for (k, v) in layer {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

/// Convert a JSON value into a variable string.
///
/// Strings are taken verbatim; every other value uses its JSON encoding.
pub fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Validate a variable key.
///
/// Rules:
/// - Must not be empty or exceed `MAX_KEY_LEN` characters.
/// - Must not contain whitespace or `=` (it would corrupt the rendered
///   inventory).
pub fn validate_key(key: &str) -> Result<(), CoreError> {
    if key.is_empty() {
        return Err(CoreError::Validation(
            "Variable key must not be empty".to_string(),
        ));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(CoreError::Validation(format!(
            "Variable key must not exceed {MAX_KEY_LEN} characters"
        )));
    }
    if key.chars().any(|c| c.is_whitespace() || c == '=') {
        return Err(CoreError::Validation(format!(
            "Variable key '{key}' must not contain whitespace or '='"
        )));
    }
    Ok(())
}
