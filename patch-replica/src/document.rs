//! JSON Patch application against the replicated document.
//!
//! Application never mutates its input: the patch runs against a clone and
//! the caller swaps the result in on success, so a failed patch leaves the
//! input document bit-for-bit unchanged.

use json_patch::Patch;
use serde_json::Value;

use crate::error::PatchError;

/// The document every node starts from.
pub fn empty() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Parses RFC 6902 patch text.
pub fn decode(payload: &str) -> Result<Patch, PatchError> {
    serde_json::from_str(payload).map_err(|err| PatchError::Decode(err.to_string()))
}

/// Applies `patch` to a copy of `document` and returns the new document.
pub fn apply(document: &Value, patch: &Patch) -> Result<Value, PatchError> {
    let mut next = document.clone();
    json_patch::patch(&mut next, &patch.0).map_err(|err| PatchError::Apply(err.to_string()))?;
    Ok(next)
}

/// Decodes and applies raw payload text in one step.
pub fn apply_payload(document: &Value, payload: &str) -> Result<Value, PatchError> {
    let patch = decode(payload)?;
    apply(document, &patch)
}
