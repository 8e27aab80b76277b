//! Reference resolution and substitution.

use fanout_abstraction::{SubRequest, SubResult};
use serde_json::Value;
use tracing::trace;

use crate::error::ReferenceError;
use crate::path::PropertyPath;
use crate::reference::{self, ReferenceToken};

/// Resolves `token` for the sub-request at `current_index`.
///
/// `results` holds one slot per sub-request; `None` marks a slot that has
/// not produced a result yet.
pub fn resolve_reference(
    token: &ReferenceToken,
    current_index: usize,
    results: &[Option<SubResult>],
) -> Result<Value, ReferenceError> {
    let source_index = token.source_index;
    if source_index >= current_index {
        return Err(ReferenceError::NotPreceding { index: current_index, source_index });
    }

    let result = results
        .get(source_index)
        .ok_or(ReferenceError::OutOfRange { source_index, available: results.len() })?
        .as_ref()
        .ok_or(ReferenceError::Pending { source_index })?;

    let path = PropertyPath::parse(&token.property_path).map_err(|e| {
        ReferenceError::MalformedPath { path: token.property_path.clone(), reason: e.to_string() }
    })?;

    path.lookup(&result.body).cloned().map_err(|e| ReferenceError::PathNotFound {
        source_index,
        path: token.property_path.clone(),
        reason: e.to_string(),
    })
}

/// Returns a copy of `request` with every reference replaced.
///
/// Path segments receive the percent-encoded text form of the referenced
/// value, so a value containing `/` or `?` stays within its segment. A payload
/// string consisting of exactly one reference is replaced by the referenced
/// value itself, keeping its JSON type; otherwise the text form is spliced in.
pub fn substitute_request(
    request: &SubRequest,
    index: usize,
    results: &[Option<SubResult>],
) -> Result<SubRequest, ReferenceError> {
    let path = reference::split_path(&request.path)
        .into_iter()
        .map(|segment| substitute_segment(segment, index, results))
        .collect::<Result<Vec<_>, _>>()?
        .join("/");

    let payload = request
        .payload
        .as_ref()
        .map(|payload| substitute_value(payload, index, results))
        .transpose()?;

    if path != request.path {
        trace!(index, from = %request.path, to = %path, "Substituted path references");
    }

    Ok(SubRequest { method: request.method.clone(), path, payload })
}

fn substitute_segment(
    segment: &str,
    index: usize,
    results: &[Option<SubResult>],
) -> Result<String, ReferenceError> {
    let parsed = reference::parse(segment);
    match parsed.reference() {
        Some(token) => {
            let value = resolve_reference(&token, index, results)?;
            Ok(format!("{}{}", urlencoding::encode(&render(&value)), parsed.remainder()))
        }
        None => Ok(segment.to_string()),
    }
}

fn substitute_value(
    value: &Value,
    index: usize,
    results: &[Option<SubResult>],
) -> Result<Value, ReferenceError> {
    match value {
        Value::String(text) => {
            let parsed = reference::parse(text);
            let Some(token) = parsed.reference() else {
                return Ok(value.clone());
            };
            let resolved = resolve_reference(&token, index, results)?;
            if parsed.remainder().is_empty() {
                Ok(resolved)
            } else {
                Ok(Value::String(format!("{}{}", render(&resolved), parsed.remainder())))
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|item| substitute_value(item, index, results))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(key, item)| {
                substitute_value(item, index, results).map(|item| (key.clone(), item))
            })
            .collect::<Result<serde_json::Map<_, _>, _>>()
            .map(Value::Object),
        _ => Ok(value.clone()),
    }
}

/// Text form of a value inside an address: strings unquoted, everything else
/// as compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
