//! Request signatures: the identity of a logical request.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::api::Method;
use crate::error::ApiError;

/// Deterministic key identifying a logical request for caching and
/// deduplication.
///
/// Two descriptions with equal signatures are the same request. Derivation is
/// pure and order-stable: JSON objects are canonicalized (keys sorted
/// recursively) before hashing, so semantically equal parameter sets always
/// collapse to one signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestSignature(String);

impl RequestSignature {
  /// Compute the signature for a request description.
  pub fn compute(
    method: Method,
    url: &str,
    params: &BTreeMap<String, Value>,
    body: Option<&Value>,
  ) -> Self {
    let mut input = String::new();
    input.push_str(method.as_str());
    input.push(':');
    input.push_str(url);
    input.push(':');
    write_canonical_map(&mut input, params);
    input.push(':');
    match body {
      Some(body) => write_canonical(&mut input, body),
      None => input.push_str("null"),
    }

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    Self(hex::encode(hasher.finalize()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for RequestSignature {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Compute a signature from arbitrary serializable params and body.
///
/// Fails with [`ApiError::Serialization`] when either cannot be represented
/// as JSON.
pub fn signature_for<P: Serialize, B: Serialize>(
  method: Method,
  url: &str,
  params: &P,
  body: Option<&B>,
) -> Result<RequestSignature, ApiError> {
  let params = serde_json::to_value(params)
    .map_err(|e| ApiError::Serialization(format!("Failed to serialize params: {}", e)))?;

  let params: BTreeMap<String, Value> = match params {
    Value::Object(map) => map.into_iter().collect(),
    Value::Null => BTreeMap::new(),
    other => {
      return Err(ApiError::Serialization(format!(
        "Params must be an object, got {}",
        other
      )))
    }
  };

  let body = body
    .map(|b| {
      serde_json::to_value(b)
        .map_err(|e| ApiError::Serialization(format!("Failed to serialize body: {}", e)))
    })
    .transpose()?;

  Ok(RequestSignature::compute(
    method,
    url,
    &params,
    body.as_ref(),
  ))
}

/// Append a canonical rendering of a JSON value: objects with keys sorted,
/// arrays in order, scalars in their serde_json form.
fn write_canonical(out: &mut String, value: &Value) {
  match value {
    Value::Object(map) => {
      out.push('{');
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      for (i, key) in keys.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&Value::String((*key).clone()).to_string());
        out.push(':');
        write_canonical(out, &map[*key]);
      }
      out.push('}');
    }
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(out, item);
      }
      out.push(']');
    }
    other => out.push_str(&other.to_string()),
  }
}

fn write_canonical_map(out: &mut String, map: &BTreeMap<String, Value>) {
  out.push('{');
  for (i, (key, value)) in map.iter().enumerate() {
    if i > 0 {
      out.push(',');
    }
    out.push_str(&Value::String(key.clone()).to_string());
    out.push(':');
    write_canonical(out, value);
  }
  out.push('}');
}
