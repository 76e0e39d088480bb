//! Normalized error taxonomy for the fetch layer.
//!
//! The transport turns raw HTTP failures into one [`ApiError`]; everything
//! above it (cache, dedupe, the fetch controller) only ever sees this type.
//! Errors are `Clone` so a settled result can be fanned out to every caller
//! that joined a deduplicated execution.

use serde_json::Value;

/// A single field-level validation failure from a 422 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
  /// Field name, empty when the error is not tied to a field
  pub key: String,
  pub message: String,
}

/// Normalized fetch error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
  #[error("Network error: {0}")]
  Network(String),

  #[error("Request timeout")]
  Timeout,

  #[error("HTTP error {status}: {message}")]
  HttpStatus { status: u16, message: String },

  #[error("Validation failed: {} field(s)", .0.len())]
  Validation(Vec<FieldError>),

  #[error("Serialization error: {0}")]
  Serialization(String),

  #[error("Unknown error: {0}")]
  Unknown(String),
}

impl ApiError {
  /// The wire status this error corresponds to, when one applies.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Timeout => Some(408),
      Self::HttpStatus { status, .. } => Some(*status),
      Self::Validation(_) => Some(422),
      _ => None,
    }
  }

  /// Normalize a non-2xx response into an error.
  ///
  /// Status 422 is decomposed into per-field validation entries; everything
  /// else becomes [`ApiError::HttpStatus`] with the best message the body
  /// offers.
  pub fn from_response(status: u16, body: Option<&Value>) -> Self {
    if status == 422 {
      return Self::Validation(parse_validation_errors(body));
    }

    Self::HttpStatus {
      status,
      message: extract_message(body).unwrap_or_else(|| default_message(status).to_string()),
    }
  }
}

/// Pull a human-readable message out of an error body.
///
/// Servers wrap messages either as `{"error": {"message": ...}}` or as a
/// top-level `{"message": ...}`.
fn extract_message(body: Option<&Value>) -> Option<String> {
  let body = body?;

  if let Some(msg) = body
    .get("error")
    .and_then(|e| e.get("message"))
    .and_then(Value::as_str)
  {
    return Some(msg.to_string());
  }

  body.get("message").and_then(Value::as_str).map(String::from)
}

fn default_message(status: u16) -> &'static str {
  match status {
    400 => "Bad Request",
    401 => "Unauthorized",
    403 => "Forbidden",
    404 => "Not Found",
    408 => "Request Timeout",
    422 => "Unprocessable Entity",
    500 => "Internal Server Error",
    502 => "Bad Gateway",
    503 => "Service Unavailable",
    _ => "Request failed",
  }
}

/// Decompose a 422 body into per-field errors.
///
/// The message under `error.message` is either a plain string or an
/// arbitrarily nested object where leaves are strings or `{"value": "..."}`
/// wrappers; nested objects are unwrapped recursively.
pub fn parse_validation_errors(body: Option<&Value>) -> Vec<FieldError> {
  let message = body.and_then(|b| b.get("error")).and_then(|e| e.get("message"));

  let message = match message {
    Some(m) => m,
    None => {
      return vec![FieldError {
        key: String::new(),
        message: "Unknown validation error.".to_string(),
      }]
    }
  };

  match message {
    Value::String(s) => vec![FieldError {
      key: String::new(),
      message: s.clone(),
    }],
    Value::Object(map) => {
      let mut errors = Vec::new();
      extract_field_errors(map, &mut errors);
      if errors.is_empty() {
        errors.push(FieldError {
          key: String::new(),
          message: "Unknown validation error.".to_string(),
        });
      }
      errors
    }
    _ => vec![FieldError {
      key: String::new(),
      message: "Unknown validation error.".to_string(),
    }],
  }
}

fn extract_field_errors(map: &serde_json::Map<String, Value>, out: &mut Vec<FieldError>) {
  for (key, value) in map {
    match value {
      Value::Object(inner) => {
        // A {"value": "..."} wrapper is a leaf; anything else nests further
        if let Some(v) = inner.get("value") {
          out.push(FieldError {
            key: key.clone(),
            message: v
              .as_str()
              .unwrap_or("Unknown validation error.")
              .to_string(),
          });
        } else {
          extract_field_errors(inner, out);
        }
      }
      Value::String(s) => out.push(FieldError {
        key: key.clone(),
        message: s.clone(),
      }),
      _ => out.push(FieldError {
        key: key.clone(),
        message: "Validation error".to_string(),
      }),
    }
  }
}
