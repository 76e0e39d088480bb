use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::event::{ApiEvent, ApiEventSender};

/// The transport collaborator the fetch controller dispatches through.
///
/// Implementations perform one HTTP call, parse the response body as JSON,
/// and normalize every failure into an [`ApiError`]. The core never sees
/// wire bytes.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn get(&self, url: &str, params: &BTreeMap<String, Value>) -> Result<Value, ApiError>;
  async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError>;
  async fn put(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError>;
  async fn patch(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError>;
  async fn delete(&self, url: &str) -> Result<Value, ApiError>;
}

/// Production transport over reqwest.
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: String,
  auth_token: RwLock<Option<String>>,
  events: Option<ApiEventSender>,
}

impl HttpTransport {
  /// Create a transport from the given configuration.
  pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
    // Validate the base URL up front so a typo fails at startup, not on the
    // first request
    url::Url::parse(&config.base_url)
      .map_err(|e| ApiError::Unknown(format!("Invalid base URL {}: {}", config.base_url, e)))?;

    let client = reqwest::Client::builder()
      .timeout(config.timeout)
      .build()
      .map_err(|e| ApiError::Unknown(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Self {
      client,
      base_url: config.base_url.trim_end_matches('/').to_string(),
      auth_token: RwLock::new(config.auth_token),
      events: None,
    })
  }

  /// Attach a notification channel; status-specific events are published to
  /// it alongside normalized errors.
  pub fn with_events(mut self, events: ApiEventSender) -> Self {
    self.events = Some(events);
    self
  }

  /// Set the bearer token used for subsequent requests.
  pub fn set_auth_token(&self, token: impl Into<String>) {
    if let Ok(mut guard) = self.auth_token.write() {
      *guard = Some(token.into());
    }
  }

  /// Remove the bearer token.
  pub fn clear_auth_token(&self) {
    if let Ok(mut guard) = self.auth_token.write() {
      *guard = None;
    }
  }

  fn full_url(&self, path: &str) -> String {
    format!("{}/{}", self.base_url, path.trim_start_matches('/'))
  }

  /// Publish the event matching a normalized error, best-effort.
  fn notify(&self, error: &ApiError) {
    if let Some(tx) = &self.events {
      if let Some(event) = ApiEvent::from_error(error) {
        let _ = tx.send(event);
      }
    }
  }

  async fn execute(
    &self,
    method: reqwest::Method,
    path: &str,
    params: Option<&BTreeMap<String, Value>>,
    body: Option<&Value>,
  ) -> Result<Value, ApiError> {
    let url = self.full_url(path);
    let mut request = self.client.request(method.clone(), &url);

    if let Some(params) = params {
      let pairs: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (k.clone(), query_value(v)))
        .collect();
      request = request.query(&pairs);
    }

    if let Some(body) = body {
      request = request.json(body);
    }

    let token = self.auth_token.read().ok().and_then(|g| g.clone());
    if let Some(token) = token {
      request = request.bearer_auth(token);
    }

    tracing::trace!(%method, %url, "dispatching request");

    let response = match request.send().await {
      Ok(response) => response,
      Err(e) => {
        let error = normalize_send_error(e);
        self.notify(&error);
        return Err(error);
      }
    };

    let status = response.status().as_u16();
    if status >= 400 {
      let body: Option<Value> = response.json().await.ok();
      let error = ApiError::from_response(status, body.as_ref());
      tracing::debug!(%url, status, "request failed");
      self.notify(&error);
      return Err(error);
    }

    response
      .json::<Value>()
      .await
      .map_err(|e| ApiError::Serialization(format!("Failed to parse response body: {}", e)))
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn get(&self, url: &str, params: &BTreeMap<String, Value>) -> Result<Value, ApiError> {
    self
      .execute(reqwest::Method::GET, url, Some(params), None)
      .await
  }

  async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
    self.execute(reqwest::Method::POST, url, None, body).await
  }

  async fn put(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
    self.execute(reqwest::Method::PUT, url, None, body).await
  }

  async fn patch(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
    self.execute(reqwest::Method::PATCH, url, None, body).await
  }

  async fn delete(&self, url: &str) -> Result<Value, ApiError> {
    self.execute(reqwest::Method::DELETE, url, None, None).await
  }
}

/// Map a reqwest send failure into the error taxonomy.
fn normalize_send_error(error: reqwest::Error) -> ApiError {
  if error.is_timeout() {
    ApiError::Timeout
  } else if error.is_connect() {
    ApiError::Network(error.to_string())
  } else {
    ApiError::Unknown(error.to_string())
  }
}

/// Render a JSON value as a query-string value. Strings go bare, everything
/// else keeps its JSON rendering.
fn query_value(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_full_url_joining() {
    let transport = HttpTransport::new(ApiConfig::new("https://api.example.com/")).unwrap();
    assert_eq!(
      transport.full_url("/items/1"),
      "https://api.example.com/items/1"
    );
    assert_eq!(transport.full_url("items"), "https://api.example.com/items");
  }

  #[test]
  fn test_invalid_base_url_rejected() {
    assert!(HttpTransport::new(ApiConfig::new("not a url")).is_err());
  }

  #[test]
  fn test_query_value_rendering() {
    assert_eq!(query_value(&json!("abc")), "abc");
    assert_eq!(query_value(&json!(42)), "42");
    assert_eq!(query_value(&json!(true)), "true");
  }
}
