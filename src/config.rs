use std::time::Duration;

/// Transport configuration.
///
/// All environment access is centralized here; every knob has a default so
/// loading never fails.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  /// Base URL every request path is joined onto
  pub base_url: String,
  /// Per-request timeout enforced by the transport
  pub timeout: Duration,
  /// Bearer token attached to every request, if present
  pub auth_token: Option<String>,
}

impl ApiConfig {
  /// Load configuration from environment variables.
  ///
  /// Checks REQUERY_API_BASE_URL first, then API_BASE_URL as fallback,
  /// defaulting to `http://localhost:3000`. The timeout comes from
  /// REQUERY_API_TIMEOUT_MS (default 30000); the auth token from
  /// REQUERY_API_TOKEN or API_TOKEN and may be absent.
  pub fn from_env() -> Self {
    let base_url = std::env::var("REQUERY_API_BASE_URL")
      .or_else(|_| std::env::var("API_BASE_URL"))
      .unwrap_or_else(|_| "http://localhost:3000".to_string());

    let timeout = std::env::var("REQUERY_API_TIMEOUT_MS")
      .ok()
      .and_then(|v| v.parse().ok())
      .map(Duration::from_millis)
      .unwrap_or(DEFAULT_TIMEOUT);

    let auth_token = std::env::var("REQUERY_API_TOKEN")
      .or_else(|_| std::env::var("API_TOKEN"))
      .ok();

    Self {
      base_url,
      timeout,
      auth_token,
    }
  }

  /// Create a configuration pointing at the given base URL.
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      base_url: base_url.into(),
      timeout: DEFAULT_TIMEOUT,
      auth_token: None,
    }
  }

  /// Set the request timeout.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Set the bearer token.
  pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
    self.auth_token = Some(token.into());
    self
  }
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

impl Default for ApiConfig {
  fn default() -> Self {
    Self::new("http://localhost:3000")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = ApiConfig::default();
    assert_eq!(config.base_url, "http://localhost:3000");
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert!(config.auth_token.is_none());
  }

  #[test]
  fn test_builder() {
    let config = ApiConfig::new("https://api.example.com")
      .with_timeout(Duration::from_secs(5))
      .with_auth_token("secret");

    assert_eq!(config.base_url, "https://api.example.com");
    assert_eq!(config.timeout, Duration::from_secs(5));
    assert_eq!(config.auth_token.as_deref(), Some("secret"));
  }
}
