//! Transport notification channel.
//!
//! Status-specific reactions (redirect to login on 401, toast on 5xx, ...)
//! belong to the application shell, not the fetch layer. The transport
//! publishes [`ApiEvent`]s on an optional channel the shell subscribes to and
//! stays otherwise oblivious to what happens with them.

use tokio::sync::mpsc;

use crate::error::{ApiError, FieldError};

/// Notification emitted by the transport alongside a normalized failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiEvent {
  /// 401 - session is gone, the shell should re-authenticate
  Unauthorized,
  /// 403
  Forbidden,
  /// 404
  NotFound,
  /// 408 or a transport-level timeout
  Timeout,
  /// 5xx
  ServerError,
  /// Connection refused / aborted / DNS failure
  NetworkError,
  /// 422, with the decomposed field errors
  ValidationFailed(Vec<FieldError>),
}

impl ApiEvent {
  /// Derive the event matching a normalized error, if any.
  pub fn from_error(error: &ApiError) -> Option<Self> {
    match error {
      ApiError::Network(_) => Some(Self::NetworkError),
      ApiError::Timeout => Some(Self::Timeout),
      ApiError::Validation(fields) => Some(Self::ValidationFailed(fields.clone())),
      ApiError::HttpStatus { status, .. } => match status {
        401 => Some(Self::Unauthorized),
        403 => Some(Self::Forbidden),
        404 => Some(Self::NotFound),
        408 => Some(Self::Timeout),
        500..=599 => Some(Self::ServerError),
        _ => None,
      },
      _ => None,
    }
  }
}

/// Sender half handed to the transport.
pub type ApiEventSender = mpsc::UnboundedSender<ApiEvent>;

/// Create the notification channel.
///
/// The receiver goes to the application shell; the sender to
/// [`HttpTransport::with_events`](crate::api::HttpTransport::with_events).
pub fn channel() -> (ApiEventSender, mpsc::UnboundedReceiver<ApiEvent>) {
  mpsc::unbounded_channel()
}
