//! Error taxonomy for the offline subsystem.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Validation messages returned by the remote service, keyed by field name.
pub type FieldErrors = BTreeMap<String, String>;

/// Maximum length for error response bodies kept in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
  #[error("Local store unavailable: {0}")]
  StorageUnavailable(String),

  #[error("Network unreachable: {0}")]
  NetworkUnreachable(String),

  #[error("Server error: status {status}")]
  ServerError { status: u16 },

  #[error("Rejected by remote service (status {status}): {}", format_field_errors(.errors))]
  RemoteRejected { status: u16, errors: FieldErrors },

  #[error("Invalid response: {0}")]
  InvalidResponse(String),

  #[error("Invalid request: {0}")]
  InvalidRequest(String),
}

impl SyncError {
  /// Whether the failure is transient and the write should be kept for a later drain.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      SyncError::NetworkUnreachable(_) | SyncError::ServerError { .. }
    )
  }

  /// Build a `RemoteRejected` from a 4xx body.
  ///
  /// Accepts `{field: "message"}` and `{field: ["message", ...]}` shapes. Anything
  /// else is kept verbatim under a `detail` key.
  pub fn rejected(status: u16, body: &[u8]) -> Self {
    let errors = match serde_json::from_slice::<Value>(body) {
      Ok(Value::Object(map)) => map
        .into_iter()
        .map(|(field, message)| (field, flatten_message(message)))
        .collect(),
      _ => {
        let mut errors = FieldErrors::new();
        let text = String::from_utf8_lossy(body);
        if !text.trim().is_empty() {
          errors.insert("detail".to_string(), truncate_body(&text));
        }
        errors
      }
    };
    SyncError::RemoteRejected { status, errors }
  }
}

fn flatten_message(message: Value) -> String {
  match message {
    Value::String(s) => s,
    Value::Array(items) => items
      .into_iter()
      .map(flatten_message)
      .collect::<Vec<_>>()
      .join("; "),
    other => other.to_string(),
  }
}

fn format_field_errors(errors: &FieldErrors) -> String {
  if errors.is_empty() {
    return "no details".to_string();
  }
  errors
    .iter()
    .map(|(field, message)| format!("{}: {}", field, message))
    .collect::<Vec<_>>()
    .join(", ")
}

/// Truncate a response body so error messages stay readable
fn truncate_body(body: &str) -> String {
  if body.len() <= MAX_ERROR_BODY_LENGTH {
    return body.to_string();
  }
  let mut end = MAX_ERROR_BODY_LENGTH;
  while !body.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_rejected_parses_field_lists() {
    let err = SyncError::rejected(400, br#"{"content": ["This field may not be blank."]}"#);
    match err {
      SyncError::RemoteRejected { status, errors } => {
        assert_eq!(status, 400);
        assert_eq!(errors["content"], "This field may not be blank.");
      }
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[test]
  fn test_rejected_keeps_plain_body_as_detail() {
    let err = SyncError::rejected(401, b"Unauthorized");
    assert_eq!(
      err.to_string(),
      "Rejected by remote service (status 401): detail: Unauthorized"
    );
  }

  #[test]
  fn test_retryable_classification() {
    assert!(SyncError::NetworkUnreachable("timeout".into()).is_retryable());
    assert!(SyncError::ServerError { status: 503 }.is_retryable());
    assert!(!SyncError::rejected(400, b"{}").is_retryable());
    assert!(!SyncError::StorageUnavailable("gone".into()).is_retryable());
  }

  #[test]
  fn test_truncate_body_respects_char_boundaries() {
    let body = "é".repeat(400);
    let truncated = truncate_body(&body);
    assert!(truncated.contains("truncated, 800 total bytes"));
  }
}
