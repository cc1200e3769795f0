//! Entities persisted by the cache manager and the pending-write queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::TweetDraft;
use crate::store::{Partition, Storable};

/// Prefix marking ids generated on this device
pub const LOCAL_ID_PREFIX: &str = "local-";

/// A remote read entity kept for offline use.
///
/// `payload` is the object exactly as the read endpoint returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntity {
  pub id: String,
  pub payload: Value,
  pub cached_at: DateTime<Utc>,
}

impl CachedEntity {
  /// Wrap a payload, taking its id from the `id` field.
  ///
  /// Returns `None` when the payload has no usable id.
  pub fn from_payload(payload: Value) -> Option<Self> {
    let id = entity_id(&payload)?;
    Some(Self {
      id,
      payload,
      cached_at: Utc::now(),
    })
  }
}

impl Storable for CachedEntity {
  fn key(&self) -> &str {
    &self.id
  }

  fn partition() -> Partition {
    Partition::CachedReads
  }
}

/// Normalise an entity's `id` field into a store key.
pub fn entity_id(payload: &Value) -> Option<String> {
  match payload.get("id")? {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// A locally created write awaiting confirmation from the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntity {
  pub id: String,
  pub payload: TweetDraft,
  pub created_at: DateTime<Utc>,
}

impl PendingEntity {
  /// New pending entity, generating a local id unless one is given.
  pub fn new(id: Option<String>, payload: TweetDraft) -> Self {
    Self {
      id: id.unwrap_or_else(generate_local_id),
      payload,
      created_at: Utc::now(),
    }
  }

  /// Shape returned to the caller in place of the created entity
  pub fn acknowledgement(&self) -> Value {
    serde_json::json!({
      "id": self.id,
      "content": self.payload.content,
      "created_at": self.created_at,
      "pending": true,
    })
  }
}

impl Storable for PendingEntity {
  fn key(&self) -> &str {
    &self.id
  }

  fn partition() -> Partition {
    Partition::PendingWrites
  }
}

fn generate_local_id() -> String {
  format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_entity_id_accepts_numbers_and_strings() {
    assert_eq!(entity_id(&serde_json::json!({"id": 1})), Some("1".to_string()));
    assert_eq!(entity_id(&serde_json::json!({"id": "abc"})), Some("abc".to_string()));
    assert_eq!(entity_id(&serde_json::json!({"id": ""})), None);
    assert_eq!(entity_id(&serde_json::json!({"id": null})), None);
    assert_eq!(entity_id(&serde_json::json!({"content": "hi"})), None);
  }

  #[test]
  fn test_cached_entity_keeps_payload_verbatim() {
    let payload = serde_json::json!({"id": 3, "content": "hi", "user": {"username": "a"}});
    let entity = CachedEntity::from_payload(payload.clone()).unwrap();
    assert_eq!(entity.id, "3");
    assert_eq!(entity.payload, payload);
  }

  #[test]
  fn test_pending_ids_are_generated_and_unique() {
    let a = PendingEntity::new(None, TweetDraft::text("x"));
    let b = PendingEntity::new(None, TweetDraft::text("x"));
    assert!(a.id.starts_with(LOCAL_ID_PREFIX));
    assert_ne!(a.id, b.id);
  }

  #[test]
  fn test_pending_keeps_given_id() {
    let entity = PendingEntity::new(Some("draft-7".into()), TweetDraft::text("x"));
    assert_eq!(entity.id, "draft-7");
    assert_eq!(entity.acknowledgement()["pending"], true);
  }
}
