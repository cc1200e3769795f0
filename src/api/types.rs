use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tweet as returned by the read endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
  pub id: Value,
  #[serde(default)]
  pub content: String,
  #[serde(default)]
  pub user: Option<TweetAuthor>,
  pub created_at: Option<DateTime<Utc>>,
  /// Attachment locator
  #[serde(default)]
  pub image: Option<String>,
}

impl Tweet {
  /// The id as printed: strings unquoted, numbers as-is
  pub fn display_id(&self) -> String {
    match self.id {
      Value::String(ref s) => s.clone(),
      ref other => other.to_string(),
    }
  }

  pub fn username(&self) -> &str {
    self
      .user
      .as_ref()
      .map(|u| u.username.as_str())
      .unwrap_or("unknown")
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TweetAuthor {
  pub username: String,
}

/// Content intended for the write endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweetDraft {
  pub content: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image: Option<ImageUpload>,
}

impl TweetDraft {
  pub fn text(content: impl Into<String>) -> Self {
    Self {
      content: content.into(),
      image: None,
    }
  }

  pub fn with_image(
    content: impl Into<String>,
    file_name: impl Into<String>,
    mime_type: impl Into<String>,
    bytes: Vec<u8>,
  ) -> Self {
    Self {
      content: content.into(),
      image: Some(ImageUpload {
        file_name: file_name.into(),
        mime_type: mime_type.into(),
        bytes,
      }),
    }
  }
}

/// Binary image part of a draft. Bytes are hex-encoded when persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUpload {
  pub file_name: String,
  pub mime_type: String,
  #[serde(with = "hex_bytes")]
  pub bytes: Vec<u8>,
}

mod hex_bytes {
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    hex::decode(s).map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_tweet_listing() {
    let json = r#"[{"id":1,"content":"hi","user":{"username":"a"},"created_at":"2025-01-01T00:00:00Z","image":null}]"#;
    let tweets: Vec<Tweet> = serde_json::from_str(json).unwrap();
    assert_eq!(tweets.len(), 1);
    assert_eq!(tweets[0].username(), "a");
    assert_eq!(tweets[0].content, "hi");
    assert!(tweets[0].image.is_none());
  }

  #[test]
  fn test_tweet_without_user_falls_back() {
    let tweet: Tweet = serde_json::from_str(r#"{"id":"x","created_at":null}"#).unwrap();
    assert_eq!(tweet.username(), "unknown");
  }

  #[test]
  fn test_display_id_unquotes_strings() {
    let numeric: Tweet = serde_json::from_str(r#"{"id":7}"#).unwrap();
    let text: Tweet = serde_json::from_str(r#"{"id":"abc"}"#).unwrap();
    assert_eq!(numeric.display_id(), "7");
    assert_eq!(text.display_id(), "abc");
  }

  #[test]
  fn test_image_bytes_persist_as_hex() {
    let draft = TweetDraft::with_image("hi", "cap.jpg", "image/jpeg", vec![0xde, 0xad]);
    let json = serde_json::to_value(&draft).unwrap();
    assert_eq!(json["image"]["bytes"], "dead");

    let back: TweetDraft = serde_json::from_value(json).unwrap();
    assert_eq!(back, draft);
  }

  #[test]
  fn test_text_draft_omits_image() {
    let json = serde_json::to_string(&TweetDraft::text("hello")).unwrap();
    assert_eq!(json, r#"{"content":"hello"}"#);
  }
}
