//! Client for the tweet endpoints.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::SyncError;
use crate::http::{Body, Request, Transport};

use super::types::TweetDraft;

/// Path of the tweet collection, relative to the API root
const TWEETS_PATH: &str = "tweets/";

/// Typed access to the tweet endpoints.
/// Clone is cheap - the transport is shared.
#[derive(Clone)]
pub struct TweetApi {
  transport: Arc<dyn Transport>,
  base: Url,
}

impl TweetApi {
  /// `base` is the API root, e.g. `https://example.org/api/`.
  pub fn new(transport: Arc<dyn Transport>, base: Url) -> Result<Self, SyncError> {
    // Url::join drops the last segment unless the root ends with a slash
    let base = if base.path().ends_with('/') {
      base
    } else {
      let mut with_slash = base.clone();
      with_slash.set_path(&format!("{}/", base.path()));
      with_slash
    };
    // Validate early so the endpoint accessors cannot fail
    base
      .join(TWEETS_PATH)
      .map_err(|e| SyncError::InvalidRequest(format!("Invalid API url {}: {}", base, e)))?;
    Ok(Self { transport, base })
  }

  pub fn base(&self) -> &Url {
    &self.base
  }

  /// URL of the tweet collection (read and write endpoint)
  pub fn tweets_url(&self) -> Url {
    // Checked in `new`
    self.base.join(TWEETS_PATH).unwrap_or_else(|_| self.base.clone())
  }

  /// Request listing all tweets
  pub fn list_request(&self) -> Request {
    Request::get(self.tweets_url())
  }

  /// Request creating a tweet from a draft
  pub fn create_request(&self, draft: &TweetDraft) -> Request {
    Request::post(self.tweets_url(), Body::Draft(draft.clone()))
  }

  /// Submit a draft straight to the remote service, bypassing the proxy.
  ///
  /// Returns the created entity. 4xx becomes `RemoteRejected`, 5xx `ServerError`.
  pub async fn create_tweet(&self, draft: &TweetDraft) -> Result<Value, SyncError> {
    let request = self.create_request(draft);
    let response = self.transport.send(&request).await?;

    if response.is_success() {
      debug!(status = response.status, "Tweet accepted");
      // An empty or non-JSON success body still counts as accepted
      return Ok(response.parse().unwrap_or(Value::Null));
    }

    if response.is_client_error() {
      warn!(status = response.status, "Tweet rejected by remote service");
      return Err(SyncError::rejected(response.status, &response.body));
    }

    Err(SyncError::ServerError {
      status: response.status,
    })
  }
}
