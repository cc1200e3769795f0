//! Request classification.

use std::collections::HashSet;

use reqwest::Method;
use url::Url;

use crate::cache::locator_key;
use crate::http::Request;

/// What an intercepted request is, as far as offline handling goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
  /// Immutable asset from the pre-cache list
  StaticAsset,
  /// Read of the entity collection
  EntityListing,
  /// Write to the entity collection
  EntityCreate,
  /// Binary referenced by an entity
  Attachment,
  /// Anything else; forwarded untouched
  Passthrough,
}

/// Route table mapping requests to kinds.
#[derive(Debug, Clone)]
pub struct RouteTable {
  collection: Url,
  static_assets: HashSet<String>,
  media_prefix: String,
}

impl RouteTable {
  /// `collection` is the entity endpoint; `media_prefix` the path prefix
  /// attachments are served under.
  pub fn new(collection: Url, static_assets: &[Url], media_prefix: impl Into<String>) -> Self {
    Self {
      collection,
      static_assets: static_assets.iter().map(locator_key).collect(),
      media_prefix: media_prefix.into(),
    }
  }

  pub fn classify(&self, request: &Request) -> RequestKind {
    let is_get = request.method == Method::GET;

    if is_get && self.static_assets.contains(&locator_key(&request.url)) {
      return RequestKind::StaticAsset;
    }

    if self.is_collection(&request.url) {
      if is_get {
        return RequestKind::EntityListing;
      }
      if request.method == Method::POST {
        return RequestKind::EntityCreate;
      }
    }

    if is_get && !self.media_prefix.is_empty() && request.url.path().starts_with(&self.media_prefix) {
      return RequestKind::Attachment;
    }

    RequestKind::Passthrough
  }

  /// Same origin and path as the collection; the query string is ignored.
  fn is_collection(&self, url: &Url) -> bool {
    url.origin() == self.collection.origin()
      && url.path().trim_end_matches('/') == self.collection.path().trim_end_matches('/')
  }
}
