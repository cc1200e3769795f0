//! Cache manager that sits between the proxy and the durable store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::SyncError;
use crate::http::{Request, Response, Transport};
use crate::model::CachedEntity;
use crate::store::{BlobBucket, Store};

use super::key::locator_key;

/// Maximum concurrent attachment or asset fetches.
const MAX_CONCURRENT_FETCHES: usize = 4;

/// Payload field holding an entity's attachment locator
const ATTACHMENT_FIELD: &str = "image";

/// Outcome of a static asset pre-cache pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrecacheReport {
  pub stored: usize,
  pub failed: Vec<Url>,
}

/// Cache manager.
///
/// Holds no state of its own beyond handles to the store and transport.
#[derive(Clone)]
pub struct CacheManager {
  store: Store,
  transport: Arc<dyn Transport>,
  /// Entities not refreshed within this window are dropped on admission
  retention: Option<Duration>,
}

impl CacheManager {
  pub fn new(store: Store, transport: Arc<dyn Transport>) -> Self {
    Self {
      store,
      transport,
      retention: None,
    }
  }

  /// Set how long cached reads are kept without being refreshed.
  pub fn with_retention(mut self, retention: Duration) -> Self {
    self.retention = Some(retention);
    self
  }

  /// Admit a successful listing response.
  ///
  /// Each array element is stored by id, replacing any earlier entry wholesale,
  /// and the batch takes the listing's order. Cached entities missing from the
  /// listing are kept ahead of it. Elements without an id are skipped. Returns
  /// the admitted entities.
  pub fn admit_listing(&self, response: &Response) -> Result<Vec<CachedEntity>, SyncError> {
    // Taken before the puts so entries admitted now are never pruned
    let cutoff = self.retention.map(|retention| Utc::now() - retention);

    let items: Vec<Value> = match response.parse::<Value>()? {
      Value::Array(items) => items,
      _ => {
        return Err(SyncError::InvalidResponse(
          "Listing body is not a JSON array".to_string(),
        ))
      }
    };

    let mut admitted = Vec::with_capacity(items.len());
    for item in items {
      match CachedEntity::from_payload(item) {
        Some(entity) => admitted.push(entity),
        None => warn!("Skipping listing entry without an id"),
      }
    }
    // The substitute listing follows the order of the latest admission
    self.store.put_ordered(&admitted)?;

    if let Some(cutoff) = cutoff {
      let pruned = self.store.prune::<CachedEntity>(cutoff)?;
      if pruned > 0 {
        debug!(pruned, "Dropped expired cached reads");
      }
    }

    debug!(count = admitted.len(), "Admitted listing into cache");
    Ok(admitted)
  }

  /// All cached read entities, in store order.
  pub fn cached_listing(&self) -> Result<Vec<CachedEntity>, SyncError> {
    self.store.get_all()
  }

  /// Rebuild the listing response from the cache.
  ///
  /// The body is the JSON array of cached payloads, the same wire shape the read
  /// endpoint uses. An empty cache yields an empty array.
  pub fn substitute_listing(&self) -> Result<Response, SyncError> {
    let payloads: Vec<Value> = self
      .cached_listing()?
      .into_iter()
      .map(|entity| entity.payload)
      .collect();
    debug!(count = payloads.len(), "Serving listing from cache");
    Response::json(200, &payloads)
  }

  /// Attachment locators referenced by `entities`, resolved against `base`.
  pub fn attachment_locators(entities: &[CachedEntity], base: &Url) -> Vec<Url> {
    entities
      .iter()
      .filter_map(|entity| entity.payload.get(ATTACHMENT_FIELD)?.as_str())
      .filter(|locator| !locator.is_empty())
      .filter_map(|locator| match base.join(locator) {
        Ok(url) => Some(url),
        Err(e) => {
          warn!(locator, error = %e, "Ignoring unparseable attachment locator");
          None
        }
      })
      .collect()
  }

  /// Fetch and store attachments not already cached.
  ///
  /// Best-effort: failures are logged and never propagate. Returns how many
  /// attachments were newly stored.
  pub async fn cache_attachments(&self, locators: Vec<Url>) -> usize {
    let missing: Vec<Url> = locators
      .into_iter()
      .filter(|url| !matches!(self.cached_attachment(url), Ok(Some(_))))
      .collect();

    let results: Vec<bool> = stream::iter(missing)
      .map(|url| async move { self.fetch_into(BlobBucket::Images, &url).await.is_ok() })
      .buffer_unordered(MAX_CONCURRENT_FETCHES)
      .collect()
      .await;

    results.into_iter().filter(|stored| *stored).count()
  }

  pub fn cached_attachment(&self, url: &Url) -> Result<Option<Response>, SyncError> {
    self.store.get_blob(BlobBucket::Images, &locator_key(url))
  }

  pub fn store_attachment(&self, url: &Url, response: &Response) -> Result<(), SyncError> {
    self.store.put_blob(BlobBucket::Images, &locator_key(url), response)
  }

  pub fn cached_static(&self, url: &Url) -> Result<Option<Response>, SyncError> {
    self.store.get_blob(BlobBucket::Static, &locator_key(url))
  }

  pub fn store_static(&self, url: &Url, response: &Response) -> Result<(), SyncError> {
    self.store.put_blob(BlobBucket::Static, &locator_key(url), response)
  }

  /// Fetch and store every static asset.
  ///
  /// A failing asset is reported, not fatal.
  pub async fn precache(&self, assets: &[Url]) -> PrecacheReport {
    let results: Vec<(Url, Result<(), SyncError>)> = stream::iter(assets.iter().cloned())
      .map(|url| async move {
        let result = self.fetch_into(BlobBucket::Static, &url).await;
        (url, result)
      })
      .buffer_unordered(MAX_CONCURRENT_FETCHES)
      .collect()
      .await;

    let mut report = PrecacheReport::default();
    for (url, result) in results {
      match result {
        Ok(()) => report.stored += 1,
        Err(e) => {
          warn!(url = %url, error = %e, "Failed to cache static asset");
          report.failed.push(url);
        }
      }
    }
    info!(stored = report.stored, failed = report.failed.len(), "Static assets cached");
    report
  }

  async fn fetch_into(&self, bucket: BlobBucket, url: &Url) -> Result<(), SyncError> {
    let response = self.transport.send(&Request::get(url.clone())).await?;
    if !response.is_success() {
      debug!(url = %url, status = response.status, "Not caching unsuccessful response");
      return Err(SyncError::InvalidResponse(format!(
        "status {} for {}",
        response.status, url
      )));
    }
    self.store.put_blob(bucket, &locator_key(url), &response)
  }
}
