//! Per-kind request handling: lookup, forward, fallback.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::TweetDraft;
use crate::cache::CacheManager;
use crate::error::SyncError;
use crate::http::{Body, Request, Response, Transport};
use crate::queue::PendingQueue;
use crate::sync::Connectivity;

use super::routes::{RequestKind, RouteTable};

/// Where an intercepted response came from.
///
/// Carried beside the response; the body itself has the network's wire shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSource {
  Network,
  StaticCache,
  OfflineCache,
  /// The write was queued; the response acknowledges the pending entity
  Queued { pending_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intercepted {
  pub response: Response,
  pub source: ResponseSource,
}

impl Intercepted {
  fn network(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
    }
  }
}

/// Network interception proxy.
///
/// The network answer is always preferred; cache and queue fallbacks only run
/// after the network failed or the connectivity signal reports offline.
pub struct Proxy {
  routes: RouteTable,
  cache: CacheManager,
  queue: PendingQueue,
  transport: Arc<dyn Transport>,
  connectivity: watch::Receiver<Connectivity>,
  /// When false, failures reach the caller instead of the cache or queue
  offline_fallback: bool,
}

impl Proxy {
  pub fn new(
    routes: RouteTable,
    cache: CacheManager,
    queue: PendingQueue,
    transport: Arc<dyn Transport>,
    connectivity: watch::Receiver<Connectivity>,
  ) -> Self {
    Self {
      routes,
      cache,
      queue,
      transport,
      connectivity,
      offline_fallback: true,
    }
  }

  /// Disable cache and queue fallbacks, for when there is no usable store.
  pub fn network_only(mut self) -> Self {
    self.offline_fallback = false;
    self
  }

  pub fn cache(&self) -> &CacheManager {
    &self.cache
  }

  pub fn queue(&self) -> &PendingQueue {
    &self.queue
  }

  /// Handle one outbound request.
  ///
  /// Only `RemoteRejected` (writes), `StorageUnavailable` (writes that could not
  /// be queued) and failures with nothing to fall back on reach the caller.
  pub async fn handle(&self, request: Request) -> Result<Intercepted, SyncError> {
    let kind = self.routes.classify(&request);
    debug!(method = %request.method, url = %request.url, ?kind, "Intercepted request");

    match kind {
      RequestKind::StaticAsset => self.serve_static(&request).await,
      RequestKind::EntityListing => self.serve_listing(&request).await,
      RequestKind::EntityCreate => self.submit_create(&request).await,
      RequestKind::Attachment => self.serve_attachment(&request).await,
      RequestKind::Passthrough => self.forward(&request).await.map(Intercepted::network),
    }
  }

  fn is_online(&self) -> bool {
    *self.connectivity.borrow() == Connectivity::Online
  }

  async fn forward(&self, request: &Request) -> Result<Response, SyncError> {
    if !self.is_online() {
      return Err(SyncError::NetworkUnreachable(
        "connectivity signal reports offline".to_string(),
      ));
    }
    self.transport.send(request).await
  }

  async fn serve_static(&self, request: &Request) -> Result<Intercepted, SyncError> {
    match self.cache.cached_static(&request.url) {
      Ok(Some(response)) => {
        debug!(url = %request.url, "Static cache hit");
        return Ok(Intercepted {
          response,
          source: ResponseSource::StaticCache,
        });
      }
      Ok(None) => {}
      Err(e) => warn!(error = %e, "Static cache lookup failed"),
    }

    let response = self.forward(request).await?;
    if response.is_success() {
      if let Err(e) = self.cache.store_static(&request.url, &response) {
        warn!(url = %request.url, error = %e, "Failed to cache static asset");
      }
    }
    Ok(Intercepted::network(response))
  }

  async fn serve_listing(&self, request: &Request) -> Result<Intercepted, SyncError> {
    match self.forward(request).await {
      Ok(response) if response.is_success() => {
        self.admit(request, &response);
        Ok(Intercepted::network(response))
      }
      Ok(response) if response.is_server_error() => self.listing_fallback(SyncError::ServerError {
        status: response.status,
      }),
      Ok(response) => Ok(Intercepted::network(response)),
      Err(e) if e.is_retryable() => self.listing_fallback(e),
      Err(e) => Err(e),
    }
  }

  /// Cache admission; a failure here never affects the response.
  fn admit(&self, request: &Request, response: &Response) {
    let admitted = match self.cache.admit_listing(response) {
      Ok(admitted) => admitted,
      Err(e) => {
        warn!(url = %request.url, error = %e, "Listing not admitted to cache");
        return;
      }
    };

    let locators = CacheManager::attachment_locators(&admitted, &request.url);
    if locators.is_empty() {
      return;
    }

    let cache = self.cache.clone();
    tokio::spawn(async move {
      let stored = cache.cache_attachments(locators).await;
      debug!(stored, "Attachment caching finished");
    });
  }

  fn listing_fallback(&self, cause: SyncError) -> Result<Intercepted, SyncError> {
    if !self.offline_fallback {
      return Err(cause);
    }

    match self.cache.substitute_listing() {
      Ok(response) => {
        info!(cause = %cause, "Serving cached listing");
        Ok(Intercepted {
          response,
          source: ResponseSource::OfflineCache,
        })
      }
      Err(e) => {
        warn!(error = %e, "Cached listing unavailable");
        Err(cause)
      }
    }
  }

  async fn submit_create(&self, request: &Request) -> Result<Intercepted, SyncError> {
    let draft = match queueable_draft(&request.body) {
      Some(draft) => draft,
      None => {
        debug!(url = %request.url, "Create body cannot be queued, forwarding as-is");
        return self.forward(request).await.map(Intercepted::network);
      }
    };

    match self.forward(request).await {
      Ok(response) if response.is_success() => Ok(Intercepted::network(response)),
      Ok(response) if response.is_client_error() => {
        Err(SyncError::rejected(response.status, &response.body))
      }
      Ok(response) if response.is_server_error() => self.enqueue_write(
        draft,
        SyncError::ServerError {
          status: response.status,
        },
      ),
      Ok(response) => Ok(Intercepted::network(response)),
      Err(e) if e.is_retryable() => self.enqueue_write(draft, e),
      Err(e) => Err(e),
    }
  }

  fn enqueue_write(&self, draft: TweetDraft, cause: SyncError) -> Result<Intercepted, SyncError> {
    if !self.offline_fallback {
      return Err(cause);
    }

    let pending = self.queue.enqueue(draft)?;
    info!(id = %pending.id, cause = %cause, "Write queued for sync");

    let response = Response::json(202, &pending.acknowledgement())?;
    Ok(Intercepted {
      response,
      source: ResponseSource::Queued {
        pending_id: pending.id,
      },
    })
  }

  async fn serve_attachment(&self, request: &Request) -> Result<Intercepted, SyncError> {
    let cause = match self.forward(request).await {
      Ok(response) if response.is_success() => {
        if let Err(e) = self.cache.store_attachment(&request.url, &response) {
          debug!(url = %request.url, error = %e, "Failed to cache attachment");
        }
        return Ok(Intercepted::network(response));
      }
      Ok(response) if response.is_server_error() => SyncError::ServerError {
        status: response.status,
      },
      Ok(response) => return Ok(Intercepted::network(response)),
      Err(e) if e.is_retryable() => e,
      Err(e) => return Err(e),
    };

    if !self.offline_fallback {
      return Err(cause);
    }

    match self.cache.cached_attachment(&request.url) {
      Ok(Some(response)) => Ok(Intercepted {
        response,
        source: ResponseSource::OfflineCache,
      }),
      Ok(None) => Err(cause),
      Err(e) => {
        warn!(error = %e, "Attachment cache lookup failed");
        Err(cause)
      }
    }
  }
}

/// Draft carried by a create request, if it is one the queue can hold.
fn queueable_draft(body: &Body) -> Option<TweetDraft> {
  match body {
    Body::Draft(draft) => Some(draft.clone()),
    Body::Json(value) => serde_json::from_value(value.clone()).ok(),
    Body::Empty => None,
  }
}
