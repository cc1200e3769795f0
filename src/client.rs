//! Offline-tolerant tweet client that wires the subsystem together.

use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

use crate::api::{Tweet, TweetApi, TweetDraft};
use crate::cache::{CacheManager, PrecacheReport};
use crate::config::Config;
use crate::error::SyncError;
use crate::http::{HttpTransport, Transport};
use crate::model::PendingEntity;
use crate::proxy::{Intercepted, Proxy, ResponseSource, RouteTable};
use crate::queue::PendingQueue;
use crate::store::{AttemptRecord, Store};
use crate::sync::{spawn_probe, Connectivity, ConnectivitySignal, Reconciler, TriggerOutcome};

/// Client for the tweet service with offline reads and queued writes.
///
/// Every request goes through the proxy; the reconciler shares the same store.
#[derive(Clone)]
pub struct OfflineClient {
  api: TweetApi,
  proxy: Arc<Proxy>,
  reconciler: Arc<Reconciler>,
  signal: ConnectivitySignal,
  transport: Arc<dyn Transport>,
  static_assets: Vec<Url>,
  probe_interval: Duration,
}

impl OfflineClient {
  /// Create a client talking to the configured service over HTTP.
  pub fn new(config: &Config) -> Result<Self> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
      config.timeout(),
      Config::get_api_token(),
    )?);
    Self::with_transport(config, transport)
  }

  /// Create a client over `transport`, opening the configured store.
  ///
  /// Without a usable store the client runs network-only.
  pub fn with_transport(config: &Config, transport: Arc<dyn Transport>) -> Result<Self> {
    if !config.cache.enabled {
      info!("Caching disabled, running network-only");
      return Self::assemble(config, transport, Store::noop(), false);
    }

    let path = config.store_path()?;
    match Store::open(&path) {
      Ok(store) => Self::assemble(config, transport, store, true),
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Store unavailable, running network-only");
        Self::assemble(config, transport, Store::noop(), false)
      }
    }
  }

  /// Create a client over an existing transport and store.
  pub fn with_parts(config: &Config, transport: Arc<dyn Transport>, store: Store) -> Result<Self> {
    Self::assemble(config, transport, store, true)
  }

  fn assemble(
    config: &Config,
    transport: Arc<dyn Transport>,
    store: Store,
    offline_fallback: bool,
  ) -> Result<Self> {
    let api = TweetApi::new(transport.clone(), config.api_url()?)?;
    let static_assets = config.static_asset_urls()?;

    let mut cache = CacheManager::new(store.clone(), transport.clone());
    if let Some(retention) = config.retention() {
      cache = cache.with_retention(retention);
    }
    let queue = PendingQueue::new(store);
    let routes = RouteTable::new(api.tweets_url(), &static_assets, config.cache.media_prefix.clone());
    let signal = ConnectivitySignal::new(Connectivity::Online);

    let proxy = Proxy::new(routes, cache, queue.clone(), transport.clone(), signal.subscribe());
    let proxy = if offline_fallback { proxy } else { proxy.network_only() };

    Ok(Self {
      reconciler: Arc::new(Reconciler::new(queue, api.clone())),
      api,
      proxy: Arc::new(proxy),
      signal,
      transport,
      static_assets,
      probe_interval: config.probe_interval(),
    })
  }

  pub fn signal(&self) -> &ConnectivitySignal {
    &self.signal
  }

  pub fn proxy(&self) -> &Proxy {
    &self.proxy
  }

  /// Fetch the tweet listing, from the cache when the network is unavailable.
  pub async fn feed(&self) -> Result<(Vec<Tweet>, ResponseSource), SyncError> {
    let Intercepted { response, source } = self.proxy.handle(self.api.list_request()).await?;

    if response.is_client_error() {
      return Err(SyncError::rejected(response.status, &response.body));
    }
    if !response.is_success() {
      return Err(SyncError::ServerError {
        status: response.status,
      });
    }

    Ok((response.parse()?, source))
  }

  /// Post a tweet; queued for later when the network is unavailable.
  pub async fn post(&self, draft: TweetDraft) -> Result<Intercepted, SyncError> {
    self.proxy.handle(self.api.create_request(&draft)).await
  }

  pub fn pending(&self) -> Result<Vec<(PendingEntity, Option<AttemptRecord>)>, SyncError> {
    let queue = self.proxy.queue();
    queue
      .pending()?
      .into_iter()
      .map(|entity| {
        let attempt = queue.attempt(&entity.id)?;
        Ok((entity, attempt))
      })
      .collect()
  }

  pub fn discard(&self, id: &str) -> Result<(), SyncError> {
    self.proxy.queue().discard(id)
  }

  /// Drain the pending queue now.
  pub async fn sync(&self) -> Result<TriggerOutcome, SyncError> {
    self.reconciler.trigger().await
  }

  pub async fn precache(&self) -> PrecacheReport {
    self.proxy.cache().precache(&self.static_assets).await
  }

  /// Start the connectivity probe and the reconnect watcher.
  ///
  /// Both run until their handles are aborted.
  pub fn watch(&self) -> Vec<JoinHandle<()>> {
    let probe = spawn_probe(
      self.signal.clone(),
      self.transport.clone(),
      self.api.base().clone(),
      self.probe_interval,
    );
    let reconnect = self.reconciler.clone().watch_connectivity(self.signal.subscribe());
    vec![probe, reconnect]
  }
}
