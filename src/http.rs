//! Request/response types and the transport seam the proxy forwards through.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, multipart, Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::api::TweetDraft;
use crate::error::SyncError;

/// Default content type for synthesized JSON bodies
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Outbound request body
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
  Empty,
  Json(Value),
  /// Multipart tweet form: `content` plus an optional `image` part
  Draft(TweetDraft),
}

/// An outbound request as seen by the proxy
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub body: Body,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      body: Body::Empty,
    }
  }

  pub fn post(url: Url, body: Body) -> Self {
    Self {
      method: Method::POST,
      url,
      body,
    }
  }
}

/// A fully buffered response.
///
/// Status, content type and body bytes are all that the cache keeps, so they are
/// all a substitute response carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
    Self {
      status,
      content_type,
      body,
    }
  }

  /// Serialize `value` into an `application/json` response.
  pub fn json<T: Serialize>(status: u16, value: &T) -> Result<Self, SyncError> {
    let body = serde_json::to_vec(value)
      .map_err(|e| SyncError::InvalidResponse(format!("Failed to serialize body: {}", e)))?;
    Ok(Self::new(status, Some(JSON_CONTENT_TYPE.to_string()), body))
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn is_client_error(&self) -> bool {
    (400..500).contains(&self.status)
  }

  pub fn is_server_error(&self) -> bool {
    self.status >= 500
  }

  /// Parse the body as JSON.
  pub fn parse<T: DeserializeOwned>(&self) -> Result<T, SyncError> {
    serde_json::from_slice(&self.body)
      .map_err(|e| SyncError::InvalidResponse(format!("Failed to parse JSON body: {}", e)))
  }
}

/// Sends requests to the remote service.
///
/// Any HTTP status is an `Ok` response; only transport-level failures (connect
/// errors, timeouts, truncated bodies) are `NetworkUnreachable`.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: &Request) -> Result<Response, SyncError>;
}

/// reqwest-backed transport.
/// Clone is cheap - reqwest::Client shares its connection pool.
#[derive(Clone)]
pub struct HttpTransport {
  client: Client,
  token: Option<String>,
}

impl HttpTransport {
  pub fn new(timeout: Duration, token: Option<String>) -> Result<Self, SyncError> {
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| SyncError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Self { client, token })
  }

  fn build(&self, request: &Request) -> Result<reqwest::RequestBuilder, SyncError> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());

    if let Some(ref token) = self.token {
      builder = builder.bearer_auth(token);
    }

    builder = match &request.body {
      Body::Empty => builder,
      Body::Json(value) => builder.json(value),
      Body::Draft(draft) => builder.multipart(draft_form(draft)?),
    };

    Ok(builder)
  }
}

fn draft_form(draft: &TweetDraft) -> Result<multipart::Form, SyncError> {
  let mut form = multipart::Form::new().text("content", draft.content.clone());
  if let Some(ref image) = draft.image {
    let part = multipart::Part::bytes(image.bytes.clone())
      .file_name(image.file_name.clone())
      .mime_str(&image.mime_type)
      .map_err(|e| SyncError::InvalidRequest(format!("Invalid image mime type: {}", e)))?;
    form = form.part("image", part);
  }
  Ok(form)
}

#[async_trait]
impl Transport for HttpTransport {
  async fn send(&self, request: &Request) -> Result<Response, SyncError> {
    let response = self
      .build(request)?
      .send()
      .await
      .map_err(|e| SyncError::NetworkUnreachable(format!("{} {}: {}", request.method, request.url, e)))?;

    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);

    let body = response
      .bytes()
      .await
      .map_err(|e| SyncError::NetworkUnreachable(format!("Failed to read body from {}: {}", request.url, e)))?;

    debug!(method = %request.method, url = %request.url, status, "Response received");
    Ok(Response::new(status, content_type, body.to_vec()))
  }
}
