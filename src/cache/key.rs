//! Stable keys for cached responses.

use sha2::{Digest, Sha256};
use url::Url;

/// Digest identifying a resource locator in a blob bucket.
///
/// The fragment never reaches the server, so it is ignored.
pub fn locator_key(url: &Url) -> String {
  let mut normalized = url.clone();
  normalized.set_fragment(None);

  // SHA256 hash for stable, fixed-length keys
  let mut hasher = Sha256::new();
  hasher.update(normalized.as_str().as_bytes());
  hex::encode(hasher.finalize())
}
