//! Tweet endpoints of the remote service.
//!
//! `TweetApi` builds the requests the host sends through the proxy and submits
//! pending drafts directly during a drain. The wire types live in `types`.

pub mod client;
pub mod types;

pub use client::TweetApi;
pub use types::{ImageUpload, Tweet, TweetAuthor, TweetDraft};
