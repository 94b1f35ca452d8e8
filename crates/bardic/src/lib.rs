//! Anonymous client for the Gemini web chat frontend.
//!
//! Talks to the undocumented batch endpoint the web app itself uses, with
//! no API key and no cookie jar:
//! - Nested-array request envelope (`f.req`) encoding
//! - Retrying dispatch with per-attempt deadlines and linear backoff
//! - Best-effort decoding of the batch response envelope
//! - Optional word-by-word pacing stream over a completed answer
//!
//! The endpoint is operated by someone else and documented by no one;
//! everything here is reverse-engineered and may stop working without
//! notice.
//!
//! # Example
//!
//! ```no_run
//! use bardic::BardClient;
//!
//! # async fn demo() -> Result<(), bardic::BardError> {
//! let client = BardClient::default();
//! let answer = client.ask("What is the capital of France?").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod decode;
pub mod payload;
pub mod session;
pub mod streaming;
pub mod transport;

use std::time::Duration;

pub use client::BardClient;
pub use config::BardConfig;
pub use decode::Reply;
pub use session::SessionState;
pub use transport::{RawResponse, Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum BardError {
    /// Non-success status or a request failure that is not worth
    /// retrying. Surfaces immediately.
    #[error("api error: {0}")]
    Api(String),
    /// Connectivity failure; retried with backoff.
    #[error("network error: {0}")]
    Network(String),
    /// Per-attempt deadline expired; retried with backoff.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// Every attempt failed; wraps the last cause.
    #[error("api error after {retries} retries: {source}")]
    RetriesExhausted {
        retries: u32,
        #[source]
        source: Box<BardError>,
    },
}

impl BardError {
    /// Whether the attempt that produced this error may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, BardError::Network(_) | BardError::Timeout(_))
    }
}

/// One-shot convenience: ask a single question with a default client and
/// no prior conversation.
pub async fn query(message: &str) -> Result<String, BardError> {
    BardClient::default().ask(message).await
}
