//! HTTP transport seam.
//!
//! The client only needs "POST a form, hand back status and body text".
//! Keeping that behind a trait lets tests script failures and capture
//! requests without touching the network.

use std::time::Duration;

use async_trait::async_trait;

/// User agent presented to the frontend. It serves the anonymous web app,
/// so this only has to look like a generic desktop browser.
pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

/// Content type the frontend expects, charset included.
pub(crate) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

/// Status and body of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport's own deadline expired mid-request.
    #[error("request timed out")]
    TimedOut,
    /// The remote host could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),
    /// Anything else (malformed request, body read failure, ...).
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `form` url-encoded to `url` and read the full body.
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, String)],
    ) -> Result<RawResponse, TransportError>;
}

/// Production transport over a shared `reqwest` client, sending the fixed
/// browser-like headers on every request.
pub struct ReqwestTransport {
    http: reqwest::Client,
    origin: String,
}

impl ReqwestTransport {
    /// `origin` is the frontend origin, used for the `Origin` and
    /// `Referer` headers.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            origin: origin.into(),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, String)],
    ) -> Result<RawResponse, TransportError> {
        let response = self
            .http
            .post(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ORIGIN, &self.origin)
            .header(reqwest::header::REFERER, format!("{}/", self.origin))
            .form(form)
            // .form() sets the bare content type; the frontend wants the
            // charset spelled out.
            .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;
        Ok(RawResponse { status, body })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::TimedOut
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}
