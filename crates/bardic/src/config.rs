//! Client configuration.

use std::time::Duration;

/// Frontend origin the endpoint path is appended to. Overridable because
/// the endpoint is unofficial and moves without notice.
pub const DEFAULT_BASE_URL: &str = "https://gemini.google.com";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct BardConfig {
    /// Frontend origin (no trailing slash).
    pub base_url: String,
    /// Per-attempt network deadline.
    pub timeout: Duration,
    /// Maximum number of attempts per call.
    pub retries: u32,
    /// Artificial delay between streamed word tokens.
    pub stream_pace: Duration,
}

impl Default for BardConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            retries: 3,
            stream_pace: Duration::from_millis(50),
        }
    }
}

impl BardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_stream_pace(mut self, pace: Duration) -> Self {
        self.stream_pace = pace;
        self
    }
}
