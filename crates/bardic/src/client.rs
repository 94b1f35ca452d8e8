//! Client struct, attempt loop, and retry/backoff policy.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::Stream;
use tracing::{debug, warn};

use crate::config::BardConfig;
use crate::decode::{self, Reply};
use crate::payload;
use crate::session::SessionState;
use crate::streaming;
use crate::transport::{ReqwestTransport, Transport, TransportError};
use crate::BardError;

/// Path of the batch RPC the web app uses for chat turns.
pub(crate) const ENDPOINT: &str =
    "/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate";

/// Delay before the next attempt, linear in the attempt index:
/// 2s, 4s, 6s, ...
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(u64::from(attempt + 1) * 2_000)
}

/// Anonymous client for the Gemini web chat frontend.
///
/// Cheap to share behind an `Arc`; concurrent `ask` calls are independent
/// requests that only share the conversation identifiers snapshotted at
/// each call's start.
pub struct BardClient {
    config: BardConfig,
    transport: Arc<dyn Transport>,
    session: Mutex<SessionState>,
}

impl Default for BardClient {
    fn default() -> Self {
        Self::new(BardConfig::default())
    }
}

impl BardClient {
    pub fn new(config: BardConfig) -> Self {
        let transport = Arc::new(ReqwestTransport::new(config.base_url.clone()));
        Self::with_transport(config, transport)
    }

    /// Client over a custom transport (tests, instrumentation, proxies).
    pub fn with_transport(config: BardConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            session: Mutex::new(SessionState::default()),
        }
    }

    /// Snapshot of the current conversation identifiers.
    pub fn session(&self) -> SessionState {
        self.session.lock().unwrap().clone()
    }

    /// Drop any referenced conversation; the next call starts fresh.
    pub fn clear_conversation(&self) {
        *self.session.lock().unwrap() = SessionState::default();
    }

    /// Ask one question and return the completed answer.
    ///
    /// An empty string is a valid outcome: the response carried no
    /// recognizable answer.
    pub async fn ask(&self, message: &str) -> Result<String, BardError> {
        let reply = self.roundtrip(message).await?;
        Ok(reply.text)
    }

    /// Ask one question and expose the completed answer as a paced
    /// word-token stream.
    ///
    /// The network call finishes before the first token is produced; the
    /// pacing is purely cosmetic.
    pub async fn ask_stream(
        &self,
        message: &str,
    ) -> Result<impl Stream<Item = String>, BardError> {
        let reply = self.roundtrip(message).await?;
        Ok(streaming::words(reply.text, self.config.stream_pace))
    }

    async fn roundtrip(&self, message: &str) -> Result<Reply, BardError> {
        let session = self.session();
        let url = format!("{}{}", self.config.base_url, ENDPOINT);
        let form = [(payload::FORM_FIELD, payload::form_value(message, &session))];

        let mut attempt = 0;
        loop {
            debug!(attempt, retries = self.config.retries, "chat request");
            match self.attempt(&url, &form).await {
                Ok(body) => {
                    let reply = decode::decode(&body);
                    self.adopt(&reply);
                    return Ok(reply);
                }
                Err(err) if err.is_transient() => {
                    if attempt + 1 >= self.config.retries {
                        return Err(BardError::RetriesExhausted {
                            retries: self.config.retries,
                            source: Box::new(err),
                        });
                    }
                    let wait = backoff_delay(attempt);
                    warn!(
                        attempt,
                        retries = self.config.retries,
                        wait_ms = wait.as_millis() as u64,
                        "transient failure, backing off: {err}"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One bounded HTTP attempt. The deadline covers the whole exchange;
    /// expiry drops the in-flight request future, cancelling it.
    async fn attempt(
        &self,
        url: &str,
        form: &[(&str, String)],
    ) -> Result<String, BardError> {
        let outcome =
            tokio::time::timeout(self.config.timeout, self.transport.post_form(url, form)).await;
        let response = match outcome {
            Err(_) => return Err(BardError::Timeout(self.config.timeout)),
            Ok(Err(TransportError::TimedOut)) => {
                return Err(BardError::Timeout(self.config.timeout))
            }
            Ok(Err(TransportError::Connect(msg))) => return Err(BardError::Network(msg)),
            Ok(Err(TransportError::Other(msg))) => return Err(BardError::Api(msg)),
            Ok(Ok(response)) => response,
        };
        if !(200..300).contains(&response.status) {
            return Err(BardError::Api(format!("status {}", response.status)));
        }
        Ok(response.body)
    }

    /// Replace the session value when the reply echoes an identifier
    /// pair; replies without one leave the session untouched.
    fn adopt(&self, reply: &Reply) {
        if reply.conversation_id.is_none() && reply.response_id.is_none() {
            return;
        }
        let next = SessionState {
            conversation_id: reply.conversation_id.clone(),
            response_id: reply.response_id.clone(),
        };
        debug!(?next, "conversation identifiers updated");
        *self.session.lock().unwrap() = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RawResponse;
    use futures_util::StreamExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Transport driven by a per-attempt script, counting calls and
    /// recording each request's `f.req` value.
    struct ScriptedTransport {
        script: Box<dyn Fn(u32) -> Result<RawResponse, TransportError> + Send + Sync>,
        calls: AtomicU32,
        forms: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(
            script: impl Fn(u32) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Box::new(script),
                calls: AtomicU32::new(0),
                forms: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        /// Inner envelope of the `n`th recorded request.
        fn sent_envelope(&self, n: usize) -> serde_json::Value {
            let forms = self.forms.lock().unwrap();
            let outer: serde_json::Value = serde_json::from_str(&forms[n]).unwrap();
            serde_json::from_str(outer[1].as_str().unwrap()).unwrap()
        }
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn post_form(
            &self,
            _url: &str,
            form: &[(&str, String)],
        ) -> Result<RawResponse, TransportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.forms.lock().unwrap().push(form[0].1.clone());
            (self.script)(n)
        }
    }

    /// Transport whose requests never complete on their own.
    struct StalledTransport {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Transport for StalledTransport {
        async fn post_form(
            &self,
            _url: &str,
            _form: &[(&str, String)],
        ) -> Result<RawResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("request should have been cancelled by the deadline");
        }
    }

    fn ok_envelope(text: &str) -> RawResponse {
        let payload = json!([null, ["c_1", "r_1"], null, null, [["rc_1", text]]]).to_string();
        let body = format!(")]}}'\n{}", json!([["wrb.fr", null, payload]]));
        RawResponse { status: 200, body }
    }

    #[tokio::test]
    async fn success_returns_decoded_answer() {
        let transport = ScriptedTransport::new(|_| Ok(ok_envelope("hello there")));
        let client = BardClient::with_transport(BardConfig::default(), transport.clone());
        assert_eq!(client.ask("hi").await.unwrap(), "hello there");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn unrecognized_body_is_a_silent_empty_answer() {
        let transport = ScriptedTransport::new(|_| {
            Ok(RawResponse {
                status: 200,
                body: "not json".into(),
            })
        });
        let client = BardClient::with_transport(BardConfig::default(), transport.clone());
        assert_eq!(client.ask("hi").await.unwrap(), "");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_until_exhausted() {
        let transport = ScriptedTransport::new(|_| Err(TransportError::Connect("refused".into())));
        let config = BardConfig::default().with_retries(3);
        let client = BardClient::with_transport(config, transport.clone());

        let start = tokio::time::Instant::now();
        let err = client.ask("hi").await.unwrap_err();

        assert_eq!(transport.calls(), 3);
        // Backoff between attempts only: 2s then 4s.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        match err {
            BardError::RetriesExhausted { retries, source } => {
                assert_eq!(retries, 3);
                assert!(matches!(*source, BardError::Network(_)));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_linearly_with_attempt_index() {
        let transport = ScriptedTransport::new(|_| Err(TransportError::TimedOut));
        let config = BardConfig::default().with_retries(4);
        let client = BardClient::with_transport(config, transport.clone());

        let start = tokio::time::Instant::now();
        let _ = client.ask("hi").await;

        assert_eq!(transport.calls(), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(2 + 4 + 6));
    }

    #[tokio::test]
    async fn http_failure_is_fatal_and_short_circuits() {
        let transport = ScriptedTransport::new(|_| {
            Ok(RawResponse {
                status: 500,
                body: String::new(),
            })
        });
        let config = BardConfig::default().with_retries(5);
        let client = BardClient::with_transport(config, transport.clone());

        let err = client.ask("hi").await.unwrap_err();
        assert_eq!(transport.calls(), 1);
        match err {
            BardError::Api(msg) => assert!(msg.contains("status 500"), "got: {msg}"),
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_transient_transport_failure_is_fatal() {
        let transport =
            ScriptedTransport::new(|_| Err(TransportError::Other("body decode failed".into())));
        let config = BardConfig::default().with_retries(5);
        let client = BardClient::with_transport(config, transport.clone());

        let err = client.ask("hi").await.unwrap_err();
        assert_eq!(transport.calls(), 1);
        assert!(matches!(err, BardError::Api(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_counts_as_transient() {
        let transport = Arc::new(StalledTransport {
            calls: AtomicU32::new(0),
        });
        let config = BardConfig::default()
            .with_timeout(Duration::from_secs(1))
            .with_retries(2);
        let client = BardClient::with_transport(config, transport.clone());

        let start = tokio::time::Instant::now();
        let err = client.ask("hi").await.unwrap_err();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        // Two 1s deadlines with a 2s backoff between them.
        assert_eq!(start.elapsed(), Duration::from_secs(1 + 2 + 1));
        match err {
            BardError::RetriesExhausted { retries, source } => {
                assert_eq!(retries, 2);
                assert!(matches!(*source, BardError::Timeout(_)));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let transport = ScriptedTransport::new(|attempt| {
            if attempt == 0 {
                Err(TransportError::TimedOut)
            } else {
                Ok(ok_envelope("recovered"))
            }
        });
        let client = BardClient::with_transport(BardConfig::default(), transport.clone());
        assert_eq!(client.ask("hi").await.unwrap(), "recovered");
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn echoed_identifiers_thread_into_next_request() {
        let transport = ScriptedTransport::new(|_| Ok(ok_envelope("answer")));
        let client = BardClient::with_transport(BardConfig::default(), transport.clone());

        client.ask("first").await.unwrap();
        assert_eq!(client.session(), SessionState::new("c_1", "r_1"));

        client.ask("second").await.unwrap();
        assert_eq!(transport.sent_envelope(0)[2], json!([null, null]));
        assert_eq!(transport.sent_envelope(1)[2], json!(["c_1", "r_1"]));
    }

    #[tokio::test]
    async fn clear_conversation_resets_the_next_payload() {
        let transport = ScriptedTransport::new(|_| Ok(ok_envelope("answer")));
        let client = BardClient::with_transport(BardConfig::default(), transport.clone());

        client.ask("first").await.unwrap();
        assert!(!client.session().is_empty());

        client.clear_conversation();
        assert!(client.session().is_empty());

        client.ask("after reset").await.unwrap();
        assert_eq!(transport.sent_envelope(1)[2], json!([null, null]));
    }

    #[tokio::test]
    async fn ask_stream_paces_the_completed_answer() {
        let transport = ScriptedTransport::new(|_| Ok(ok_envelope("a b c")));
        let config = BardConfig::default().with_stream_pace(Duration::ZERO);
        let client = BardClient::with_transport(config, transport.clone());

        let stream = client.ask_stream("hi").await.unwrap();
        let tokens: Vec<String> = stream.collect().await;
        // The whole answer was fetched before the first token.
        assert_eq!(transport.calls(), 1);
        assert_eq!(tokens, vec!["a ", "b ", "c "]);
    }
}
