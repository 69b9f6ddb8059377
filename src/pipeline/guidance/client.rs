use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{ApiKey, GenerationConfig, APP_NAME, APP_VERSION, MAX_RETRIES_CAP};

use super::cancel::CancellationToken;
use super::{GenerationFailureKind, GuidanceError};

/// Longest excerpt of an error body carried in a failure detail.
const ERROR_BODY_EXCERPT: usize = 200;

/// Result of one generation request, after any retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Success { raw_text: String },
    Failure {
        kind: GenerationFailureKind,
        detail: String,
    },
}

impl GenerationOutcome {
    pub fn failure(kind: GenerationFailureKind, detail: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            detail: detail.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::failure(GenerationFailureKind::Cancelled, "request cancelled")
    }

    pub fn into_result(self) -> Result<String, GuidanceError> {
        match self {
            Self::Success { raw_text } => Ok(raw_text),
            Self::Failure { kind, detail } => Err(GuidanceError::Generation { kind, detail }),
        }
    }
}

/// Sends a prompt to a text generation backend. Implementations never
/// panic or return early without an outcome.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> GenerationOutcome;
}

/// Retry policy for transient transport failures: at most one retry,
/// delayed by the base delay plus up to the same again in jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.min(MAX_RETRIES_CAP),
            base_delay,
        }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn backoff(&self) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let jitter_ms = if base_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=base_ms)
        };
        Duration::from_millis(base_ms.saturating_add(jitter_ms))
    }
}

// ═══════════════════════════════════════════
// Gemini generateContent client
// ═══════════════════════════════════════════

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Text of the first candidate, its parts concatenated.
pub fn first_candidate_text(body: &str) -> Result<String, String> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| format!("response body is not valid JSON: {e}"))?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err("response has no candidate text".to_string())
    } else {
        Ok(text)
    }
}

#[derive(Debug)]
struct AttemptFailure {
    kind: GenerationFailureKind,
    detail: String,
    retryable: bool,
}

impl AttemptFailure {
    fn transport(detail: String, retryable: bool) -> Self {
        Self {
            kind: GenerationFailureKind::Transport,
            detail,
            retryable,
        }
    }

    fn shape(detail: String) -> Self {
        Self {
            kind: GenerationFailureKind::Shape,
            detail,
            retryable: false,
        }
    }

    fn cancelled() -> Self {
        Self {
            kind: GenerationFailureKind::Cancelled,
            detail: "request cancelled".to_string(),
            retryable: false,
        }
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        let retryable = error.is_connect() || error.is_timeout();
        Self::transport(error.without_url().to_string(), retryable)
    }

    fn into_outcome(self) -> GenerationOutcome {
        GenerationOutcome::failure(self.kind, self.detail)
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(ERROR_BODY_EXCERPT).collect()
}

/// HTTP client for a Gemini-style `generateContent` endpoint.
#[derive(Debug)]
pub struct GeminiClient {
    endpoint: String,
    api_key: ApiKey,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, GuidanceError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("{APP_NAME}/{APP_VERSION}"))
            .build()
            .map_err(|e| GuidanceError::HttpClient(e.to_string()))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            http,
            retry: RetryPolicy::new(config.max_retries, config.retry_base_delay),
        })
    }

    async fn attempt(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, AttemptFailure> {
        if cancel.is_cancelled() {
            return Err(AttemptFailure::cancelled());
        }

        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };
        let request = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", self.api_key.expose())
            .json(&body);

        let exchange = async {
            let response = request.send().await.map_err(AttemptFailure::from_reqwest)?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let retryable =
                    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                return Err(AttemptFailure::transport(
                    format!("status {}: {}", status.as_u16(), excerpt(&body)),
                    retryable,
                ));
            }
            let body = response.text().await.map_err(AttemptFailure::from_reqwest)?;
            first_candidate_text(&body).map_err(AttemptFailure::shape)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AttemptFailure::cancelled()),
            result = tokio::time::timeout(timeout, exchange) => match result {
                Ok(inner) => inner,
                Err(_) => Err(AttemptFailure::transport(
                    format!("timed out after {}ms", timeout.as_millis()),
                    true,
                )),
            },
        }
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> GenerationOutcome {
        let mut attempt = 0u32;
        loop {
            tracing::debug!(attempt, "Sending generation request");
            match self.attempt(prompt, timeout, cancel).await {
                Ok(raw_text) => return GenerationOutcome::Success { raw_text },
                Err(failure) if failure.retryable && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff();
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        detail = %failure.detail,
                        "Generation attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return GenerationOutcome::cancelled(),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(failure) => return failure.into_outcome(),
            }
        }
    }
}

// ═══════════════════════════════════════════
// Scripted client
// ═══════════════════════════════════════════

/// Scripted client: returns outcomes in order, repeating the last one.
/// Records every prompt it receives.
#[derive(Debug, Default)]
pub struct MockGenerationClient {
    script: Vec<GenerationOutcome>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerationClient {
    pub fn new(script: Vec<GenerationOutcome>) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    pub fn succeeding(raw_text: &str) -> Self {
        Self::new(vec![GenerationOutcome::Success {
            raw_text: raw_text.to_string(),
        }])
    }

    pub fn failing(kind: GenerationFailureKind) -> Self {
        Self::new(vec![GenerationOutcome::failure(kind, "scripted failure")])
    }

    /// Delay every response, honoring timeout and cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GenerationClient for MockGenerationClient {
    async fn generate(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> GenerationOutcome {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let index = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = cancel.cancelled() => return GenerationOutcome::cancelled(),
                _ = tokio::time::sleep(delay.min(timeout)) => {}
            }
            if delay > timeout {
                return GenerationOutcome::failure(
                    GenerationFailureKind::Transport,
                    format!("timed out after {}ms", timeout.as_millis()),
                );
            }
        }
        if cancel.is_cancelled() {
            return GenerationOutcome::cancelled();
        }

        self.script
            .get(index)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or_else(|| {
                GenerationOutcome::failure(GenerationFailureKind::Transport, "no scripted outcome")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use crate::config::ApiKey;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn spawn_stub(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1/generate")
    }

    fn client_for(endpoint: String, max_retries: u32) -> GeminiClient {
        let mut config = GenerationConfig::new(ApiKey::new("test-key"));
        config.endpoint = endpoint;
        config.max_retries = max_retries;
        config.retry_base_delay = Duration::from_millis(10);
        GeminiClient::new(&config).unwrap()
    }

    fn candidate(text: &str) -> Value {
        json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
    }

    fn failure_kind(outcome: &GenerationOutcome) -> Option<GenerationFailureKind> {
        match outcome {
            GenerationOutcome::Failure { kind, .. } => Some(*kind),
            GenerationOutcome::Success { .. } => None,
        }
    }

    #[test]
    fn candidate_parts_are_concatenated() {
        let body = json!({"candidates": [
            {"content": {"parts": [{"text": "Hello"}, {"text": ", world"}]}},
            {"content": {"parts": [{"text": "ignored"}]}}
        ]})
        .to_string();
        assert_eq!(first_candidate_text(&body).unwrap(), "Hello, world");
    }

    #[test]
    fn missing_candidates_is_a_shape_error() {
        assert!(first_candidate_text(r#"{"promptFeedback": {}}"#).is_err());
        assert!(first_candidate_text(r#"{"candidates": [{"content": {"parts": []}}]}"#).is_err());
        assert!(first_candidate_text("<html>oops</html>").is_err());
    }

    #[test]
    fn retry_policy_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.max_retries, MAX_RETRIES_CAP);
        let delay = policy.backoff();
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_millis(200));
        assert_eq!(RetryPolicy::none().backoff(), Duration::ZERO);
    }

    #[test]
    fn huge_base_delay_saturates() {
        let policy = RetryPolicy::new(1, Duration::from_millis(u64::MAX));
        assert!(policy.backoff() >= Duration::from_millis(u64::MAX));
    }

    #[tokio::test]
    async fn successful_call_returns_text_and_sends_key_header() {
        async fn handler(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
            if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) != Some("test-key") {
                return (StatusCode::UNAUTHORIZED, Json(json!({})));
            }
            let prompt = body["contents"][0]["parts"][0]["text"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            (StatusCode::OK, Json(candidate(&format!("echo: {prompt}"))))
        }
        let endpoint = spawn_stub(Router::new().route("/v1/generate", post(handler))).await;
        let client = client_for(endpoint, 0);

        let outcome = client
            .generate("hello", TIMEOUT, &CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            GenerationOutcome::Success {
                raw_text: "echo: hello".into()
            }
        );
    }

    #[tokio::test]
    async fn server_error_is_transport_failure() {
        let app = Router::new().route(
            "/v1/generate",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let client = client_for(spawn_stub(app).await, 0);
        let outcome = client.generate("p", TIMEOUT, &CancellationToken::new()).await;
        assert_eq!(failure_kind(&outcome), Some(GenerationFailureKind::Transport));
        if let GenerationOutcome::Failure { detail, .. } = outcome {
            assert!(detail.contains("500"));
        }
    }

    #[tokio::test]
    async fn missing_candidates_is_shape_failure() {
        let app = Router::new().route(
            "/v1/generate",
            post(|| async { Json(json!({"promptFeedback": {"blockReason": "SAFETY"}})) }),
        );
        let client = client_for(spawn_stub(app).await, 0);
        let outcome = client.generate("p", TIMEOUT, &CancellationToken::new()).await;
        assert_eq!(failure_kind(&outcome), Some(GenerationFailureKind::Shape));
    }

    #[tokio::test]
    async fn non_json_success_body_is_shape_failure() {
        let app = Router::new().route("/v1/generate", post(|| async { "plain text" }));
        let client = client_for(spawn_stub(app).await, 0);
        let outcome = client.generate("p", TIMEOUT, &CancellationToken::new()).await;
        assert_eq!(failure_kind(&outcome), Some(GenerationFailureKind::Shape));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let app = Router::new().route(
            "/v1/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(candidate("late"))
            }),
        );
        let client = client_for(spawn_stub(app).await, 0);
        let outcome = client
            .generate("p", Duration::from_millis(100), &CancellationToken::new())
            .await;
        assert_eq!(failure_kind(&outcome), Some(GenerationFailureKind::Transport));
    }

    #[tokio::test]
    async fn cancellation_interrupts_in_flight_request() {
        let app = Router::new().route(
            "/v1/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(candidate("late"))
            }),
        );
        let client = client_for(spawn_stub(app).await, 0);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = client.generate("p", TIMEOUT, &cancel).await;
        assert_eq!(failure_kind(&outcome), Some(GenerationFailureKind::Cancelled));
    }

    #[tokio::test]
    async fn already_cancelled_token_skips_request() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/v1/generate",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(candidate("ok"))
                }),
            )
            .with_state(hits.clone());
        let client = client_for(spawn_stub(app).await, 0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = client.generate("p", TIMEOUT, &cancel).await;
        assert_eq!(failure_kind(&outcome), Some(GenerationFailureKind::Cancelled));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    fn flaky_app(hits: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/v1/generate",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})))
                    } else {
                        (StatusCode::OK, Json(candidate("recovered")))
                    }
                }),
            )
            .with_state(hits)
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let client = client_for(spawn_stub(flaky_app(hits.clone())).await, 1);
        let outcome = client.generate("p", TIMEOUT, &CancellationToken::new()).await;
        assert_eq!(
            outcome,
            GenerationOutcome::Success {
                raw_text: "recovered".into()
            }
        );
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_retry_by_default() {
        let hits = Arc::new(AtomicUsize::new(0));
        let client = client_for(spawn_stub(flaky_app(hits.clone())).await, 0);
        let outcome = client.generate("p", TIMEOUT, &CancellationToken::new()).await;
        assert_eq!(failure_kind(&outcome), Some(GenerationFailureKind::Transport));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/v1/generate",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::BAD_REQUEST, "bad request")
                }),
            )
            .with_state(hits.clone());
        let client = client_for(spawn_stub(app).await, 1);
        let outcome = client.generate("p", TIMEOUT, &CancellationToken::new()).await;
        assert_eq!(failure_kind(&outcome), Some(GenerationFailureKind::Transport));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = client_for(format!("http://{addr}/v1/generate"), 0);
        let outcome = client.generate("p", TIMEOUT, &CancellationToken::new()).await;
        assert_eq!(failure_kind(&outcome), Some(GenerationFailureKind::Transport));
    }

    #[tokio::test]
    async fn mock_repeats_last_outcome_and_records_prompts() {
        let mock = MockGenerationClient::new(vec![
            GenerationOutcome::failure(GenerationFailureKind::Transport, "down"),
            GenerationOutcome::Success {
                raw_text: "ok".into(),
            },
        ]);
        let cancel = CancellationToken::new();
        let first = mock.generate("one", TIMEOUT, &cancel).await;
        let second = mock.generate("two", TIMEOUT, &cancel).await;
        let third = mock.generate("three", TIMEOUT, &cancel).await;
        assert_eq!(failure_kind(&first), Some(GenerationFailureKind::Transport));
        assert_eq!(second, third);
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.prompts(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn mock_delay_honors_timeout() {
        let mock = MockGenerationClient::succeeding("ok").with_delay(Duration::from_secs(2));
        let outcome = mock
            .generate("p", Duration::from_millis(20), &CancellationToken::new())
            .await;
        assert_eq!(failure_kind(&outcome), Some(GenerationFailureKind::Transport));
    }

    #[test]
    fn outcome_converts_into_result() {
        let err = GenerationOutcome::cancelled().into_result().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(
            GenerationOutcome::Success {
                raw_text: "x".into()
            }
            .into_result()
            .unwrap(),
            "x"
        );
    }
}
