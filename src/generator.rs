//! Script generation: sends a [`ResolvedPrompt`] to a [`ScriptBackend`].
//!
//! Transient backend failures are retried with exponential backoff. Every
//! attempt sends the same resolved text; the prompt is never re-resolved.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry2::strategy::{ExponentialBackoff, jitter};
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::resolver::ResolvedPrompt;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication rejected ({0})")]
    Auth(String),

    #[error("backend returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("backend returned no content")]
    Empty,
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Transport(_) | BackendError::Empty => true,
            BackendError::Status { code, .. } => *code == 429 || *code >= 500,
            BackendError::Auth(_) => false,
        }
    }
}

/// The only capability the pipeline needs from a language model.
#[async_trait]
pub trait ScriptBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, BackendError>;

    fn name(&self) -> &str;
}

/// Raw text returned by the backend for one prompt.
///
/// This is output, not a template: it has no way back into the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedScript {
    key: String,
    text: String,
}

impl GeneratedScript {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Clone)]
pub struct ScriptGenerator {
    backend: Arc<dyn ScriptBackend>,
    policy: RetryPolicy,
}

impl ScriptGenerator {
    pub fn new(backend: Arc<dyn ScriptBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Delays between attempts before jitter: `base_delay`, then doubling,
    /// each capped at `max_delay`, one per allowed retry.
    fn backoff(&self) -> impl Iterator<Item = Duration> {
        let base_ms = u64::try_from(self.policy.base_delay.as_millis()).unwrap_or(u64::MAX);
        // from_millis(2) yields 2, 4, 8...; the factor scales that to base, 2*base, 4*base...
        ExponentialBackoff::from_millis(2)
            .factor((base_ms / 2).max(1))
            .max_delay(self.policy.max_delay)
            .take(self.policy.max_retries)
    }

    pub async fn generate(&self, prompt: &ResolvedPrompt) -> Result<GeneratedScript> {
        let key = prompt.key();
        let text = prompt.as_str();
        let backend = self.backend.as_ref();
        let timeout = self.policy.attempt_timeout;
        let attempts = AtomicU32::new(0);

        info!(
            "Generating script for '{}' via {} ({} prompt chars)",
            key,
            backend.name(),
            text.len()
        );

        let strategy = self.backoff().map(jitter);

        let outcome = Retry::spawn(strategy, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                debug!("Backend attempt {} for '{}'", attempt, key);
                let result = match tokio::time::timeout(timeout, backend.complete(text)).await {
                    Ok(result) => result,
                    Err(_) => Err(BackendError::Transport(format!(
                        "no response within {}s",
                        timeout.as_secs()
                    ))),
                };
                match result {
                    Ok(body) if body.trim().is_empty() => {
                        warn!("Empty response for '{}' on attempt {}", key, attempt);
                        Err(RetryError::Transient {
                            err: BackendError::Empty,
                            retry_after: None,
                        })
                    }
                    Ok(body) => Ok(body),
                    Err(e) if e.is_retryable() => {
                        warn!("Transient backend error for '{}', will retry: {}", key, e);
                        Err(RetryError::Transient {
                            err: e,
                            retry_after: None,
                        })
                    }
                    Err(e) => {
                        warn!("Permanent backend error for '{}': {}", key, e);
                        Err(RetryError::Permanent(e))
                    }
                }
            }
        })
        .await;

        let total = attempts.load(Ordering::SeqCst);
        match outcome {
            Ok(body) => {
                info!(
                    "Received {} chars for '{}' after {} attempt(s)",
                    body.len(),
                    key,
                    total
                );
                Ok(GeneratedScript {
                    key: key.to_string(),
                    text: body,
                })
            }
            Err(BackendError::Empty) => Err(Error::GenerationEmpty {
                key: key.to_string(),
            }),
            Err(e) => Err(Error::GenerationUnavailable {
                key: key.to_string(),
                reason: format!("{e} (after {total} attempt(s))"),
            }),
        }
    }

    /// Like [`generate`](Self::generate), but gives up as soon as `cancel`
    /// completes. The in-flight request is dropped.
    pub async fn generate_cancellable<C>(
        &self,
        prompt: &ResolvedPrompt,
        cancel: C,
    ) -> Result<GeneratedScript>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            result = self.generate(prompt) => result,
            _ = cancel => {
                warn!("Generation for '{}' cancelled", prompt.key());
                Err(Error::GenerationUnavailable {
                    key: prompt.key().to_string(),
                    reason: "cancelled".into(),
                })
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI-compatible chat completions backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl ScriptBackend for OpenAiBackend {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.7,
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(BackendError::Auth(status.to_string()));
        }
        if !status.is_success() {
            return Err(BackendError::Status {
                code: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| BackendError::Transport(format!("malformed response body: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(BackendError::Empty);
        }
        Ok(content)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::resolver::{ParameterSet, resolve};
    use crate::template::Template;

    struct Flaky {
        replies: Mutex<Vec<std::result::Result<String, BackendError>>>,
        seen: Mutex<Vec<String>>,
    }

    impl Flaky {
        fn new(mut replies: Vec<std::result::Result<String, BackendError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ScriptBackend for Flaky {
        async fn complete(&self, prompt: &str) -> std::result::Result<String, BackendError> {
            self.seen.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(BackendError::Transport("exhausted".into())))
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    fn prompt() -> ResolvedPrompt {
        let t = Template::parse("short_prompt", "script about {title} for {time}s").unwrap();
        resolve(&t, &ParameterSet::new().with("title", "tea").with("time", "30")).unwrap()
    }

    #[tokio::test]
    async fn test_should_retry_transient_errors_with_same_prompt() {
        let backend = Arc::new(Flaky::new(vec![
            Err(BackendError::Transport("reset".into())),
            Err(BackendError::Status {
                code: 503,
                body: String::new(),
            }),
            Ok("Tea is great.".into()),
        ]));
        let generator = ScriptGenerator::new(backend.clone(), fast_policy(3));
        let script = generator.generate(&prompt()).await.unwrap();
        assert_eq!(script.as_str(), "Tea is great.");
        assert_eq!(script.key(), "short_prompt");

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|p| p == "script about tea for 30s"));
    }

    #[tokio::test]
    async fn test_should_not_retry_auth_failures() {
        let backend = Arc::new(Flaky::new(vec![Err(BackendError::Auth("401".into()))]));
        let generator = ScriptGenerator::new(backend.clone(), fast_policy(3));
        let err = generator.generate(&prompt()).await.unwrap_err();
        assert!(matches!(err, Error::GenerationUnavailable { .. }));
        assert_eq!(backend.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_should_surface_empty_after_retries() {
        let backend = Arc::new(Flaky::new(vec![Ok("".into()), Ok("  \n".into())]));
        let generator = ScriptGenerator::new(backend.clone(), fast_policy(1));
        let err = generator.generate(&prompt()).await.unwrap_err();
        assert!(matches!(err, Error::GenerationEmpty { ref key } if key == "short_prompt"));
        assert_eq!(backend.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_should_give_up_when_cancelled() {
        struct Hang;

        #[async_trait]
        impl ScriptBackend for Hang {
            async fn complete(&self, _: &str) -> std::result::Result<String, BackendError> {
                std::future::pending().await
            }

            fn name(&self) -> &str {
                "hang"
            }
        }

        let generator = ScriptGenerator::new(Arc::new(Hang), fast_policy(0));
        let err = generator
            .generate_cancellable(&prompt(), async {})
            .await
            .unwrap_err();
        match err {
            Error::GenerationUnavailable { reason, .. } => assert_eq!(reason, "cancelled"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_should_classify_retryable_statuses() {
        let status = |code| BackendError::Status {
            code,
            body: String::new(),
        };
        assert!(status(429).is_retryable());
        assert!(status(502).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!BackendError::Auth("403".into()).is_retryable());
    }

    #[test]
    fn test_should_start_backoff_at_base_delay_and_double() {
        let generator = ScriptGenerator::new(Arc::new(Flaky::new(Vec::new())), RetryPolicy::default());
        let delays: Vec<Duration> = generator.backoff().collect();
        assert_eq!(
            delays,
            [
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2)
            ]
        );
    }

    #[test]
    fn test_should_cap_backoff_at_max_delay() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
            ..RetryPolicy::default()
        };
        let generator = ScriptGenerator::new(Arc::new(Flaky::new(Vec::new())), policy);
        let delays: Vec<u64> = generator.backoff().map(|d| d.as_secs()).collect();
        assert_eq!(delays, [1, 2, 3, 3, 3]);
    }
}
