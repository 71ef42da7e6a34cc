//! Blackbox agent backend client.
//!
//! Sends an [`AgentEnvelope`] to `{BLACKBOX_BASE_URL}/send` and returns a tagged
//! [`BackendOutcome`]. Failures never escape this module: network errors, timeouts,
//! non-success statuses, unparsable bodies and `ok: false` replies all resolve to
//! [`BackendOutcome::Fallback`] with a deterministic, clearly labelled mock reply.
//!
//! Environment:
//! - BLACKBOX_BASE_URL          -> backend base URL (default https://symbi.world/api/agents)
//! - BLACKBOX_TOKEN             -> optional bearer credential
//! - BLACKBOX_TIMEOUT_SECONDS   -> per-attempt timeout (default 30)
//! - BLACKBOX_MAX_RETRIES       -> 0 or 1; one extra attempt on network errors and 5xx

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::envelope::AgentEnvelope;

pub const DEFAULT_BASE_URL: &str = "https://symbi.world/api/agents";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_RETRIES_CAP: u32 = 1;

/// Connection settings for the Blackbox backend.
#[derive(Clone)]
pub struct BlackboxConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl std::fmt::Debug for BlackboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlackboxConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for BlackboxConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 0,
        }
    }
}

impl BlackboxConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.min(MAX_RETRIES_CAP);
        self
    }

    /// Read the backend settings from the environment.
    pub fn from_env() -> Self {
        let base_url = match std::env::var("BLACKBOX_BASE_URL") {
            Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
            _ => {
                static LOGGED: std::sync::OnceLock<()> = std::sync::OnceLock::new();
                LOGGED.get_or_init(|| {
                    tracing::warn!("BLACKBOX_BASE_URL not set; defaulting to {DEFAULT_BASE_URL}");
                });
                DEFAULT_BASE_URL.to_string()
            }
        };

        let token = std::env::var("BLACKBOX_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let timeout = std::env::var("BLACKBOX_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let max_retries = std::env::var("BLACKBOX_MAX_RETRIES")
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(0);

        Self {
            base_url,
            token,
            timeout,
            max_retries: max_retries.min(MAX_RETRIES_CAP),
        }
    }

    pub fn send_url(&self) -> String {
        format!("{}/send", self.base_url.trim_end_matches('/'))
    }
}

/// Why the backend reply was replaced by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// Connection failure or timeout
    Unreachable(String),
    /// Backend answered with a non-success status
    HttpStatus(u16),
    /// Backend answered `ok: false`
    Rejected,
    /// Body was not a valid backend reply
    MalformedReply(String),
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::Unreachable(e) => write!(f, "backend unreachable: {e}"),
            FallbackReason::HttpStatus(code) => write!(f, "backend returned HTTP {code}"),
            FallbackReason::Rejected => f.write_str("backend reported failure"),
            FallbackReason::MalformedReply(e) => write!(f, "malformed backend reply: {e}"),
        }
    }
}

/// Result of one backend exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOutcome {
    Reply {
        content: String,
    },
    Fallback {
        content: String,
        reason: FallbackReason,
    },
}

impl BackendOutcome {
    pub fn content(&self) -> &str {
        match self {
            BackendOutcome::Reply { content } | BackendOutcome::Fallback { content, .. } => content,
        }
    }

    pub fn into_content(self) -> String {
        match self {
            BackendOutcome::Reply { content } | BackendOutcome::Fallback { content, .. } => content,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, BackendOutcome::Fallback { .. })
    }

    /// Replace a failed exchange with the mock reply for `envelope`.
    pub fn fallback(envelope: &AgentEnvelope, reason: FallbackReason) -> Self {
        warn!(
            agent = %envelope.agent,
            "Blackbox unavailable, using mock response: {}", reason
        );
        BackendOutcome::Fallback {
            content: fallback_content(envelope),
            reason,
        }
    }
}

/// Agent backend seam. Implementations must absorb their own failures.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn send(&self, envelope: &AgentEnvelope) -> BackendOutcome;

    /// Human-readable target, for status reporting.
    fn describe(&self) -> String {
        "custom".to_string()
    }
}

#[derive(Debug, Deserialize)]
struct BlackboxResponse {
    ok: bool,
    #[serde(default)]
    reply: Option<BlackboxReply>,
}

#[derive(Debug, Deserialize)]
struct BlackboxReply {
    payload: BlackboxReplyPayload,
}

#[derive(Debug, Deserialize)]
struct BlackboxReplyPayload {
    content: String,
}

/// Retry decision for a single failed attempt.
enum Attempt {
    Done(BackendOutcome),
    Retryable(FallbackReason),
}

/// HTTP client for the Blackbox `/send` endpoint.
pub struct BlackboxClient {
    config: BlackboxConfig,
    client: reqwest::Client,
}

impl BlackboxClient {
    pub fn new(config: BlackboxConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &BlackboxConfig {
        &self.config
    }

    async fn attempt(&self, url: &str, envelope: &AgentEnvelope) -> Attempt {
        let mut rb = self
            .client
            .post(url)
            .timeout(self.config.timeout)
            .json(envelope);
        if let Some(token) = self.config.token.as_deref() {
            rb = rb.bearer_auth(token);
        }

        let response = match rb.send().await {
            Ok(r) => r,
            Err(e) => return Attempt::Retryable(FallbackReason::Unreachable(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            let reason = FallbackReason::HttpStatus(status.as_u16());
            return if status.is_server_error() {
                Attempt::Retryable(reason)
            } else {
                Attempt::Done(BackendOutcome::fallback(envelope, reason))
            };
        }

        let parsed: BlackboxResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                return Attempt::Done(BackendOutcome::fallback(
                    envelope,
                    FallbackReason::MalformedReply(e.to_string()),
                ))
            }
        };

        let outcome = match (parsed.ok, parsed.reply) {
            (false, _) => BackendOutcome::fallback(envelope, FallbackReason::Rejected),
            (true, None) => BackendOutcome::fallback(
                envelope,
                FallbackReason::MalformedReply("missing reply".to_string()),
            ),
            (true, Some(reply)) => BackendOutcome::Reply {
                content: reply.payload.content,
            },
        };
        Attempt::Done(outcome)
    }
}

#[async_trait]
impl AgentBackend for BlackboxClient {
    async fn send(&self, envelope: &AgentEnvelope) -> BackendOutcome {
        let url = self.config.send_url();
        let mut attempts_left = self.config.max_retries;

        loop {
            debug!(agent = %envelope.agent, "Sending envelope to {}", url);
            match self.attempt(&url, envelope).await {
                Attempt::Done(outcome) => return outcome,
                Attempt::Retryable(reason) if attempts_left > 0 => {
                    attempts_left -= 1;
                    debug!("Retrying Blackbox call after failure: {}", reason);
                }
                Attempt::Retryable(reason) => return BackendOutcome::fallback(envelope, reason),
            }
        }
    }

    fn describe(&self) -> String {
        self.config.base_url.clone()
    }
}

/// Deterministic mock reply echoing the routing details and the user's content.
pub fn fallback_content(envelope: &AgentEnvelope) -> String {
    format!(
        "SYMBI {banner} ONLINE\n\n\
         Received: \"{content}\"\n\n\
         This is a mock response. Configure BLACKBOX_BASE_URL and BLACKBOX_TOKEN environment variables to connect to your agent infrastructure.\n\n\
         Agent: {agent}\n\
         Classification: {classification}\n\
         Compartments: {compartments}",
        banner = envelope.agent.to_uppercase().replacen('_', " ", 1),
        content = envelope.payload.content,
        agent = envelope.agent,
        classification = envelope.classification,
        compartments = envelope.compartments.join(", "),
    )
}
