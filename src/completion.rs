//! Completion shaping: backend outcome → usage-annotated result → OpenAI response object.

use actix_web::HttpResponseBuilder;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::blackbox::AgentBackend;
use crate::envelope::{estimate_usage, AgentEnvelope};
use crate::error::ApiError;
use crate::models::chat::{
    ChatChoice, ChatCompletionResponse, ChatResponseMessage, ChatUsage, Role,
};

pub const REQUEST_ID_HEADER: &str = "symbi-request-id";
const REQUEST_ID_LEN: usize = 13;

/// Content produced for one request, with its estimated usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResult {
    pub content: String,
    pub usage: ChatUsage,
}

/// Per-request identity shared by the JSON body, the SSE chunks and the headers.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub request_id: String,
    pub created: i64,
    pub model: String,
}

impl ResponseMeta {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            request_id: generate_request_id(),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
        }
    }

    pub fn completion_id(&self) -> String {
        format!("chatcmpl-{}", self.request_id)
    }
}

/// Short lowercase alphanumeric token, unique per request in practice.
pub fn generate_request_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REQUEST_ID_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Plan/quota headers reported to clients. Values are informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanInfo {
    pub plan: String,
    pub su_remaining: u64,
    pub su_percent: u8,
}

impl Default for PlanInfo {
    fn default() -> Self {
        Self {
            plan: "pro".to_string(),
            su_remaining: 1000,
            su_percent: 75,
        }
    }
}

/// Attach the request id and plan headers.
pub fn insert_response_headers(
    builder: &mut HttpResponseBuilder,
    meta: &ResponseMeta,
    plan: &PlanInfo,
) {
    builder.insert_header((REQUEST_ID_HEADER, meta.request_id.clone()));
    builder.insert_header(("x-plan", plan.plan.clone()));
    builder.insert_header(("x-su-remaining", plan.su_remaining.to_string()));
    builder.insert_header(("x-su-percent", plan.su_percent.to_string()));
}

/// Send `envelope` to the backend and estimate usage on whichever content came back.
pub async fn complete(
    backend: &dyn AgentBackend,
    envelope: &AgentEnvelope,
) -> Result<CompletionResult, ApiError> {
    let outcome = backend.send(envelope).await;
    let content = outcome.into_content();
    let usage = estimate_usage(envelope, &content)?;
    Ok(CompletionResult { content, usage })
}

/// Shape a non-streaming `chat.completion` object.
pub fn build_response(meta: &ResponseMeta, result: &CompletionResult) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: meta.completion_id(),
        object: "chat.completion".to_string(),
        created: meta.created,
        model: meta.model.clone(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatResponseMessage {
                role: Role::Assistant,
                content: result.content.clone(),
            },
            finish_reason: "stop".to_string(),
        }],
        usage: result.usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackbox::{fallback_content, BackendOutcome, FallbackReason};
    use crate::envelope::EnvelopePayload;
    use async_trait::async_trait;

    struct Canned(BackendOutcome);

    #[async_trait]
    impl AgentBackend for Canned {
        async fn send(&self, _envelope: &AgentEnvelope) -> BackendOutcome {
            self.0.clone()
        }
    }

    fn envelope() -> AgentEnvelope {
        AgentEnvelope {
            agent: "field_commander".into(),
            classification: "C".into(),
            compartments: vec!["OPS".into()],
            payload: EnvelopePayload {
                content: "Report".into(),
                context: Some("user: hi".into()),
            },
        }
    }

    #[test]
    fn request_ids_are_short_lowercase_alphanumeric() {
        let id = generate_request_id();
        assert_eq!(id.len(), REQUEST_ID_LEN);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(id, generate_request_id());
    }

    #[test]
    fn response_shape_matches_chat_completion() {
        let meta = ResponseMeta {
            request_id: "abc123".into(),
            created: 1_700_000_000,
            model: "symbi-field-commander-001".into(),
        };
        let result = CompletionResult {
            content: "Copy that.".into(),
            usage: ChatUsage::new(10, 3),
        };
        let v = serde_json::to_value(build_response(&meta, &result)).unwrap();
        assert_eq!(v["id"], "chatcmpl-abc123");
        assert_eq!(v["object"], "chat.completion");
        assert_eq!(v["created"], 1_700_000_000);
        assert_eq!(v["model"], "symbi-field-commander-001");
        assert_eq!(v["choices"][0]["index"], 0);
        assert_eq!(v["choices"][0]["message"]["role"], "assistant");
        assert_eq!(v["choices"][0]["message"]["content"], "Copy that.");
        assert_eq!(v["choices"][0]["finish_reason"], "stop");
        assert_eq!(v["usage"]["total_tokens"], 13);
    }

    #[tokio::test]
    async fn complete_uses_backend_reply() {
        let backend = Canned(BackendOutcome::Reply {
            content: "All clear".into(),
        });
        let result = complete(&backend, &envelope()).await.unwrap();
        assert_eq!(result.content, "All clear");
        assert_eq!(result.usage.completion_tokens, 3);
        assert_eq!(
            result.usage.total_tokens,
            result.usage.prompt_tokens + result.usage.completion_tokens
        );
    }

    #[tokio::test]
    async fn complete_estimates_usage_on_fallback_content() {
        let env = envelope();
        let mock = fallback_content(&env);
        let backend = Canned(BackendOutcome::Fallback {
            content: mock.clone(),
            reason: FallbackReason::Rejected,
        });
        let result = complete(&backend, &env).await.unwrap();
        assert_eq!(result.content, mock);
        assert_eq!(
            result.usage.completion_tokens,
            crate::envelope::estimate_tokens(&mock)
        );
        assert_eq!(
            result.usage.total_tokens,
            result.usage.prompt_tokens + result.usage.completion_tokens
        );
    }
}
