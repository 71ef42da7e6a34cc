//! Wire models for the OpenAI-compatible surface.
//!
//! Only the fields the gateway reads or produces are modelled. Unknown request fields are
//! ignored on input; optional response fields are skipped when absent.

pub mod chat {
    use serde::{Deserialize, Serialize};

    /// Author of a chat message.
    ///
    /// Roles outside the three known variants are kept verbatim in `Other` so they still
    /// reach the agent context instead of being rejected or dropped.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(from = "String", into = "String")]
    pub enum Role {
        System,
        User,
        Assistant,
        Other(String),
    }

    impl Role {
        pub fn as_str(&self) -> &str {
            match self {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Other(s) => s.as_str(),
            }
        }
    }

    impl From<String> for Role {
        fn from(value: String) -> Self {
            match value.as_str() {
                "system" => Role::System,
                "user" => Role::User,
                "assistant" => Role::Assistant,
                _ => Role::Other(value),
            }
        }
    }

    impl From<Role> for String {
        fn from(role: Role) -> Self {
            match role {
                Role::Other(s) => s,
                known => known.as_str().to_string(),
            }
        }
    }

    impl std::fmt::Display for Role {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.as_str())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: Role,
        pub content: String,
    }

    impl ChatMessage {
        pub fn new(role: Role, content: impl Into<String>) -> Self {
            Self {
                role,
                content: content.into(),
            }
        }

        pub fn user(content: impl Into<String>) -> Self {
            Self::new(Role::User, content)
        }
    }

    /// Inbound `POST /chat/completions` body.
    ///
    /// `max_tokens` and `temperature` are accepted for client compatibility; the agent
    /// backend decides output length and sampling on its own.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChatCompletionRequest {
        pub model: String,
        pub messages: Vec<ChatMessage>,
        #[serde(default)]
        pub stream: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub max_tokens: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub temperature: Option<f32>,
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatUsage {
        pub prompt_tokens: u32,
        pub completion_tokens: u32,
        pub total_tokens: u32,
    }

    impl ChatUsage {
        /// Build a usage record whose total is always the exact sum of its parts.
        pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
            Self {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatResponseMessage {
        pub role: Role,
        pub content: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChatChoice {
        pub index: u32,
        pub message: ChatResponseMessage,
        pub finish_reason: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChatCompletionResponse {
        pub id: String,
        pub object: String,
        pub created: i64,
        pub model: String,
        pub choices: Vec<ChatChoice>,
        pub usage: ChatUsage,
    }

    /// Incremental content for one streamed choice. An empty delta serializes as `{}`.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub content: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChatStreamChoice {
        pub index: u32,
        pub delta: ChatDelta,
        /// Serialized as `null` until the closing chunk.
        pub finish_reason: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChatCompletionChunk {
        pub id: String,
        pub object: String,
        pub created: i64,
        pub model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub choices: Option<Vec<ChatStreamChoice>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub usage: Option<ChatUsage>,
    }

}

pub mod model_list {
    use serde::{Deserialize, Serialize};

    /// One entry of `GET /models`.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ModelCard {
        pub id: String,
        pub object: String,
        pub created: i64,
        pub owned_by: String,
        pub context_length: u32,
        pub max_output_tokens: u32,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ModelList {
        pub object: String,
        pub data: Vec<ModelCard>,
    }
}
