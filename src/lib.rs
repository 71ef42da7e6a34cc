#![forbid(unsafe_code)]
#![doc = r#"
SYMBI Gateway

Expose SYMBI Blackbox agents behind an OpenAI-compatible Chat Completions API.

Crate highlights
- Library: pure translation via `envelope::translate(&AgentConfig, &[ChatMessage])`.
- HTTP server (in `server`): `/chat/completions` (JSON or SSE) and `/models`, mounted under
  `/api/v1`, `/v1` and the root.
- Degraded mode: when the Blackbox is unreachable or reports failure, callers receive a
  clearly labelled mock completion instead of an error.

Modules
- `models`: OpenAI wire types.
- `agent_routing`: model id → agent configuration.
- `envelope`: chat history → agent envelope, token estimates.
- `blackbox`: backend client and fallback replies.
- `completion`: response shaping and headers.
- `streaming`: SSE chunk emission.
- `server`: Actix-web routes and handlers.
- `util`: Shared helpers (tracing, env, state, CORS).
"#]

pub mod agent_routing;
pub mod blackbox;
pub mod completion;
pub mod envelope;
pub mod error;
pub mod models;
pub mod server;
pub mod streaming;
pub mod util;

pub use crate::agent_routing::{AgentConfig, AgentRoutingTable, ModelRoute};
pub use crate::blackbox::{
    fallback_content, AgentBackend, BackendOutcome, BlackboxClient, BlackboxConfig,
    FallbackReason,
};
pub use crate::completion::{build_response, complete, CompletionResult, PlanInfo, ResponseMeta};
pub use crate::envelope::{estimate_tokens, translate, AgentEnvelope, EnvelopePayload};
pub use crate::error::ApiError;
pub use crate::streaming::{completion_event_stream, split_fragments, ChunkEmitter, StreamState};

// Re-export model namespaces for convenience (downstream users can do `use symbi_gateway::chat`).
pub use crate::models::chat;
