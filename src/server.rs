use actix_web::http::header;
use actix_web::{web, HttpResponse, Responder};
use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use crate::completion::{build_response, complete, insert_response_headers, ResponseMeta};
use crate::envelope::translate;
use crate::error::ApiError;
use crate::models::chat::ChatCompletionRequest;
use crate::streaming::completion_event_stream;
use crate::util::AppState;

const OPENAI_PREFIXES: [&str; 3] = ["/api/v1", "/v1", ""];

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Configure Actix-web routes with AppState.
///
/// The OpenAI-compatible surface is mounted under `/api/v1`, `/v1` and the root.
pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
        .route("/status", web::get().to(status))
        .route("/api/agents/health", web::get().to(agents_health))
        .service(web::scope("/api/v1").configure(openai_routes))
        .service(web::scope("/v1").configure(openai_routes))
        .configure(openai_routes);
}

fn openai_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/chat/completions", web::post().to(chat_completions))
        .route("/models", web::get().to(list_models));
}

/// `POST /chat/completions`: route to an agent, call the backend, answer as JSON or SSE.
async fn chat_completions(
    state: web::Data<AppState>,
    body: Result<Bytes, actix_web::Error>,
) -> Result<HttpResponse, ApiError> {
    let invalid = |e: &dyn std::fmt::Display| {
        ApiError::MalformedRequest(format!("Invalid request body: {e}"))
    };
    let body = body.map_err(|e| invalid(&e))?;
    let request: ChatCompletionRequest = serde_json::from_slice(&body).map_err(|e| invalid(&e))?;

    info!(
        model = %request.model,
        messages = request.messages.len(),
        stream = request.stream,
        "Processing chat completion"
    );

    let agent = state
        .routing
        .resolve(&request.model)
        .ok_or_else(|| ApiError::ModelNotFound(request.model.clone()))?;
    let envelope = translate(agent, &request.messages)?;
    let meta = ResponseMeta::new(request.model);

    if request.stream {
        let backend = state.backend.clone();
        let completion = async move { complete(backend.as_ref(), &envelope).await };
        let stream = completion_event_stream(meta.clone(), completion, state.stream_delay);

        let mut builder = HttpResponse::Ok();
        builder
            .insert_header((header::CONTENT_TYPE, "text/event-stream"))
            .insert_header((header::CACHE_CONTROL, "no-cache"))
            .insert_header((header::CONNECTION, "keep-alive"));
        insert_response_headers(&mut builder, &meta, &state.plan);
        return Ok(builder.streaming(Box::pin(stream)));
    }

    let result = complete(state.backend.as_ref(), &envelope).await?;
    info!(
        request_id = %meta.request_id,
        content_len = result.content.len(),
        "Sending completion"
    );

    let mut builder = HttpResponse::Ok();
    insert_response_headers(&mut builder, &meta, &state.plan);
    Ok(builder.json(build_response(&meta, &result)))
}

/// `GET /models`: every model in the routing table.
async fn list_models(state: web::Data<AppState>) -> impl Responder {
    web::Json(state.routing.model_list(chrono::Utc::now().timestamp()))
}

#[derive(Debug, Serialize)]
struct AgentHealth<'a> {
    id: &'a str,
    healthy: bool,
    last_beat: String,
}

/// Mock agent heartbeat, one entry per routed agent. Does not contact the backend.
async fn agents_health(state: web::Data<AppState>) -> impl Responder {
    let now = chrono::Utc::now().to_rfc3339();
    let agents: Vec<AgentHealth<'_>> = state
        .routing
        .agents()
        .into_iter()
        .map(|id| AgentHealth {
            id,
            healthy: true,
            last_beat: now.clone(),
        })
        .collect();
    HttpResponse::Ok().json(agents)
}

/// Service status endpoint exposing routes and backend wiring.
async fn status(state: web::Data<AppState>) -> impl Responder {
    let mut routes = vec!["/status".to_string(), "/api/agents/health".to_string()];
    for prefix in OPENAI_PREFIXES {
        routes.push(format!("{prefix}/chat/completions"));
        routes.push(format!("{prefix}/models"));
    }

    web::Json(serde_json::json!({
        "name": "symbi-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "routes": routes,
        "models": state.routing.list_models(),
        "backend": {
            "target": state.backend.describe(),
            "authenticated": state.backend_authenticated,
        },
        "stream_delay_ms": u64::try_from(state.stream_delay.as_millis()).unwrap_or(u64::MAX),
    }))
}
