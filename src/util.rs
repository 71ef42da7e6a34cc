use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use crate::agent_routing::AgentRoutingTable;
use crate::blackbox::{AgentBackend, BlackboxClient, BlackboxConfig};
use crate::completion::PlanInfo;

const DEFAULT_STREAM_DELAY_MS: u64 = 30;

/// Initialize dotenv and structured tracing based on RUST_LOG.
/// - Supports explicit env file paths via ENV_FILE or DOTENV_PATH
/// - Falls back to default .env discovery
/// - Logs the source used
pub fn init_tracing() {
    let mut env_source: String = "none".into();
    for key in ["ENV_FILE", "DOTENV_PATH"] {
        if let Ok(p) = std::env::var(key) {
            let p = p.trim();
            if !p.is_empty()
                && std::path::Path::new(p).is_file()
                && dotenvy::from_filename(p).is_ok()
            {
                env_source = format!("{p} ({key})");
                break;
            }
        }
    }

    if env_source == "none" && dotenvy::dotenv().is_ok() {
        env_source = ".env".into();
    }

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,actix_web=info".into());
    let _ = fmt().with_env_filter(EnvFilter::new(filter)).try_init();

    tracing::info!("Environment loaded from: {}", env_source);
}

/// Get the bind address for the HTTP server from env or default to 0.0.0.0:8088.
pub fn env_bind_addr() -> String {
    std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8088".into())
}

/// Truthy env flag: 1, true, yes, on.
pub fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v.trim().to_ascii_lowercase())
        .map(|v| v == "1" || v == "true" || v == "yes" || v == "on")
        .unwrap_or(false)
}

/// Inter-chunk pacing for streamed completions (SYMBI_STREAM_DELAY_MS, default 30ms).
pub fn stream_delay_from_env() -> Duration {
    let ms = std::env::var("SYMBI_STREAM_DELAY_MS")
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_STREAM_DELAY_MS);
    Duration::from_millis(ms)
}

/// Shared application state used by the HTTP server and handlers.
///
/// Everything here is read-only after startup; requests never share mutable state.
#[derive(Clone)]
pub struct AppState {
    /// Model → agent table
    pub routing: Arc<AgentRoutingTable>,
    /// Agent backend (Blackbox client in production)
    pub backend: Arc<dyn AgentBackend>,
    /// Whether a bearer credential is configured for the backend
    pub backend_authenticated: bool,
    /// Informational plan/quota headers
    pub plan: PlanInfo,
    /// Delay between streamed content deltas
    pub stream_delay: Duration,
}

impl AppState {
    /// Build state around an explicit backend.
    pub fn new(routing: AgentRoutingTable, backend: Arc<dyn AgentBackend>) -> Self {
        Self {
            routing: Arc::new(routing),
            backend,
            backend_authenticated: false,
            plan: PlanInfo::default(),
            stream_delay: Duration::from_millis(DEFAULT_STREAM_DELAY_MS),
        }
    }

    /// Build state that talks to a Blackbox backend.
    pub fn with_blackbox(routing: AgentRoutingTable, config: BlackboxConfig) -> Self {
        let authenticated = config.token.is_some();
        let client = BlackboxClient::new(config, build_http_client_from_env());
        let mut state = Self::new(routing, Arc::new(client));
        state.backend_authenticated = authenticated;
        state
    }

    /// Build state entirely from the environment.
    pub fn from_env(routing: AgentRoutingTable) -> Self {
        let mut state = Self::with_blackbox(routing, BlackboxConfig::from_env());
        state.stream_delay = stream_delay_from_env();
        state
    }

    pub fn with_stream_delay(mut self, delay: Duration) -> Self {
        self.stream_delay = delay;
        self
    }
}

/// Build an HTTP client honoring proxy environment variables.
///
/// Environment:
/// - SYMBI_NO_PROXY = 1|true|yes|on  -> disable all proxies
/// - SYMBI_PROXY_URL = <url>         -> proxy for all schemes
///
/// Per-request timeouts are applied by the Blackbox client.
pub fn build_http_client_from_env() -> reqwest::Client {
    let mut builder = reqwest::Client::builder();

    if env_flag("SYMBI_NO_PROXY") {
        builder = builder.no_proxy();
    } else if let Ok(url) = std::env::var("SYMBI_PROXY_URL") {
        let u = url.trim();
        if !u.is_empty() {
            match reqwest::Proxy::all(u) {
                Ok(p) => builder = builder.proxy(p),
                Err(e) => tracing::warn!("Ignoring invalid SYMBI_PROXY_URL: {}", e),
            }
        }
    }

    builder = builder.user_agent(format!("symbi-gateway/{}", env!("CARGO_PKG_VERSION")));

    builder.build().unwrap_or_else(|_| reqwest::Client::new())
}

/// Build a CORS configuration from environment variables for Actix-web.
///
/// Environment variables:
/// - CORS_ALLOWED_ORIGINS: "*" or comma-separated origins (e.g., "https://a.com, https://b.com")
/// - CORS_ALLOWED_METHODS: "*" or comma-separated methods (e.g., "GET,POST,OPTIONS")
/// - CORS_ALLOW_CREDENTIALS: enable with 1,true,yes,on
/// - CORS_MAX_AGE: max age in seconds (usize)
///
/// Defaults are permissive so the dashboard can call the API from another origin.
pub fn cors_config_from_env() -> actix_cors::Cors {
    let mut cors = actix_cors::Cors::default().allow_any_header();

    match std::env::var("CORS_ALLOWED_ORIGINS") {
        Ok(origins) if origins.trim() != "*" => {
            for origin in split_list(&origins) {
                cors = cors.allowed_origin(origin);
            }
        }
        _ => cors = cors.allow_any_origin(),
    }

    match std::env::var("CORS_ALLOWED_METHODS") {
        Ok(methods) if methods.trim() != "*" => {
            let methods = split_list(&methods);
            if !methods.is_empty() {
                cors = cors.allowed_methods(methods);
            }
        }
        _ => cors = cors.allow_any_method(),
    }

    if env_flag("CORS_ALLOW_CREDENTIALS") {
        cors = cors.supports_credentials();
    }

    if let Ok(secs) = std::env::var("CORS_MAX_AGE") {
        if let Ok(n) = secs.trim().parse::<usize>() {
            cors = cors.max_age(n);
        }
    }

    cors
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}
