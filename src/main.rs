use std::time::Duration;

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;

use symbi_gateway::agent_routing::AgentRoutingTable;
use symbi_gateway::server::config_routes;
use symbi_gateway::util::{cors_config_from_env, env_bind_addr, init_tracing, AppState};

/// OpenAI-compatible gateway in front of SYMBI Blackbox agents.
#[derive(Debug, Parser)]
#[command(name = "symbi-gateway", version, about)]
struct Args {
    /// Address to bind (defaults to BIND_ADDR or 0.0.0.0:8088)
    #[arg(long)]
    bind: Option<String>,

    /// JSON routing file replacing the built-in model table
    #[arg(long, env = "SYMBI_ROUTING_FILE")]
    routing_file: Option<String>,

    /// Delay between streamed words, in milliseconds
    #[arg(long, env = "SYMBI_STREAM_DELAY_MS")]
    stream_delay_ms: Option<u64>,

    /// Number of HTTP workers (defaults to the number of CPUs)
    #[arg(long, env = "SYMBI_WORKERS")]
    workers: Option<usize>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let routing = match args.routing_file.as_deref() {
        Some(path) => AgentRoutingTable::load_from_file(path)?,
        None => AgentRoutingTable::builtin(),
    };

    let mut state = AppState::from_env(routing);
    if let Some(ms) = args.stream_delay_ms {
        state.stream_delay = Duration::from_millis(ms);
    }

    let bind = args.bind.unwrap_or_else(env_bind_addr);
    tracing::info!(
        models = ?state.routing.list_models(),
        backend = %state.backend.describe(),
        authenticated = state.backend_authenticated,
        "Starting symbi-gateway on {}",
        bind
    );

    let data = web::Data::new(state);
    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(cors_config_from_env())
            .wrap(middleware::Logger::default())
            .app_data(data.clone())
            .configure(config_routes)
    });
    if let Some(workers) = args.workers {
        server = server.workers(workers);
    }

    server
        .bind(&bind)
        .with_context(|| format!("failed to bind {bind}"))?
        .run()
        .await?;

    Ok(())
}
