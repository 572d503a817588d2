//! `vectorgated` — the gateway's server binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use vectorgate_server::config::load_config;
use vectorgate_server::graph::GraphRunner;
use vectorgate_server::registries::Registries;
use vectorgate_server::testbed::TestbedRunner;
use vectorgate_server::{db, http, logging, mcp};

#[derive(Parser)]
#[command(name = "vectorgated", about = "Gateway mediating clients, LLM providers, and a vector-capable database", version)]
struct Cli {
    /// Path to the JSON configuration file (also read from `CONFIG_FILE`).
    #[arg(long, global = true, env = "CONFIG_FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and MCP surfaces (the default when no subcommand is given).
    Serve,
    /// Create the registry-backed tables on the default database handle and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    logging::init(&config.server.log_level);

    let registries = Registries::from_config(&config);
    let default_pool = db::connect(&default_dsn(&config), 5).await?;
    ensure_side_tables(&default_pool).await?;

    let probe_client = reqwest::Client::new();
    registries.models.probe_all(&probe_client).await;

    let graph = Arc::new(GraphRunner::new(registries.clone()));
    let testbed = Arc::new(TestbedRunner::new(default_pool.clone(), registries.clone()));
    testbed.ensure_tables().await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Migrate => {
            println!("database handles and registry tables are ready.");
        }
        Commands::Serve => {
            let state = http::AppState {
                config: Arc::new(config.clone()),
                registries: registries.clone(),
                graph: graph.clone(),
                testbed: testbed.clone(),
                http_client: probe_client.clone(),
            };

            let app = http::build_router(state)
                .merge(mcp::router(mcp::McpBridge::new(registries, graph), config.server.mcp_api_key.clone()));

            let addr = format!("{}:{}", config.server.api_server_url, config.server.api_server_port);
            tracing::info!(%addr, "vectorgated listening");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

fn default_dsn(config: &vectorgate_server::config::Config) -> String {
    config
        .database_configs
        .iter()
        .find(|d| d.name == "DEFAULT")
        .map(|d| d.dsn.clone())
        .unwrap_or_else(|| "./data/vectorgate.db".to_string())
}

/// Create the side tables every registry/backend needs on first use, ahead
/// of the first request (§6 "Persisted state layout").
async fn ensure_side_tables(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
    use vectorgate_server::vectorstore::sqlite_backend::SqliteVectorBackend;
    SqliteVectorBackend::new(pool.clone()).ensure_side_tables().await?;
    Ok(())
}
