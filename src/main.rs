use anyhow::{bail, Result};
use clap::Parser;
use redis_mcp_server::server::RedisToolServer;
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::EnvFilter;

/// MCP server for Redis — lets LLMs set, get, delete, and scan keys of any data type
#[derive(Parser)]
#[command(name = "redis-mcp-server", version, about)]
struct Cli {
    /// Redis connection URL.
    /// Example: redis://127.0.0.1:6379
    #[arg(long)]
    url: Option<String>,

    /// Read the Redis URL from an environment variable.
    /// Example: --url-env REDIS_URL
    #[arg(long)]
    url_env: Option<String>,

    /// Allow write operations (set, delete).
    /// By default, only read operations are permitted.
    #[arg(long)]
    allow_write: bool,

    /// Number of keys per SCAN iteration (default: 100)
    #[arg(long, default_value = "100")]
    scan_count: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let url = match (cli.url, cli.url_env) {
        (Some(url), _) => url,
        (None, Some(env_name)) => match std::env::var(&env_name) {
            Ok(url) => {
                tracing::info!(env = %env_name, "Read Redis URL from environment variable");
                url
            }
            Err(_) => bail!("Environment variable '{env_name}' is not set"),
        },
        (None, None) => {
            tracing::info!("No URL provided, defaulting to redis://127.0.0.1:6379");
            "redis://127.0.0.1:6379".to_string()
        }
    };

    let client = redis::Client::open(url.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid Redis URL '{}': {}", url, e))?;

    let conn = redis::aio::ConnectionManager::new(client)
        .await
        .map_err(|e| anyhow::anyhow!("Cannot connect to '{}': {}", url, e))?;

    tracing::info!(url = %redact_url(&url), "Connected to Redis");

    tracing::info!(
        allow_write = cli.allow_write,
        scan_count = cli.scan_count,
        "Starting redis-mcp-server"
    );

    let service = RedisToolServer::new(conn, cli.allow_write, cli.scan_count);
    let running = service.serve(stdio()).await?;
    running.waiting().await?;

    Ok(())
}

fn redact_url(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}
