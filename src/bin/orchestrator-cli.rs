use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "orchestrator-cli")]
#[command(about = "Management CLI for the orchestrator gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    /// Management API key, sent as a bearer token
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gateway liveness and overall health
    Status,
    /// List registered endpoints
    Endpoints {
        /// Only endpoints with this status (active, inactive, disabled, unhealthy)
        #[arg(long)]
        status: Option<String>,
    },
    /// List active routes
    Routes,
    /// Health of every endpoint
    Health,
    /// Run a health check for one endpoint now
    Check { id: String },
    /// Show one circuit breaker
    Breaker { id: String },
    /// Close a circuit breaker
    Reset { id: String },
    /// Force a circuit breaker open
    Trip { id: String },
    /// Reload the gateway configuration file
    Reload,
}

impl Commands {
    fn request(&self) -> (Method, String) {
        match self {
            Commands::Status => (Method::GET, "/health/status".into()),
            Commands::Endpoints { status: Some(status) } => {
                (Method::GET, format!("/registry/endpoints?status={}", status))
            }
            Commands::Endpoints { status: None } => (Method::GET, "/registry/endpoints".into()),
            Commands::Routes => (Method::GET, "/router/routes".into()),
            Commands::Health => (Method::GET, "/health/endpoints".into()),
            Commands::Check { id } => (Method::POST, format!("/health/check/{}", id)),
            Commands::Breaker { id } => (Method::GET, format!("/circuit-breakers/{}", id)),
            Commands::Reset { id } => (Method::POST, format!("/circuit-breakers/{}/reset", id)),
            Commands::Trip { id } => (Method::POST, format!("/circuit-breakers/{}/trip", id)),
            Commands::Reload => (Method::POST, "/config/reload".into()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }

    let (method, path) = cli.command.request();
    let res = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if status.is_success() {
        println!("{}", rendered);
        Ok(())
    } else {
        eprintln!("Error: management API returned status {}", status);
        eprintln!("{}", rendered);
        std::process::exit(1);
    }
}
