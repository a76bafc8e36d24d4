use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the API gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status and table consistency
    Status,
    /// Dump the routing table
    Routes,
    /// List online frontend paths
    Online,
    /// Promote a router to online
    Promote { name: String },
    /// Demote a router to offline
    Demote { name: String },
    /// List services and their endpoints
    Services,
    /// List endpoints
    Endpoints,
    /// Show watcher counters
    Watchers,
    /// Force a watcher to re-subscribe
    Resubscribe { kind: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match &cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)),
        Commands::Routes => client.get(format!("{}/admin/routes", cli.url)),
        Commands::Online => client.get(format!("{}/admin/routes/online", cli.url)),
        Commands::Promote { name } => client.post(format!("{}/admin/routes/{}/online", cli.url, name)),
        Commands::Demote { name } => client.post(format!("{}/admin/routes/{}/offline", cli.url, name)),
        Commands::Services => client.get(format!("{}/admin/services", cli.url)),
        Commands::Endpoints => client.get(format!("{}/admin/endpoints", cli.url)),
        Commands::Watchers => client.get(format!("{}/admin/watchers", cli.url)),
        Commands::Resubscribe { kind } => client.post(format!("{}/admin/watchers/{}/resubscribe", cli.url, kind)),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await?;
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
