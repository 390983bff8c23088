use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Command-line client for a running origin-proxy", long_about = None)]
struct Cli {
    /// Base URL of the proxy.
    #[arg(short, long, default_value = "http://localhost:8000", env = "PROXY_URL")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show service metadata and the endpoint directory
    Status,
    /// Liveness probe
    Health,
    /// Check that the proxy can reach its upstream origin
    Check,
    /// Analyze the structure of the origin's landing page
    Analyze,
    /// List headline links from the origin's landing page
    News,
    /// Fetch one page through the proxy cache
    Fetch {
        /// Page URL, absolute or relative to the upstream base
        url: String,
        /// Bypass the cache entirely
        #[arg(long)]
        no_cache: bool,
        /// Fetch from the origin even when a fresh entry exists
        #[arg(long)]
        refresh: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/", base)),
        Commands::Health => client.get(format!("{}/health", base)),
        Commands::Check => client.get(format!("{}/test", base)),
        Commands::Analyze => client.get(format!("{}/analyze", base)),
        Commands::News => client.get(format!("{}/news", base)),
        Commands::Fetch {
            url,
            no_cache,
            refresh,
        } => client.get(format!("{}/fetch", base)).query(&[
            ("url", url),
            ("use_cache", (!no_cache).to_string()),
            ("refresh", refresh.to_string()),
        ]),
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: proxy returned status {}", status);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
