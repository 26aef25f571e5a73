use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "route-cli")]
#[command(about = "Query a running exchange router", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a best-execution route
    Route {
        /// buy | sell | swap
        kind: String,
        /// Asset to receive, e.g. BTC
        receive: String,
        /// Asset to pay with, e.g. USD
        pay: String,
        /// Receive volume for buy/sell, pay volume for swap
        volume: String,
    },
    /// Check router status
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let res = match cli.command {
        Commands::Route {
            kind,
            receive,
            pay,
            volume,
        } => {
            client
                .get(format!("{}/api/route", cli.url))
                .query(&[
                    ("kind", kind),
                    ("receiveAsset", receive),
                    ("payAsset", pay),
                    ("volume", volume),
                ])
                .send()
                .await?
        }
        Commands::Health => client.get(format!("{}/health", cli.url)).send().await?,
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let pretty = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|json| serde_json::to_string_pretty(&json).ok())
        .unwrap_or(text);

    if status.is_success() {
        println!("{pretty}");
    } else {
        eprintln!("Error: router returned status {status}");
        eprintln!("{pretty}");
        std::process::exit(1);
    }
    Ok(())
}
