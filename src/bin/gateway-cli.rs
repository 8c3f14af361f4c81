use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN};

use request_gateway::config::{load_config, GatewayConfig};
use request_gateway::security::endpoint::{EndpointClass, EndpointClassifier};
use request_gateway::security::threat;

/// Response headers the gateway sets, in display order.
const GATEWAY_HEADERS: [&str; 8] = [
    "x-request-id",
    "x-ratelimit-limit",
    "x-ratelimit-remaining",
    "x-ratelimit-reset",
    "retry-after",
    "access-control-allow-origin",
    "x-content-type-options",
    "x-frame-options",
];

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the request security gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a config file, then print the quota table
    Validate { config: PathBuf },
    /// Run the threat detector against a URL and optional body
    Scan {
        #[arg(short, long)]
        url: String,
        #[arg(short, long, default_value = "")]
        body: String,
    },
    /// Print the endpoint class of a path
    Classify {
        path: String,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Send a request to a running gateway and show its headers
    Probe {
        #[arg(short, long)]
        url: String,
        #[arg(short, long)]
        origin: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => {
            let config = load_config(&config)?;
            println!("Configuration OK");
            println!("{:<14} {:>12} {:>8}  prefixes", "class", "window_ms", "max");
            for class in EndpointClass::ALL {
                let policy = config.quota.policy(class);
                println!(
                    "{:<14} {:>12} {:>8}  {}",
                    class.as_str(),
                    policy.window_ms,
                    policy.max_requests,
                    policy.path_prefixes.join(", ")
                );
            }
            println!("allowed origins: {}", config.cors.allowed_origins.join(", "));
        }
        Commands::Scan { url, body } => {
            let result = threat::scan(&url, &body);
            match result.reason {
                Some(reason) => {
                    println!("suspicious: {}", reason);
                    std::process::exit(1);
                }
                None => println!("clean"),
            }
        }
        Commands::Classify { path, config } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => GatewayConfig::default(),
            };
            let classifier = EndpointClassifier::from_config(&config.quota);
            println!("{}", classifier.classify(&path));
        }
        Commands::Probe { url, origin } => {
            let client = reqwest::Client::new();
            let mut headers = HeaderMap::new();
            if let Some(origin) = origin {
                headers.insert(ORIGIN, HeaderValue::from_str(&origin)?);
            }
            let res = client.get(&url).headers(headers).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    println!("status: {}", res.status());
    for name in GATEWAY_HEADERS {
        if let Some(value) = res.headers().get(name) {
            println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
        }
    }
    let text = res.text().await?;
    if !text.is_empty() {
        println!();
        println!("{}", text);
    }
    Ok(())
}
