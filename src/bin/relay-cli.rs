use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

const CONTROL_PREFIX: &str = "api/v1/serverHub/ServerController";

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Management CLI for the relay hub", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Bearer token. Obtain one with `login`.
    #[arg(short, long, env = "RELAY_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request an access token
    Login {
        #[arg(long)]
        user: String,
        #[arg(long)]
        password: String,
    },
    /// Check that the control API answers
    Ping,
    /// Broadcast a message to every session
    SendAll { message: String },
    /// Send a notification to one connection
    Notify {
        connection_id: String,
        content: String,
        #[arg(long)]
        value: Option<f64>,
        #[arg(long)]
        quality: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
    }

    match cli.command {
        Commands::Login { user, password } => {
            let res = client
                .post(format!("{}/api/v1/Auth/login", base))
                .json(&json!({ "userName": user, "password": password }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Ping => {
            let res = client
                .get(format!("{}/{}/ping", base, CONTROL_PREFIX))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::SendAll { message } => {
            let res = client
                .post(format!("{}/{}/send-message-to-all", base, CONTROL_PREFIX))
                .headers(headers)
                .json(&message)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Notify {
            connection_id,
            content,
            value,
            quality,
        } => {
            let res = client
                .post(format!(
                    "{}/{}/send-notification-by/{}",
                    base, CONTROL_PREFIX, connection_id
                ))
                .headers(headers)
                .json(&json!({ "content": content, "value": value, "quality": quality }))
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if text.is_empty() => println!("{}", status),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
