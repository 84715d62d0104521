use clap::{Parser, Subcommand};

const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:3000";

#[derive(Parser)]
#[command(name = "wa-relay")]
#[command(about = "Chat relay: QR login page, webhook forwarding, send/restart API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the relay (connects to the automation sidecar and serves the status/control API).
    Serve {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.wa-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from PORT, config, or 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Send a message through a running relay.
    Send {
        /// Phone number or full chat address (e.g. 15551234567 or 15551234567@c.us)
        #[arg(long, short)]
        number: String,

        /// Message text
        #[arg(long, short)]
        message: String,

        /// Base URL of the running relay
        #[arg(long, default_value = DEFAULT_RELAY_URL)]
        url: String,
    },

    /// Print the session status of a running relay.
    Status {
        /// Base URL of the running relay
        #[arg(long, default_value = DEFAULT_RELAY_URL)]
        url: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("wa-relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("relay failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Send {
            number,
            message,
            url,
        }) => {
            if let Err(e) = run_send(&url, &number, &message).await {
                log::error!("send failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Status { url }) => {
            if let Err(e) = run_status(&url).await {
                log::error!("status failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = relay::config::load_config(config_path)?;
    if let Some(p) = port {
        config.server.port = p;
    }
    log::info!(
        "starting relay on {}:{} (config {})",
        config.server.bind,
        config.server.port,
        path.display()
    );
    relay::server::run_server(config).await
}

async fn run_send(base: &str, number: &str, message: &str) -> anyhow::Result<()> {
    let url = format!("{}/send-message", base.trim_end_matches('/'));
    let res = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({ "number": number, "message": message }))
        .send()
        .await?;
    let status = res.status();
    let body: serde_json::Value = res.json().await.unwrap_or(serde_json::Value::Null);
    if !status.is_success() {
        let error = body
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("request failed");
        match body.get("details").and_then(|v| v.as_str()) {
            Some(details) => anyhow::bail!("{} {}: {}", status, error, details),
            None => anyhow::bail!("{} {}", status, error),
        }
    }
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn run_status(base: &str) -> anyhow::Result<()> {
    let url = format!("{}/status", base.trim_end_matches('/'));
    let body: serde_json::Value = reqwest::get(&url).await?.error_for_status()?.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
