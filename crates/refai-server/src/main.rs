use anyhow::Result;
use clap::Parser;
use refai_core::gateway::{self, GatewayClient};
use refai_core::RELAY_PATH;
use refai_server::{router, RelayState};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "refai-server")]
#[command(about = "Relay that streams basketball-rules answers from the AI gateway")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "REFAI_BIND", default_value = "127.0.0.1:8787")]
    bind: String,

    /// Gateway credential
    #[arg(long, env = "AI_GATEWAY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Chat-completions endpoint of the gateway
    #[arg(long, env = "AI_GATEWAY_URL", default_value = gateway::DEFAULT_URL)]
    gateway_url: String,

    #[arg(long, env = "AI_GATEWAY_MODEL", default_value = gateway::DEFAULT_MODEL)]
    model: String,

    #[arg(long, env = "AI_GATEWAY_TEMPERATURE", default_value_t = gateway::DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let gateway = GatewayClient::new(args.api_key.as_deref())
        .with_url(&args.gateway_url)
        .with_model(&args.model)
        .with_temperature(args.temperature);

    if !gateway.has_credential() {
        // Still serve, every chat request will answer 500 until the key is set
        warn!("{} is not set", gateway::API_KEY_VAR);
    }

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!(
        "RefAI relay listening on http://{}{} (model {})",
        listener.local_addr()?,
        RELAY_PATH,
        gateway.model()
    );

    axum::serve(listener, router(RelayState { gateway })).await?;
    Ok(())
}
