use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use scribe_gateway::{router, GatewayConfig, UpstreamGenerator};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    #[command(flatten)]
    pub upstream: GatewayConfig,
}

pub async fn serve(args: ServeArgs) -> Result<()> {
    if args.upstream.api_key().is_none() {
        println!(
            "{}",
            "⚠️  DEEPSEEK_API_KEY is not set; every request will return a configuration error"
                .yellow()
        );
    }

    let generator = UpstreamGenerator::new(args.upstream.clone())
        .context("Failed to build upstream client")?;
    let app = router(Arc::new(generator));

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;

    println!(
        "{} Scribe gateway on {}",
        "🚀 Listening".green().bold(),
        format!("http://{}", args.bind).cyan()
    );
    tracing::info!(bind = %args.bind, upstream = %args.upstream.upstream_url, "Gateway started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
