use std::sync::Arc;

use anyhow::Context;

use identity_verify::api;
use identity_verify::config::ServiceConfig;
use identity_verify::gateway::{HttpGateway, ProviderGateway};
use identity_verify::orchestrator::{self, Orchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env().context("Invalid configuration")?;

    eprintln!("Identity Verify v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Listen: http://{}", config.bind_addr);
    eprintln!("   Phone proof: {}", config.phone_proof.as_str());
    eprintln!("   Liveness required: {}", config.require_liveness);
    eprintln!("   Provider timeout: {}s", config.provider_timeout.as_secs());

    let missing = config.missing_credentials();
    if !missing.is_empty() {
        tracing::warn!(
            missing = %missing.join(", "),
            "Provider credentials not set; affected steps will fail until configured"
        );
    }

    let gateway: Arc<dyn ProviderGateway> = Arc::new(HttpGateway::new(&config)?);
    let orchestrator = Arc::new(Orchestrator::new(gateway, &config));
    let _sweep_handle = orchestrator::spawn_sweep_task(Arc::clone(&orchestrator), config.sweep_interval);

    let app = api::router(orchestrator);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Verification service started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
