use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use virality_compare::{
    config::Config,
    gemini::GeminiClient,
    image_lookup::ImageLookup,
    pipeline::ImagePipeline,
    store::{ImageRegistry, LocalFileStorage},
    web_api::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,virality_compare=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    let lookup = ImageLookup::parse(&config.image_lookup_url)
        .with_context(|| format!("invalid IMAGE_LOOKUP_URL: {}", config.image_lookup_url))?;
    let client = GeminiClient::new(&config.gemini_base_url, &config.gemini_api_key);
    let pipeline = ImagePipeline::new(client, lookup).with_timeout(config.generation_timeout);

    let storage = LocalFileStorage::new(config.cache_dir.clone(), config.cache_base_url.clone());
    let state = AppState {
        pipeline: Arc::new(pipeline),
        registry: Arc::new(ImageRegistry::new(storage)),
    };
    let router = web_api::build_router(state);

    let tcp_listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    info!(
        address = %config.bind_address,
        cache_dir = %config.cache_dir.display(),
        "virality-compare server started"
    );

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
