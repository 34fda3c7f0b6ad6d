mod routes;
mod ws;

use axum::routing::get;
use axum::Router;
use learning_odyssey_engine::config::EngineConfig;
use learning_odyssey_engine::content::{LessonBank, StoryCatalog};
use learning_odyssey_engine::image::ImageSynthesizer;
use learning_odyssey_engine::llm::{build_backend, LlmGateway};
use learning_odyssey_engine::session::SessionContext;
use learning_odyssey_engine::store::StateStore;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::from_env()?;
    tracing::info!(environment = ?config.environment, provider = ?config.llm_provider, "starting learning-odyssey-server");

    let database_url = config
        .database_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required"))?;
    let store = StateStore::connect(&database_url).await?;
    store.run_migrations().await?;

    let stories_dir = std::env::var("STORY_CATALOG_DIR").unwrap_or_else(|_| "content/stories".to_string());
    let lessons_csv = std::env::var("LESSON_BANK_CSV").unwrap_or_else(|_| "content/lessons.csv".to_string());
    let stories = StoryCatalog::load_from_dir(&PathBuf::from(stories_dir))?;
    let lessons = LessonBank::load_from_csv(&PathBuf::from(lessons_csv))?;

    let backend = build_backend(&config)?;
    let gateway = LlmGateway::new(backend, config.reasoning_model.clone(), config.utility_model.clone(), config.max_retries);

    let image_api_key = config.image_api_key.clone().unwrap_or_default();
    let images = ImageSynthesizer::new(
        config.image_endpoint.clone(),
        image_api_key,
        config.image_call_timeout,
        config.max_retries,
    );

    let ctx = Arc::new(SessionContext {
        config: Arc::new(config),
        gateway: Arc::new(gateway),
        images: Arc::new(images),
        store: Arc::new(store),
        stories: Arc::new(stories),
        lessons: Arc::new(lessons),
    });

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
