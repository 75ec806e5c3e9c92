use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use grounded_llm::LlmClient;
use grounded_rag::EmbeddingClient;
use grounded_service::{routes, AppState, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let config = ServiceConfig::from_env();
    let embedder = EmbeddingClient::from_env().unwrap_or_else(|_| EmbeddingClient::hash());
    let llm = LlmClient::from_env().unwrap_or_else(|_| LlmClient::local());

    info!(
        data_dir = %config.data_dir.display(),
        embedding = %embedder.model_name(),
        llm = llm.provider().as_str(),
        generation_model = %config.generation_model,
        "starting grounded service"
    );

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::init(config, embedder, llm)?);
    let app = routes::router(state);

    let addr: SocketAddr = bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
