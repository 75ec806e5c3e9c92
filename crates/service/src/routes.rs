use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use grounded_core::{Document, DocumentChunk, GenerationResult, GroundedError, RegenerationResult};

use crate::chat::{run_chat_turn, ChatTurnRequest, ChatTurnResult};
use crate::error::AppError;
use crate::generate::{
    run_generate, run_regenerate, run_suggestions, GenerateRequest, RegenerateRequest,
    SuggestionsRequest, SuggestionsResult,
};
use crate::ingest::{delete_document, enqueue_document};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/documents", post(upload_document).get(list_documents))
        .route(
            "/api/documents/:id",
            get(get_document).delete(remove_document),
        )
        .route("/api/documents/:id/chunks", get(document_chunks))
        .route("/api/generate", post(generate))
        .route("/api/generate/section", post(regenerate_section))
        .route("/api/generate/suggestions", post(suggestions))
        .route("/api/chat", post(chat).get(list_conversations))
        .route(
            "/api/chat/:id",
            get(get_conversation)
                .delete(remove_conversation)
                .patch(rename_conversation),
        )
        .route("/api/health", get(health))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct DocumentListResponse {
    documents: Vec<Document>,
    total: usize,
}

#[derive(Debug, Serialize)]
struct ChunkListResponse {
    chunks: Vec<DocumentChunk>,
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    title: String,
}

async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Document>, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut title: Option<String> = None;
    let mut author: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GroundedError::InputInvalid(e.to_string()))?
    {
        match field.name() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| GroundedError::InputInvalid("filename is required".into()))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| GroundedError::InputInvalid(e.to_string()))?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("title") => {
                title = field.text().await.ok().filter(|s| !s.is_empty());
            }
            Some("author") => {
                author = field.text().await.ok().filter(|s| !s.is_empty());
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| GroundedError::InputInvalid("missing file field".into()))?;
    let document = enqueue_document(state, &filename, title, author, bytes).await?;
    Ok(Json(document))
}

async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = state.registry.read().await.list()?;
    let total = documents.len();
    Ok(Json(DocumentListResponse { documents, total }))
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, AppError> {
    Ok(Json(state.registry.read().await.get(id)?))
}

async fn remove_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !delete_document(&state, id).await? {
        return Err(GroundedError::NotFound(format!("document not found: {id}")).into());
    }
    Ok(Json(json!({ "status": "deleted", "id": id })))
}

async fn document_chunks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChunkListResponse>, AppError> {
    if !state.registry.read().await.exists(id) {
        return Err(GroundedError::NotFound(format!("document not found: {id}")).into());
    }
    let store = state.store.read().await;
    let chunks = store
        .chunks_for_document(id)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(ChunkListResponse { chunks }))
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerationResult>, AppError> {
    Ok(Json(run_generate(&state, req).await?))
}

async fn regenerate_section(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegenerateRequest>,
) -> Result<Json<RegenerationResult>, AppError> {
    Ok(Json(run_regenerate(&state, req).await?))
}

async fn suggestions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SuggestionsRequest>,
) -> Result<Json<SuggestionsResult>, AppError> {
    Ok(Json(run_suggestions(&state, req).await?))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatTurnRequest>,
) -> Result<Json<ChatTurnResult>, AppError> {
    Ok(Json(run_chat_turn(&state, req).await?))
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<grounded_core::ConversationSummary>>, AppError> {
    Ok(Json(state.conversations.read().await.list()))
}

async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<grounded_core::Conversation>, AppError> {
    Ok(Json(state.conversations.read().await.load(id)?))
}

async fn remove_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    state.conversations.write().await.delete(id)?;
    // Idempotent: deleting an unknown conversation still acknowledges.
    Ok(Json(json!({ "status": "deleted", "conversation_id": id })))
}

async fn rename_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<Value>, AppError> {
    if req.title.trim().is_empty() {
        return Err(GroundedError::InputInvalid("title must not be empty".into()).into());
    }
    if !state.conversations.write().await.update_title(id, &req.title)? {
        return Err(GroundedError::NotFound(format!("conversation not found: {id}")).into());
    }
    Ok(Json(json!({ "status": "updated", "conversation_id": id, "title": req.title })))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.store.read().await.stats();
    Json(json!({
        "status": "healthy",
        "vector_store": stats,
    }))
}
