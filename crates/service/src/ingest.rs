use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use grounded_core::{
    ChunkConfig, Chunker, Document, DocumentStatus, DocumentType, GroundedError, Result,
};

use crate::state::AppState;

/// Text extraction is an external collaborator reached through this narrow
/// seam. Plain text is handled inline; PDF and DOCX need a parser binary
/// wired in at deploy time and fail the document (retryably) until then.
pub fn extract_text(doc_type: DocumentType, bytes: &[u8]) -> Result<String> {
    match doc_type {
        DocumentType::Txt => Ok(String::from_utf8_lossy(bytes).into_owned()),
        DocumentType::Pdf => Err(GroundedError::InputInvalid(
            "no pdf parser configured; install an extraction backend".into(),
        )),
        DocumentType::Docx => Err(GroundedError::InputInvalid(
            "no docx parser configured; install an extraction backend".into(),
        )),
    }
}

/// Register an upload and return immediately with `pending`; the heavy
/// parse -> chunk -> embed work runs on the bounded worker pool.
pub async fn enqueue_document(
    state: Arc<AppState>,
    filename: &str,
    title: Option<String>,
    author: Option<String>,
    bytes: Vec<u8>,
) -> Result<Document> {
    let extension = filename.rsplit('.').next().unwrap_or("");
    let doc_type = DocumentType::from_extension(extension).ok_or_else(|| {
        GroundedError::InputInvalid(format!(
            "unsupported document type '.{extension}'; supported: pdf, docx, txt"
        ))
    })?;

    let mut document = Document::new(filename, doc_type, title);
    document.author = author;
    state.registry.write().await.save(&document)?;

    info!(document_id = %document.id, filename, "document accepted for ingestion");

    let spawned = document.clone();
    tokio::spawn(async move {
        process_document(state, spawned.id, bytes).await;
    });

    Ok(document)
}

/// Worker body. Status moves forward only: pending -> processing ->
/// ready | failed. A failed document stays listed with its error message
/// and can be re-uploaded.
pub async fn process_document(state: Arc<AppState>, document_id: Uuid, bytes: Vec<u8>) {
    // Uploads stay pending until a pool slot frees.
    let _permit = match state.ingest_slots.acquire().await {
        Ok(permit) => permit,
        Err(_) => return,
    };

    let mut document = {
        let registry = state.registry.read().await;
        match registry.get(document_id) {
            Ok(doc) => doc,
            Err(err) => {
                error!(document_id = %document_id, error = %err, "document vanished before processing");
                return;
            }
        }
    };

    document.status = DocumentStatus::Processing;
    document.touch();
    if let Err(err) = state.registry.write().await.save(&document) {
        error!(document_id = %document_id, error = %err, "failed to persist processing status");
        return;
    }

    match ingest(&state, &mut document, &bytes).await {
        Ok(chunk_count) => {
            document.status = DocumentStatus::Ready;
            document.chunk_count = chunk_count;
            document.error_message = None;
            document.touch();
            info!(document_id = %document_id, chunk_count, "document ingested");
        }
        Err(err) => {
            document.status = DocumentStatus::Failed;
            document.error_message = Some(err.to_string());
            document.touch();
            error!(document_id = %document_id, error = %err, "document ingestion failed");
        }
    }

    if let Err(err) = state.registry.write().await.save(&document) {
        error!(document_id = %document_id, error = %err, "failed to persist final status");
    }
}

async fn ingest(state: &Arc<AppState>, document: &mut Document, bytes: &[u8]) -> Result<usize> {
    let content = extract_text(document.doc_type, bytes)?;
    document.word_count = Some(content.split_whitespace().count());

    let chunker = Chunker::new(ChunkConfig {
        chunk_size: state.config.chunk_size,
        chunk_overlap: state.config.chunk_overlap,
    });
    let chunks = chunker.chunk_document(document.id, &document.title, &document.filename, &content);
    if chunks.is_empty() {
        return Err(GroundedError::InputInvalid(
            "document contained no extractable text".into(),
        ));
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = state.embedder.embed_batch(&texts).await?;

    let count = chunks.len();
    state.store.write().await.add_chunks(chunks, vectors)?;
    Ok(count)
}

/// Two-phase delete: vectors first, then the registry record. A crash
/// between phases leaves orphaned chunks that startup reconciliation prunes.
pub async fn delete_document(state: &Arc<AppState>, document_id: Uuid) -> Result<bool> {
    if !state.registry.read().await.exists(document_id) {
        return Ok(false);
    }
    state.store.write().await.delete_document(document_id)?;
    state.registry.write().await.delete(document_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txt_extraction_decodes_utf8() {
        let text = extract_text(DocumentType::Txt, "hello world".as_bytes()).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn pdf_extraction_requires_a_backend() {
        let err = extract_text(DocumentType::Pdf, &[0u8; 4]).unwrap_err();
        assert!(matches!(err, GroundedError::InputInvalid(_)));
    }
}
