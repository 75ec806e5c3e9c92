use std::sync::Arc;
use std::time::Duration;

use grounded_core::{ChatRole, DocumentStatus};
use grounded_llm::LlmClient;
use grounded_rag::EmbeddingClient;
use grounded_service::chat::{run_chat_turn, ChatTurnRequest};
use grounded_service::ingest::enqueue_document;
use grounded_service::{AppState, ServiceConfig};
use uuid::Uuid;

fn state_with(dir: &std::path::Path) -> Arc<AppState> {
    let mut config = ServiceConfig::with_data_dir(dir.to_path_buf());
    config.chunk_size = 120;
    config.chunk_overlap = 0;
    config.similarity_threshold = 0.05;
    Arc::new(AppState::init(config, EmbeddingClient::hash(), LlmClient::local()).unwrap())
}

fn paragraphs(n: usize, topic: &str) -> String {
    (0..n)
        .map(|i| format!("{topic} chapter {i} covers the theme of {topic} in depth for part {i}."))
        .collect::<Vec<_>>()
        .join("\n\n")
}

async fn ingest_and_wait(state: &Arc<AppState>, filename: &str, content: &str) -> Uuid {
    let document = enqueue_document(
        state.clone(),
        filename,
        None,
        None,
        content.as_bytes().to_vec(),
    )
    .await
    .unwrap();
    for _ in 0..200 {
        let status = state.registry.read().await.get(document.id).unwrap().status;
        match status {
            DocumentStatus::Ready => return document.id,
            DocumentStatus::Failed => panic!("ingestion failed"),
            _ => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    panic!("ingestion did not finish in time");
}

fn turn(conversation_id: Option<Uuid>, message: &str) -> ChatTurnRequest {
    ChatTurnRequest {
        conversation_id,
        message: message.to_string(),
        document_ids: None,
        include_history: true,
        history_turns: None,
    }
}

#[tokio::test]
async fn follow_up_grows_cumulative_coverage_and_reuses_context() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(dir.path());
    ingest_and_wait(&state, "book.txt", &paragraphs(40, "maritime history")).await;

    let first = run_chat_turn(&state, turn(None, "Summarize chapter 2"))
        .await
        .unwrap();
    let conversation_id = first.conversation_id;
    let first_coverage = first.cumulative_coverage.as_ref().unwrap().chunks_seen;
    assert!(first_coverage > 0);
    assert_eq!(first.context_used.history_messages_count, 0);

    let second = run_chat_turn(
        &state,
        turn(Some(conversation_id), "What did it say about trade routes?"),
    )
    .await
    .unwrap();
    assert_eq!(second.conversation_id, conversation_id);
    // Turn 1's user and assistant messages are in the window.
    assert!(second.context_used.history_messages_count >= 2);
    assert!(!second.context_used.history_truncated);
    // Coverage is monotone: the union can only grow.
    let second_coverage = second.cumulative_coverage.as_ref().unwrap().chunks_seen;
    assert!(second_coverage >= first_coverage);
}

#[tokio::test]
async fn conversation_is_persisted_per_turn_with_title() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(dir.path());
    ingest_and_wait(&state, "book.txt", &paragraphs(10, "glaciers")).await;

    let result = run_chat_turn(&state, turn(None, "What are glaciers?"))
        .await
        .unwrap();

    let conversation = state
        .conversations
        .read()
        .await
        .load(result.conversation_id)
        .unwrap();
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[0].role, ChatRole::User);
    assert_eq!(conversation.messages[1].role, ChatRole::Assistant);
    assert_eq!(conversation.title, "What are glaciers?");
    assert!(conversation.cumulative_coverage.is_some());

    // The assistant message carries the section metadata contract.
    let sections = conversation.messages[1].sections.as_ref().unwrap();
    assert_eq!(sections.len(), 1);
}

#[tokio::test]
async fn unknown_conversation_id_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(dir.path());
    let err = run_chat_turn(&state, turn(Some(Uuid::new_v4()), "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, grounded_core::GroundedError::NotFound(_)));
}

#[tokio::test]
async fn chat_without_documents_still_answers_with_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(dir.path());

    let result = run_chat_turn(&state, turn(None, "What is in my documents?"))
        .await
        .unwrap();
    assert_eq!(result.context_used.sources_count, 0);
    let sections = result.message.sections.as_ref().unwrap();
    assert!(sections[0]
        .warnings
        .iter()
        .any(|w| w.starts_with("no_sources")));
}

#[tokio::test]
async fn document_delete_leaves_conversations_listable() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(dir.path());
    let doc_id = ingest_and_wait(&state, "book.txt", &paragraphs(20, "volcano geology")).await;

    let result = run_chat_turn(&state, turn(None, "Tell me about volcano geology chapter 1"))
        .await
        .unwrap();
    let conversation_id = result.conversation_id;

    let deleted = grounded_service::ingest::delete_document(&state, doc_id)
        .await
        .unwrap();
    assert!(deleted);

    // The conversation still lists and loads; its chunk references are
    // stale but intact.
    let listing = state.conversations.read().await.list();
    assert!(listing.iter().any(|s| s.id == conversation_id));
    let conversation = state.conversations.read().await.load(conversation_id).unwrap();
    assert_eq!(conversation.messages.len(), 2);
    for source in &conversation.messages[1].sources_used {
        assert!(state.store.read().await.chunk_text(source.chunk_id).is_none());
    }
}

#[tokio::test]
async fn history_window_respects_turn_budget() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(dir.path());
    ingest_and_wait(&state, "book.txt", &paragraphs(10, "orchards")).await;

    let first = run_chat_turn(&state, turn(None, "Tell me about orchards"))
        .await
        .unwrap();
    let id = first.conversation_id;
    for i in 0..4 {
        run_chat_turn(&state, turn(Some(id), &format!("More detail please ({i})")))
            .await
            .unwrap();
    }
    let last = run_chat_turn(&state, turn(Some(id), "And finally?"))
        .await
        .unwrap();
    // Window capped at HISTORY_TURNS (3) pairs = 6 messages.
    assert!(last.context_used.history_messages_count <= state.config.history_turns * 2);
}
