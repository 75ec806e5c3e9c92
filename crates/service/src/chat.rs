use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use grounded_core::{
    ChatMessage, ChatRole, Conversation, GroundedError, QueryIntent, Result, RetrievalType,
};
use grounded_rag::{
    build_chat_prompt, classify_intent, compute_coverage, retrieve_similarity, validate_output,
    SimilarityParams,
};

use crate::generate::resolve_prompt_sources;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurnRequest {
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    pub message: String,
    #[serde(default)]
    pub document_ids: Option<Vec<Uuid>>,
    #[serde(default = "default_include_history")]
    pub include_history: bool,
    #[serde(default)]
    pub history_turns: Option<usize>,
}

fn default_include_history() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextUsed {
    pub history_messages_count: usize,
    pub history_truncated: bool,
    pub sources_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatTurnResult {
    pub conversation_id: Uuid,
    pub message: ChatMessage,
    pub cumulative_coverage: Option<grounded_core::CoverageDescriptor>,
    pub context_used: ContextUsed,
    pub generation_time_ms: f64,
    pub model_used: String,
}

/// One chat turn: retrieve fresh sources, fold in the bounded history
/// window, generate, validate, then persist the user and assistant messages
/// in a single write.
pub async fn run_chat_turn(state: &Arc<AppState>, req: ChatTurnRequest) -> Result<ChatTurnResult> {
    let start = Instant::now();

    if req.message.trim().is_empty() {
        return Err(GroundedError::InputInvalid("message must not be empty".into()));
    }

    // Resolve the id first so the per-conversation lock covers the load;
    // turns serialize per conversation, independent ones run in parallel.
    let conversation_id = match req.conversation_id {
        Some(id) => {
            if !state.conversations.read().await.exists(id) {
                return Err(GroundedError::NotFound(format!(
                    "conversation not found: {id}"
                )));
            }
            id
        }
        None => Uuid::new_v4(),
    };
    let lock = state.conversation_lock(conversation_id).await;
    let _guard = lock.lock().await;

    let mut conversation = if req.conversation_id.is_some() {
        state.conversations.read().await.load(conversation_id)?
    } else {
        let mut conversation = Conversation::new(req.document_ids.clone());
        conversation.id = conversation_id;
        conversation
    };

    let effective_docs = match req.document_ids.clone().or(conversation.document_ids.clone()) {
        Some(ids) => ids,
        None => state.registry.read().await.ready_ids(),
    };

    let intent = classify_intent(&req.message);
    info!(
        conversation_id = %conversation.id,
        intent = intent.intent.as_str(),
        "chat turn started"
    );

    let query = augment_query(&req.message, &conversation);

    let history_turns = req.history_turns.unwrap_or(state.config.history_turns);
    let (history, history_truncated) = if req.include_history {
        history_window(
            &conversation,
            history_turns,
            state.config.max_history_chars,
        )
    } else {
        (Vec::new(), false)
    };

    let (sources, prompt_sources, cumulative_coverage) = {
        let store = state.store.read().await;
        let (sources, _) = retrieve_similarity(
            &store,
            &state.embedder,
            &query,
            Some(&effective_docs[..]),
            SimilarityParams {
                top_k: state.config.top_k,
                threshold: state.config.similarity_threshold,
            },
        )
        .await?;
        let prompt_sources = resolve_prompt_sources(&store, &sources);

        // Cumulative coverage: the union of chunk ids seen across all turns
        // of this conversation, over the same eligible documents.
        let mut seen: HashSet<Uuid> = conversation
            .messages
            .iter()
            .flat_map(|m| m.sources_used.iter().map(|s| s.chunk_id))
            .collect();
        seen.extend(sources.iter().map(|s| s.chunk_id));
        let eligible: Vec<_> = store
            .chunks()
            .iter()
            .filter(|c| effective_docs.contains(&c.document_id))
            .collect();
        let cumulative = compute_coverage(RetrievalType::Similarity, &eligible, &seen);
        (sources, prompt_sources, cumulative)
    };

    let cumulative_info = if conversation.messages.is_empty() && sources.is_empty() {
        "This is the start of the conversation. No prior sources have been retrieved."
            .to_string()
    } else {
        cumulative_coverage.summary.clone()
    };

    let (system_prompt, user_prompt) =
        build_chat_prompt(&req.message, &prompt_sources, &history, &cumulative_info);

    let model = state.config.model_for_intent(intent.intent).to_string();
    let response = state.llm.generate(&system_prompt, &user_prompt, &model).await?;

    // Chat responses are a single validated section; splitting is a
    // generate-endpoint concern.
    let message_id = Uuid::new_v4();
    let mut sections = validate_output(
        &response,
        QueryIntent::Qa,
        &sources,
        &message_id.to_string(),
    );
    let section = sections.remove(0);

    let user_message = ChatMessage::user(&req.message);
    let mut assistant_message = ChatMessage::assistant(section.content.clone(), sources.clone());
    assistant_message.id = message_id;
    assistant_message.sections = Some(vec![section]);

    // Both messages land in one persisted write so a failed turn leaves no
    // dangling user message.
    conversation.messages.push(user_message);
    conversation.messages.push(assistant_message.clone());
    conversation.cumulative_coverage = Some(cumulative_coverage.clone());
    conversation.derive_title();
    conversation.updated_at = chrono::Utc::now();
    state.conversations.write().await.save(&conversation)?;

    let generation_time_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(
        conversation_id = %conversation.id,
        sources = sources.len(),
        history_messages = history.len(),
        time_ms = generation_time_ms,
        "chat turn completed"
    );

    Ok(ChatTurnResult {
        conversation_id: conversation.id,
        message: assistant_message,
        cumulative_coverage: Some(cumulative_coverage),
        context_used: ContextUsed {
            history_messages_count: history.len(),
            history_truncated,
            sources_count: sources.len(),
        },
        generation_time_ms,
        model_used: model,
    })
}

/// Retrieval query = the new message plus a light summary of prior user
/// turns, capped at 200 chars, so follow-ups keep their topic context.
fn augment_query(message: &str, conversation: &Conversation) -> String {
    let prior: Vec<&str> = conversation
        .messages
        .iter()
        .filter(|m| m.role == ChatRole::User)
        .map(|m| m.content.as_str())
        .collect();
    if prior.is_empty() {
        return message.to_string();
    }
    let mut summary = prior.join("; ");
    if summary.chars().count() > 200 {
        summary = summary.chars().take(200).collect();
    }
    format!("{message}\n{summary}")
}

/// The last `max_turns` turns as role-tagged pairs, then whole-turn drops
/// from the front until the character budget holds. Dropping whole turns
/// keeps the role alternation intact.
fn history_window(
    conversation: &Conversation,
    max_turns: usize,
    max_chars: usize,
) -> (Vec<(String, String)>, bool) {
    // Group messages into turns; a turn starts at each user message.
    let mut turns: Vec<Vec<(String, String)>> = Vec::new();
    for message in &conversation.messages {
        let entry = (message.role.as_str().to_string(), message.content.clone());
        match message.role {
            ChatRole::User => turns.push(vec![entry]),
            ChatRole::Assistant => match turns.last_mut() {
                Some(turn) => turn.push(entry),
                None => turns.push(vec![entry]),
            },
        }
    }

    let keep_from = turns.len().saturating_sub(max_turns);
    let mut window: Vec<Vec<(String, String)>> = turns.split_off(keep_from);

    let char_count = |turns: &[Vec<(String, String)>]| -> usize {
        turns
            .iter()
            .flatten()
            .map(|(role, content)| role.len() + content.len())
            .sum()
    };

    let mut truncated = false;
    while window.len() > 1 && char_count(&window) > max_chars {
        window.remove(0);
        truncated = true;
    }
    if window.len() == 1 && char_count(&window) > max_chars {
        // A single oversized turn is dropped entirely rather than split.
        window.clear();
        truncated = true;
    }

    (window.into_iter().flatten().collect(), truncated)
}
