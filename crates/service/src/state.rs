use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::info;
use uuid::Uuid;

use grounded_core::Result;
use grounded_llm::LlmClient;
use grounded_rag::{EmbeddingClient, VectorStore};

use crate::config::ServiceConfig;
use crate::conversations::ConversationStore;
use crate::registry::DocumentRegistry;

/// Process-wide handles. The vector index is read-mostly behind a RwLock;
/// ingestion depth is bounded by the semaphore; chat turns serialize on a
/// per-conversation lock.
pub struct AppState {
    pub config: ServiceConfig,
    pub registry: RwLock<DocumentRegistry>,
    pub store: RwLock<VectorStore>,
    pub conversations: RwLock<ConversationStore>,
    pub embedder: EmbeddingClient,
    pub llm: LlmClient,
    pub ingest_slots: Semaphore,
    chat_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl AppState {
    /// Open the stores, then reconcile: stale documents fail, orphaned
    /// vectors from interrupted two-phase deletes are pruned.
    pub fn init(config: ServiceConfig, embedder: EmbeddingClient, llm: LlmClient) -> Result<Self> {
        config.ensure_directories()?;
        let mut registry = DocumentRegistry::open(config.documents_dir())?;
        let mut store = VectorStore::open(config.vectors_dir())?;
        let conversations = ConversationStore::open(config.conversations_dir())?;

        let stale = registry.reconcile_startup()?;
        let valid: HashSet<Uuid> = registry.document_ids().into_iter().collect();
        let pruned = store.retain_documents(&valid)?;
        if stale > 0 || pruned > 0 {
            info!(stale, pruned, "startup reconciliation complete");
        }

        let ingest_workers = config.ingest_workers.max(1);
        Ok(Self {
            config,
            registry: RwLock::new(registry),
            store: RwLock::new(store),
            conversations: RwLock::new(conversations),
            embedder,
            llm,
            ingest_slots: Semaphore::new(ingest_workers),
            chat_locks: Mutex::new(HashMap::new()),
        })
    }

    /// At most one generation in flight per conversation.
    pub async fn conversation_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.chat_locks.lock().await;
        locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Eligible documents for retrieval: the explicit filter, or every
    /// document in ready state.
    pub async fn eligible_documents(&self, requested: Option<&[Uuid]>) -> Vec<Uuid> {
        match requested {
            Some(ids) => ids.to_vec(),
            None => self.registry.read().await.ready_ids(),
        }
    }
}
