use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::warn;
use uuid::Uuid;

use grounded_core::{Conversation, ConversationSummary, GroundedError, Result};
use grounded_rag::atomic_write;

/// File-backed conversation persistence: `conversations/{id}.json` plus an
/// `index.json` of summaries for fast listings. One write per chat turn.
pub struct ConversationStore {
    dir: PathBuf,
    index: BTreeMap<Uuid, ConversationSummary>,
}

impl ConversationStore {
    pub fn open(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        let mut store = Self {
            dir,
            index: BTreeMap::new(),
        };
        store.load_index()?;
        Ok(store)
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.json")
    }

    fn conversation_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn load_index(&mut self) -> Result<()> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(());
        }
        match serde_json::from_str::<Vec<ConversationSummary>>(&fs::read_to_string(&path)?) {
            Ok(summaries) => {
                self.index = summaries.into_iter().map(|s| (s.id, s)).collect();
            }
            Err(err) => {
                warn!(error = %err, "failed to parse conversation index, starting empty");
            }
        }
        Ok(())
    }

    fn save_index(&self) -> Result<()> {
        let summaries: Vec<&ConversationSummary> = self.index.values().collect();
        let json = serde_json::to_vec_pretty(&summaries)?;
        atomic_write(&self.dir, &self.index_path(), &json)
    }

    pub fn save(&mut self, conversation: &Conversation) -> Result<()> {
        let json = serde_json::to_vec_pretty(conversation)?;
        atomic_write(&self.dir, &self.conversation_path(conversation.id), &json)?;
        self.index.insert(
            conversation.id,
            ConversationSummary::from_conversation(conversation),
        );
        self.save_index()
    }

    pub fn load(&self, id: Uuid) -> Result<Conversation> {
        let path = self.conversation_path(id);
        if !path.exists() {
            return Err(GroundedError::NotFound(format!(
                "conversation not found: {id}"
            )));
        }
        Ok(serde_json::from_str(&fs::read_to_string(&path)?)?)
    }

    pub fn exists(&self, id: Uuid) -> bool {
        self.index.contains_key(&id)
    }

    /// Newest first by `updated_at`.
    pub fn list(&self) -> Vec<ConversationSummary> {
        let mut summaries: Vec<ConversationSummary> = self.index.values().cloned().collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    /// Idempotent: deleting an unknown conversation reports false.
    pub fn delete(&mut self, id: Uuid) -> Result<bool> {
        let existed = self.index.remove(&id).is_some();
        if existed {
            self.save_index()?;
        }
        let path = self.conversation_path(id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(existed)
    }

    pub fn update_title(&mut self, id: Uuid, title: &str) -> Result<bool> {
        if !self.index.contains_key(&id) {
            return Ok(false);
        }
        let mut conversation = self.load(id)?;
        conversation.title = title.to_string();
        conversation.updated_at = chrono::Utc::now();
        self.save(&conversation)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grounded_core::ChatMessage;

    #[test]
    fn conversation_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConversationStore::open(dir.path().to_path_buf()).unwrap();
        let mut conversation = Conversation::new(None);
        conversation.messages.push(ChatMessage::user("hello"));
        conversation
            .messages
            .push(ChatMessage::assistant("hi [Source 1]".into(), Vec::new()));
        conversation.derive_title();
        store.save(&conversation).unwrap();

        let loaded = store.load(conversation.id).unwrap();
        assert_eq!(loaded.id, conversation.id);
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].content, "hello");
        assert_eq!(loaded.title, conversation.title);
        assert_eq!(
            loaded.created_at.timestamp(),
            conversation.created_at.timestamp()
        );
        assert_eq!(
            loaded.updated_at.timestamp(),
            conversation.updated_at.timestamp()
        );
    }

    #[test]
    fn listing_sorts_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConversationStore::open(dir.path().to_path_buf()).unwrap();
        let mut older = Conversation::new(None);
        older.updated_at = chrono::Utc::now() - chrono::Duration::hours(2);
        let newer = Conversation::new(None);
        store.save(&older).unwrap();
        store.save(&newer).unwrap();
        let listing = store.list();
        assert_eq!(listing[0].id, newer.id);
        assert_eq!(listing[1].id, older.id);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConversationStore::open(dir.path().to_path_buf()).unwrap();
        let conversation = Conversation::new(None);
        store.save(&conversation).unwrap();
        assert!(store.delete(conversation.id).unwrap());
        assert!(!store.delete(conversation.id).unwrap());
    }

    #[test]
    fn update_title_changes_index_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConversationStore::open(dir.path().to_path_buf()).unwrap();
        let conversation = Conversation::new(None);
        store.save(&conversation).unwrap();
        assert!(store.update_title(conversation.id, "renamed").unwrap());
        assert_eq!(store.load(conversation.id).unwrap().title, "renamed");
        assert_eq!(store.list()[0].title, "renamed");
        assert!(!store.update_title(Uuid::new_v4(), "nope").unwrap());
    }
}
