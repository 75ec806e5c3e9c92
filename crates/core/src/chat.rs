use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coverage::CoverageDescriptor;
use crate::document::SourceRef;
use crate::generation::GeneratedSection;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sources_used: Vec<SourceRef>,
    #[serde(default)]
    pub sections: Option<Vec<GeneratedSection>>,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::User,
            content: content.to_string(),
            timestamp: Utc::now(),
            sources_used: Vec::new(),
            sections: None,
        }
    }

    pub fn assistant(content: String, sources_used: Vec<SourceRef>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::Assistant,
            content,
            timestamp: Utc::now(),
            sources_used,
            sections: None,
        }
    }
}

/// A conversation thread. Messages reference chunks by id only, never by
/// pointer, which keeps persistence flat and deletion safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    #[serde(default)]
    pub title: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub document_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub cumulative_coverage: Option<CoverageDescriptor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(document_ids: Option<Vec<Uuid>>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: String::new(),
            messages: Vec::new(),
            document_ids,
            cumulative_coverage: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Title falls back to the first user message, truncated to 80 chars.
    pub fn derive_title(&mut self) {
        if !self.title.is_empty() {
            return;
        }
        if let Some(first) = self.messages.iter().find(|m| m.role == ChatRole::User) {
            let mut title: String = first.content.chars().take(80).collect();
            if first.content.chars().count() > 80 {
                title.push_str("...");
            }
            self.title = title;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSummary {
    pub fn from_conversation(conversation: &Conversation) -> Self {
        let title = if conversation.title.is_empty() {
            "New conversation".to_string()
        } else {
            conversation.title.clone()
        };
        Self {
            id: conversation.id,
            title,
            message_count: conversation.messages.len(),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_derives_from_first_user_message() {
        let mut conversation = Conversation::new(None);
        conversation.messages.push(ChatMessage::user("Summarize chapter 2"));
        conversation
            .messages
            .push(ChatMessage::assistant("done".into(), Vec::new()));
        conversation.derive_title();
        assert_eq!(conversation.title, "Summarize chapter 2");
    }

    #[test]
    fn long_title_is_truncated_to_80_chars() {
        let mut conversation = Conversation::new(None);
        let long = "x".repeat(120);
        conversation.messages.push(ChatMessage::user(&long));
        conversation.derive_title();
        assert!(conversation.title.starts_with(&"x".repeat(80)));
        assert!(conversation.title.ends_with("..."));
    }

    #[test]
    fn existing_title_is_preserved() {
        let mut conversation = Conversation::new(None);
        conversation.title = "kept".to_string();
        conversation.messages.push(ChatMessage::user("ignored"));
        conversation.derive_title();
        assert_eq!(conversation.title, "kept");
    }
}
