use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use grounded_core::{Document, DocumentStatus, DocumentType, GroundedError, Result};
use grounded_rag::atomic_write;

/// Index entry kept small for O(1) listings; the full record lives in
/// `{id}.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub title: String,
    pub filename: String,
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub chunk_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl DocumentSummary {
    fn from_document(doc: &Document) -> Self {
        Self {
            id: doc.id,
            title: doc.title.clone(),
            filename: doc.filename.clone(),
            doc_type: doc.doc_type,
            status: doc.status,
            chunk_count: doc.chunk_count,
            updated_at: doc.updated_at,
        }
    }
}

/// File-backed document registry: `documents/{id}.json` + `index.json`.
/// The registry exclusively owns Document records.
pub struct DocumentRegistry {
    dir: PathBuf,
    index: BTreeMap<Uuid, DocumentSummary>,
}

impl DocumentRegistry {
    pub fn open(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        let mut registry = Self {
            dir,
            index: BTreeMap::new(),
        };
        registry.load_index()?;
        Ok(registry)
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.json")
    }

    fn document_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn load_index(&mut self) -> Result<()> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(());
        }
        match serde_json::from_str::<Vec<DocumentSummary>>(&fs::read_to_string(&path)?) {
            Ok(summaries) => {
                self.index = summaries.into_iter().map(|s| (s.id, s)).collect();
            }
            Err(err) => {
                warn!(error = %err, "failed to parse document index, starting empty");
            }
        }
        Ok(())
    }

    fn save_index(&self) -> Result<()> {
        let summaries: Vec<&DocumentSummary> = self.index.values().collect();
        let json = serde_json::to_vec_pretty(&summaries)?;
        atomic_write(&self.dir, &self.index_path(), &json)
    }

    pub fn save(&mut self, document: &Document) -> Result<()> {
        let json = serde_json::to_vec_pretty(document)?;
        atomic_write(&self.dir, &self.document_path(document.id), &json)?;
        self.index
            .insert(document.id, DocumentSummary::from_document(document));
        self.save_index()
    }

    pub fn get(&self, id: Uuid) -> Result<Document> {
        let path = self.document_path(id);
        if !path.exists() {
            return Err(GroundedError::NotFound(format!("document not found: {id}")));
        }
        Ok(serde_json::from_str(&fs::read_to_string(&path)?)?)
    }

    pub fn exists(&self, id: Uuid) -> bool {
        self.index.contains_key(&id)
    }

    pub fn list(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::with_capacity(self.index.len());
        for id in self.index.keys() {
            documents.push(self.get(*id)?);
        }
        Ok(documents)
    }

    pub fn summaries(&self) -> Vec<DocumentSummary> {
        self.index.values().cloned().collect()
    }

    /// Delete is idempotent: a missing document reports false, never errors.
    pub fn delete(&mut self, id: Uuid) -> Result<bool> {
        let existed = self.index.remove(&id).is_some();
        if existed {
            self.save_index()?;
        }
        let path = self.document_path(id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(existed)
    }

    pub fn document_ids(&self) -> Vec<Uuid> {
        self.index.keys().copied().collect()
    }

    pub fn ready_ids(&self) -> Vec<Uuid> {
        self.index
            .values()
            .filter(|s| s.status == DocumentStatus::Ready)
            .map(|s| s.id)
            .collect()
    }

    /// Documents still marked pending or processing at startup were
    /// interrupted mid-ingestion; mark them failed so they surface as
    /// retryable instead of hanging forever.
    pub fn reconcile_startup(&mut self) -> Result<usize> {
        let stale: Vec<Uuid> = self
            .index
            .values()
            .filter(|s| {
                matches!(
                    s.status,
                    DocumentStatus::Pending | DocumentStatus::Processing
                )
            })
            .map(|s| s.id)
            .collect();
        for id in &stale {
            let mut document = self.get(*id)?;
            document.status = DocumentStatus::Failed;
            document.error_message = Some("stale_on_restart".to_string());
            document.touch();
            self.save(&document)?;
        }
        if !stale.is_empty() {
            info!(count = stale.len(), "marked stale documents as failed");
        }
        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: DocumentStatus) -> Document {
        let mut doc = Document::new("a.txt", DocumentType::Txt, None);
        doc.status = status;
        doc
    }

    #[test]
    fn save_and_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = DocumentRegistry::open(dir.path().to_path_buf()).unwrap();
        let doc = sample(DocumentStatus::Ready);
        registry.save(&doc).unwrap();
        let loaded = registry.get(doc.id).unwrap();
        assert_eq!(loaded.id, doc.id);
        assert_eq!(loaded.status, DocumentStatus::Ready);
    }

    #[test]
    fn index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let doc = sample(DocumentStatus::Ready);
        {
            let mut registry = DocumentRegistry::open(dir.path().to_path_buf()).unwrap();
            registry.save(&doc).unwrap();
        }
        let registry = DocumentRegistry::open(dir.path().to_path_buf()).unwrap();
        assert!(registry.exists(doc.id));
        assert_eq!(registry.summaries().len(), 1);
    }

    #[test]
    fn stale_documents_fail_on_startup() {
        let dir = tempfile::tempdir().unwrap();
        let pending = sample(DocumentStatus::Pending);
        let processing = sample(DocumentStatus::Processing);
        let ready = sample(DocumentStatus::Ready);
        {
            let mut registry = DocumentRegistry::open(dir.path().to_path_buf()).unwrap();
            registry.save(&pending).unwrap();
            registry.save(&processing).unwrap();
            registry.save(&ready).unwrap();
        }
        let mut registry = DocumentRegistry::open(dir.path().to_path_buf()).unwrap();
        let swept = registry.reconcile_startup().unwrap();
        assert_eq!(swept, 2);
        for id in [pending.id, processing.id] {
            let doc = registry.get(id).unwrap();
            assert_eq!(doc.status, DocumentStatus::Failed);
            assert_eq!(doc.error_message.as_deref(), Some("stale_on_restart"));
        }
        assert_eq!(registry.get(ready.id).unwrap().status, DocumentStatus::Ready);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = DocumentRegistry::open(dir.path().to_path_buf()).unwrap();
        let doc = sample(DocumentStatus::Ready);
        registry.save(&doc).unwrap();
        assert!(registry.delete(doc.id).unwrap());
        assert!(!registry.delete(doc.id).unwrap());
        assert!(registry.get(doc.id).is_err());
    }
}
