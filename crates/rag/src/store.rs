use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bytemuck::cast_slice;
use uuid::Uuid;

use grounded_core::{cosine_similarity, DocumentChunk, GroundedError, Result};

/// Flat vector index with a parallel chunk table. Vectors are stored
/// unit-norm so similarity reduces to a dot product. Persisted as
/// `index.bin` (little-endian f32) plus `chunks.json`.
pub struct VectorStore {
    dir: PathBuf,
    chunks: Vec<DocumentChunk>,
    vectors: Vec<Vec<f32>>,
    dimensions: Option<usize>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub total_chunks: usize,
    pub total_documents: usize,
    pub dimensions: Option<usize>,
}

impl VectorStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let mut store = Self {
            dir,
            chunks: Vec::new(),
            vectors: Vec::new(),
            dimensions: None,
        };
        store.load()?;
        Ok(store)
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.bin")
    }

    fn chunks_path(&self) -> PathBuf {
        self.dir.join("chunks.json")
    }

    fn load(&mut self) -> Result<()> {
        let chunks_path = self.chunks_path();
        let index_path = self.index_path();
        if !chunks_path.exists() || !index_path.exists() {
            return Ok(());
        }
        let chunks: Vec<DocumentChunk> = serde_json::from_str(&fs::read_to_string(&chunks_path)?)?;
        let bytes = fs::read(&index_path)?;
        if bytes.len() % 4 != 0 {
            return Err(GroundedError::PersistenceFailed(
                "vector index file is truncated".into(),
            ));
        }
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if chunks.is_empty() {
            return Ok(());
        }
        if floats.is_empty() || floats.len() % chunks.len() != 0 {
            return Err(GroundedError::PersistenceFailed(
                "vector index does not match chunk table".into(),
            ));
        }
        let dims = floats.len() / chunks.len();
        self.vectors = floats.chunks_exact(dims).map(|v| v.to_vec()).collect();
        self.dimensions = Some(dims);
        self.chunks = chunks;
        Ok(())
    }

    fn save(&self) -> Result<()> {
        if self.chunks.is_empty() {
            // Empty store drops its files rather than persisting zero-length
            // artifacts that a partial crash could also produce.
            let _ = fs::remove_file(self.index_path());
            let _ = fs::remove_file(self.chunks_path());
            return Ok(());
        }
        let mut bytes = Vec::with_capacity(self.vectors.len() * self.vectors[0].len() * 4);
        for vector in &self.vectors {
            bytes.extend_from_slice(cast_slice::<f32, u8>(vector));
        }
        atomic_write(&self.dir, &self.index_path(), &bytes)?;
        let json = serde_json::to_vec_pretty(&self.chunks)?;
        atomic_write(&self.dir, &self.chunks_path(), &json)?;
        Ok(())
    }

    /// Add chunk records with their vectors. The index dimension is fixed by
    /// the first insert; mismatched vectors are rejected.
    pub fn add_chunks(&mut self, chunks: Vec<DocumentChunk>, vectors: Vec<Vec<f32>>) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(GroundedError::InputInvalid(format!(
                "chunk/vector count mismatch: {} vs {}",
                chunks.len(),
                vectors.len()
            )));
        }
        if chunks.is_empty() {
            return Ok(());
        }
        let dims = match self.dimensions {
            Some(dims) => dims,
            None => vectors[0].len(),
        };
        for vector in &vectors {
            if vector.len() != dims {
                return Err(GroundedError::InputInvalid(format!(
                    "embedding dimension {} does not match index dimension {dims}",
                    vector.len()
                )));
            }
        }
        self.dimensions = Some(dims);
        self.chunks.extend(chunks);
        self.vectors.extend(vectors);
        self.save()
    }

    /// Remove every chunk of a document. Returns the number removed.
    pub fn delete_document(&mut self, document_id: Uuid) -> Result<usize> {
        let before = self.chunks.len();
        let mut kept_chunks = Vec::with_capacity(before);
        let mut kept_vectors = Vec::with_capacity(before);
        for (chunk, vector) in self.chunks.drain(..).zip(self.vectors.drain(..)) {
            if chunk.document_id != document_id {
                kept_chunks.push(chunk);
                kept_vectors.push(vector);
            }
        }
        self.chunks = kept_chunks;
        self.vectors = kept_vectors;
        let removed = before - self.chunks.len();
        if removed > 0 {
            if self.chunks.is_empty() {
                self.dimensions = None;
            }
            self.save()?;
        }
        Ok(removed)
    }

    /// Drop chunks whose document no longer exists. Run at startup to finish
    /// interrupted two-phase deletes.
    pub fn retain_documents(&mut self, valid: &HashSet<Uuid>) -> Result<usize> {
        let orphaned: Vec<Uuid> = self
            .chunks
            .iter()
            .map(|c| c.document_id)
            .filter(|id| !valid.contains(id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let mut removed = 0;
        for document_id in orphaned {
            removed += self.delete_document(document_id)?;
        }
        Ok(removed)
    }

    /// Cosine top-k over eligible chunks with a score threshold.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
        document_ids: Option<&[Uuid]>,
    ) -> Vec<(&DocumentChunk, f32)> {
        let filter: Option<HashSet<Uuid>> = document_ids.map(|ids| ids.iter().copied().collect());
        let mut hits: Vec<(&DocumentChunk, f32)> = self
            .chunks
            .iter()
            .zip(self.vectors.iter())
            .filter(|(chunk, _)| {
                filter
                    .as_ref()
                    .map(|ids| ids.contains(&chunk.document_id))
                    .unwrap_or(true)
            })
            .map(|(chunk, vector)| (chunk, cosine_similarity(query, vector)))
            .filter(|(_, score)| *score >= threshold)
            .collect();
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.ordinal.cmp(&b.0.ordinal))
        });
        hits.truncate(top_k);
        hits
    }

    /// Similarity of every eligible chunk to the query, unfiltered and
    /// unsorted. The diverse retriever ranks within regions itself.
    pub fn score_all(
        &self,
        query: &[f32],
        document_ids: Option<&[Uuid]>,
    ) -> Vec<(&DocumentChunk, f32)> {
        let filter: Option<HashSet<Uuid>> = document_ids.map(|ids| ids.iter().copied().collect());
        self.chunks
            .iter()
            .zip(self.vectors.iter())
            .filter(|(chunk, _)| {
                filter
                    .as_ref()
                    .map(|ids| ids.contains(&chunk.document_id))
                    .unwrap_or(true)
            })
            .map(|(chunk, vector)| (chunk, cosine_similarity(query, vector)))
            .collect()
    }

    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    pub fn chunks_for_document(&self, document_id: Uuid) -> Vec<&DocumentChunk> {
        let mut chunks: Vec<&DocumentChunk> = self
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .collect();
        chunks.sort_by_key(|c| c.ordinal);
        chunks
    }

    pub fn chunk_text(&self, chunk_id: Uuid) -> Option<&str> {
        self.chunks
            .iter()
            .find(|c| c.id == chunk_id)
            .map(|c| c.text.as_str())
    }

    pub fn stats(&self) -> StoreStats {
        let documents: HashSet<Uuid> = self.chunks.iter().map(|c| c.document_id).collect();
        StoreStats {
            total_chunks: self.chunks.len(),
            total_documents: documents.len(),
            dimensions: self.dimensions,
        }
    }
}

/// Write-to-temp, fsync, rename. The temp file lives in the target directory
/// so the rename stays on one filesystem.
pub fn atomic_write(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| GroundedError::PersistenceFailed(e.to_string()))?;
    tmp.write_all(bytes)
        .map_err(|e| GroundedError::PersistenceFailed(e.to_string()))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| GroundedError::PersistenceFailed(e.to_string()))?;
    tmp.persist(path)
        .map_err(|e| GroundedError::PersistenceFailed(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use grounded_core::{HashEmbedder, HashEmbedderConfig};

    fn chunk(document_id: Uuid, ordinal: usize, text: &str) -> DocumentChunk {
        DocumentChunk {
            id: Uuid::new_v4(),
            document_id,
            ordinal,
            text: text.to_string(),
            page: None,
            section_title: None,
            title: "doc".to_string(),
            filename: "doc.txt".to_string(),
        }
    }

    fn embed(texts: &[&DocumentChunk]) -> Vec<Vec<f32>> {
        let embedder = HashEmbedder::new(HashEmbedderConfig::default());
        texts.iter().map(|c| embedder.embed_text(&c.text)).collect()
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let document_id = Uuid::new_v4();
        let chunks = vec![
            chunk(document_id, 0, "alpha beta"),
            chunk(document_id, 1, "gamma delta"),
        ];
        let vectors = embed(&chunks.iter().collect::<Vec<_>>());
        {
            let mut store = VectorStore::open(dir.path()).unwrap();
            store.add_chunks(chunks.clone(), vectors.clone()).unwrap();
        }
        let store = VectorStore::open(dir.path()).unwrap();
        assert_eq!(store.chunks().len(), 2);
        assert_eq!(store.chunks()[0].id, chunks[0].id);
        assert_eq!(store.stats().dimensions, Some(vectors[0].len()));
    }

    #[test]
    fn search_respects_document_filter_and_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = VectorStore::open(dir.path()).unwrap();
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        let chunks = vec![
            chunk(doc_a, 0, "data feminism and power"),
            chunk(doc_b, 0, "completely unrelated topic"),
        ];
        let vectors = embed(&chunks.iter().collect::<Vec<_>>());
        store.add_chunks(chunks, vectors).unwrap();

        let embedder = HashEmbedder::new(HashEmbedderConfig::default());
        let query = embedder.embed_text("data feminism");
        let hits = store.search(&query, 10, 0.1, Some(&[doc_a]));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.document_id, doc_a);

        let none = store.search(&query, 10, 0.99, Some(&[doc_b]));
        assert!(none.is_empty());
    }

    #[test]
    fn delete_document_removes_chunks_and_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = VectorStore::open(dir.path()).unwrap();
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        let chunks = vec![
            chunk(doc_a, 0, "first"),
            chunk(doc_a, 1, "second"),
            chunk(doc_b, 0, "third"),
        ];
        let vectors = embed(&chunks.iter().collect::<Vec<_>>());
        store.add_chunks(chunks, vectors).unwrap();

        let removed = store.delete_document(doc_a).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.chunks().len(), 1);
        assert_eq!(store.chunks()[0].document_id, doc_b);
    }

    #[test]
    fn retain_documents_prunes_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = VectorStore::open(dir.path()).unwrap();
        let keep = Uuid::new_v4();
        let orphan = Uuid::new_v4();
        let chunks = vec![chunk(keep, 0, "keep me"), chunk(orphan, 0, "orphaned")];
        let vectors = embed(&chunks.iter().collect::<Vec<_>>());
        store.add_chunks(chunks, vectors).unwrap();

        let valid: HashSet<Uuid> = [keep].into_iter().collect();
        let removed = store.retain_documents(&valid).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.chunks().len(), 1);
        assert_eq!(store.chunks()[0].document_id, keep);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = VectorStore::open(dir.path()).unwrap();
        let doc = Uuid::new_v4();
        store
            .add_chunks(vec![chunk(doc, 0, "a")], vec![vec![1.0, 0.0]])
            .unwrap();
        let err = store
            .add_chunks(vec![chunk(doc, 1, "b")], vec![vec![1.0, 0.0, 0.0]])
            .unwrap_err();
        assert!(matches!(err, GroundedError::InputInvalid(_)));
    }
}
