//! Vector index abstraction and the in-process implementation.
//!
//! [`VectorIndex`] is the seam between the pipeline and its persistence
//! backend: the in-memory index here, or the MySQL-compatible store in
//! [`crate::store_sql`]. Both policies from the upload contract are
//! expressed as separate operations: `replace` (overwrite — prior content
//! becomes unreachable) and `append` (prior documents stay searchable).
//!
//! Concurrency: `replace` installs a fully-built entry list in one swap
//! under the write lock, so a query racing an upload sees the old index
//! or the new one, never a partial one.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::models::{Embedded, Retrieved};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Drop everything currently indexed and install `items`.
    async fn replace(&self, items: Vec<Embedded>) -> Result<()>;

    /// Add `items` alongside whatever is already indexed.
    async fn append(&self, items: Vec<Embedded>) -> Result<()>;

    /// Top-`k` entries by descending cosine similarity to `query_vec`.
    /// An empty index yields an empty list, not an error; the pipeline
    /// decides how to surface that.
    async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<Retrieved>>;

    async fn is_empty(&self) -> Result<bool>;

    async fn clear(&self) -> Result<()>;
}

/// In-process index used by the visual backend and as the local text
/// backend. One active index per process; `replace` makes the previous
/// upload unreachable.
#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<Vec<Embedded>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn replace(&self, items: Vec<Embedded>) -> Result<()> {
        *self.entries.write().await = items;
        Ok(())
    }

    async fn append(&self, items: Vec<Embedded>) -> Result<()> {
        self.entries.write().await.extend(items);
        Ok(())
    }

    async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<Retrieved>> {
        let entries = self.entries.read().await;

        let mut scored: Vec<Retrieved> = entries
            .iter()
            .map(|e| Retrieved {
                content: e.content.clone(),
                score: cosine_similarity(query_vec, &e.vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.entries.read().await.is_empty())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Content;

    fn entry(id: &str, doc: &str, text: &str, vector: Vec<f32>) -> Embedded {
        Embedded {
            id: id.to_string(),
            document_id: doc.to_string(),
            position: 0,
            content: Content::Text(text.to_string()),
            vector,
        }
    }

    fn text_of(r: &Retrieved) -> &str {
        match &r.content {
            Content::Text(t) => t,
            Content::Image(_) => panic!("expected text"),
        }
    }

    #[tokio::test]
    async fn search_orders_by_descending_similarity() {
        let index = MemoryIndex::new();
        index
            .append(vec![
                entry("a", "d1", "far", vec![0.0, 1.0]),
                entry("b", "d1", "near", vec![1.0, 0.0]),
                entry("c", "d1", "mid", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 3).await.unwrap();
        assert_eq!(text_of(&hits[0]), "near");
        assert_eq!(text_of(&hits[1]), "mid");
        assert_eq!(text_of(&hits[2]), "far");
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[tokio::test]
    async fn search_truncates_to_k() {
        let index = MemoryIndex::new();
        index
            .append((0..10).map(|i| entry(&i.to_string(), "d1", "t", vec![1.0])).collect())
            .await
            .unwrap();

        let hits = index.search(&[1.0], 3).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn empty_index_returns_empty_not_error() {
        let index = MemoryIndex::new();
        assert!(index.is_empty().await.unwrap());
        let hits = index.search(&[1.0, 0.0], 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn replace_makes_prior_content_unreachable() {
        let index = MemoryIndex::new();
        index
            .replace(vec![entry("a", "d1", "first document", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .replace(vec![entry("b", "d2", "second document", vec![0.0, 1.0])])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(text_of(&hits[0]), "second document");
    }

    #[tokio::test]
    async fn append_keeps_prior_content_searchable() {
        let index = MemoryIndex::new();
        index
            .append(vec![entry("a", "d1", "first document", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .append(vec![entry("b", "d2", "second document", vec![0.0, 1.0])])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(text_of(&hits[0]), "first document");
    }

    #[tokio::test]
    async fn clear_empties_the_index() {
        let index = MemoryIndex::new();
        index
            .append(vec![entry("a", "d1", "t", vec![1.0])])
            .await
            .unwrap();
        index.clear().await.unwrap();
        assert!(index.is_empty().await.unwrap());
    }
}
