//! Pipeline orchestration: Loader → (Chunker) → Indexer at build time,
//! Query → Retriever → Answerer at query time.
//!
//! One [`Pipeline`] per process, shared by every request handler. It owns
//! the embedder, the index, and the answer client; the index is only
//! mutated through [`VectorIndex`] operations whose swap/append discipline
//! keeps concurrent queries consistent (they see the previous index or the
//! new one, never a partial one).
//!
//! Stage policies: loading, embedding, and storage fail hard; answer
//! generation degrades to error text (see [`crate::answer`]).

use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::answer::GeminiClient;
use crate::chunk::chunk_text;
use crate::config::{Backend, Config, OnMissingIndex, UpdatePolicy};
use crate::embedding::{embed_query, Embedder};
use crate::error::{PipelineError, Result};
use crate::index::{MemoryIndex, VectorIndex};
use crate::loader;
use crate::models::{Answer, Content, Embedded, Retrieved};
use crate::store_sql::SqlStore;

/// Printed (and returned) when a query finds nothing to rank.
pub const NO_RESULTS_MESSAGE: &str = "No results found.";

pub struct Pipeline {
    config: Arc<Config>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    answerer: Option<GeminiClient>,
}

impl Pipeline {
    /// Assemble a pipeline with explicit collaborators. Tests inject stub
    /// embedders and a pre-seeded index through this constructor.
    pub fn new(
        config: Arc<Config>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        answerer: Option<GeminiClient>,
    ) -> Self {
        Self {
            config,
            embedder,
            index,
            answerer,
        }
    }

    /// Build the pipeline described by `config`. `api_key` is required by
    /// commands that answer queries and absent for index-only commands.
    pub async fn from_config(config: Arc<Config>, api_key: Option<String>) -> Result<Self> {
        let embedder =
            crate::embedding::create_embedder(&config.embedding, config.pipeline.backend())?;

        let index: Arc<dyn VectorIndex> = match config.store.backend.as_str() {
            "mysql" => {
                let db = config.database.as_ref().ok_or_else(|| {
                    PipelineError::Precondition("mysql store requires a [database] section".into())
                })?;
                if !db.ssl_ca.exists() {
                    return Err(PipelineError::Precondition(format!(
                        "SSL CA file not found at: {}",
                        db.ssl_ca.display()
                    )));
                }
                Arc::new(SqlStore::connect(db, &config.store.table).await?)
            }
            _ => Arc::new(MemoryIndex::new()),
        };

        let answerer = match api_key {
            Some(key) => Some(GeminiClient::new(&config.generation, key)?),
            None => None,
        };

        Ok(Self {
            config,
            embedder,
            index,
            answerer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn answerer(&self) -> Option<&GeminiClient> {
        self.answerer.as_ref()
    }

    /// Index a document from disk. Script-mode entry point; reports
    /// `DocumentNotFound` for a bad path.
    pub async fn index_document_from_path(&self, path: &Path) -> Result<usize> {
        let bytes = loader::read_document(path)?;
        self.index_document(&bytes).await
    }

    /// Index a document's bytes: load, split into retrievable units, embed,
    /// and persist under the configured update policy. Returns the number
    /// of units indexed.
    pub async fn index_document(&self, bytes: &[u8]) -> Result<usize> {
        let document_id = Uuid::new_v4().to_string();

        let items = match self.config.pipeline.backend() {
            Backend::Visual => self.embed_pages(&document_id, bytes).await?,
            Backend::Text => self.embed_chunks(&document_id, bytes).await?,
        };

        let count = items.len();
        tracing::info!(document_id = %document_id, units = count, "indexing document");

        match self.config.pipeline.update_policy() {
            UpdatePolicy::Overwrite => self.index.replace(items).await?,
            UpdatePolicy::Append => self.index.append(items).await?,
        }

        Ok(count)
    }

    async fn embed_pages(&self, document_id: &str, bytes: &[u8]) -> Result<Vec<Embedded>> {
        let pages = loader::render_pages(bytes)?;
        let vectors = self.embedder.embed_images(&pages).await?;

        Ok(pages
            .into_iter()
            .zip(vectors)
            .map(|(page, vector)| Embedded {
                id: Uuid::new_v4().to_string(),
                document_id: document_id.to_string(),
                position: page.page_index as i64,
                content: Content::Image(page),
                vector,
            })
            .collect())
    }

    async fn embed_chunks(&self, document_id: &str, bytes: &[u8]) -> Result<Vec<Embedded>> {
        let text = loader::load_text(bytes)?;
        let chunks = chunk_text(
            document_id,
            &text,
            self.config.chunking.chunk_size,
            self.config.chunking.chunk_overlap,
        );

        let mut items = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.embedding.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            for (chunk, vector) in batch.iter().zip(vectors) {
                items.push(Embedded {
                    id: chunk.id.clone(),
                    document_id: chunk.document_id.clone(),
                    position: chunk.chunk_index,
                    content: Content::Text(chunk.text.clone()),
                    vector,
                });
            }
        }
        Ok(items)
    }

    /// Top-K retrieval for `query`. Empty queries are rejected before any
    /// upstream call; an unbuilt index follows the configured policy.
    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Result<Vec<Retrieved>> {
        if query.trim().is_empty() {
            return Err(PipelineError::Validation("query must not be empty".into()));
        }

        if self.index.is_empty().await? {
            return match self.config.retrieval.on_missing_index() {
                OnMissingIndex::Error => Err(PipelineError::Precondition(
                    "no document indexed yet; upload a PDF first".into(),
                )),
                OnMissingIndex::Empty => Ok(Vec::new()),
            };
        }

        let k = k.unwrap_or_else(|| self.config.top_k());
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        self.index.search(&query_vec, k).await
    }

    /// Retrieve and answer. Retrieval failures propagate; generation
    /// failures degrade into the answer text.
    pub async fn ask(&self, query: &str, k: Option<usize>) -> Result<Answer> {
        let retrieved = self.retrieve(query, k).await?;

        if retrieved.is_empty() {
            return Ok(Answer {
                query: query.to_string(),
                text: NO_RESULTS_MESSAGE.to_string(),
                retrieved,
            });
        }

        let answerer = self.answerer.as_ref().ok_or_else(|| {
            PipelineError::Precondition("answer generation is not configured".into())
        })?;

        let text = answerer.answer(query, &retrieved).await;

        Ok(Answer {
            query: query.to_string(),
            text,
            retrieved,
        })
    }
}
