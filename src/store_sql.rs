//! MySQL-compatible vector store (TiDB Cloud and friends).
//!
//! One shared table holds every indexed chunk with its embedding as a
//! little-endian f32 BLOB. Uploads append by default; the overwrite
//! policy truncates and inserts inside a single transaction, so a
//! concurrent reader sees the old rows or the new ones.
//!
//! Similarity search fetches candidate rows and ranks them by cosine
//! similarity in Rust, the same way the in-memory index does.
//!
//! Connection, TLS, and insert failures are [`Stage::Store`] upstream
//! errors: fatal to the request in the server, fatal to the process in
//! script mode.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use sqlx::Row;

use crate::config::DatabaseConfig;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{PipelineError, Result, Stage};
use crate::index::VectorIndex;
use crate::models::{Content, Embedded, Retrieved};

pub struct SqlStore {
    pool: MySqlPool,
    table: String,
}

impl SqlStore {
    /// Connect with CA-verified TLS. The caller has already checked that
    /// the CA file exists (startup precondition).
    pub async fn connect(config: &DatabaseConfig, table: &str) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password())
            .database(&config.database)
            .ssl_mode(MySqlSslMode::VerifyCa)
            .ssl_ca(&config.ssl_ca);

        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| PipelineError::upstream(Stage::Store, e))?;

        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    /// Create the chunk table. Idempotent; run by `docq init`.
    pub async fn migrate(&self) -> Result<()> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id VARCHAR(36) PRIMARY KEY,
                document_id VARCHAR(36) NOT NULL,
                chunk_index BIGINT NOT NULL,
                content LONGTEXT NOT NULL,
                embedding MEDIUMBLOB NOT NULL,
                created_at BIGINT NOT NULL,
                INDEX idx_document_id (document_id)
            )
            "#,
            self.table
        );

        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::upstream(Stage::Store, e))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn content_text(item: &Embedded) -> Result<&str> {
        match &item.content {
            Content::Text(text) => Ok(text),
            Content::Image(_) => Err(PipelineError::upstream(
                Stage::Store,
                "the SQL store holds text chunks only",
            )),
        }
    }

    async fn insert_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::MySql>,
        items: &[Embedded],
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let sql = format!(
            "INSERT INTO {} (id, document_id, chunk_index, content, embedding, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            self.table
        );

        for item in items {
            let text = Self::content_text(item)?;
            sqlx::query(&sql)
                .bind(&item.id)
                .bind(&item.document_id)
                .bind(item.position)
                .bind(text)
                .bind(vec_to_blob(&item.vector))
                .bind(now)
                .execute(&mut **tx)
                .await
                .map_err(|e| PipelineError::upstream(Stage::Store, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for SqlStore {
    async fn replace(&self, items: Vec<Embedded>) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PipelineError::upstream(Stage::Store, e))?;

        let delete = format!("DELETE FROM {}", self.table);
        sqlx::query(&delete)
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::upstream(Stage::Store, e))?;

        self.insert_tx(&mut tx, &items).await?;

        tx.commit()
            .await
            .map_err(|e| PipelineError::upstream(Stage::Store, e))
    }

    async fn append(&self, items: Vec<Embedded>) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PipelineError::upstream(Stage::Store, e))?;

        self.insert_tx(&mut tx, &items).await?;

        tx.commit()
            .await
            .map_err(|e| PipelineError::upstream(Stage::Store, e))
    }

    async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<Retrieved>> {
        let sql = format!("SELECT content, embedding FROM {}", self.table);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::upstream(Stage::Retrieve, e))?;

        let mut scored: Vec<Retrieved> = rows
            .iter()
            .map(|row| {
                let text: String = row.get("content");
                let blob: Vec<u8> = row.get("embedding");
                Retrieved {
                    content: Content::Text(text),
                    score: cosine_similarity(query_vec, &blob_to_vec(&blob)),
                }
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
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PipelineError::upstream(Stage::Retrieve, e))?;
        Ok(count == 0)
    }

    async fn clear(&self) -> Result<()> {
        let sql = format!("DELETE FROM {}", self.table);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::upstream(Stage::Store, e))?;
        Ok(())
    }
}
