//! Round-trip test for the MySQL-compatible store. Needs a reachable
//! server, so it is gated on environment variables and skips itself when
//! they are absent:
//!
//! ```bash
//! DOCQ_TEST_DB_HOST=... DOCQ_TEST_DB_USER=... DOCQ_TEST_DB_PASSWORD=... \
//! DOCQ_TEST_DB_NAME=test DOCQ_TEST_DB_SSL_CA=./isrgrootx1.pem \
//! cargo test --test sql_store
//! ```

use std::path::PathBuf;

use docquery::config::DatabaseConfig;
use docquery::index::VectorIndex;
use docquery::models::{Content, Embedded};
use docquery::store_sql::SqlStore;

fn test_db_config() -> Option<DatabaseConfig> {
    let host = std::env::var("DOCQ_TEST_DB_HOST").ok()?;
    Some(DatabaseConfig {
        host,
        port: std::env::var("DOCQ_TEST_DB_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(4000),
        user: std::env::var("DOCQ_TEST_DB_USER").ok()?,
        password: std::env::var("DOCQ_TEST_DB_PASSWORD").ok(),
        database: std::env::var("DOCQ_TEST_DB_NAME").ok()?,
        ssl_ca: PathBuf::from(std::env::var("DOCQ_TEST_DB_SSL_CA").ok()?),
    })
}

fn entry(id: &str, doc: &str, text: &str, vector: Vec<f32>) -> Embedded {
    Embedded {
        id: id.to_string(),
        document_id: doc.to_string(),
        position: 0,
        content: Content::Text(text.to_string()),
        vector,
    }
}

#[tokio::test]
async fn append_search_and_clear_round_trip() {
    let Some(db) = test_db_config() else {
        eprintln!("skipping: DOCQ_TEST_DB_* not set");
        return;
    };

    let store = SqlStore::connect(&db, "docq_test_chunks").await.unwrap();
    store.migrate().await.unwrap();
    store.clear().await.unwrap();
    assert!(store.is_empty().await.unwrap());

    store
        .append(vec![
            entry("t-1", "d1", "refund window is 30 days", vec![1.0, 0.0]),
            entry("t-2", "d2", "warranty coverage lasts five years", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();
    assert!(!store.is_empty().await.unwrap());

    let hits = store.search(&[1.0, 0.0], 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    match &hits[0].content {
        Content::Text(t) => assert!(t.contains("refund window")),
        Content::Image(_) => panic!("expected text"),
    }

    // Overwrite truncates before inserting.
    store
        .replace(vec![entry("t-3", "d3", "entirely new content", vec![0.5, 0.5])])
        .await
        .unwrap();
    let hits = store.search(&[1.0, 0.0], 10).await.unwrap();
    assert_eq!(hits.len(), 1);

    store.clear().await.unwrap();
    store.close().await;
}
