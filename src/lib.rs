//! # docquery
//!
//! A configurable PDF retrieval and answering pipeline.
//!
//! A document is indexed either as page images (visual backend, CLIP
//! embeddings, in-process index) or as overlapping text chunks (text
//! backend, local or remote text embeddings, in-process index or a
//! MySQL-compatible vector table). A query retrieves the most similar
//! units and a multimodal model answers grounded in them.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐   ┌───────────────┐   ┌─────────────┐
//! │ Loader │──▶│ Chunk / Pages  │──▶│   Indexer    │
//! │  PDF   │   │ text | images │   │ memory|mysql │
//! └────────┘   └───────────────┘   └──────┬──────┘
//!                                         │
//!                      Query ──▶ Retriever┴──▶ Answerer (Gemini)
//!                                         │
//!                        ┌────────────────┤
//!                        ▼                ▼
//!                   ┌─────────┐      ┌─────────┐
//!                   │   CLI   │      │  HTTP   │
//!                   │ (docq)  │      │ (axum)  │
//!                   └─────────┘      └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docq init                                # create the MySQL schema (text/mysql store)
//! docq index ./doc/policy.pdf              # build the index
//! docq ask ./doc/policy.pdf "refund window"
//! docq chat ./doc/policy.pdf               # interactive loop, quit with 'q'
//! docq serve                               # HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and startup checks |
//! | [`models`] | Core data types |
//! | [`loader`] | PDF text extraction and page rasterization |
//! | [`chunk`] | Overlapping sliding-window chunker |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index seam and in-memory index |
//! | [`store_sql`] | MySQL-compatible vector store |
//! | [`answer`] | Gemini answer and question generation |
//! | [`pipeline`] | Stage orchestration and policies |
//! | [`server`] | HTTP API |
//! | [`repl`] | One-shot and interactive script modes |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod repl;
pub mod server;
pub mod store_sql;
