//! Shared helpers for integration tests: a deterministic stub embedder
//! and a minimal hand-built PDF generator.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;

use docquery::config::Config;
use docquery::embedding::Embedder;
use docquery::error::Result;
use docquery::models::PageImage;

/// Deterministic embedder: a text maps to the L2-normalized bag of its
/// character trigrams, folded into 64 dimensions. Identical texts get
/// identical vectors (cosine 1.0); unrelated texts land far apart. No
/// model downloads, no network.
pub struct StubEmbedder;

impl StubEmbedder {
    pub fn arc() -> Arc<dyn Embedder> {
        Arc::new(StubEmbedder)
    }

    fn vectorize(bytes: &[u8]) -> Vec<f32> {
        let mut v = vec![0.0f32; 64];
        for window in bytes.windows(3) {
            let mut h: u32 = 2166136261;
            for &b in window {
                h ^= b as u32;
                h = h.wrapping_mul(16777619);
            }
            v[(h % 64) as usize] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub"
    }
    fn dims(&self) -> usize {
        64
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| Self::vectorize(t.to_lowercase().as_bytes()))
            .collect())
    }

    async fn embed_images(&self, pages: &[PageImage]) -> Result<Vec<Vec<f32>>> {
        Ok(pages.iter().map(|p| Self::vectorize(&p.png)).collect())
    }
}

/// Minimal valid single-page PDF containing `phrase`. Builds the body,
/// then the xref with correct byte offsets so pdf-extract can parse it.
/// `phrase` must not contain parentheses or backslashes.
pub fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let stream_content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET\n", phrase);

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}endstream endobj\n",
            stream_content.len(),
            stream_content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// A visual/memory config: overwrite policy, top_k = 1.
pub fn visual_config() -> Config {
    toml::from_str("[pipeline]\nbackend = \"visual\"\n").unwrap()
}

/// A text/memory config with the given update and missing-index policies.
pub fn text_config(update_policy: &str, on_missing_index: &str) -> Config {
    let toml_str = format!(
        r#"
[pipeline]
backend = "text"
update_policy = "{}"

[retrieval]
top_k = 3
on_missing_index = "{}"
"#,
        update_policy, on_missing_index
    );
    toml::from_str(&toml_str).unwrap()
}
