//! Core data types flowing through the indexing and retrieval pipeline.

/// A rendered page of a source document, as an RGB PNG.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Zero-based page position within the document.
    pub page_index: usize,
    pub png: Vec<u8>,
}

/// A bounded, possibly overlapping window of a document's extracted text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// The retrievable payload of an indexed unit: a text chunk on the text
/// backend, a page image on the visual backend.
#[derive(Debug, Clone)]
pub enum Content {
    Text(String),
    Image(PageImage),
}

impl Content {
    /// Display form of the unit: chunk text, or a page label for images.
    pub fn label(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Image(page) => format!("page {}", page.page_index + 1),
        }
    }

    pub fn as_image(&self) -> Option<&PageImage> {
        match self {
            Content::Image(page) => Some(page),
            Content::Text(_) => None,
        }
    }
}

/// A unit ready for persistence: content plus its embedding vector.
#[derive(Debug, Clone)]
pub struct Embedded {
    pub id: String,
    pub document_id: String,
    pub position: i64,
    pub content: Content,
    pub vector: Vec<f32>,
}

/// One search hit, ordered by descending similarity in a result list.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub content: Content,
    pub score: f32,
}

/// The outcome of a full query: retrieval plus generated answer.
#[derive(Debug, Clone)]
pub struct Answer {
    pub query: String,
    pub text: String,
    pub retrieved: Vec<Retrieved>,
}
