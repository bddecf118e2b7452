//! Script-mode front-ends: one-shot ask and the interactive query loop.
//!
//! Both build the index once, then run Query → Retriever → Answerer and
//! print the outcome. The interactive loop exits on `q` or `quit`. On the
//! visual backend the top-1 page image is saved next to the working
//! directory, mirroring what a user would inspect by hand.

use anyhow::Result;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Backend, Config};
use crate::models::{Answer, Content};
use crate::pipeline::Pipeline;

const RETRIEVED_IMAGE_PATH: &str = "retrieved_image.png";

/// `docq index <file>` — build or extend the index, nothing else.
/// Does not need a Gemini key.
pub async fn run_index(config: &Config, file: &Path) -> Result<()> {
    crate::config::check_store_preconditions(config)?;
    let pipeline = Pipeline::from_config(Arc::new(config.clone()), None).await?;

    println!("Indexing {}...", file.display());
    let count = pipeline.index_document_from_path(file).await?;
    println!("Indexed {} units.", count);
    Ok(())
}

/// `docq ask <file> <query>` — index, run one query, print the answer.
pub async fn run_ask(config: &Config, file: &Path, query: &str) -> Result<()> {
    let pipeline = build_answering_pipeline(config).await?;

    println!("Indexing {}...", file.display());
    let count = pipeline.index_document_from_path(file).await?;
    println!("Indexed {} units.", count);

    let answer = pipeline.ask(query, None).await?;
    print_answer(config, &answer)?;
    Ok(())
}

/// `docq chat <file>` — index once, then loop reading queries from the
/// terminal until `q` or `quit`.
pub async fn run_chat(config: &Config, file: &Path) -> Result<()> {
    let pipeline = build_answering_pipeline(config).await?;

    println!("Indexing {}...", file.display());
    let count = pipeline.index_document_from_path(file).await?;
    println!("Indexed {} units.", count);
    println!();
    println!("Enter your query (or type 'q' to quit):");

    let stdin = std::io::stdin();
    loop {
        print!("\nYour query: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break; // EOF
        }
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("q") || query.eq_ignore_ascii_case("quit") {
            println!("Goodbye.");
            break;
        }

        match pipeline.ask(query, None).await {
            Ok(answer) => print_answer(config, &answer)?,
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    Ok(())
}

async fn build_answering_pipeline(config: &Config) -> Result<Pipeline> {
    crate::config::check_store_preconditions(config)?;
    let api_key = crate::config::gemini_api_key()?;
    Ok(Pipeline::from_config(Arc::new(config.clone()), Some(api_key)).await?)
}

fn print_answer(config: &Config, answer: &Answer) -> Result<()> {
    if answer.retrieved.is_empty() {
        println!("{}", answer.text);
        return Ok(());
    }

    println!("\n--- Retrieved ---");
    for (i, r) in answer.retrieved.iter().enumerate() {
        let label = match &r.content {
            Content::Text(text) => excerpt(text, 120),
            Content::Image(page) => format!("page {}", page.page_index + 1),
        };
        println!("{}. [{:.2}] {}", i + 1, r.score, label);
    }

    if config.pipeline.backend() == Backend::Visual {
        if let Some(page) = answer.retrieved.first().and_then(|r| r.content.as_image()) {
            std::fs::write(RETRIEVED_IMAGE_PATH, &page.png)?;
            println!("Retrieved image saved to {}", RETRIEVED_IMAGE_PATH);
        }
    }

    println!("\n--- Answer ---");
    println!("{}", answer.text);
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let trimmed = flat.trim();
    let cut = trimmed
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    if cut < trimmed.len() {
        format!("\"{}...\"", &trimmed[..cut])
    } else {
        format!("\"{}\"", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_short_text_untruncated() {
        assert_eq!(excerpt("short", 120), "\"short\"");
    }

    #[test]
    fn excerpt_long_text_truncated_at_char_boundary() {
        let text = "ü".repeat(200);
        let out = excerpt(&text, 120);
        assert!(out.ends_with("...\""));
        assert_eq!(out.matches('ü').count(), 120);
    }
}
