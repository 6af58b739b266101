use std::path::{Path, PathBuf};

use crate::error::Result;
use pdfium_render::prelude::Pdfium;
use rig::{
    Embed,
    client::{EmbeddingsClient, ProviderClient},
    embeddings::EmbeddingsBuilder,
    providers::{openai, openai::EmbeddingModel, openai::TEXT_EMBEDDING_3_SMALL},
    vector_store::VectorStoreIndex,
};
use rig_sqlite::{
    Column, ColumnValue, SqliteVectorIndex, SqliteVectorStore, SqliteVectorStoreTable,
};
use serde::{Deserialize, Serialize};
use sqlite_vec::sqlite3_vec_init;
use tokio_rusqlite::{Connection, ffi::sqlite3_auto_extension};

// Word-boundary chunking parameters for the rules corpus.
const CHUNK_SIZE: usize = 512;
const CHUNK_OVERLAP: usize = 50;

// How many chunks a single lookup pulls into context.
const TOP_K: usize = 3;

// Returned in place of retrieved context when the index is unreachable.
// Callers treat any context starting with this prefix as a degraded lookup.
pub const RETRIEVAL_ERROR_PREFIX: &str = "Error:";

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct RuleChunk {
    id: String,
    content: String,
}

impl Embed for RuleChunk {
    fn embed(
        &self,
        embedder: &mut rig::embeddings::TextEmbedder,
    ) -> std::result::Result<(), rig::embeddings::EmbedError> {
        embedder.embed(self.content.clone());
        Ok(())
    }
}

impl SqliteVectorStoreTable for RuleChunk {
    fn name() -> &'static str {
        "rule_chunks"
    }

    fn schema() -> Vec<Column> {
        vec![
            Column::new("id", "TEXT PRIMARY KEY"),
            Column::new("content", "TEXT"),
        ]
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn column_values(&self) -> Vec<(&'static str, Box<dyn ColumnValue>)> {
        vec![
            ("id", Box::new(self.id.clone())),
            ("content", Box::new(self.content.clone())),
        ]
    }
}

// Read-only handle over the persistent rules index. Lookup failures never
// propagate: they degrade to a sentinel string the caller can surface.
pub struct RulesRetriever {
    index: SqliteVectorIndex<EmbeddingModel, RuleChunk>,
}

impl RulesRetriever {
    // Opens an existing index. The index must already have been built with
    // the `build-index` command; a missing database file is a startup error,
    // not a runtime one.
    pub async fn open(index_path: &Path) -> Result<Self> {
        let openai_client = openai::Client::from_env();
        unsafe {
            sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
        }
        let conn = Connection::open(index_path).await?;
        let embedding_model = openai_client.embedding_model(TEXT_EMBEDDING_3_SMALL);
        let vector_store = SqliteVectorStore::new(conn, &embedding_model).await?;
        let index = vector_store.index(embedding_model);
        log::info!("Rules index opened: {}", index_path.display());
        Ok(RulesRetriever { index })
    }

    // Top-k retrieval, chunks joined by a separator line. On any failure this
    // returns a sentinel string instead of an error so a broken index only
    // degrades answers rather than killing the conversation.
    pub async fn retrieve(&self, query: &str) -> String {
        match self.index.top_n::<RuleChunk>(query, TOP_K).await {
            Ok(results) if results.is_empty() => {
                "No relevant rules found in my references.".to_string()
            }
            Ok(results) => results
                .into_iter()
                .map(|(_score, _id, chunk)| chunk.content)
                .collect::<Vec<_>>()
                .join("\n---\n"),
            Err(e) => {
                log::error!("Rules retrieval failed: {e:#}");
                format!("{RETRIEVAL_ERROR_PREFIX} could not query the rules index.")
            }
        }
    }
}

// One-shot index build from a directory of rulebook PDFs. Re-running it
// replaces the index wholesale.
pub async fn build_index(documents_dir: &Path, index_path: &Path) -> Result<()> {
    let openai_client = openai::Client::from_env();
    unsafe {
        sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
    }

    if index_path.exists() {
        std::fs::remove_file(index_path)?;
        log::info!("Removed previous index at {}", index_path.display());
    }
    if let Some(parent) = index_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(index_path).await?;
    let embedding_model = openai_client.embedding_model(TEXT_EMBEDDING_3_SMALL);
    let vector_store = SqliteVectorStore::new(conn, &embedding_model).await?;

    let pdfs = pdf_paths(documents_dir)?;
    if pdfs.is_empty() {
        log::warn!("No PDF documents found in {}", documents_dir.display());
        return Ok(());
    }

    let mut builder = EmbeddingsBuilder::new(embedding_model.clone());
    let mut total_chunks = 0usize;
    for pdf in &pdfs {
        let stem = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let pages = pdf_extract(pdf)?;
        for (page_nb, page) in pages.iter().enumerate() {
            for (chunk_nb, chunk_txt) in chunk_text(page).into_iter().enumerate() {
                builder = builder.document(RuleChunk {
                    id: format!("{stem}_p{page_nb}_{chunk_nb}"),
                    content: chunk_txt,
                })?;
                total_chunks += 1;
            }
        }
        log::info!("Chunked {}", pdf.display());
    }

    let embeddings = builder.build().await?;
    vector_store.add_rows(embeddings).await?;
    log::info!(
        "Indexed {} chunks from {} documents into {}",
        total_chunks,
        pdfs.len(),
        index_path.display()
    );
    Ok(())
}

fn pdf_paths(documents_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(documents_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn pdf_extract(path: &Path) -> Result<Vec<String>> {
    let mut contents = Vec::new();
    let pdfium = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) => Pdfium::new(
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
                .map_err(crate::error::SheetError::Pdfium)?,
        ),
        Err(_) => Pdfium::new(
            Pdfium::bind_to_system_library().map_err(crate::error::SheetError::Pdfium)?,
        ),
    };
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(crate::error::SheetError::Pdfium)?;
    for page in document.pages().iter() {
        if let Ok(text) = page.text() {
            contents.push(text.all());
        }
    }
    Ok(contents)
}

// Sliding-window chunking on word boundaries. Each chunk carries roughly
// CHUNK_OVERLAP characters of trailing context from its predecessor.
pub fn chunk_text(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in &words {
        if current.len() + word.len() + 1 > CHUNK_SIZE && !current.is_empty() {
            chunks.push(current.trim().to_string());
            // Carry the tail of the previous chunk into the next one.
            let tail_start = current.len().saturating_sub(CHUNK_OVERLAP);
            let mut boundary = tail_start;
            while !current.is_char_boundary(boundary) {
                boundary += 1;
            }
            let tail = current[boundary..].trim_start().to_string();
            current = tail;
            if !current.is_empty() {
                current.push(' ');
            }
        }
        current.push_str(word);
        current.push(' ');
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }
    chunks
}
