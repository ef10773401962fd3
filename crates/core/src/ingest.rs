use crate::chunking::chunk_text;
use crate::config::ChunkingConfig;
use crate::embeddings::Embedder;
use crate::extractor::{TextExtractor, SUPPORTED_EXTENSIONS};
use crate::traits::VectorIndex;
use crate::{DocumentRef, IndexedDocument, IngestError, PipelineError};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Hex SHA-256 of the text a document was indexed from.
pub fn digest_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn document_ref_for_path(path: &Path) -> Result<DocumentRef, IngestError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    Ok(DocumentRef {
        document_id: generate_document_id(path),
        file_name: name.to_string(),
        source_path: path.to_string_lossy().to_string(),
    })
}

fn generate_document_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Chunks and embeds `text`, then replaces whatever the index held for `document`.
///
/// Nothing is written unless every chunk has a vector.
pub async fn index_document<E, V>(
    embedder: &E,
    index: &V,
    document: &DocumentRef,
    text: &str,
    chunking: ChunkingConfig,
) -> Result<IndexedDocument, IngestError>
where
    E: Embedder + ?Sized,
    V: VectorIndex + ?Sized,
{
    let chunks = chunk_text(text, chunking, Some(document.document_id.as_str()))?;
    if chunks.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no text to index in {}",
            document.file_name
        )));
    }

    let texts = chunks
        .iter()
        .map(|chunk| chunk.content.clone())
        .collect::<Vec<_>>();
    let embeddings = embedder.embed_batch(&texts).await?;

    if embeddings.len() != chunks.len() {
        return Err(PipelineError::CountMismatch {
            expected: chunks.len(),
            actual: embeddings.len(),
        }
        .into());
    }

    index.replace_document(document, &chunks, &embeddings).await?;
    info!(file = %document.file_name, chunks = chunks.len(), "document indexed");

    Ok(IndexedDocument {
        document: document.clone(),
        chunk_count: chunks.len(),
        content_digest: digest_text(text),
        indexed_at: Utc::now(),
    })
}

pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub documents: Vec<IndexedDocument>,
    pub skipped_files: Vec<SkippedDocument>,
}

impl IngestionReport {
    pub fn chunk_count(&self) -> usize {
        self.documents.iter().map(|document| document.chunk_count).sum()
    }
}

/// Indexes every supported file under `folder`. Files that cannot be read or chunked
/// are reported and skipped; an unreachable embedding service or store aborts the run.
pub async fn index_folder_best_effort<X, E, V>(
    folder: &Path,
    extractor: &X,
    embedder: &E,
    index: &V,
    chunking: ChunkingConfig,
) -> Result<IngestionReport, IngestError>
where
    X: TextExtractor + ?Sized,
    E: Embedder + ?Sized,
    V: VectorIndex + ?Sized,
{
    let files = discover_documents(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no supported documents found in {}",
            folder.display()
        )));
    }

    let mut documents = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        let prepared = document_ref_for_path(&path)
            .and_then(|document| extractor.extract(&path).map(|text| (document, text)));

        let outcome = match prepared {
            Ok((document, text)) => {
                index_document(embedder, index, &document, &text, chunking).await
            }
            Err(error) => Err(error),
        };

        match outcome {
            Ok(indexed) => documents.push(indexed),
            Err(IngestError::Pipeline(error)) => return Err(IngestError::Pipeline(error)),
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped document");
                skipped_files.push(SkippedDocument {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(IngestionReport {
        documents,
        skipped_files,
    })
}
