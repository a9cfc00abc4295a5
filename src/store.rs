use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::{bail, ensure, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::corpus::{build_documents, DocMeta};
use crate::embedding::{EmbeddingClient, EMBEDDING_DIM};
use crate::parser::curriculum::CurriculumTable;
use crate::parser::ProgramRecord;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_MIN_SCORE: f32 = 0.2;

const DOCUMENTS_FILE: &str = "documents.json";
const EMBEDDINGS_FILE: &str = "embeddings.bin";
const SUMMARY_FILE: &str = "corpus_summary.json";

/// One program ready for indexing.
pub struct ProgramInput {
    pub record: ProgramRecord,
    pub curriculum: Option<CurriculumTable>,
}

/// The aligned triple. Immutable once published; rebuilds create a fresh
/// Index and swap the Arc, so concurrent searches always see one consistent
/// snapshot.
#[derive(Default)]
struct Index {
    documents: Vec<String>,
    metadata: Vec<DocMeta>,
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document: String,
    pub metadata: DocMeta,
    pub score: f32,
}

/// Per-program document counts written next to the corpus for diagnostics.
/// Never read back by the engine.
#[derive(Debug, Serialize, Deserialize)]
pub struct CorpusSummary {
    pub built_at: DateTime<Utc>,
    pub documents: usize,
    pub programs: BTreeMap<String, BTreeMap<String, usize>>,
}

#[derive(Serialize, Deserialize)]
struct DocumentsFile {
    documents: Vec<String>,
    metadata: Vec<DocMeta>,
}

pub struct VectorStore {
    client: EmbeddingClient,
    data_dir: PathBuf,
    index: RwLock<Arc<Index>>,
}

impl VectorStore {
    pub fn new(client: EmbeddingClient, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            data_dir: data_dir.into(),
            index: RwLock::new(Arc::new(Index::default())),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rebuild the corpus wholesale from parsed programs, embed it, publish
    /// the new triple in one swap, and persist. Returns the document count.
    pub async fn build(&self, programs: &[ProgramInput]) -> Result<usize> {
        let mut documents = Vec::new();
        let mut metadata = Vec::new();
        for program in programs {
            for (text, meta) in
                build_documents(&program.record, program.curriculum.as_ref())
            {
                documents.push(text);
                metadata.push(meta);
            }
        }
        info!("Built {} documents from {} programs", documents.len(), programs.len());

        let embeddings = self.client.embed_documents(&documents).await;
        ensure!(
            documents.len() == metadata.len() && metadata.len() == embeddings.len(),
            "corpus triple out of alignment: {} documents, {} metadata, {} embeddings",
            documents.len(),
            metadata.len(),
            embeddings.len()
        );
        ensure!(
            embeddings.iter().all(|row| row.len() == EMBEDDING_DIM),
            "embedding rows are not all {}-dimensional",
            EMBEDDING_DIM
        );

        let index = Index {
            documents,
            metadata,
            embeddings,
        };
        self.save(&index)?;
        let count = index.documents.len();
        *self.index.write().expect("index lock poisoned") = Arc::new(index);
        Ok(count)
    }

    /// Rank every corpus document against the query by cosine similarity.
    ///
    /// An empty store short-circuits to an empty list without touching the
    /// embedding service; a service failure degrades to an empty list as
    /// well. Only a malformed (blank) query is surfaced as an error.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchHit>> {
        ensure!(!query.trim().is_empty(), "query must not be blank");

        let index = self.snapshot();
        if index.documents.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = match self.client.embed_query(query).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Query embedding failed ({}); returning no context", e);
                return Ok(Vec::new());
            }
        };

        let hits = rank(&query_vector, &index.embeddings, top_k, min_score)
            .into_iter()
            .map(|(i, score)| SearchHit {
                document: index.documents[i].clone(),
                metadata: index.metadata[i].clone(),
                score,
            })
            .collect();
        Ok(hits)
    }

    /// Repopulate the triple from persisted state. `Ok(false)` means no
    /// database has been built yet, which is not an error.
    pub fn load(&self) -> Result<bool> {
        let documents_path = self.data_dir.join(DOCUMENTS_FILE);
        let embeddings_path = self.data_dir.join(EMBEDDINGS_FILE);
        if !documents_path.exists() || !embeddings_path.exists() {
            return Ok(false);
        }

        let raw = fs::read_to_string(&documents_path)
            .with_context(|| format!("failed to read {}", documents_path.display()))?;
        let file: DocumentsFile = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt {}", documents_path.display()))?;

        let blob = fs::read(&embeddings_path)
            .with_context(|| format!("failed to read {}", embeddings_path.display()))?;
        let embeddings = decode_matrix(&blob)
            .with_context(|| format!("corrupt {}", embeddings_path.display()))?;

        ensure!(
            file.documents.len() == file.metadata.len()
                && file.metadata.len() == embeddings.len(),
            "persisted triple out of alignment: {} documents, {} metadata, {} embeddings",
            file.documents.len(),
            file.metadata.len(),
            embeddings.len()
        );

        let index = Index {
            documents: file.documents,
            metadata: file.metadata,
            embeddings,
        };
        info!("Loaded {} documents from {}", index.documents.len(), self.data_dir.display());
        *self.index.write().expect("index lock poisoned") = Arc::new(index);
        Ok(true)
    }

    pub fn load_summary(&self) -> Option<CorpusSummary> {
        let raw = fs::read_to_string(self.data_dir.join(SUMMARY_FILE)).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn snapshot(&self) -> Arc<Index> {
        self.index.read().expect("index lock poisoned").clone()
    }

    fn save(&self, index: &Index) -> Result<()> {
        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;

        let file = DocumentsFile {
            documents: index.documents.clone(),
            metadata: index.metadata.clone(),
        };
        fs::write(
            self.data_dir.join(DOCUMENTS_FILE),
            serde_json::to_string_pretty(&file)?,
        )?;
        fs::write(
            self.data_dir.join(EMBEDDINGS_FILE),
            encode_matrix(&index.embeddings),
        )?;
        fs::write(
            self.data_dir.join(SUMMARY_FILE),
            serde_json::to_string_pretty(&summarize(index))?,
        )?;
        Ok(())
    }
}

fn summarize(index: &Index) -> CorpusSummary {
    let mut programs: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for meta in &index.metadata {
        *programs
            .entry(meta.program.clone())
            .or_default()
            .entry(meta.doc_type.clone())
            .or_default() += 1;
    }
    CorpusSummary {
        built_at: Utc::now(),
        documents: index.documents.len(),
        programs,
    }
}

/// Top-k indices by descending cosine similarity. The sort is stable, so
/// equal scores keep corpus order; everything at or below `min_score` is
/// dropped after truncation.
fn rank(query: &[f32], embeddings: &[Vec<f32>], top_k: usize, min_score: f32) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = embeddings
        .iter()
        .enumerate()
        .map(|(i, row)| (i, cosine_similarity(query, row)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);
    scored.retain(|(_, score)| *score > min_score);
    scored
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (l, r) in left.iter().zip(right.iter()) {
        let (l, r) = (f64::from(*l), f64::from(*r));
        dot += l * r;
        left_norm += l * l;
        right_norm += r * r;
    }
    if left_norm <= 0.0 || right_norm <= 0.0 {
        return 0.0;
    }
    (dot / (left_norm.sqrt() * right_norm.sqrt())) as f32
}

// ── Matrix file: u32 LE row count, u32 LE dim, then f32 LE rows ──

fn encode_matrix(rows: &[Vec<f32>]) -> Vec<u8> {
    let dim = rows.first().map(Vec::len).unwrap_or(0);
    let mut out = Vec::with_capacity(8 + rows.len() * dim * 4);
    out.extend_from_slice(&(rows.len() as u32).to_le_bytes());
    out.extend_from_slice(&(dim as u32).to_le_bytes());
    for row in rows {
        for value in row {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
    out
}

fn decode_matrix(blob: &[u8]) -> Result<Vec<Vec<f32>>> {
    if blob.len() < 8 {
        bail!("matrix file too short for its header");
    }
    let rows = u32::from_le_bytes([blob[0], blob[1], blob[2], blob[3]]) as usize;
    let dim = u32::from_le_bytes([blob[4], blob[5], blob[6], blob[7]]) as usize;
    let body = &blob[8..];
    ensure!(
        body.len() == rows * dim * 4,
        "matrix file body is {} bytes, expected {} ({} rows x {} dim)",
        body.len(),
        rows * dim * 4,
        rows,
        dim
    );

    if dim == 0 {
        return Ok(vec![Vec::new(); rows]);
    }

    let mut out = Vec::with_capacity(rows);
    for row_bytes in body.chunks_exact(dim * 4) {
        let mut row = Vec::with_capacity(dim);
        for chunk in row_bytes.chunks_exact(4) {
            row.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        out.push(row);
    }
    Ok(out)
}
