use anyhow::{bail, ensure, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Vector width of mistral-embed. External contract of the service, not a
/// tunable.
pub const EMBEDDING_DIM: usize = 1024;

/// Documents per request; bounds payload size and the blast radius of a
/// failed call.
pub const BATCH_SIZE: usize = 10;

const ENDPOINT: &str = "https://api.mistral.ai/v1/embeddings";
const MODEL: &str = "mistral-embed";

pub struct EmbeddingClient {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl EmbeddingClient {
    pub fn from_env() -> Self {
        Self::new(std::env::var("MISTRAL_API_KEY").ok().filter(|k| !k.trim().is_empty()))
    }

    pub fn new(api_key: Option<String>) -> Self {
        if api_key.is_none() {
            warn!("MISTRAL_API_KEY is not set; embeddings will be random stand-ins");
        }
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    /// Embed the corpus in batches of [`BATCH_SIZE`]. A failed batch yields
    /// zero vectors for exactly its texts instead of aborting the run, so the
    /// output length always equals the input length.
    pub async fn embed_documents(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let pb = ProgressBar::new(texts.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} embedding [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap()
                .progress_chars("#>-"),
        );

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            let inputs: Vec<&str> = batch.iter().map(String::as_str).collect();
            match self.embed_batch(&inputs).await {
                Ok(mut vectors) => embeddings.append(&mut vectors),
                Err(e) => {
                    warn!(
                        "Embedding batch failed ({}); zero vectors substituted for {} documents",
                        e,
                        batch.len()
                    );
                    embeddings
                        .extend(std::iter::repeat_with(|| vec![0.0; EMBEDDING_DIM]).take(batch.len()));
                }
            }
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();
        embeddings
    }

    /// Embed a single query. Unlike corpus embedding, failure propagates;
    /// the store turns it into an empty search result.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text]).await?;
        vectors
            .pop()
            .filter(|v| v.len() == EMBEDDING_DIM)
            .context("service returned no embedding for the query")
    }

    async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        // Keyless mode: random vectors of the right width keep the pipeline
        // runnable in dev and tests without touching the network.
        let Some(api_key) = &self.api_key else {
            return Ok(random_vectors(inputs.len()));
        };

        let request = EmbeddingRequest {
            model: MODEL,
            input: inputs,
        };
        let response = self
            .client
            .post(ENDPOINT)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .context("embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("embedding request returned {}: {}", status, body);
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .context("failed to parse embedding response")?;
        parsed.data.sort_by_key(|entry| entry.index);
        ensure!(
            parsed.data.len() == inputs.len(),
            "service returned {} embeddings for {} inputs",
            parsed.data.len(),
            inputs.len()
        );
        ensure!(
            parsed.data.iter().all(|entry| entry.embedding.len() == EMBEDDING_DIM),
            "service returned embeddings of unexpected width"
        );
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

fn random_vectors(count: usize) -> Vec<Vec<f32>> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| (0..EMBEDDING_DIM).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client() -> EmbeddingClient {
        EmbeddingClient::new(None)
    }

    #[tokio::test]
    async fn keyless_client_substitutes_random_vectors() {
        let texts: Vec<String> = (0..25).map(|i| format!("документ {i}")).collect();
        let embeddings = offline_client().embed_documents(&texts).await;
        assert_eq!(embeddings.len(), 25);
        assert!(embeddings.iter().all(|v| v.len() == EMBEDDING_DIM));
    }

    #[tokio::test]
    async fn keyless_query_embedding_has_right_width() {
        let vector = offline_client().embed_query("как поступить").await.unwrap();
        assert_eq!(vector.len(), EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn empty_corpus_embeds_to_nothing() {
        let embeddings = offline_client().embed_documents(&[]).await;
        assert!(embeddings.is_empty());
    }
}
