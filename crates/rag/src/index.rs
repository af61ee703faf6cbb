use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::snippet::Snippet;

/// Weight of the embedding score versus raw token overlap when ranking.
const COSINE_WEIGHT: f32 = 0.7;
const OVERLAP_WEIGHT: f32 = 0.3;

#[derive(Debug, Clone, Copy)]
pub struct HashEmbedderConfig {
    pub dimensions: usize,
    pub seed: u64,
}

impl Default for HashEmbedderConfig {
    fn default() -> Self {
        Self {
            dimensions: 64,
            seed: 1337,
        }
    }
}

/// Deterministic bag-of-words embedder. Each token hashes into a bucket
/// and the vector is L2-normalized. No model download, no network, and the
/// same text always embeds to the same vector.
#[derive(Clone)]
pub struct HashEmbedder {
    config: HashEmbedderConfig,
}

impl HashEmbedder {
    pub fn new(config: HashEmbedderConfig) -> Self {
        Self { config }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let dims = self.config.dimensions.max(1);
        let mut vector = vec![0f32; dims];
        for token in tokens(text) {
            let bucket = self.bucket_for(&token);
            vector[bucket] += 1.0;
        }
        normalize(&mut vector);
        vector
    }

    fn bucket_for(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        hasher.write_u64(self.config.seed);
        token.hash(&mut hasher);
        (hasher.finish() as usize) % self.config.dimensions.max(1)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(HashEmbedderConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct ScoredSnippet {
    pub snippet: Snippet,
    pub score: f32,
}

/// In-memory snippet index for one session's dataset. Rebuilt from scratch
/// on every upload or filter change; queries see either the old index or
/// the new one, never a half-built mix.
pub struct SnippetIndex {
    embedder: HashEmbedder,
    snippets: Vec<Snippet>,
    embeddings: Vec<Vec<f32>>,
}

impl SnippetIndex {
    pub fn build(snippets: Vec<Snippet>, embedder: HashEmbedder) -> Self {
        let embeddings = snippets
            .iter()
            .map(|s| embedder.embed_text(&s.text))
            .collect();
        Self {
            embedder,
            snippets,
            embeddings,
        }
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Rank snippets against a question. Hash collisions can make two
    /// different tokens share a bucket, so the cosine score is blended
    /// with plain token overlap before sorting. Ties break by snippet id
    /// to keep results stable.
    pub fn search(&self, question: &str, top_k: usize) -> Vec<ScoredSnippet> {
        let query_embedding = self.embedder.embed_text(question);
        let query_tokens: Vec<String> = tokens(question).collect();
        let mut hits: Vec<ScoredSnippet> = self
            .snippets
            .iter()
            .zip(self.embeddings.iter())
            .map(|(snippet, embedding)| {
                let cosine = cosine_similarity(&query_embedding, embedding);
                let overlap = token_overlap(&query_tokens, &snippet.text);
                ScoredSnippet {
                    snippet: snippet.clone(),
                    score: COSINE_WEIGHT * cosine + OVERLAP_WEIGHT * overlap,
                }
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.snippet.id.cmp(&b.snippet.id))
        });
        if hits.len() > top_k {
            hits.truncate(top_k);
        }
        hits
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn token_overlap(query_tokens: &[String], text: &str) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let snippet_tokens: Vec<String> = tokens(text).collect();
    let matched = query_tokens
        .iter()
        .filter(|t| snippet_tokens.contains(t))
        .count();
    matched as f32 / query_tokens.len() as f32
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut a_norm = 0.0f32;
    let mut b_norm = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    dot / (a_norm.sqrt() * b_norm.sqrt())
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}
