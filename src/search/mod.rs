//! HybridSearch (C12): merge vector and BM25 candidate sets with score
//! fusion (spec.md §4.12).
//!
//! Grounded in the teacher's `query` module shape (a thin struct wrapping
//! store accessors, returning a ranked result type) generalized to fuse
//! two independently-fallible subsystems rather than traverse one graph.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::embed::{EmbedError, Embedder};
use crate::graph::NodeId;
use crate::storage::{GraphStore, StorageError};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),
}

/// Which subsystem(s) contributed a hit (spec.md §4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitSource {
    Vector,
    Keyword,
    Hybrid,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedHit {
    pub id: String,
    pub score: f32,
    pub source: HitSource,
    pub preview: String,
}

/// Tunable fusion constants (spec.md §9 open question: not empirically
/// justified in the source, exposed here rather than hardcoded).
#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    pub hybrid_boost: f32,
    pub keyword_base_score: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            hybrid_boost: 0.2,
            keyword_base_score: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<RankedHit>,
    pub is_error: bool,
    pub errors: Vec<String>,
}

pub struct HybridSearch<'a> {
    store: &'a dyn GraphStore,
    embedder: &'a dyn Embedder,
    config: FusionConfig,
}

impl<'a> HybridSearch<'a> {
    pub fn new(store: &'a dyn GraphStore, embedder: &'a dyn Embedder) -> Self {
        Self {
            store,
            embedder,
            config: FusionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: FusionConfig) -> Self {
        self.config = config;
        self
    }

    /// Run both the vector and keyword paths, merge by id, and return the
    /// top `limit` hits by descending fused score (spec.md §4.12). Either
    /// subsystem failing is recorded rather than propagated; the response
    /// is flagged `is_error` only if both failed to contribute anything.
    pub async fn search(&self, query: &str, limit: usize) -> SearchResponse {
        let mut candidates: HashMap<String, RankedHit> = HashMap::new();
        let mut errors = Vec::new();

        match self.embedder.embed(query).await {
            Ok(raw_vector) => {
                let normalized = crate::vector::decode(&crate::vector::encode(&raw_vector));
                match self.store.find_similar(&normalized, limit, None) {
                    Ok(hits) => {
                        for hit in hits {
                            candidates.insert(
                                hit.id.as_str().to_string(),
                                RankedHit {
                                    id: hit.id.as_str().to_string(),
                                    score: hit.score,
                                    source: HitSource::Vector,
                                    preview: String::new(),
                                },
                            );
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "vector search failed");
                        errors.push(format!("vector: {e}"));
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "query embedding failed, skipping vector search");
                errors.push(format!("embed: {e}"));
            }
        }

        match self.store.search_text(query, limit) {
            Ok(hits) => {
                for hit in hits {
                    let id = hit.id.as_str().to_string();
                    match candidates.get_mut(&id) {
                        Some(existing) => {
                            existing.score += self.config.hybrid_boost;
                            existing.source = HitSource::Hybrid;
                            existing.preview = truncate_preview(&hit.snippet);
                        }
                        None => {
                            candidates.insert(
                                id.clone(),
                                RankedHit {
                                    id,
                                    score: self.config.keyword_base_score,
                                    source: HitSource::Keyword,
                                    preview: truncate_preview(&hit.snippet),
                                },
                            );
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "keyword search failed");
                errors.push(format!("keyword: {e}"));
            }
        }

        self.fill_previews(&mut candidates);

        let mut results: Vec<RankedHit> = candidates.into_values().collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);

        // Partial-failure policy (spec.md §4.12): either subsystem failing
        // is recorded but doesn't abort the call. Only flag `is_error` when
        // there's nothing to show *and* something actually went wrong.
        let is_error = results.is_empty() && !errors.is_empty();

        SearchResponse {
            results,
            is_error,
            errors,
        }
    }

    fn fill_previews(&self, candidates: &mut HashMap<String, RankedHit>) {
        for (id, hit) in candidates.iter_mut() {
            if hit.preview.is_empty() {
                if let Ok(Some(node)) = self.store.get_node(&NodeId::from_string(id.clone())) {
                    if let Some(content) = node.content {
                        hit.preview = truncate_preview(&content);
                    }
                }
            }
        }
    }
}

fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= 200 {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(200).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::EmbedResult;
    use crate::graph::{Domain, Layer, Node, NodeType};
    use crate::storage::{OpenStore, SqliteStore};
    use async_trait::async_trait;

    struct StubEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, _text: &str) -> EmbedResult<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    fn note(id: &str, content: &str) -> Node {
        Node::new(NodeId::from_string(id), NodeType::Note, Domain::Experience, Layer::Note)
            .with_title(id)
            .with_content(content)
    }

    #[tokio::test]
    async fn fuses_keyword_and_vector_hits_with_a_boost_on_overlap() {
        let store = SqliteStore::open_in_memory().unwrap();

        let a = note("a", "quick brown fox jumps");
        store.insert_node(&a).unwrap();

        let mut b = note("b", "an unrelated document about fox hunting near the fox den");
        b.embedding = Some(vec![1.0, 0.0, 0.0]);
        store.insert_node(&b).unwrap();

        let embedder = StubEmbedder(vec![1.0, 0.0, 0.0]);
        let search = HybridSearch::new(&store, &embedder);
        let response = search.search("fox", 10).await;

        let ids: Vec<&str> = response.results.iter().map(|h| h.id.as_str()).collect();
        assert!(ids.contains(&"a"));
        assert!(ids.contains(&"b"));

        let b_hit = response.results.iter().find(|h| h.id == "b").unwrap();
        assert_eq!(b_hit.source, HitSource::Hybrid);
    }

    #[tokio::test]
    async fn keyword_only_hit_is_tagged_keyword() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_node(&note("a", "quick brown fox")).unwrap();

        let embedder = StubEmbedder(vec![0.0, 1.0]);
        let search = HybridSearch::new(&store, &embedder);
        let response = search.search("fox", 10).await;

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].source, HitSource::Keyword);
        assert_eq!(response.results[0].score, 0.5);
    }

    #[tokio::test]
    async fn preview_is_truncated_to_200_chars() {
        let store = SqliteStore::open_in_memory().unwrap();
        let long_content = "word ".repeat(100);
        store.insert_node(&note("a", &long_content)).unwrap();

        let embedder = StubEmbedder(vec![0.0, 1.0]);
        let search = HybridSearch::new(&store, &embedder);
        let response = search.search("word", 10).await;
        assert!(response.results[0].preview.chars().count() <= 203);
    }
}
