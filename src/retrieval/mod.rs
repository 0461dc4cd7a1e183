//! Knowledge store client for the vectorized policy documents.
//!
//! The underlying similarity-search service owns ranking and top-k; this
//! layer only shapes results: concatenating fragment texts, extracting
//! distinct source names, and suppressing under-threshold noise.

pub mod chroma;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

pub use chroma::ChromaStore;

/// Concatenated results shorter than this are treated as noise rather
/// than an answer.
pub const MIN_INFORMATIVE_CHARS: usize = 50;

/// A retrieved snippet of source document text, ordered by decreasing
/// relevance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    /// Source document name, when the index recorded one.
    pub source: Option<String>,
    /// Page or section identifier within the source.
    pub section: Option<String>,
    /// Similarity score (higher = better).
    pub score: f32,
}

/// Shaped outcome of a lookup. Callers branch on the variant instead of
/// pattern-matching sentinel substrings.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found {
        content: String,
        sources: Vec<String>,
    },
    Empty,
    Failed(String),
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Top-k similarity search. Ranking is delegated to the service.
    async fn lookup(&self, query: &str, k: usize) -> Result<Vec<Fragment>, ApiError>;
}

/// Knowledge store wrapper that applies result shaping and absorbs
/// transport failures; callers never see an `Err`.
#[derive(Clone)]
pub struct PolicyIndex {
    store: Arc<dyn KnowledgeStore>,
}

impl PolicyIndex {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }

    pub async fn lookup(&self, query: &str, k: usize) -> LookupOutcome {
        let fragments = match self.store.lookup(query, k).await {
            Ok(fragments) => fragments,
            Err(err) => {
                tracing::warn!("knowledge store lookup failed: {}", err);
                return LookupOutcome::Failed(err.to_string());
            }
        };
        shape(fragments)
    }
}

fn shape(fragments: Vec<Fragment>) -> LookupOutcome {
    if fragments.is_empty() {
        return LookupOutcome::Empty;
    }

    let content = fragments
        .iter()
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    if content.trim().chars().count() < MIN_INFORMATIVE_CHARS {
        return LookupOutcome::Empty;
    }

    // distinct source names, first-seen order
    let mut sources: Vec<String> = Vec::new();
    for fragment in &fragments {
        if let Some(source) = &fragment.source {
            let name = basename(source);
            if !name.is_empty() && !sources.iter().any(|s| s == &name) {
                sources.push(name);
            }
        }
    }

    LookupOutcome::Found { content, sources }
}

fn basename(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(text: &str, source: Option<&str>) -> Fragment {
        Fragment {
            text: text.to_string(),
            source: source.map(|s| s.to_string()),
            section: None,
            score: 0.9,
        }
    }

    #[test]
    fn empty_results_are_empty() {
        assert_eq!(shape(vec![]), LookupOutcome::Empty);
    }

    #[test]
    fn short_content_is_suppressed() {
        let out = shape(vec![fragment("art. 12", Some("a.pdf"))]);
        assert_eq!(out, LookupOutcome::Empty);
    }

    #[test]
    fn content_at_threshold_is_kept() {
        let text = "x".repeat(MIN_INFORMATIVE_CHARS);
        let out = shape(vec![fragment(&text, None)]);
        assert!(matches!(out, LookupOutcome::Found { .. }));
    }

    #[test]
    fn sources_are_deduplicated_and_basenamed() {
        let long = "La póliza de hospitalización cubre los gastos derivados \
                    de la estancia hospitalaria del asegurado.";
        let out = shape(vec![
            fragment(long, Some("docs/polizas/hospitalizacion.pdf")),
            fragment(long, Some("docs/polizas/hospitalizacion.pdf")),
            fragment(long, Some("docs/polizas/general.pdf")),
        ]);
        match out {
            LookupOutcome::Found { sources, .. } => {
                assert_eq!(sources, vec!["hospitalizacion.pdf", "general.pdf"]);
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn fragment_texts_are_concatenated_in_order() {
        let a = "Primera cláusula con suficiente texto para superar el umbral.";
        let b = "Segunda cláusula igualmente informativa y suficientemente larga.";
        let out = shape(vec![fragment(a, None), fragment(b, None)]);
        match out {
            LookupOutcome::Found { content, .. } => {
                assert_eq!(content, format!("{}\n\n{}", a, b));
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }
}
