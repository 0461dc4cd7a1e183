//! HTTP client for a Chroma-style similarity-search service.
//!
//! Request: `POST {base}/api/v1/collections/{collection}/query` with
//! `query_texts` + `n_results`. The response carries parallel arrays
//! (`documents`, `metadatas`, `distances`), one inner list per query text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{Fragment, KnowledgeStore};
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct ChromaStore {
    base_url: String,
    collection: String,
    client: Client,
}

impl ChromaStore {
    pub fn new(
        base_url: String,
        collection: String,
        request_timeout_secs: u64,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            collection,
            client,
        })
    }
}

#[async_trait]
impl KnowledgeStore for ChromaStore {
    async fn lookup(&self, query: &str, k: usize) -> Result<Vec<Fragment>, ApiError> {
        let url = format!(
            "{}/api/v1/collections/{}/query",
            self.base_url, self.collection
        );
        let body = json!({
            "query_texts": [query],
            "n_results": k,
            "include": ["documents", "metadatas", "distances"],
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout("knowledge store query timed out".to_string())
                } else {
                    ApiError::internal(e)
                }
            })?;

        if !res.status().is_success() {
            return Err(ApiError::Internal(format!(
                "knowledge store query failed: {}",
                res.status()
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        Ok(parse_query_response(&payload))
    }
}

fn parse_query_response(payload: &Value) -> Vec<Fragment> {
    let documents = inner_list(payload, "documents");
    let metadatas = inner_list(payload, "metadatas");
    let distances = inner_list(payload, "distances");

    let mut fragments = Vec::new();
    for (i, doc) in documents.iter().enumerate() {
        let Some(text) = doc.as_str() else { continue };
        if text.is_empty() {
            continue;
        }

        let metadata = metadatas.get(i);
        let source = metadata
            .and_then(|m| m.get("source"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let section = metadata
            .and_then(|m| m.get("page"))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty());

        // Chroma reports distances; invert into a similarity-style score.
        let score = distances
            .get(i)
            .and_then(|v| v.as_f64())
            .map(|d| 1.0 - d as f32)
            .unwrap_or(0.0);

        fragments.push(Fragment {
            text: text.to_string(),
            source,
            section,
            score,
        });
    }
    fragments
}

fn inner_list<'a>(payload: &'a Value, key: &str) -> Vec<&'a Value> {
    payload
        .get(key)
        .and_then(|v| v.as_array())
        .and_then(|outer| outer.first())
        .and_then(|v| v.as_array())
        .map(|inner| inner.iter().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parallel_arrays() {
        let payload = json!({
            "documents": [["texto uno", "texto dos"]],
            "metadatas": [[{"source": "polizas/vida.pdf", "page": 4}, null]],
            "distances": [[0.12, 0.48]],
        });
        let fragments = parse_query_response(&payload);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text, "texto uno");
        assert_eq!(fragments[0].source.as_deref(), Some("polizas/vida.pdf"));
        assert_eq!(fragments[0].section.as_deref(), Some("4"));
        assert!(fragments[0].score > fragments[1].score);
        assert!(fragments[1].source.is_none());
    }

    #[test]
    fn tolerates_missing_sections() {
        let payload = json!({ "documents": [["solo texto"]] });
        let fragments = parse_query_response(&payload);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].score, 0.0);
    }

    #[test]
    fn empty_response_yields_no_fragments() {
        assert!(parse_query_response(&json!({})).is_empty());
        assert!(parse_query_response(&json!({"documents": [[]]})).is_empty());
    }
}
