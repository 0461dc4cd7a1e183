//! Web search, used only as a fallback when the policy documents come up
//! empty or when the question explicitly asks for current information.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{Tool, ToolName, ToolOutcome};
use crate::core::errors::ApiError;

pub const CLARIFICATION_MESSAGE: &str =
    "¿Podrías darme más detalles sobre lo que quieres buscar? Necesito una consulta \
     un poco más concreta para buscar en internet.";
pub const NO_RESULTS_MESSAGE: &str = "No encontré resultados relevantes en internet.";
pub const SEARCH_FAILED_MESSAGE: &str =
    "La búsqueda en internet no está disponible en este momento.";

const MIN_QUERY_CHARS: usize = 3;

#[derive(Debug, Clone)]
pub struct WebHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<WebHit>, ApiError>;
}

/// DuckDuckGo instant-answer API. No key required.
pub struct DuckDuckGoBackend {
    client: Client,
}

impl DuckDuckGoBackend {
    pub fn new(request_timeout_secs: u64) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    async fn search(&self, query: &str) -> Result<Vec<WebHit>, ApiError> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1",
            urlencoding::encode(query)
        );

        let response = self.client.get(url).send().await.map_err(ApiError::internal)?;
        if !response.status().is_success() {
            return Err(ApiError::Internal(format!(
                "DuckDuckGo search failed: {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::internal)?;
        let mut results = Vec::new();

        if let Some(abstract_text) = payload.get("AbstractText").and_then(|v| v.as_str()) {
            if let Some(url) = payload.get("AbstractURL").and_then(|v| v.as_str()) {
                if !abstract_text.is_empty() && !url.is_empty() {
                    results.push(WebHit {
                        title: abstract_text
                            .split(" - ")
                            .next()
                            .unwrap_or(abstract_text)
                            .to_string(),
                        url: url.to_string(),
                        snippet: abstract_text.to_string(),
                    });
                }
            }
        }

        if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
            extract_topics(items, &mut results);
        }
        if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
            extract_topics(items, &mut results);
        }

        Ok(results)
    }
}

fn extract_topics(items: &[Value], results: &mut Vec<WebHit>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_topics(topics, results);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        results.push(WebHit {
            title: text.split(" - ").next().unwrap_or(text).to_string(),
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
}

pub struct WebSearchTool {
    backend: Box<dyn SearchBackend>,
}

impl WebSearchTool {
    pub fn new(backend: Box<dyn SearchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> ToolName {
        ToolName::WebSearch
    }

    fn description(&self) -> &'static str {
        "Busca información actualizada en internet. Solo como último recurso, cuando \
         los documentos de pólizas no contienen la respuesta o se pide información \
         muy reciente."
    }

    async fn invoke(&self, input: &str) -> ToolOutcome {
        let query = input.trim();
        // reject degenerate queries before spending a network call
        if query.chars().count() < MIN_QUERY_CHARS {
            return ToolOutcome::Clarification(CLARIFICATION_MESSAGE.to_string());
        }

        let hits = match self.backend.search(query).await {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!("web search failed: {}", err);
                return ToolOutcome::Failed(SEARCH_FAILED_MESSAGE.to_string());
            }
        };

        if hits.is_empty() {
            return ToolOutcome::Empty(NO_RESULTS_MESSAGE.to_string());
        }

        let summary = hits
            .iter()
            .take(5)
            .map(|hit| format!("- {} ({})\n  {}", hit.title, hit.url, hit.snippet))
            .collect::<Vec<_>>()
            .join("\n");

        ToolOutcome::Content(format!(
            "Información encontrada en internet sobre \"{}\":\n{}",
            query, summary
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct CountingBackend {
        calls: Arc<AtomicUsize>,
        hits: Vec<WebHit>,
    }

    #[async_trait]
    impl SearchBackend for CountingBackend {
        async fn search(&self, _query: &str) -> Result<Vec<WebHit>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.hits.clone())
        }
    }

    fn tool_with(hits: Vec<WebHit>) -> (WebSearchTool, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let tool = WebSearchTool::new(Box::new(CountingBackend {
            calls: calls.clone(),
            hits,
        }));
        (tool, calls)
    }

    #[tokio::test]
    async fn short_query_never_contacts_the_backend() {
        let (tool, calls) = tool_with(vec![]);
        for query in ["", "  ", "ab", " a "] {
            let out = tool.invoke(query).await;
            assert_eq!(out, ToolOutcome::Clarification(CLARIFICATION_MESSAGE.to_string()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn three_character_query_is_accepted() {
        let (tool, calls) = tool_with(vec![]);
        let out = tool.invoke("ley").await;
        assert_eq!(out, ToolOutcome::Empty(NO_RESULTS_MESSAGE.to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hits_are_summarized() {
        let (tool, _) = tool_with(vec![WebHit {
            title: "Seguro de hospitalización".to_string(),
            url: "https://example.com/seguros".to_string(),
            snippet: "Qué cubre un seguro de hospitalización.".to_string(),
        }]);
        match tool.invoke("seguro hospitalización").await {
            ToolOutcome::Content(text) => {
                assert!(text.contains("Seguro de hospitalización"));
                assert!(text.contains("https://example.com/seguros"));
            }
            other => panic!("expected Content, got {:?}", other),
        }
    }

    #[test]
    fn ddg_nested_topics_are_flattened() {
        let items = vec![serde_json::json!({
            "Topics": [
                {"Text": "Seguro - definición", "FirstURL": "https://a"},
                {"Text": "Póliza - definición", "FirstURL": "https://b"}
            ]
        })];
        let mut results = Vec::new();
        extract_topics(&items, &mut results);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Seguro");
    }
}
