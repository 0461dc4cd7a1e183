use async_trait::async_trait;

use super::{Tool, ToolName, ToolOutcome};
use crate::retrieval::{LookupOutcome, PolicyIndex};

pub const NOT_FOUND_MESSAGE: &str =
    "No encontré información relevante en los documentos de pólizas.";
pub const LOOKUP_FAILED_MESSAGE: &str =
    "No pude consultar la base de documentos de pólizas en este momento.";

/// Searches the vectorized policy documents.
pub struct PolicyLookupTool {
    index: PolicyIndex,
    top_k: usize,
}

impl PolicyLookupTool {
    pub fn new(index: PolicyIndex, top_k: usize) -> Self {
        Self { index, top_k }
    }
}

#[async_trait]
impl Tool for PolicyLookupTool {
    fn name(&self) -> ToolName {
        ToolName::PolicyLookup
    }

    fn description(&self) -> &'static str {
        "Busca información en los documentos de pólizas de seguros: coberturas, \
         exclusiones, derechos del asegurado, procesos de reclamo."
    }

    async fn invoke(&self, input: &str) -> ToolOutcome {
        match self.index.lookup(input, self.top_k).await {
            LookupOutcome::Found { content, sources } => {
                let mut formatted = format!(
                    "Información encontrada en documentos de pólizas:\n\n{}",
                    content
                );
                if !sources.is_empty() {
                    formatted.push_str(&format!("\n\nFuentes: {}", sources.join(", ")));
                }
                ToolOutcome::Content(formatted)
            }
            LookupOutcome::Empty => ToolOutcome::Empty(NOT_FOUND_MESSAGE.to_string()),
            LookupOutcome::Failed(reason) => {
                tracing::warn!("policy lookup failed: {}", reason);
                ToolOutcome::Failed(LOOKUP_FAILED_MESSAGE.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::errors::ApiError;
    use crate::retrieval::{Fragment, KnowledgeStore};
    use async_trait::async_trait;

    struct FixedStore(Result<Vec<Fragment>, String>);

    #[async_trait]
    impl KnowledgeStore for FixedStore {
        async fn lookup(&self, _query: &str, _k: usize) -> Result<Vec<Fragment>, ApiError> {
            match &self.0 {
                Ok(fragments) => Ok(fragments.clone()),
                Err(msg) => Err(ApiError::Internal(msg.clone())),
            }
        }
    }

    fn tool_with(store: FixedStore) -> PolicyLookupTool {
        PolicyLookupTool::new(PolicyIndex::new(Arc::new(store)), 3)
    }

    #[tokio::test]
    async fn formats_content_with_sources() {
        let fragment = Fragment {
            text: "La póliza cubre la hospitalización del asegurado hasta 90 días por año."
                .to_string(),
            source: Some("polizas/hospitalizacion.pdf".to_string()),
            section: None,
            score: 0.91,
        };
        let tool = tool_with(FixedStore(Ok(vec![fragment])));
        match tool.invoke("hospitalización").await {
            ToolOutcome::Content(text) => {
                assert!(text.contains("hospitalización del asegurado"));
                assert!(text.contains("Fuentes: hospitalizacion.pdf"));
            }
            other => panic!("expected Content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_index_yields_not_found() {
        let tool = tool_with(FixedStore(Ok(vec![])));
        assert_eq!(
            tool.invoke("algo").await,
            ToolOutcome::Empty(NOT_FOUND_MESSAGE.to_string())
        );
    }

    #[tokio::test]
    async fn store_failure_is_absorbed() {
        let tool = tool_with(FixedStore(Err("connection refused".to_string())));
        assert_eq!(
            tool.invoke("algo").await,
            ToolOutcome::Failed(LOOKUP_FAILED_MESSAGE.to_string())
        );
    }
}
