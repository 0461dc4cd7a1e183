//! Clause drafting: retrieves fragments for each requested topic and asks
//! the model for one unified clause built strictly from them.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Tool, ToolName, ToolOutcome};
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::retrieval::{Fragment, KnowledgeStore};

pub const INSUFFICIENT_MATERIAL_MESSAGE: &str =
    "No encontré material suficiente en los documentos de pólizas para redactar \
     una cláusula sobre esos temas.";
pub const DRAFT_FAILED_MESSAGE: &str =
    "No pude redactar la cláusula en este momento. Inténtalo de nuevo más tarde.";

const CLAUSE_SYSTEM_PROMPT: &str =
    "Eres un redactor de pólizas de seguros. A partir de los fragmentos de \
     documentos proporcionados, redacta UNA única cláusula unificada en español. \
     Usa estrictamente la información de los fragmentos, elimina redundancias y \
     no inventes coberturas que no aparezcan en ellos.";

/// Fragments retrieved per topic.
const TOPIC_TOP_K: usize = 2;

pub struct ClauseDraftTool {
    store: Arc<dyn KnowledgeStore>,
    llm: Arc<dyn LlmProvider>,
    model: String,
    temperature: f32,
}

impl ClauseDraftTool {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        llm: Arc<dyn LlmProvider>,
        model: String,
        temperature: f32,
    ) -> Self {
        Self {
            store,
            llm,
            model,
            temperature,
        }
    }
}

/// Split "hospitalización y maternidad, odontología" into individual topics.
pub fn split_topics(input: &str) -> Vec<String> {
    input
        .split(',')
        .flat_map(|part| part.split(" y "))
        .map(|topic| topic.trim())
        .filter(|topic| !topic.is_empty())
        .map(|topic| topic.to_string())
        .collect()
}

fn render_fragments(topic: &str, fragments: &[Fragment]) -> String {
    fragments
        .iter()
        .map(|fragment| {
            let source = fragment.source.as_deref().unwrap_or("desconocido");
            format!(
                "--- Documento: {} (tema: {}) ---\n{}",
                source, topic, fragment.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Tool for ClauseDraftTool {
    fn name(&self) -> ToolName {
        ToolName::ClauseDraft
    }

    fn description(&self) -> &'static str {
        "Redacta una nueva cláusula combinando fragmentos de varias pólizas. \
         La entrada son los temas a combinar, separados por \"y\" o comas."
    }

    async fn invoke(&self, input: &str) -> ToolOutcome {
        let topics = split_topics(input);
        if topics.is_empty() {
            return ToolOutcome::Clarification(
                "Indícame qué temas quieres combinar en la cláusula, por ejemplo: \
                 \"hospitalización y maternidad\"."
                    .to_string(),
            );
        }

        let mut blocks = Vec::new();
        for topic in &topics {
            match self.store.lookup(topic, TOPIC_TOP_K).await {
                Ok(fragments) if !fragments.is_empty() => {
                    blocks.push(render_fragments(topic, &fragments));
                }
                Ok(_) => {
                    tracing::debug!("no fragments for clause topic {:?}", topic);
                }
                Err(err) => {
                    tracing::warn!("clause lookup failed for {:?}: {}", topic, err);
                }
            }
        }

        // Without material the model would only hallucinate; skip it.
        if blocks.is_empty() {
            return ToolOutcome::Empty(INSUFFICIENT_MATERIAL_MESSAGE.to_string());
        }

        let request = ChatRequest::new(vec![
            ChatMessage::system(CLAUSE_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Temas solicitados: {}\n\nFragmentos:\n\n{}",
                topics.join(", "),
                blocks.join("\n\n")
            )),
        ])
        .with_temperature(self.temperature);

        match self.llm.chat(request, &self.model).await {
            Ok(text) if !text.trim().is_empty() => ToolOutcome::Content(text),
            Ok(_) => ToolOutcome::Failed(DRAFT_FAILED_MESSAGE.to_string()),
            Err(err) => {
                tracing::warn!("clause draft completion failed: {}", err);
                ToolOutcome::Failed(DRAFT_FAILED_MESSAGE.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use super::*;
    use crate::core::errors::ApiError;

    struct RecordingStore {
        queries: Mutex<Vec<String>>,
        fragments: Vec<Fragment>,
    }

    #[async_trait]
    impl KnowledgeStore for RecordingStore {
        async fn lookup(&self, query: &str, k: usize) -> Result<Vec<Fragment>, ApiError> {
            assert_eq!(k, TOPIC_TOP_K);
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.fragments.clone())
        }
    }

    struct CountingLlm {
        calls: AtomicUsize,
        reply: String,
    }

    #[async_trait]
    impl LlmProvider for CountingLlm {
        fn name(&self) -> &str {
            "mock"
        }

        async fn health_check(&self) -> Result<bool, ApiError> {
            Ok(true)
        }

        async fn chat(&self, _request: ChatRequest, _model_id: &str) -> Result<String, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }

        async fn stream_chat(
            &self,
            _request: ChatRequest,
            _model_id: &str,
        ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
            unimplemented!("clause drafting never streams")
        }
    }

    fn fragment(text: &str) -> Fragment {
        Fragment {
            text: text.to_string(),
            source: Some("polizas/base.pdf".to_string()),
            section: None,
            score: 0.8,
        }
    }

    #[test]
    fn splits_on_conjunction_and_commas() {
        assert_eq!(
            split_topics("hospitalización y maternidad"),
            vec!["hospitalización", "maternidad"]
        );
        assert_eq!(
            split_topics("vida, accidentes y robo"),
            vec!["vida", "accidentes", "robo"]
        );
        assert!(split_topics("  ,  y ").is_empty());
    }

    #[tokio::test]
    async fn issues_one_lookup_per_topic_before_the_model_call() {
        let store = Arc::new(RecordingStore {
            queries: Mutex::new(Vec::new()),
            fragments: vec![fragment("Cobertura de hospitalización hasta 90 días.")],
        });
        let llm = Arc::new(CountingLlm {
            calls: AtomicUsize::new(0),
            reply: "Cláusula unificada.".to_string(),
        });
        let tool = ClauseDraftTool::new(store.clone(), llm.clone(), "m".into(), 0.1);

        let out = tool.invoke("hospitalización y maternidad").await;
        assert_eq!(
            *store.queries.lock().unwrap(),
            vec!["hospitalización", "maternidad"]
        );
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
        assert_eq!(out, ToolOutcome::Content("Cláusula unificada.".to_string()));
    }

    #[tokio::test]
    async fn no_fragments_means_no_model_call() {
        let store = Arc::new(RecordingStore {
            queries: Mutex::new(Vec::new()),
            fragments: vec![],
        });
        let llm = Arc::new(CountingLlm {
            calls: AtomicUsize::new(0),
            reply: String::new(),
        });
        let tool = ClauseDraftTool::new(store, llm.clone(), "m".into(), 0.1);

        let out = tool.invoke("tema a y tema b").await;
        assert_eq!(
            out,
            ToolOutcome::Empty(INSUFFICIENT_MATERIAL_MESSAGE.to_string())
        );
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_topic_list_asks_for_clarification() {
        let store = Arc::new(RecordingStore {
            queries: Mutex::new(Vec::new()),
            fragments: vec![],
        });
        let llm = Arc::new(CountingLlm {
            calls: AtomicUsize::new(0),
            reply: String::new(),
        });
        let tool = ClauseDraftTool::new(store.clone(), llm, "m".into(), 0.1);

        let out = tool.invoke("   ").await;
        assert!(matches!(out, ToolOutcome::Clarification(_)));
        assert!(store.queries.lock().unwrap().is_empty());
    }
}
