//! Agent orchestration: the decision procedure that routes each query to
//! the right information source and streams back a grounded answer.

pub mod orchestrator;
pub mod prompts;


use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::config::Settings;
use crate::llm::LlmProvider;
use crate::memory::ConversationStore;
use crate::stream::{self, StreamEvent};
use crate::tools::ToolSet;

pub use orchestrator::{AgentStep, Intent, Orchestrator};

/// Shared, read-only wiring for the agent. A fresh [`Orchestrator`] is
/// created per query so per-request state never leaks across requests.
#[derive(Clone)]
pub struct AgentService {
    settings: Arc<Settings>,
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolSet>,
    memory: ConversationStore,
}

impl AgentService {
    pub fn new(
        settings: Arc<Settings>,
        llm: Arc<dyn LlmProvider>,
        tools: Arc<ToolSet>,
        memory: ConversationStore,
    ) -> Self {
        Self {
            settings,
            llm,
            tools,
            memory,
        }
    }

    /// Submit one question. The returned receiver yields answer tokens in
    /// order and always terminates with exactly one [`StreamEvent::Done`],
    /// even when the orchestrator fails before producing output.
    pub fn submit(&self, question: String, session_id: String) -> mpsc::Receiver<StreamEvent> {
        let (sink, rx) = stream::channel();
        let orchestrator = Orchestrator::new(
            self.settings.clone(),
            self.llm.clone(),
            self.tools.clone(),
            self.memory.clone(),
        );

        tokio::spawn(async move {
            orchestrator.run(&question, &session_id, &sink).await;
            sink.finish().await;
        });

        rx
    }
}
