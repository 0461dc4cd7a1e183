use std::fs;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::agent::AgentService;
use crate::core::config::{AppPaths, Settings};
use crate::llm::{LlmProvider, OllamaProvider};
use crate::memory::ConversationStore;
use crate::retrieval::{ChromaStore, KnowledgeStore, PolicyIndex};
use crate::tools::web_search::DuckDuckGoBackend;
use crate::tools::{ClauseDraftTool, PolicyLookupTool, ToolSet, WebSearchTool};

#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Arc<Settings>,
    pub llm: Arc<dyn LlmProvider>,
    pub memory: ConversationStore,
    pub agent: AgentService,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub async fn initialize() -> anyhow::Result<Arc<Self>> {
        let settings = Arc::new(Settings::load().context("Failed to load configuration")?);
        let paths = Arc::new(AppPaths::resolve());
        fs::create_dir_all(&paths.data_dir)
            .with_context(|| format!("Failed to create data dir {}", paths.data_dir.display()))?;

        let memory = ConversationStore::new(paths.history_db_path(), settings.memory.max_turns)
            .await
            .context("Failed to open conversation store")?;

        let llm: Arc<dyn LlmProvider> = Arc::new(OllamaProvider::new(
            settings.llm.base_url.clone(),
            settings.llm.request_timeout_secs,
        )?);

        let knowledge: Arc<dyn KnowledgeStore> = Arc::new(ChromaStore::new(
            settings.knowledge.base_url.clone(),
            settings.knowledge.collection.clone(),
            settings.knowledge.request_timeout_secs,
        )?);

        let tools = Arc::new(ToolSet::new(
            Arc::new(PolicyLookupTool::new(
                PolicyIndex::new(knowledge.clone()),
                settings.knowledge.top_k,
            )),
            Arc::new(WebSearchTool::new(Box::new(DuckDuckGoBackend::new(
                settings.knowledge.request_timeout_secs,
            )?))),
            Arc::new(ClauseDraftTool::new(
                knowledge,
                llm.clone(),
                settings.llm.model.clone(),
                settings.llm.temperature,
            )),
        ));

        let agent = AgentService::new(settings.clone(), llm.clone(), tools, memory.clone());
        let started_at = Utc::now();

        Ok(Arc::new(AppState {
            paths,
            settings,
            llm,
            memory,
            agent,
            started_at,
        }))
    }
}
