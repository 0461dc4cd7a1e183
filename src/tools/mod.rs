//! The closed set of capabilities the orchestrator can invoke.
//!
//! Tool names are a fixed enumeration dispatched deterministically; the
//! natural-language descriptions feed the selection prompt only. Tools
//! never return `Err`; every internal failure is converted into a
//! descriptive outcome the orchestrator can act on.

pub mod clause;
pub mod lookup;
pub mod web_search;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

pub use clause::ClauseDraftTool;
pub use lookup::PolicyLookupTool;
pub use web_search::WebSearchTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    PolicyLookup,
    WebSearch,
    ClauseDraft,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::PolicyLookup => "consulta_polizas",
            ToolName::WebSearch => "busqueda_web",
            ToolName::ClauseDraft => "redaccion_clausula",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state-plus-validation result of a tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Usable content for answer synthesis.
    Content(String),
    /// Nothing found. Carries the user-facing text; drives fallback
    /// selection instead of being matched as a sentinel substring.
    Empty(String),
    /// Input was rejected before contacting any service; the message asks
    /// the user to clarify.
    Clarification(String),
    /// The underlying service failed; descriptive, never propagated.
    Failed(String),
}

impl ToolOutcome {
    /// The text to show when this outcome becomes the observation.
    pub fn text(&self) -> &str {
        match self {
            ToolOutcome::Content(s)
            | ToolOutcome::Empty(s)
            | ToolOutcome::Clarification(s)
            | ToolOutcome::Failed(s) => s,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    /// Natural-language description used by the selection prompt.
    fn description(&self) -> &'static str;

    async fn invoke(&self, input: &str) -> ToolOutcome;
}

/// The closed tool set bound to one request.
#[derive(Clone)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new(
        lookup: Arc<PolicyLookupTool>,
        web_search: Arc<WebSearchTool>,
        clause: Arc<ClauseDraftTool>,
    ) -> Self {
        Self {
            tools: vec![lookup, web_search, clause],
        }
    }

    pub fn get(&self, name: ToolName) -> &dyn Tool {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
            .expect("tool set always holds all three tools")
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Tool> {
        self.tools.iter().map(|t| t.as_ref())
    }
}
