//! Per-query decision procedure.
//!
//! A fresh orchestrator runs each query through a bounded loop:
//! `Idle -> Selecting -> {ToolInvoked -> Selecting} | Answering -> Done`.
//! Every selection attempt and tool invocation consumes one cycle; when the
//! bound is exhausted the orchestrator still emits a best-effort answer.
//! Memory is committed only once the answer has been fully delivered.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use std::sync::OnceLock;
use tokio::time::timeout;

use super::prompts;
use crate::core::config::Settings;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::memory::{ConversationStore, ConversationTurn, TurnRole};
use crate::stream::StreamSink;
use crate::tools::{ToolName, ToolOutcome, ToolSet};

/// Semantic routing decision over the closed tool enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Policy,
    CurrentInfo,
    ClauseDraft,
    Unrelated,
}

impl Intent {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "polizas" => Some(Intent::Policy),
            "actualidad" => Some(Intent::CurrentInfo),
            "clausula" => Some(Intent::ClauseDraft),
            "fuera_de_tema" => Some(Intent::Unrelated),
            _ => None,
        }
    }
}

/// One entry of the per-query trace.
#[derive(Debug, Clone)]
pub enum AgentStep {
    ToolCall {
        tool: ToolName,
        input: String,
        observation: String,
    },
    FinalAnswer(String),
}

pub struct Orchestrator {
    settings: Arc<Settings>,
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolSet>,
    memory: ConversationStore,
    steps: Vec<AgentStep>,
    cycles_used: usize,
}

impl Orchestrator {
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
            steps: Vec::new(),
            cycles_used: 0,
        }
    }

    /// Ordered trace of the finished run, for observability.
    pub fn steps(&self) -> &[AgentStep] {
        &self.steps
    }

    /// Drive one query to completion, pushing answer tokens into `sink`.
    /// Returns the trace. The end-of-stream marker is the caller's duty.
    pub async fn run(mut self, question: &str, session_id: &str, sink: &StreamSink) -> Vec<AgentStep> {
        let history = match self.memory.history(session_id).await {
            Ok(history) => history,
            Err(err) => {
                tracing::warn!("failed to load history for {}: {}", session_id, err);
                Vec::new()
            }
        };

        let effective = self.effective_query(question, &history).await;
        if effective != question {
            tracing::debug!("effective query: {:?} -> {:?}", question, effective);
        }

        let intent = self.select_intent(&effective).await;
        tracing::info!(
            "session={} intent={:?} cycles_used={}",
            session_id,
            intent,
            self.cycles_used
        );

        let answer = match intent {
            Intent::Unrelated => self.deliver(sink, prompts::REFUSAL_MESSAGE.to_string()).await,
            Intent::ClauseDraft => self.run_clause(&effective, sink).await,
            Intent::Policy => self.run_policy(question, &effective, &history, sink).await,
            Intent::CurrentInfo => {
                self.run_web_then_answer(question, &effective, &history, sink).await
            }
        };

        match answer {
            Some(text) => {
                self.steps.push(AgentStep::FinalAnswer(text.clone()));
                // Done: commit the turn pair. A disconnected caller means
                // the turn was never delivered, so nothing is committed.
                if !sink.is_closed() {
                    self.commit(session_id, question, &text).await;
                }
            }
            None => {
                tracing::info!("session={} cancelled mid-stream, turn not committed", session_id);
            }
        }

        tracing::debug!("agent trace: {:?}", self.steps);
        self.steps
    }

    /// Resolve follow-ups against the conversation so the tools see a
    /// standalone question, not a bare "¿de qué artículo es esto?".
    async fn effective_query(&self, question: &str, history: &[ConversationTurn]) -> String {
        if history.is_empty() {
            return question.to_string();
        }

        let mut messages = vec![ChatMessage::system(prompts::CONDENSE_SYSTEM_PROMPT)];
        for turn in history {
            let msg = match turn.role {
                TurnRole::User => ChatMessage::user(&turn.content),
                TurnRole::Agent => ChatMessage::assistant(&turn.content),
            };
            messages.push(msg);
        }
        messages.push(ChatMessage::user(question));

        let request = ChatRequest::new(messages).with_temperature(0.0);
        match self.llm_chat(request).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => question.to_string(),
            Err(err) => {
                tracing::warn!("condense failed, using literal question: {}", err);
                question.to_string()
            }
        }
    }

    /// Ask the model for one label out of the closed set. Unparseable
    /// replies are retried within the cycle bound; the domain default
    /// (`Policy`) applies once retries run out.
    async fn select_intent(&mut self, effective: &str) -> Intent {
        let system = prompts::intent_prompt(&self.tools);

        while self.cycles_used < self.settings.agent.max_cycles {
            self.cycles_used += 1;
            let request = ChatRequest::new(vec![
                ChatMessage::system(system.clone()),
                ChatMessage::user(effective),
            ])
            .with_temperature(0.0);

            let reply = match self.llm_chat(request).await {
                Ok(reply) => reply,
                Err(err) => {
                    tracing::warn!("intent selection call failed: {}", err);
                    return Intent::Policy;
                }
            };

            if let Some(intent) = parse_intent(&reply) {
                return intent;
            }
            tracing::warn!("unparseable intent reply {:?}, retrying", reply);
        }

        Intent::Policy
    }

    async fn run_clause(&mut self, effective: &str, sink: &StreamSink) -> Option<String> {
        let Some(outcome) = self.invoke_tool(ToolName::ClauseDraft, effective).await else {
            return self.best_effort(sink).await;
        };
        // every variant carries user-ready text here
        self.deliver(sink, outcome.text().to_string()).await
    }

    async fn run_policy(
        &mut self,
        question: &str,
        effective: &str,
        history: &[ConversationTurn],
        sink: &StreamSink,
    ) -> Option<String> {
        let Some(outcome) = self.invoke_tool(ToolName::PolicyLookup, effective).await else {
            return self.best_effort(sink).await;
        };

        match outcome {
            // Grounded content found: answer from it, web search stays out
            // of this cycle entirely.
            ToolOutcome::Content(observation) => {
                self.answer_from(question, &observation, history, sink).await
            }
            ToolOutcome::Empty(_) | ToolOutcome::Failed(_) => {
                self.run_web_then_answer(question, effective, history, sink).await
            }
            ToolOutcome::Clarification(msg) => self.deliver(sink, msg).await,
        }
    }

    async fn run_web_then_answer(
        &mut self,
        question: &str,
        effective: &str,
        history: &[ConversationTurn],
        sink: &StreamSink,
    ) -> Option<String> {
        let Some(outcome) = self.invoke_tool(ToolName::WebSearch, effective).await else {
            return self.best_effort(sink).await;
        };

        match outcome {
            ToolOutcome::Content(observation) => {
                self.answer_from(question, &observation, history, sink).await
            }
            ToolOutcome::Clarification(msg) => self.deliver(sink, msg).await,
            ToolOutcome::Empty(_) | ToolOutcome::Failed(_) => {
                self.deliver(sink, prompts::NO_INFORMATION_MESSAGE.to_string()).await
            }
        }
    }

    /// Invoke one tool under the per-call timeout, consuming a cycle.
    /// `None` means the cycle bound was already exhausted.
    async fn invoke_tool(&mut self, name: ToolName, input: &str) -> Option<ToolOutcome> {
        if self.cycles_used >= self.settings.agent.max_cycles {
            tracing::warn!("cycle bound reached before invoking {}", name);
            return None;
        }
        self.cycles_used += 1;

        let tool = self.tools.get(name);
        let deadline = Duration::from_secs(self.settings.agent.tool_timeout_secs);
        let outcome = match timeout(deadline, tool.invoke(input)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!("tool {} timed out after {:?}", name, deadline);
                ToolOutcome::Failed(format!("La herramienta {} tardó demasiado en responder.", name))
            }
        };

        tracing::debug!("tool {} -> {:?}", name, outcome);
        self.steps.push(AgentStep::ToolCall {
            tool: name,
            input: input.to_string(),
            observation: outcome.text().to_string(),
        });
        Some(outcome)
    }

    /// Answering state: stream the grounded answer token by token.
    async fn answer_from(
        &mut self,
        question: &str,
        observation: &str,
        history: &[ConversationTurn],
        sink: &StreamSink,
    ) -> Option<String> {
        let mut messages = vec![ChatMessage::system(prompts::ANSWER_SYSTEM_PROMPT)];
        for turn in history {
            let msg = match turn.role {
                TurnRole::User => ChatMessage::user(&turn.content),
                TurnRole::Agent => ChatMessage::assistant(&turn.content),
            };
            messages.push(msg);
        }
        messages.push(ChatMessage::user(prompts::answer_user_prompt(
            question,
            observation,
        )));

        let request =
            ChatRequest::new(messages).with_temperature(self.settings.llm.temperature);
        let deadline = Duration::from_secs(self.settings.llm.request_timeout_secs);

        let mut rx = match timeout(
            deadline,
            self.llm.stream_chat(request, &self.settings.llm.model),
        )
        .await
        {
            Ok(Ok(rx)) => rx,
            Ok(Err(err)) => {
                tracing::warn!("answer stream failed to start: {}", err);
                return self.fallback_answer(observation, sink).await;
            }
            Err(_) => {
                tracing::warn!("answer stream start timed out");
                return self.fallback_answer(observation, sink).await;
            }
        };

        let mut full = String::new();
        loop {
            match timeout(deadline, rx.recv()).await {
                Ok(Some(Ok(token))) => {
                    full.push_str(&token);
                    if !sink.token(token).await {
                        return None; // caller disconnected
                    }
                }
                Ok(Some(Err(err))) => {
                    tracing::warn!("answer stream error: {}", err);
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("answer stream stalled");
                    break;
                }
            }
        }

        if full.trim().is_empty() {
            return self.fallback_answer(observation, sink).await;
        }
        Some(full)
    }

    /// The model produced nothing; the raw observation is still a grounded,
    /// user-readable answer.
    async fn fallback_answer(&self, observation: &str, sink: &StreamSink) -> Option<String> {
        let text = if observation.trim().is_empty() {
            prompts::APOLOGY_MESSAGE.to_string()
        } else {
            observation.to_string()
        };
        self.deliver(sink, text).await
    }

    /// Exhaustion path: surface whatever was observed, never an empty stream.
    async fn best_effort(&self, sink: &StreamSink) -> Option<String> {
        let text = self
            .steps
            .iter()
            .rev()
            .find_map(|step| match step {
                AgentStep::ToolCall { observation, .. } if !observation.trim().is_empty() => {
                    Some(observation.clone())
                }
                _ => None,
            })
            .unwrap_or_else(|| prompts::APOLOGY_MESSAGE.to_string());
        self.deliver(sink, text).await
    }

    /// Send a complete answer through the sink as a single token.
    async fn deliver(&self, sink: &StreamSink, text: String) -> Option<String> {
        if sink.token(text.clone()).await {
            Some(text)
        } else {
            None
        }
    }

    async fn commit(&self, session_id: &str, question: &str, answer: &str) {
        if let Err(err) = self.memory.append(session_id, TurnRole::User, question).await {
            tracing::error!("failed to commit user turn: {}", err);
            return;
        }
        if let Err(err) = self.memory.append(session_id, TurnRole::Agent, answer).await {
            tracing::error!("failed to commit agent turn: {}", err);
        }
    }

    async fn llm_chat(&self, request: ChatRequest) -> Result<String, crate::core::errors::ApiError> {
        let deadline = Duration::from_secs(self.settings.llm.request_timeout_secs);
        match timeout(deadline, self.llm.chat(request, &self.settings.llm.model)).await {
            Ok(result) => result,
            Err(_) => Err(crate::core::errors::ApiError::Timeout(
                "LLM call timed out".to_string(),
            )),
        }
    }
}

fn intent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(polizas|actualidad|clausula|fuera_de_tema)\b")
            .expect("intent label pattern is valid")
    })
}

/// Extract the first recognized label from a model reply. Models tend to
/// wrap the label in prose or quotes; anything without a label is a
/// selection parse failure.
pub fn parse_intent(reply: &str) -> Option<Intent> {
    let normalized = reply.to_lowercase().replace("pólizas", "polizas").replace("cláusula", "clausula");
    intent_regex()
        .find(&normalized)
        .and_then(|m| Intent::from_label(m.as_str()))
}

#[cfg(test)]
mod parse_tests {
    use super::*;

    #[test]
    fn accepts_bare_labels() {
        assert_eq!(parse_intent("polizas"), Some(Intent::Policy));
        assert_eq!(parse_intent("actualidad"), Some(Intent::CurrentInfo));
        assert_eq!(parse_intent("clausula"), Some(Intent::ClauseDraft));
        assert_eq!(parse_intent("fuera_de_tema"), Some(Intent::Unrelated));
    }

    #[test]
    fn accepts_wrapped_and_accented_labels() {
        assert_eq!(parse_intent("Etiqueta: \"polizas\"."), Some(Intent::Policy));
        assert_eq!(parse_intent("La respuesta es CLÁUSULA"), Some(Intent::ClauseDraft));
        assert_eq!(
            parse_intent("fuera_de_tema, porque pide un chiste"),
            Some(Intent::Unrelated)
        );
    }

    #[test]
    fn rejects_unknown_replies() {
        assert_eq!(parse_intent(""), None);
        assert_eq!(parse_intent("no lo sé"), None);
        assert_eq!(parse_intent("poliza"), None);
    }
}
