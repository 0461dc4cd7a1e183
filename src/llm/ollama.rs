//! Ollama chat backend.
//!
//! Talks to the native `/api/chat` endpoint. Streaming responses arrive as
//! NDJSON lines; the final line carries `"done": true`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    client: Client,
}

impl OllamaProvider {
    pub fn new(base_url: String, request_timeout_secs: u64) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn chat_body(&self, request: &ChatRequest, model_id: &str, stream: bool) -> Value {
        let mut options = serde_json::Map::new();
        if let Some(t) = request.temperature {
            options.insert("temperature".to_string(), json!(t));
        }
        if let Some(n) = request.max_tokens {
            options.insert("num_predict".to_string(), json!(n));
        }

        json!({
            "model": model_id,
            "messages": request.messages,
            "stream": stream,
            "options": Value::Object(options),
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout("Ollama request timed out".to_string())
        } else if err.is_connect() {
            ApiError::Internal(format!(
                "Cannot connect to Ollama at {}. Is Ollama running?",
                self.base_url
            ))
        } else {
            ApiError::internal(err)
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ApiError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.chat_body(&request, model_id, false);

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "Ollama chat error ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        let content = payload["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(content)
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.chat_body(&request, model_id, true);

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "Ollama stream error ({}): {}",
                status, text
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            let mut buffer = String::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        // NDJSON: lines may arrive split across chunks
                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].trim().to_string();
                            buffer.drain(..=pos);
                            if line.is_empty() {
                                continue;
                            }
                            match parse_stream_line(&line) {
                                StreamLine::Token(content) => {
                                    if tx.send(Ok(content)).await.is_err() {
                                        return;
                                    }
                                }
                                StreamLine::Done => return,
                                StreamLine::Skip => {}
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::internal(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

enum StreamLine {
    Token(String),
    Done,
    Skip,
}

fn parse_stream_line(line: &str) -> StreamLine {
    let Ok(payload) = serde_json::from_str::<Value>(line) else {
        return StreamLine::Skip;
    };
    if payload["done"].as_bool() == Some(true) {
        // the done line may still carry a trailing token, but Ollama
        // leaves content empty there in practice
        return StreamLine::Done;
    }
    match payload["message"]["content"].as_str() {
        Some(content) if !content.is_empty() => StreamLine::Token(content.to_string()),
        _ => StreamLine::Skip,
    }
}
