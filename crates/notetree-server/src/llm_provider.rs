//! Streaming OpenAI-compatible chat client.
//!
//! Talks to `/chat/completions` with `"stream": true` and turns the
//! server-sent event lines into [`StreamEvent`]s.

use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use notetree_core::Role;

use crate::config::{ConfigError, ProviderConfig};
use crate::transport::{AiTransport, GenerationRequest, StreamEvent, TransportError};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    openrouter: bool,
}

impl OpenAiCompatibleTransport {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let base_url = config.base_url()?;
        Ok(OpenAiCompatibleTransport {
            client: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: config.api_key.clone().unwrap_or_default(),
            openrouter: config.provider == "openrouter",
        })
    }

    fn request_body(request: &GenerationRequest) -> serde_json::Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system_prompt.trim().is_empty() {
            messages.push(json!({ "role": "system", "content": request.system_prompt }));
        }
        for message in &request.messages {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(json!({ "role": role, "content": message.text }));
        }
        json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
        })
    }

    async fn stream(self, request: GenerationRequest, tx: mpsc::Sender<StreamEvent>) {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&Self::request_body(&request));
        if self.openrouter {
            req = req
                .header("HTTP-Referer", "https://localhost:3000")
                .header("X-Title", "NoteTree");
        }

        let mut response = match req.send().await {
            Ok(response) => response,
            Err(err) => {
                let _ = tx.send(StreamEvent::Error(request_error(&err))).await;
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let _ = tx
                .send(StreamEvent::Error(TransportError::from_status(
                    status.as_u16(),
                    &body,
                )))
                .await;
            return;
        }

        let mut buffer: Vec<u8> = Vec::new();
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => return,
                Err(err) => {
                    let _ = tx.send(StreamEvent::Error(request_error(&err))).await;
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                match parse_sse_line(line.trim()) {
                    SseLine::Skip => {}
                    SseLine::Done => return,
                    SseLine::Events(events) => {
                        for event in events {
                            let terminal = !matches!(event, StreamEvent::Delta(_));
                            if tx.send(event).await.is_err() || terminal {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}

impl AiTransport for OpenAiCompatibleTransport {
    fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("generation request cancelled");
                }
                _ = this.stream(request, tx) => {}
            }
        });
        rx
    }
}

fn request_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        TransportError::Connectivity(err.to_string())
    } else {
        TransportError::classify(&err.to_string())
    }
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Skip,
    Done,
    Events(Vec<StreamEvent>),
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(err) => {
            tracing::debug!("ignoring unparseable stream line: {}", err);
            return SseLine::Skip;
        }
    };
    if let Some(error) = chunk.error {
        return SseLine::Events(vec![StreamEvent::Error(TransportError::classify(
            &error.message,
        ))]);
    }

    let mut events = Vec::new();
    for choice in chunk.choices {
        if let Some(content) = choice.delta.and_then(|d| d.content) {
            if !content.is_empty() {
                events.push(StreamEvent::Delta(content));
            }
        }
        if choice.finish_reason.as_deref() == Some("content_filter") {
            events.push(StreamEvent::SafetyStop);
        }
    }
    SseLine::Events(events)
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}
