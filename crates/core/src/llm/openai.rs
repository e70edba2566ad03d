//! OpenAI-compatible chat completions client.
//!
//! Every supported provider exposes an OpenAI-compatible `/chat/completions`
//! endpoint, so one client covers both the blocking and streamed calls.

use super::{FragmentStream, ModelCall};
use crate::error::ModelCallError;
use crate::models::ModelConfig;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Model call capability backed by an OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    config: ModelConfig,
    api_key: String,
}

impl OpenAiCompatClient {
    /// Build a client, reading the provider's API key from the environment.
    pub fn from_env(config: ModelConfig) -> Result<Self, ModelCallError> {
        let env_var = config.provider.api_key_env();
        let api_key = std::env::var(env_var).map_err(|_| ModelCallError::MissingApiKey(env_var))?;
        Self::new(config, api_key)
    }

    pub fn new(config: ModelConfig, api_key: impl Into<String>) -> Result<Self, ModelCallError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            config,
            api_key: api_key.into(),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.chat_base_url().trim_end_matches('/')
        )
    }

    fn body(&self, system: &str, prompt: &str, stream: bool) -> Value {
        json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "stream": stream,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt }
            ]
        })
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, ModelCallError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelCallError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ModelCall for OpenAiCompatClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ModelCallError> {
        let response = self.send(&self.body(system, prompt, false)).await?;
        let json: Value = response.json().await?;
        json.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ModelCallError::Decode("response has no message content".to_string()))
    }

    async fn stream(&self, system: &str, prompt: &str) -> Result<FragmentStream, ModelCallError> {
        let response = self.send(&self.body(system, prompt, true)).await?;
        tracing::debug!(model = %self.config.model, "model stream opened");

        let state = StreamState {
            bytes: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            lines: SseLineBuffer::default(),
            pending: VecDeque::new(),
            finished: false,
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.finished {
                    return None;
                }
                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        for data in state.lines.push(&chunk) {
                            match parse_stream_data(&data) {
                                StreamData::Fragment(text) => state.pending.push_back(Ok(text)),
                                StreamData::Skip => {}
                                StreamData::Done => {
                                    state.finished = true;
                                    break;
                                }
                                StreamData::Error(message) => {
                                    state.pending.push_back(Err(ModelCallError::Stream(message)));
                                    state.finished = true;
                                    break;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        state.pending.push_back(Err(ModelCallError::Http(e)));
                    }
                    None => {
                        state.finished = true;
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}

struct StreamState {
    bytes: futures::stream::BoxStream<'static, reqwest::Result<Vec<u8>>>,
    lines: SseLineBuffer,
    pending: VecDeque<Result<String, ModelCallError>>,
    finished: bool,
}

/// Reassembles server-sent-event `data:` payloads from arbitrary byte chunks.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    partial: Vec<u8>,
}

impl SseLineBuffer {
    /// Feed a network chunk; returns every complete `data:` payload in order.
    ///
    /// Bytes are held until a newline arrives, so multi-byte characters split
    /// across chunks decode intact.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}

#[derive(Debug, PartialEq)]
enum StreamData {
    Fragment(String),
    Skip,
    Done,
    Error(String),
}

fn parse_stream_data(data: &str) -> StreamData {
    if data == "[DONE]" {
        return StreamData::Done;
    }
    let json: Value = match serde_json::from_str(data) {
        Ok(json) => json,
        Err(e) => return StreamData::Error(format!("undecodable stream payload: {}", e)),
    };
    if let Some(message) = json.pointer("/error/message").and_then(Value::as_str) {
        return StreamData::Error(message.to_string());
    }
    match json
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
    {
        Some(text) if !text.is_empty() => StreamData::Fragment(text.to_string()),
        _ => StreamData::Skip,
    }
}
