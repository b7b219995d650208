//! Ollama-backed generation service.
//!
//! Capability comes from `/api/tags`, downloads from a streamed `/api/pull`,
//! generation from `/api/chat`. Sessions hold their conversation locally, so a
//! fork is a copy of the history.

use super::{
    Availability, DownloadMonitor, DownloadProgress, GenerationService, GenerationSession,
    SessionOptions, SharedSession, TextStream,
};
use crate::config::ServiceConfig;
use crate::error::PipelineError;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

fn map_http_error(error: reqwest::Error) -> PipelineError {
    if error.is_timeout() {
        PipelineError::Generation(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        PipelineError::Generation(format!("Connection error: {}", error))
    } else {
        PipelineError::Generation(format!("HTTP error: {}", error))
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, PipelineError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(PipelineError::Generation(format!(
        "Request failed with status {}: {}",
        status, error_text
    )))
}

/// Parse a newline-delimited JSON response body as a stream of records.
fn ndjson_stream<T>(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<T, PipelineError>> + Send>>
where
    T: DeserializeOwned + Send + 'static,
{
    type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, reqwest::Error>> + Send>>;

    let bytes: ByteStream = Box::pin(response.bytes_stream().map(|r| r.map(|b| b.to_vec())));
    let parse = |raw: &[u8]| -> Result<T, PipelineError> {
        serde_json::from_slice(raw)
            .map_err(|e| PipelineError::Generation(format!("Malformed stream record: {}", e)))
    };

    futures::stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        move |(mut bytes, mut buffer, mut finished)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if line.iter().all(|b| b.is_ascii_whitespace()) {
                        continue;
                    }
                    return Some((parse(&line), (bytes, buffer, finished)));
                }
                if finished {
                    if buffer.iter().all(|b| b.is_ascii_whitespace()) {
                        return None;
                    }
                    let rest = std::mem::take(&mut buffer);
                    return Some((parse(&rest), (bytes, buffer, finished)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        buffer.clear();
                        finished = true;
                        return Some((Err(map_http_error(e)), (bytes, buffer, finished)));
                    }
                    None => finished = true,
                }
            }
        },
    )
    .boxed()
}

/// Ollama HTTP client shared by the service and its sessions
///
/// The underlying client carries no total timeout. Request/response calls set
/// `request_timeout` per request; the pull stream bounds only the gap between
/// progress records.
#[derive(Clone)]
struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    request_timeout: Duration,
}

impl OllamaClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, PipelineError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;
        let response = error_for_status(response).await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Generation(format!("Failed to parse response: {}", e)))?;
        if let Some(error) = body.error {
            return Err(PipelineError::Generation(error));
        }
        body.message
            .map(|m| m.content)
            .ok_or_else(|| PipelineError::Generation("No message in response".to_string()))
    }

    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TextStream, PipelineError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: true,
        };
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;
        let response = error_for_status(response).await?;

        let versions = ndjson_stream::<ChatResponse>(response).scan(
            String::new(),
            |accumulated, record| {
                let item = match record {
                    Ok(ChatResponse {
                        error: Some(error), ..
                    }) => Err(PipelineError::Generation(error)),
                    Ok(ChatResponse { message, .. }) => {
                        if let Some(message) = message {
                            accumulated.push_str(&message.content);
                        }
                        Ok(accumulated.clone())
                    }
                    Err(e) => Err(e),
                };
                futures::future::ready(Some(item))
            },
        );
        Ok(Box::pin(versions))
    }

    async fn list_models(&self) -> Result<Vec<String>, reqwest::Error> {
        #[derive(Deserialize)]
        struct TagsResponse {
            models: Vec<ModelInfo>,
        }
        #[derive(Deserialize)]
        struct ModelInfo {
            name: String,
        }

        let url = format!("{}/api/tags", self.base_url);
        let tags: TagsResponse = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull(&self, monitor: &DownloadMonitor) -> Result<(), PipelineError> {
        let url = format!("{}/api/pull", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "model": self.model, "stream": true }))
            .send()
            .await
            .map_err(map_http_error)?;
        let response = error_for_status(response).await?;

        let mut records = ndjson_stream::<PullStatus>(response);
        loop {
            let record = match tokio::time::timeout(self.request_timeout, records.next()).await {
                Ok(Some(record)) => record?,
                Ok(None) => break,
                Err(_) => {
                    return Err(PipelineError::Generation(format!(
                        "Request timeout: no pull progress for {}s",
                        self.request_timeout.as_secs()
                    )))
                }
            };
            if let Some(error) = record.error {
                return Err(PipelineError::SessionCreation(error));
            }
            if let (Some(total), Some(completed)) = (record.total, record.completed) {
                (**monitor)(DownloadProgress {
                    loaded_bytes: completed,
                    total_bytes: total,
                });
            }
            if record.status == "success" {
                debug!(model = %self.model, "Model pull finished");
            }
        }
        Ok(())
    }
}

/// Generation service backed by a local Ollama server
pub struct OllamaService {
    inner: OllamaClient,
}

impl OllamaService {
    pub fn new(config: &ServiceConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                PipelineError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            inner: OllamaClient {
                client,
                base_url: config.endpoint.trim_end_matches('/').to_string(),
                model: config.model.clone(),
                request_timeout: Duration::from_secs(config.request_timeout_secs),
            },
        })
    }

    pub fn model_name(&self) -> &str {
        &self.inner.model
    }
}

fn model_matches(available: &str, wanted: &str) -> bool {
    available == wanted
        || available
            .strip_prefix(wanted)
            .map(|rest| rest.starts_with(':'))
            .unwrap_or(false)
}

#[async_trait]
impl GenerationService for OllamaService {
    async fn capability(&self) -> Result<Availability, PipelineError> {
        match self.inner.list_models().await {
            Ok(models) => {
                if models.iter().any(|m| model_matches(m, &self.inner.model)) {
                    Ok(Availability::Ready)
                } else {
                    Ok(Availability::NeedsDownload)
                }
            }
            Err(e) => {
                warn!(endpoint = %self.inner.base_url, error = %e, "Generation service unreachable");
                Ok(Availability::Unavailable)
            }
        }
    }

    async fn create_session(
        &self,
        options: SessionOptions,
        monitor: Option<DownloadMonitor>,
    ) -> Result<SharedSession, PipelineError> {
        if let Some(monitor) = monitor {
            info!(model = %self.inner.model, "Downloading model");
            self.inner.pull(&monitor).await?;
        }
        Ok(Arc::new(OllamaSession {
            client: self.inner.clone(),
            system: options.system_prompt(),
            history: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }))
    }
}

/// Session over an Ollama chat conversation
pub struct OllamaSession {
    client: OllamaClient,
    system: String,
    history: Mutex<Vec<ChatMessage>>,
    disposed: AtomicBool,
}

impl OllamaSession {
    fn check_live(&self) -> Result<(), PipelineError> {
        if self.disposed.load(Ordering::Acquire) {
            Err(PipelineError::SessionDisposed)
        } else {
            Ok(())
        }
    }

    fn one_shot(&self, text: &str) -> [ChatMessage; 2] {
        [ChatMessage::system(self.system.clone()), ChatMessage::user(text)]
    }
}

#[async_trait]
impl GenerationSession for OllamaSession {
    async fn summarize(&self, text: &str) -> Result<String, PipelineError> {
        self.check_live()?;
        self.client.chat(&self.one_shot(text)).await
    }

    async fn summarize_streaming(&self, text: &str) -> Result<TextStream, PipelineError> {
        self.check_live()?;
        self.client.chat_stream(&self.one_shot(text)).await
    }

    async fn prompt(&self, input: &str) -> Result<String, PipelineError> {
        self.check_live()?;
        let mut messages = vec![ChatMessage::system(self.system.clone())];
        messages.extend(self.history.lock().iter().cloned());
        messages.push(ChatMessage::user(input));

        let reply = self.client.chat(&messages).await?;

        let mut history = self.history.lock();
        history.push(ChatMessage::user(input));
        history.push(ChatMessage::assistant(reply.clone()));
        Ok(reply)
    }

    async fn fork(&self) -> Result<SharedSession, PipelineError> {
        self.check_live()?;
        Ok(Arc::new(OllamaSession {
            client: self.client.clone(),
            system: self.system.clone(),
            history: Mutex::new(self.history.lock().clone()),
            disposed: AtomicBool::new(false),
        }))
    }

    async fn destroy(&self) {
        self.disposed.store(true, Ordering::Release);
        self.history.lock().clear();
    }
}
