//! The client proper: request construction, chat completions (blocking and
//! streaming), model listing, health checks, and the `tweak` rewrite facade.

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ModelInfo,
    ModelsResponse, StreamingChatCompletionRequest,
};
use crate::config::{self, ClientConfig};
use crate::discovery;
use crate::error::Error;
use crate::sse::{sse_data_payload, SseLineBuffer, DONE_SENTINEL};

const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";
const MODELS_PATH: &str = "v1/models";

/// Fallback settings for the rewrite facade, used when no user-provided
/// values are available.
pub mod defaults {
    pub const MODEL: &str = "llama-3.2-3b-instruct-4bit";
    pub const SYSTEM_PROMPT: &str = "Improve the provided text for clarity and tone. \
        Preserve meaning and formatting. Output only the revised text.";
    pub const TEMPERATURE: f64 = 0.3;
}

/// Handle to one server endpoint. Cheap to clone; holds no mutable state, so
/// concurrent operations on the same client are fully independent.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl Client {
    /// Builds a client against an explicit endpoint, skipping resolution.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: normalize_base_url(&base_url.into()),
            api_key,
        }
    }

    /// Strict construction: a configured base URL wins, then discovery; fails
    /// with [`Error::Discovery`] when neither produces an endpoint.
    pub fn connect(config: &ClientConfig) -> Result<Self, Error> {
        let base_url = config::resolve_base_url(config, config::STRICT_STRATEGIES)
            .ok_or(Error::Discovery)?;
        Ok(Self::new(base_url, config.api_key.clone()))
    }

    /// Lenient construction for development setups: same precedence as
    /// [`Client::connect`], but lands on `http://localhost:1337` instead of
    /// failing.
    pub fn with_defaults(config: &ClientConfig) -> Self {
        let base_url = config::resolve_base_url(config, config::LENIENT_STRATEGIES)
            .unwrap_or_else(|| config::DEFAULT_BASE_URL.to_string());
        Self::new(base_url, config.api_key.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .request(method, endpoint_url(&self.base_url, path))
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        request
    }

    /// Single-shot chat completion. Returns the first choice's content,
    /// trimmed of surrounding whitespace.
    pub async fn create(
        &self,
        model: impl Into<String>,
        messages: Vec<ChatMessage>,
        temperature: Option<f64>,
    ) -> Result<String, Error> {
        let payload = ChatCompletionRequest {
            model: model.into(),
            messages,
            temperature,
        };
        let response = self
            .request(reqwest::Method::POST, CHAT_COMPLETIONS_PATH)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http(status.as_u16()));
        }

        let body = response.bytes().await?;
        let decoded: ChatCompletionResponse = serde_json::from_slice(&body)?;
        decoded
            .choices
            .first()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or(Error::InvalidResponse)
    }

    /// Streaming chat completion. Each stream item is one content delta, in
    /// arrival order; the stream ends cleanly at the server's `[DONE]`
    /// sentinel and terminates with an `Err` item on transport or status
    /// failures. Dropping the stream cancels the producer and releases the
    /// connection.
    pub fn create_stream(
        &self,
        model: impl Into<String>,
        messages: Vec<ChatMessage>,
        temperature: Option<f64>,
    ) -> ChatStream {
        let payload = StreamingChatCompletionRequest {
            model: model.into(),
            messages,
            temperature,
            stream: true,
        };
        let request = self
            .request(reqwest::Method::POST, CHAT_COMPLETIONS_PATH)
            .header("Accept", "text/event-stream")
            .json(&payload);
        ChatStream::spawn(request)
    }

    /// Lists the models the server exposes, in server-provided order.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, Error> {
        let response = self
            .request(reqwest::Method::GET, MODELS_PATH)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http(status.as_u16()));
        }

        let body = response.bytes().await?;
        let decoded: ModelsResponse = serde_json::from_slice(&body)?;
        Ok(decoded.data)
    }

    /// Discovers an instance and round-trips a model listing against it.
    /// True iff the request comes back with a success status.
    pub async fn check_health() -> bool {
        let Ok(instance) = discovery::discover_latest_running_instance() else {
            return false;
        };
        let client = Client::new(instance.url, ClientConfig::from_env().api_key);
        match client.request(reqwest::Method::GET, MODELS_PATH).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Rewrites `text` under `system_prompt`. Fails with
    /// [`Error::InvalidResponse`] when the server produces nothing but
    /// whitespace.
    pub async fn tweak(
        &self,
        text: &str,
        model: &str,
        system_prompt: &str,
        temperature: f64,
    ) -> Result<String, Error> {
        let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(text)];
        let content = self.create(model, messages, Some(temperature)).await?;
        if content.is_empty() {
            return Err(Error::InvalidResponse);
        }
        Ok(content)
    }

    /// Streaming variant of [`Client::tweak`]. Callers own buffering and any
    /// fallback to the blocking call when a stream yields no deltas.
    pub fn tweak_stream(
        &self,
        text: &str,
        model: &str,
        system_prompt: &str,
        temperature: f64,
    ) -> ChatStream {
        let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(text)];
        self.create_stream(model, messages, Some(temperature))
    }
}

/// Consumer side of one streaming completion. Implements
/// [`futures_util::Stream`]; values arrive in receive order and the producer
/// task stops as soon as the stream is dropped.
pub struct ChatStream {
    rx: mpsc::Receiver<Result<String, Error>>,
    cancel: CancellationToken,
}

impl ChatStream {
    fn spawn(request: reqwest::RequestBuilder) -> Self {
        let (tx, rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = run_stream(request, tx) => {}
                _ = token.cancelled() => {}
            }
        });
        Self { rx, cancel }
    }

    /// Awaits the next content delta; `None` once the stream has ended.
    pub async fn next_delta(&mut self) -> Option<Result<String, Error>> {
        self.rx.recv().await
    }
}

impl Stream for ChatStream {
    type Item = Result<String, Error>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum LineOutcome {
    Continue,
    Finished,
}

async fn run_stream(request: reqwest::RequestBuilder, tx: mpsc::Sender<Result<String, Error>>) {
    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            let _ = tx.send(Err(Error::Transport(err))).await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let _ = tx.send(Err(Error::Http(status.as_u16()))).await;
        return;
    }

    let mut body = response.bytes_stream();
    let mut buffer = SseLineBuffer::default();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                let _ = tx.send(Err(Error::Transport(err))).await;
                return;
            }
        };
        for line in buffer.push(&chunk) {
            if let LineOutcome::Finished = process_line(&line, &tx).await {
                return;
            }
        }
    }

    if let Some(line) = buffer.finish() {
        let _ = process_line(&line, &tx).await;
    }
}

async fn process_line(line: &str, tx: &mpsc::Sender<Result<String, Error>>) -> LineOutcome {
    let Some(payload) = sse_data_payload(line) else {
        return LineOutcome::Continue;
    };
    if payload == DONE_SENTINEL {
        return LineOutcome::Finished;
    }

    match serde_json::from_str::<ChatCompletionChunk>(payload) {
        Ok(chunk) => {
            let delta = chunk
                .choices
                .first()
                .and_then(|choice| choice.delta.content.as_deref())
                .unwrap_or("");
            if delta.is_empty() {
                return LineOutcome::Continue;
            }
            if tx.send(Ok(delta.to_string())).await.is_err() {
                // Consumer is gone; stop reading.
                return LineOutcome::Finished;
            }
            LineOutcome::Continue
        }
        Err(err) => {
            // Keepalive and comment frames are not JSON; skip them without
            // ending the stream.
            debug!(%err, payload, "ignoring undecodable stream frame");
            LineOutcome::Continue
        }
    }
}

fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", normalize_base_url(base_url), path.trim_start_matches('/'))
}
