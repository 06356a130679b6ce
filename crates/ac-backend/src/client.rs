//! HTTP client for the agent backend.

use std::time::Duration;

use ac_protocol::{
    ChatRequest, ChatResponse, HealthStatus, LlmConfig, LlmConfigChange, LlmConfigResponse,
    McpServer, McpServerChange, McpServerRequest, Session, SessionInfo, ToolsInfo,
};
use async_stream::stream;
use futures::StreamExt;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::BackendError;
use crate::ingest::{ingest_body, CancelHandle, ChatStream, IngestEvent, StreamHandler};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the chat backend's REST and streaming endpoints.
#[derive(Debug, Clone)]
pub struct ChatClient {
    base_url: Url,
    http: Client,
}

/// Build an HTTP client. No overall timeout: streamed replies may run long.
fn build_http_client(connect_timeout: Duration) -> Result<Client, BackendError> {
    Ok(Client::builder()
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(2)
        .build()?)
}

impl ChatClient {
    /// Create a client for the backend at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        Self::with_connect_timeout(base_url, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_connect_timeout(
        base_url: &str,
        connect_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BackendError::Config(format!("invalid base URL '{base_url}': {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(BackendError::Config(format!(
                "base URL must be http(s): {base_url}"
            )));
        }

        Ok(Self {
            base_url,
            http: build_http_client(connect_timeout)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join path segments onto the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                BackendError::Config(format!("base URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, BackendError> {
        let url = self.endpoint(segments)?;
        debug!(%method, %url, "backend request");
        Ok(self.http.request(method, url))
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, BackendError> {
        let response = self.request(Method::GET, segments)?.send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn send_json<B, T>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(method, segments)?.json(body).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn delete(&self, segments: &[&str]) -> Result<(), BackendError> {
        let response = self.request(Method::DELETE, segments)?.send().await?;
        check_status(response).await?;
        Ok(())
    }

    // -- Chat --

    /// Send a message and wait for the whole reply.
    pub async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        self.send_json(Method::POST, &["api", "chat"], request).await
    }

    /// Send a message and stream the reply.
    ///
    /// Nothing is sent until the returned stream is first polled.
    pub fn stream_chat(&self, request: &ChatRequest) -> ChatStream {
        let cancel = CancelHandle::new();
        let token = cancel.token();
        let request = request.clone();
        let builder = self.request(Method::POST, &["api", "chat", "stream"]);

        let events = stream! {
            let builder = match builder {
                Ok(builder) => builder,
                Err(e) => {
                    yield IngestEvent::Failed(e);
                    return;
                }
            };

            let response = tokio::select! {
                biased;
                () = token.cancelled() => return,
                response = builder.json(&request).send() => response,
            };
            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    yield IngestEvent::Failed(e.into());
                    return;
                }
            };

            if !response.status().is_success() {
                let error = tokio::select! {
                    biased;
                    () = token.cancelled() => return,
                    error = api_error(response) => error,
                };
                yield IngestEvent::Failed(error);
                return;
            }

            debug!(session = %request.session_id, mode = %request.mode, "chat stream opened");
            let body = response
                .bytes_stream()
                .map(|read| read.map_err(BackendError::from));
            let mut events = Box::pin(ingest_body(body, token.clone()));
            while let Some(event) = events.next().await {
                yield event;
            }
        };

        ChatStream::new(events, cancel)
    }

    /// Stream a reply into callbacks on a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_stream<H: StreamHandler>(&self, request: &ChatRequest, handler: H) -> CancelHandle {
        crate::ingest::spawn_handler(self.stream_chat(request), handler)
    }

    // -- Sessions --

    pub async fn get_session(&self, session_id: &str) -> Result<SessionInfo, BackendError> {
        self.get_json(&["api", "session", session_id]).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), BackendError> {
        self.delete(&["api", "session", session_id]).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, BackendError> {
        #[derive(Deserialize)]
        struct Resp {
            sessions: Vec<Session>,
        }

        let resp: Resp = self.get_json(&["api", "sessions"]).await?;
        Ok(resp.sessions)
    }

    // -- MCP servers --

    pub async fn list_mcp_servers(&self) -> Result<Vec<McpServer>, BackendError> {
        #[derive(Deserialize)]
        struct Resp {
            servers: Vec<McpServer>,
        }

        let resp: Resp = self.get_json(&["api", "mcp-servers"]).await?;
        Ok(resp.servers)
    }

    pub async fn add_mcp_server(
        &self,
        server: &McpServerRequest,
    ) -> Result<McpServerChange, BackendError> {
        self.send_json(Method::POST, &["api", "mcp-servers"], server)
            .await
    }

    pub async fn update_mcp_server(
        &self,
        name: &str,
        server: &McpServerRequest,
    ) -> Result<McpServerChange, BackendError> {
        self.send_json(Method::PUT, &["api", "mcp-servers", name], server)
            .await
    }

    pub async fn delete_mcp_server(&self, name: &str) -> Result<(), BackendError> {
        self.delete(&["api", "mcp-servers", name]).await
    }

    // -- LLM config --

    pub async fn get_llm_config(&self) -> Result<LlmConfigResponse, BackendError> {
        #[derive(Deserialize)]
        struct Resp {
            config: LlmConfigResponse,
        }

        let resp: Resp = self.get_json(&["api", "llm-config"]).await?;
        Ok(resp.config)
    }

    pub async fn set_llm_config(&self, config: &LlmConfig) -> Result<LlmConfigChange, BackendError> {
        self.send_json(Method::POST, &["api", "llm-config"], config)
            .await
    }

    // -- Status --

    pub async fn health(&self) -> Result<HealthStatus, BackendError> {
        self.get_json(&["health"]).await
    }

    pub async fn tools_info(&self) -> Result<ToolsInfo, BackendError> {
        self.get_json(&["api", "tools"]).await
    }
}

/// Pass successful responses through; turn the rest into `BackendError::Api`.
async fn check_status(response: Response) -> Result<Response, BackendError> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(api_error(response).await)
}

async fn api_error(response: Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    BackendError::Api {
        status: status.as_u16(),
        message: error_message(status, &body),
    }
}

/// Pick the message for a failed response: the JSON `detail` field, then
/// `message`, then `HTTP {status}`. A non-JSON body falls back to the
/// canonical reason for the status code, since reqwest does not expose the
/// reason phrase the server sent.
pub fn error_message(status: StatusCode, body: &str) -> String {
    let fallback = || format!("HTTP {}", status.as_u16());

    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return status
            .canonical_reason()
            .map_or_else(fallback, str::to_string);
    };

    ["detail", "message"]
        .iter()
        .find_map(|field| match json.get(field) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::String(_) | Value::Null | Value::Bool(false)) | None => None,
            Some(other) => Some(other.to_string()),
        })
        .unwrap_or_else(fallback)
}
