//! Integration tests for the chat backend client using wiremock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ac_backend::{BackendError, ChatClient, IngestEvent, StreamHandler};
use ac_protocol::{
    ChatMode, ChatRequest, LlmConfig, LlmProvider, McpServerRequest, StreamChunk,
};
use futures::StreamExt;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> ChatRequest {
    ChatRequest::new("Hello", "default", ChatMode::Agent)
}

fn event_stream(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

async fn client(server: &MockServer) -> ChatClient {
    ChatClient::new(&server.uri()).unwrap()
}

#[tokio::test]
async fn stream_posts_request_and_dispatches_chunks() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .and(body_json(serde_json::json!({
            "message": "Hello",
            "session_id": "default",
            "mode": "agent"
        })))
        .respond_with(event_stream(
            "data: {\"chunk\":\"Hel\"}\n\ndata: {\"chunk\":\"lo\"}\n\ndata: {\"done\":true}\n\n",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let events: Vec<IngestEvent> = client(&server).await.stream_chat(&request()).collect().await;

    assert_eq!(events.len(), 4);
    assert!(matches!(&events[0], IngestEvent::Chunk(c) if *c == StreamChunk::text("Hel")));
    assert!(matches!(&events[1], IngestEvent::Chunk(c) if *c == StreamChunk::text("lo")));
    assert!(matches!(&events[2], IngestEvent::Chunk(c) if c.done));
    assert!(matches!(events[3], IngestEvent::Completed));
}

#[tokio::test]
async fn stream_http_error_uses_detail() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(serde_json::json!({"detail": "overloaded"})),
        )
        .mount(&server)
        .await;

    let events: Vec<IngestEvent> = client(&server).await.stream_chat(&request()).collect().await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        IngestEvent::Failed(e) => {
            assert_eq!(e.to_string(), "overloaded");
            assert_eq!(e.status(), Some(500));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_http_error_without_json_uses_status_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let events: Vec<IngestEvent> = client(&server).await.stream_chat(&request()).collect().await;

    assert_eq!(events.len(), 1);
    assert!(
        matches!(&events[0], IngestEvent::Failed(BackendError::Api { status: 503, message }) if message == "Service Unavailable")
    );
}

#[tokio::test]
async fn stream_connection_refused_fails_once() {
    // Nothing listens on a freshly dropped server's port.
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };

    let client = ChatClient::new(&uri).unwrap();
    let events: Vec<IngestEvent> = client.stream_chat(&request()).collect().await;

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], IngestEvent::Failed(BackendError::Http(_))));
}

#[tokio::test]
async fn stream_trailing_fragment_is_discarded() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(event_stream("data: {\"chunk\":\"hi\"}\ndata: {\"cl"))
        .mount(&server)
        .await;

    let events: Vec<IngestEvent> = client(&server).await.stream_chat(&request()).collect().await;

    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], IngestEvent::Chunk(c) if *c == StreamChunk::text("hi")));
    assert!(matches!(events[1], IngestEvent::Completed));
}

#[tokio::test]
async fn stream_cancelled_before_response_is_silent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(event_stream("data: {\"done\":true}\n").set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let mut stream = client(&server).await.stream_chat(&request());
    let cancel = stream.cancel_handle();

    let next = tokio::spawn(async move { stream.next().await.is_none() });
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let ended_silently = tokio::time::timeout(Duration::from_secs(2), next)
        .await
        .expect("cancel should end the stream promptly")
        .unwrap();
    assert!(ended_silently);
}

#[derive(Default, Clone)]
struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl StreamHandler for Recorder {
    fn on_chunk(&mut self, chunk: StreamChunk) {
        self.log
            .lock()
            .unwrap()
            .push(format!("chunk:{}", chunk.chunk.unwrap_or_default()));
    }

    fn on_error(&mut self, error: BackendError) {
        self.log.lock().unwrap().push(format!("error:{error}"));
    }

    fn on_complete(&mut self) {
        self.log.lock().unwrap().push("complete".to_string());
    }
}

#[tokio::test]
async fn spawn_stream_error_handler_only() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(serde_json::json!({"detail": "overloaded"})),
        )
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    let log = recorder.log.clone();
    let _cancel = client(&server).await.spawn_stream(&request(), recorder);

    for _ in 0..50 {
        if !log.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*log.lock().unwrap(), vec!["error:overloaded"]);
}

#[tokio::test]
async fn send_message_non_streaming() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": "Hi there",
            "session_id": "default",
            "mode": "agent",
            "tools_used": ["search"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client(&server).await.send_message(&request()).await.unwrap();
    assert_eq!(resp.response, "Hi there");
    assert_eq!(resp.tools_used, vec!["search"]);
}

#[tokio::test]
async fn session_endpoints() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sessions": [
                {"session_id": "default", "message_count": 4},
                {"session_id": "session-1700000000000", "message_count": 0}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/session/default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "session_id": "default",
            "message_count": 2,
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/session/old%20chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"message": "deleted"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).await;

    let sessions = client.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].message_count, 4);

    let info = client.get_session("default").await.unwrap();
    assert_eq!(info.messages.len(), 2);
    assert_eq!(info.messages[1].content, "hello");

    client.delete_session("old chat").await.unwrap();
}

#[tokio::test]
async fn missing_session_is_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/session/ghost"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({"detail": "Session not found"})),
        )
        .mount(&server)
        .await;

    let err = client(&server).await.get_session("ghost").await.unwrap_err();
    assert!(matches!(err, BackendError::Api { status: 404, .. }));
    assert_eq!(err.to_string(), "Session not found");
}

#[tokio::test]
async fn mcp_server_endpoints() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/mcp-servers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "servers": [{"name": "fs", "url": "http://localhost:9001/mcp", "has_api_key": true}],
            "count": 1
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/mcp-servers"))
        .and(body_json(serde_json::json!({"name": "search", "url": "http://localhost:9002/mcp"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "server": {"name": "search", "url": "http://localhost:9002/mcp", "has_api_key": false},
            "message": "MCP server added"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/api/mcp-servers/search"))
        .and(body_json(serde_json::json!({
            "name": "search",
            "url": "http://localhost:9003/mcp",
            "api_key": "secret"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "server": {"name": "search", "url": "http://localhost:9003/mcp", "has_api_key": true},
            "message": "MCP server updated"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/mcp-servers/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).await;

    let servers = client.list_mcp_servers().await.unwrap();
    assert_eq!(servers.len(), 1);
    assert!(servers[0].has_api_key);

    let added = client
        .add_mcp_server(&McpServerRequest {
            name: "search".to_string(),
            url: "http://localhost:9002/mcp".to_string(),
            api_key: None,
        })
        .await
        .unwrap();
    assert_eq!(added.message, "MCP server added");

    let updated = client
        .update_mcp_server(
            "search",
            &McpServerRequest {
                name: "search".to_string(),
                url: "http://localhost:9003/mcp".to_string(),
                api_key: Some("secret".to_string()),
            },
        )
        .await
        .unwrap();
    assert!(updated.server.has_api_key);

    client.delete_mcp_server("search").await.unwrap();
}

#[tokio::test]
async fn llm_config_endpoints() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/llm-config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "config": {"type": "openai", "model": "gpt-4o-mini", "has_api_key": true}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/llm-config"))
        .and(body_json(serde_json::json!({
            "type": "groq",
            "model": "llama-3.1-70b",
            "api_key": "gsk-test"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": "LLM configuration updated",
            "config": {"type": "groq", "model": "llama-3.1-70b", "has_api_key": true}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).await;

    let current = client.get_llm_config().await.unwrap();
    assert_eq!(current.provider, "openai");
    assert_eq!(current.has_api_key, Some(true));

    let mut config = LlmConfig::new(LlmProvider::Groq, "llama-3.1-70b");
    config.api_key = Some("gsk-test".to_string());
    let change = client.set_llm_config(&config).await.unwrap();
    assert_eq!(change.config.model, "llama-3.1-70b");
}

#[tokio::test]
async fn health_and_tools() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "healthy",
            "version": "1.2.0",
            "rag_available": false,
            "mcp_servers": 3
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "local_tools": [{"name": "calculator", "description": "Evaluate math", "type": "local"}],
            "mcp_servers": [{"name": "fs", "url": "http://localhost:9001/mcp", "status": "connected"}]
        })))
        .mount(&server)
        .await;

    let client = client(&server).await;

    let health = client.health().await.unwrap();
    assert!(health.is_healthy());
    assert_eq!(health.mcp_servers, 3);

    let tools = client.tools_info().await.unwrap();
    assert_eq!(tools.local_tools[0].name, "calculator");
    assert_eq!(tools.mcp_servers[0].status, "connected");
}
