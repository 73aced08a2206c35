//! Integration tests for the streaming chat reader using wiremock.

use std::time::Duration;

use growcab_core::chat::SensorContext;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use growcab_core::{ChatClient, ChatContext, ChatError, ChatMessage, ChatRole, Conversation, StreamEnd};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHAT_PATH: &str = "/functions/v1/chat";

fn client_for(server: &MockServer) -> ChatClient {
    ChatClient::new(&format!("{}{}", server.uri(), CHAT_PATH))
}

fn delta(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"index": 0, "delta": {"content": content}}]})
    )
}

fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

fn conversation_with(question: &str) -> Conversation {
    let mut conversation = Conversation::with_greeting();
    conversation.push_user(question);
    conversation
}

#[tokio::test]
async fn streamed_deltas_build_one_assistant_message() {
    let server = MockServer::start().await;
    let body = format!("{}{}data: [DONE]\n\n", delta("Hel"), delta("lo"));
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(sse_response(body))
        .expect(1)
        .mount(&server)
        .await;

    let mut conversation = conversation_with("hi");
    let summary = client_for(&server)
        .stream_into(&mut conversation, &ChatContext::new("basil"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.content, "Hello");
    assert_eq!(summary.end, StreamEnd::Done);
    assert_eq!(conversation.len(), 3);
    assert_eq!(conversation.last(), Some(&ChatMessage::assistant("Hello")));
}

#[tokio::test]
async fn keep_alives_and_trailing_lines_after_done_are_ignored() {
    let server = MockServer::start().await;
    let body = format!(
        ": ping\n\n{}data: [DONE]\n\n{}",
        delta("Selamat menanam 🌱"),
        delta("ignored")
    );
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(sse_response(body))
        .mount(&server)
        .await;

    let mut deltas = Vec::new();
    let summary = client_for(&server)
        .send(
            &[ChatMessage::user("hello")],
            &ChatContext::new("mint"),
            &CancellationToken::new(),
            |d| deltas.push(d.to_string()),
        )
        .await
        .unwrap();

    assert_eq!(deltas, vec!["Selamat menanam 🌱".to_string()]);
    assert_eq!(summary.end, StreamEnd::Done);
}

#[tokio::test]
async fn stream_without_sentinel_ends_at_eof() {
    let server = MockServer::start().await;
    // Last line has no terminating newline
    let body = format!("{}{}", delta("Keep it "), delta("cool.").trim_end());
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(sse_response(body))
        .mount(&server)
        .await;

    let mut conversation = conversation_with("too hot?");
    let summary = client_for(&server)
        .stream_into(&mut conversation, &ChatContext::new("coriander"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.end, StreamEnd::Eof);
    assert_eq!(conversation.last().map(|m| m.content.as_str()), Some("Keep it cool."));
}

#[tokio::test]
async fn request_carries_history_plant_and_sensor_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .and(header("content-type", "application/json"))
        .and(header("authorization", "Bearer anon-key"))
        .and(body_partial_json(serde_json::json!({
            "plantId": "pak-choy",
            "sensorData": {"temperature": 29.5, "humidity": 72.0, "timestamp": "2024-05-01T10:00:00Z"}
        })))
        .respond_with(sse_response("data: [DONE]\n\n".to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let history = vec![
        ChatMessage::assistant("Let's grow!"),
        ChatMessage::user("Is 29.5°C ok for pak choy?"),
    ];
    let context = ChatContext {
        plant_id: "pak-choy".to_string(),
        sensor: Some(SensorContext {
            temperature: Some(29.5),
            humidity: Some(72.0),
            timestamp: "2024-05-01T10:00:00Z".to_string(),
        }),
    };

    let summary = client_for(&server)
        .with_api_key("anon-key")
        .send(&history, &context, &CancellationToken::new(), |_| {})
        .await
        .unwrap();
    assert_eq!(summary.content, "");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let sent: Vec<ChatMessage> = serde_json::from_value(body["messages"].clone()).unwrap();
    assert_eq!(sent, history);
    assert_eq!(sent[1].role, ChatRole::User);
}

#[tokio::test]
async fn rate_limit_appends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": "Rate limits exceeded, please try again later."
        })))
        .mount(&server)
        .await;

    let mut conversation = conversation_with("hi");
    let result = client_for(&server)
        .stream_into(&mut conversation, &ChatContext::new("basil"), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ChatError::RateLimited)));
    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation.last().map(|m| m.role), Some(ChatRole::User));
}

#[tokio::test]
async fn payment_required_is_distinguished() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(402))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .send(&[ChatMessage::user("hi")], &ChatContext::new("basil"), &CancellationToken::new(), |_| {})
        .await;
    assert!(matches!(result, Err(ChatError::PaymentRequired)));
}

#[tokio::test]
async fn other_failures_carry_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("AI gateway error"))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .send(&[ChatMessage::user("hi")], &ChatContext::new("basil"), &CancellationToken::new(), |_| {})
        .await;

    match result {
        Err(ChatError::RequestFailed { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "AI gateway error");
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn bodiless_response_is_stream_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .send(&[ChatMessage::user("hi")], &ChatContext::new("basil"), &CancellationToken::new(), |_| {})
        .await;
    assert!(matches!(result, Err(ChatError::StreamUnavailable)));
}

#[tokio::test]
async fn unreachable_gateway_is_a_transport_error() {
    let client = ChatClient::new("http://127.0.0.1:9/functions/v1/chat");
    let result = client
        .send(&[ChatMessage::user("hi")], &ChatContext::new("basil"), &CancellationToken::new(), |_| {})
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, ChatError::Transport(_)));
    assert!(err.is_service_unavailable());
}

#[tokio::test]
async fn cancellation_returns_without_assistant_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(sse_response(delta("late")).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let mut conversation = conversation_with("hi");
    let summary = tokio::time::timeout(
        Duration::from_secs(2),
        client_for(&server).stream_into(&mut conversation, &ChatContext::new("basil"), &cancel),
    )
    .await
    .expect("cancellation is prompt")
    .unwrap();

    assert_eq!(summary.end, StreamEnd::Cancelled);
    assert_eq!(conversation.len(), 2);
}

/// Serve one chunk of `first_chunk`, then drop the connection in the middle of
/// the next chunk.
async fn serve_truncated_stream(listener: TcpListener, first_chunk: String) {
    let (mut socket, _) = listener.accept().await.unwrap();

    // Consume the whole request so closing the socket does not reset it
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        request.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&request).to_lowercase();
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if request.len() >= end + 4 + content_length {
                break;
            }
        }
        if n == 0 {
            break;
        }
    }

    let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
    socket.write_all(head.as_bytes()).await.unwrap();
    let chunk = format!("{:x}\r\n{}\r\n", first_chunk.len(), first_chunk);
    socket.write_all(chunk.as_bytes()).await.unwrap();
    socket.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    socket.write_all(b"100\r\ndata: {\"choi").await.unwrap();
    socket.flush().await.unwrap();
}

#[tokio::test]
async fn transport_failure_mid_stream_keeps_streamed_content() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_truncated_stream(listener, delta("Hel")));

    let mut conversation = conversation_with("hi");
    let client = ChatClient::new(&format!("http://{addr}{CHAT_PATH}"));
    let result = client
        .stream_into(&mut conversation, &ChatContext::new("basil"), &CancellationToken::new())
        .await;
    server.await.unwrap();

    assert!(matches!(result, Err(ChatError::Transport(_))));
    assert_eq!(conversation.len(), 3);
    assert_eq!(conversation.last(), Some(&ChatMessage::assistant("Hel")));
}
