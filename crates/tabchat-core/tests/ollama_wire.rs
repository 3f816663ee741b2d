//! Wire-format tests against a one-shot loopback HTTP server.

use serde_json::{json, Value};
use std::time::Duration;
use tabchat_core::{ChatError, ChatMessage, OllamaClient, Session, MemoryStore, TabStore};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct CapturedRequest {
    method: String,
    path: String,
    body: Value,
}

/// Accept one request, capture it, and answer with `status` and `body`.
async fn mock_server_once(
    status: u16,
    resp_body: &'static str,
) -> (String, oneshot::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut request_line = String::new();
        reader.read_line(&mut request_line).await.unwrap();
        let mut parts = request_line.trim().splitn(3, ' ');
        let method = parts.next().unwrap_or("").to_string();
        let path = parts.next().unwrap_or("").to_string();

        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }
            if let Some((k, v)) = trimmed.split_once(": ") {
                if k.eq_ignore_ascii_case("content-length") {
                    content_length = v.parse().unwrap_or(0);
                }
            }
        }

        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await.unwrap();
        let _ = tx.send(CapturedRequest {
            method,
            path,
            body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        });

        let response = format!(
            "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            resp_body.len(),
            resp_body,
        );
        let _ = write_half.write_all(response.as_bytes()).await;
    });

    (format!("http://127.0.0.1:{port}/api/chat"), rx)
}

fn client(endpoint: &str) -> OllamaClient {
    OllamaClient::new(endpoint, "gemma2:9b-instruct-q5_0", Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn sends_full_history_non_streaming() {
    let (endpoint, captured) =
        mock_server_once(200, r#"{"message":{"role":"assistant","content":"Hello"},"done":true}"#).await;

    let history = vec![
        ChatMessage::user("Hi"),
        ChatMessage::assistant("Hey"),
        ChatMessage::user("How are you?"),
    ];
    let reply = client(&endpoint).chat(&history).await.unwrap();
    assert_eq!(reply, "Hello");

    let request = captured.await.unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/api/chat");
    assert_eq!(
        request.body,
        json!({
            "model": "gemma2:9b-instruct-q5_0",
            "stream": false,
            "messages": [
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hey"},
                {"role": "user", "content": "How are you?"}
            ]
        })
    );
}

#[tokio::test]
async fn unexpected_shape_is_no_response() {
    let (endpoint, _captured) = mock_server_once(200, r#"{"done":true}"#).await;

    let result = client(&endpoint).chat(&[ChatMessage::user("Hi")]).await;
    assert!(matches!(result, Err(ChatError::NoResponse)));
}

#[tokio::test]
async fn error_status_is_reported() {
    let (endpoint, _captured) = mock_server_once(500, r#"{"error":"boom"}"#).await;

    let result = client(&endpoint).chat(&[ChatMessage::user("Hi")]).await;
    assert!(matches!(result, Err(ChatError::Status(s)) if s.as_u16() == 500));
}

#[tokio::test]
async fn unreachable_endpoint_is_transport_error() {
    // Bind then drop to get a port nothing listens on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let result = client(&format!("http://127.0.0.1:{port}/api/chat"))
        .chat(&[ChatMessage::user("Hi")])
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, ChatError::Transport(_)));
    assert_eq!(err.user_message(), "Error communicating with server.");
}

#[tokio::test]
async fn silent_server_times_out_as_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        // Hold the connection open without ever answering
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let client = OllamaClient::new(
        &format!("http://127.0.0.1:{port}/api/chat"),
        "gemma2:9b-instruct-q5_0",
        Duration::from_secs(1),
    )
    .unwrap();

    let err = client.chat(&[ChatMessage::user("Hi")]).await.unwrap_err();
    assert!(matches!(err, ChatError::Transport(ref e) if e.is_timeout()), "got {err:?}");
    assert_eq!(err.user_message(), "Error communicating with server.");
}

#[tokio::test]
async fn session_round_trip_through_server() {
    let (endpoint, _captured) =
        mock_server_once(200, r#"{"message":{"role":"assistant","content":"Hello"}}"#).await;
    let mut session = Session::open(TabStore::new(MemoryStore::new(), "chat_app_")).unwrap();

    let request = session.submit("Hi").unwrap().unwrap();
    let result = client(&endpoint).chat(&request.messages).await;
    session.complete(request.id, result).unwrap();

    let stored = session.store().load("Default Chat").unwrap();
    assert_eq!(
        stored.messages(),
        &[ChatMessage::user("Hi"), ChatMessage::assistant("Hello")]
    );
}
