//! End-to-end tests of the blocking client against a local mock server.

use playlab_client::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONVERSATIONS: &str = "/projects/proj/conversations";
const MESSAGES: &str = "/projects/proj/conversations/conv-1/messages";
const SSE_REPLY: &str = "data: {\"delta\":\"Hi\"}\n\n: keep-alive\n\ndata: {not json\n\ndata: {}\n\ndata: {\"delta\":\" there\"}\n\n";

fn config(uri: &str) -> ClientConfig {
    ClientConfig::new("test-key", "proj")
        .base_url(uri)
        .verbose(false)
        .display(DisplayMode::Plain)
}

async fn server_with_conversation() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CONVERSATIONS))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"conversation": {"id": "conv-1"}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(MESSAGES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [
                {"source": "system-start", "content": "Be helpful."},
                {"source": "provider", "content": "Hi, ask me anything."}
            ]
        })))
        .mount(&server)
        .await;
    server
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_message_reassembles_sse_reply() {
    let server = server_with_conversation().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES))
        .and(body_json(json!({"input": {"message": "hello"}})))
        .respond_with(sse(SSE_REPLY))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let (reply, chunks) = tokio::task::spawn_blocking(move || {
        let client = PlaylabClient::connect(config(&uri))?;
        let mut chunks = Vec::new();
        let reply = client.stream_message(
            "hello",
            Some(&mut |c: &str| chunks.push(c.to_string())),
            BodyEncoding::Json,
        )?;
        Ok::<_, PlaylabError>((reply, chunks))
    })
    .await
    .expect("join")
    .expect("stream");

    assert_eq!(reply, "Hi there");
    assert_eq!(chunks, vec!["Hi", " there"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn collected_send_and_list_messages() {
    let server = server_with_conversation().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES))
        .respond_with(sse(SSE_REPLY))
        .mount(&server)
        .await;

    let uri = server.uri();
    let (reply, messages) = tokio::task::spawn_blocking(move || {
        let client = PlaylabClient::connect(config(&uri))?;
        let reply = client.send_message("hello", SendOptions::default())?;
        Ok::<_, PlaylabError>((reply, client.list_messages()?))
    })
    .await
    .expect("join")
    .expect("send");

    assert_eq!(reply, "Hi there");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].source, MessageSource::Provider);
}

#[tokio::test(flavor = "multi_thread")]
async fn form_encoded_messages_use_dotted_keys() {
    let server = server_with_conversation().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("input.message=hello"))
        .respond_with(sse("data: {\"delta\":\"ok\"}\n"))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let reply = tokio::task::spawn_blocking(move || {
        let client = PlaylabClient::connect(config(&uri))?;
        client.send_message(
            "hello",
            SendOptions::streaming().encoding(BodyEncoding::Form),
        )
    })
    .await
    .expect("join")
    .expect("send");
    assert_eq!(reply, "ok");
}

#[tokio::test(flavor = "multi_thread")]
async fn attachments_are_uploaded_as_multipart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, "photosynthesis notes").expect("write");

    let server = server_with_conversation().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES))
        .and(body_string_contains("name=\"input.message\""))
        .and(body_string_contains("name=\"originalFileName\""))
        .and(body_string_contains("filename=\"notes.txt\""))
        .and(body_string_contains("photosynthesis notes"))
        .respond_with(sse("data: {\"delta\":\"Got it\"}\n"))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let reply = tokio::task::spawn_blocking(move || {
        let client = PlaylabClient::connect(config(&uri))?;
        client.send_message("summarize", SendOptions::default().attachment(&file))
    })
    .await
    .expect("join")
    .expect("send");
    assert_eq!(reply, "Got it");
}

#[tokio::test(flavor = "multi_thread")]
async fn status_codes_map_to_error_kinds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CONVERSATIONS))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid key"})))
        .mount(&server)
        .await;

    let uri = server.uri();
    let err = tokio::task::spawn_blocking(move || PlaylabClient::connect(config(&uri)))
        .await
        .expect("join")
        .expect_err("unauthorized");
    assert_eq!(err, PlaylabError::Authentication("invalid key".into()));

    let server = server_with_conversation().await;
    Mock::given(method("POST"))
        .and(path(MESSAGES))
        .and(body_string_contains("bad"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "message too long"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(MESSAGES))
        .and(body_string_contains("boom"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let uri = server.uri();
    let (bad, boom) = tokio::task::spawn_blocking(move || {
        let client = PlaylabClient::connect(config(&uri))?;
        Ok::<_, PlaylabError>((
            client.send_message("bad", SendOptions::default()),
            client.send_message("boom", SendOptions::streaming()),
        ))
    })
    .await
    .expect("join")
    .expect("connect");

    assert_eq!(bad, Err(PlaylabError::Validation("message too long".into())));
    match boom {
        Err(PlaylabError::Api {
            message,
            status,
            body,
            ..
        }) => {
            assert_eq!(message, "Failed to send message: bad gateway");
            assert_eq!(status, Some(502));
            assert_eq!(body.as_deref(), Some("bad gateway"));
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[test]
fn unreachable_server_is_an_api_error_without_status() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let uri = format!("http://{}", listener.local_addr().expect("addr"));
    drop(listener);

    let err = PlaylabClient::connect(config(&uri)).expect_err("connection refused");
    assert!(matches!(err, PlaylabError::Api { status: None, .. }), "{err:?}");
}
