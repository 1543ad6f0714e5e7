//! Drives the real `ChatClient` against a fake inference endpoint served by
//! the crate's own HTTP server.

use bytes::Bytes;
use deepseek_chat::config::Config;
use deepseek_chat::llm::{
    ChatBackend, ChatClient, ChatError, ChatResponse, Credential, GenerationOptions, Message,
    ServiceError,
};
use deepseek_chat::{Request, Response, Server, StatusCode};
use futures::stream;
use serde_json::{Value, json};

const TOKEN: &str = "ghp_integration";
const ANSWER: [&str; 6] = ["The ", "capital ", "of ", "France ", "is ", "Paris."];

fn sse(data: &Value) -> Bytes {
    Bytes::from(format!("data: {data}\n\n"))
}

async fn fake_endpoint(req: Request) -> Response {
    if req.path() != "/chat/completions" {
        return Response::new(StatusCode::NotFound);
    }
    if req.headers().get("authorization") != Some(format!("Bearer {TOKEN}").as_str()) {
        return Response::json(
            StatusCode::Unauthorized,
            &json!({"error": {"code": "unauthorized", "message": "Bad credentials"}}),
        );
    }
    let body: Value = match serde_json::from_slice(req.body()) {
        Ok(body) => body,
        Err(_) => return Response::new(StatusCode::BadRequest),
    };
    let last = body["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_owned();

    if last == "throttle" {
        return Response::new(StatusCode::BadGateway).body("upstream overloaded");
    }

    if body["stream"] == true {
        let mut events: Vec<Bytes> = vec![sse(
            &json!({"choices": [{"index": 0, "delta": {"role": "assistant"}}]}),
        )];
        if last == "break" {
            events.push(sse(&json!({"choices": [{"delta": {"content": "par"}}]})));
            events.push(Bytes::from_static(b"data: {oops\n\n"));
        } else {
            for word in ANSWER {
                events.push(sse(
                    &json!({"choices": [{"index": 0, "delta": {"content": word}}]}),
                ));
            }
            events.push(Bytes::from_static(b"data: [DONE]\n\n"));
        }
        Response::stream(StatusCode::Ok, stream::iter(events))
            .header("Content-Type", "text/event-stream")
    } else {
        Response::json(
            StatusCode::Ok,
            &json!({
                "id": "cmpl-1",
                "model": body["model"],
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": ANSWER.concat()},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 9, "completion_tokens": 7, "total_tokens": 16}
            }),
        )
    }
}

async fn spawn_endpoint() -> Config {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.run(fake_endpoint));
    Config {
        endpoint: format!("http://{addr}"),
        ..Config::default()
    }
}

async fn client(token: &str) -> ChatClient {
    let config = spawn_endpoint().await;
    ChatClient::new(Credential::new(token).unwrap(), &config).unwrap()
}

fn question() -> Vec<Message> {
    vec![Message::user("What is the capital of France?")]
}

#[tokio::test]
async fn non_streaming_returns_complete_response() {
    let client = client(TOKEN).await;
    let response = client
        .get_response(&question(), false, GenerationOptions::default())
        .await
        .unwrap();
    let ChatResponse::Complete(completion) = response else {
        panic!("expected a complete response");
    };
    assert_eq!(completion.model, "DeepSeek-V3");
    assert!(!completion.content().unwrap().is_empty());
    assert_eq!(completion.usage.unwrap().total_tokens, 16);
}

#[tokio::test]
async fn streamed_fragments_concatenate_to_complete_text() {
    let client = client(TOKEN).await;
    let options = GenerationOptions { max_tokens: 200 };

    let streamed = client
        .get_response(&question(), true, options)
        .await
        .unwrap();
    assert!(matches!(streamed, ChatResponse::Stream(_)));
    let streamed = streamed.into_text().await.unwrap();

    let whole = client.complete(&question(), options).await.unwrap();
    assert_eq!(Some(streamed.as_str()), whole.content());
}

#[tokio::test]
async fn rejected_credential_is_authentication_error() {
    let client = client("ghp_wrong").await;
    for stream in [false, true] {
        let err = client
            .get_response(&question(), stream, GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_authentication(), "stream={stream}: {err}");
        assert!(err.to_string().contains("Bad credentials"));
    }
}

#[tokio::test]
async fn provider_status_surfaces_unchanged() {
    let client = client(TOKEN).await;
    let err = client
        .complete(&[Message::user("throttle")], GenerationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChatError::Service(ServiceError::Http { status: 502, ref body }) if body == "upstream overloaded"
    ));
}

#[tokio::test]
async fn broken_stream_yields_text_then_one_error() {
    use futures::StreamExt;

    let client = client(TOKEN).await;
    let mut fragments = client
        .stream(&[Message::user("break")], GenerationOptions::default())
        .await
        .unwrap();

    assert_eq!(fragments.next().await.unwrap().unwrap().text, "par");
    assert!(matches!(
        fragments.next().await,
        Some(Err(ChatError::Service(ServiceError::Stream { .. })))
    ));
    assert!(fragments.next().await.is_none());
}

#[tokio::test]
async fn missing_credential_fails_before_any_request() {
    let err = Credential::from_lookup(|_| None).unwrap_err();
    assert!(err.is_authentication());
}
