//! OpenAI-compatible REST client.
//!
//! - `POST {base}/chat/completions` for blocking and streaming completions.
//!   Streaming responses are server-sent events whose `data` payload carries
//!   `choices[0].delta.content`; the literal `[DONE]` ends the stream.
//! - `POST {base}/images/generations` for single-shot image generation.
//!
//! A missing API key never fails construction.  Every call then returns
//! [`RelayError::MissingCredential`] so the rest of the server keeps running.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::transcript::Message;
use crate::upstream::{CompletionApi, FragmentStream, ImageApi};

/// Marker payload that terminates a streaming completion.
const DONE_MARKER: &str = "[DONE]";

const TRUNCATED_STREAM: &str = "stream ended before [DONE]";

/// Connection and model settings for [`OpenAiClient`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API root without trailing slash, e.g. `https://api.openai.com/v1`.
    pub api_base: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub image_model: String,
    /// Requested image size, e.g. `"1024x1024"`.
    pub image_size: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

// ── Client ────────────────────────────────────────────────────────────────────

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("chatrelay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn authorized_post(&self, path: &str) -> Result<reqwest::RequestBuilder, RelayError> {
        let key = self.config.api_key.as_deref().ok_or(RelayError::MissingCredential)?;
        Ok(self.http.post(self.endpoint(path)).bearer_auth(key))
    }
}

#[async_trait]
impl CompletionApi for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, RelayError> {
        let body = ChatRequest { model: &self.config.chat_model, messages, stream: false };
        let response = self.authorized_post("chat/completions")?.json(&body).send().await?;
        let response = check_status(response).await?;
        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RelayError::MalformedResponse("completion has no choices".into()))?;
        debug!(model = %self.config.chat_model, output_len = content.len(), "completion received");
        Ok(content)
    }

    async fn stream(&self, messages: &[Message]) -> Result<FragmentStream, RelayError> {
        let body = ChatRequest { model: &self.config.chat_model, messages, stream: true };
        let request = self.authorized_post("chat/completions")?.json(&body);
        let mut source = EventSource::new(request)
            .map_err(|e| RelayError::Network(format!("cannot open event stream: {e}")))?;
        // A failed turn is reported to the caller, never retried.
        source.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

        let fragments = futures::stream::unfold(Some(source), |state| async move {
            let mut source = state?;
            loop {
                match source.next().await {
                    // `[DONE]` returns before the source is polled again, so
                    // reaching the end here means the connection was cut.
                    None | Some(Err(reqwest_eventsource::Error::StreamEnded)) => {
                        source.close();
                        return Some((Err(RelayError::Network(TRUNCATED_STREAM.into())), None));
                    }
                    Some(Ok(Event::Open)) => continue,
                    Some(Ok(Event::Message(msg))) => {
                        if msg.data.trim() == DONE_MARKER {
                            source.close();
                            return None;
                        }
                        match parse_stream_data(&msg.data) {
                            Ok(Some(delta)) => return Some((Ok(delta), Some(source))),
                            Ok(None) => continue,
                            Err(e) => {
                                source.close();
                                return Some((Err(e), None));
                            }
                        }
                    }
                    Some(Err(e)) => {
                        source.close();
                        return Some((Err(map_event_source_error(e).await), None));
                    }
                }
            }
        });

        Ok(Box::pin(fragments))
    }
}

#[async_trait]
impl ImageApi for OpenAiClient {
    async fn generate_image(&self, prompt: &str) -> Result<String, RelayError> {
        let body = ImageRequest {
            model: &self.config.image_model,
            prompt,
            n: 1,
            size: &self.config.image_size,
        };
        let response = self.authorized_post("images/generations")?.json(&body).send().await?;
        let response = check_status(response).await?;
        let parsed: ImageResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .ok_or_else(|| RelayError::MalformedResponse("image response has no url".into()))
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

/// Decode one SSE `data` payload into an optional text delta.
fn parse_stream_data(data: &str) -> Result<Option<String>, RelayError> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| RelayError::MalformedResponse(format!("bad stream chunk: {e}")))?;
    if let Some(err) = chunk.error {
        return Err(RelayError::Upstream { status: 200, message: err.message });
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty()))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RelayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(RelayError::Upstream { status: status.as_u16(), message: extract_error_message(&text) })
}

async fn map_event_source_error(err: reqwest_eventsource::Error) -> RelayError {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let text = response.text().await.unwrap_or_default();
            RelayError::Upstream { status: status.as_u16(), message: extract_error_message(&text) }
        }
        reqwest_eventsource::Error::Transport(e) => RelayError::from(e),
        other => {
            warn!(error = %other, "event stream failed");
            RelayError::MalformedResponse(other.to_string())
        }
    }
}

/// Pull `error.message` out of an OpenAI error body, falling back to the raw text.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_owned())
}

#[cfg(test)]
mod test {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;

    fn config(api_key: Option<&str>) -> OpenAiConfig {
        OpenAiConfig {
            api_base: "http://127.0.0.1:9/v1/".into(),
            api_key: api_key.map(str::to_owned),
            chat_model: "test-model".into(),
            image_model: "test-image".into(),
            image_size: "256x256".into(),
        }
    }

    #[test]
    fn delta_content_is_extracted() {
        let data = r#"{"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_stream_data(data).unwrap(), Some("Hel".to_owned()));
    }

    #[test]
    fn role_only_and_empty_deltas_are_skipped() {
        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_stream_data(role_only).unwrap(), None);
        let empty = r#"{"choices":[{"delta":{"content":""}}]}"#;
        assert_eq!(parse_stream_data(empty).unwrap(), None);
        let final_chunk = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_stream_data(final_chunk).unwrap(), None);
    }

    #[test]
    fn in_stream_error_object_becomes_upstream_error() {
        let data = r#"{"error":{"message":"rate limited"}}"#;
        let err = parse_stream_data(data).unwrap_err();
        assert!(matches!(err, RelayError::Upstream { ref message, .. } if message == "rate limited"));
    }

    #[test]
    fn garbage_chunk_is_malformed() {
        assert!(matches!(
            parse_stream_data("not json"),
            Err(RelayError::MalformedResponse(_))
        ));
    }

    #[test]
    fn error_message_falls_back_to_body() {
        assert_eq!(extract_error_message(r#"{"error":{"message":"bad key"}}"#), "bad key");
        assert_eq!(extract_error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = OpenAiClient::new(config(Some("k"))).unwrap();
        assert_eq!(client.endpoint("chat/completions"), "http://127.0.0.1:9/v1/chat/completions");
    }

    #[tokio::test]
    async fn missing_credential_fails_every_call_without_network() {
        let client = OpenAiClient::new(config(None)).unwrap();

        let msgs = [Message::user("hi")];
        assert!(matches!(client.complete(&msgs).await, Err(RelayError::MissingCredential)));
        assert!(matches!(client.stream(&msgs).await, Err(RelayError::MissingCredential)));
        assert!(matches!(
            client.generate_image("a cat").await,
            Err(RelayError::MissingCredential)
        ));
    }

    /// Serve exactly one HTTP response on a local port.  The handle yields
    /// the raw request that was received.
    async fn serve_once(status: &'static str, content_type: &'static str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });
        (format!("http://{addr}/v1"), handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + content_length || n == 0 {
                    return text.into_owned();
                }
            } else if n == 0 {
                return text.into_owned();
            }
        }
    }

    fn client_for(base: String) -> OpenAiClient {
        OpenAiClient::new(OpenAiConfig { api_base: base, ..config(Some("sk-test")) }).unwrap()
    }

    async fn collect(client: &OpenAiClient) -> Vec<Result<String, RelayError>> {
        client.stream(&[Message::user("hi")]).await.unwrap().collect().await
    }

    #[tokio::test]
    async fn stream_yields_deltas_until_done() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let (base, server) = serve_once("200 OK", "text/event-stream", body).await;
        let client = client_for(base);

        let items = collect(&client).await;
        let deltas: Vec<String> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(deltas, ["Hel", "lo"]);

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("post /v1/chat/completions"));
        assert!(request.contains("authorization: bearer sk-test"));
        assert!(request.contains(r#""stream":true"#));
    }

    #[tokio::test]
    async fn stream_cut_before_done_ends_with_network_error() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n";
        let (base, _server) = serve_once("200 OK", "text/event-stream", body).await;
        let client = client_for(base);

        let items = collect(&client).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "Hel");
        assert!(matches!(items[1], Err(RelayError::Network(_))));
    }

    #[tokio::test]
    async fn stream_error_status_becomes_upstream_error() {
        let body = r#"{"error":{"message":"rate limited"}}"#;
        let (base, _server) = serve_once("429 Too Many Requests", "application/json", body).await;
        let client = client_for(base);

        let items = collect(&client).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(
            items[0],
            Err(RelayError::Upstream { status: 429, ref message }) if message == "rate limited"
        ));
    }

    #[tokio::test]
    async fn complete_returns_first_choice() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"pong"}}]}"#;
        let (base, server) = serve_once("200 OK", "application/json", body).await;
        let client = client_for(base);

        assert_eq!(client.complete(&[Message::user("ping")]).await.unwrap(), "pong");
        let request = server.await.unwrap();
        assert!(request.contains(r#""stream":false"#));
        assert!(request.contains(r#""model":"test-model""#));
    }

    #[tokio::test]
    async fn complete_error_status_carries_api_message() {
        let body = r#"{"error":{"message":"bad key"}}"#;
        let (base, _server) = serve_once("401 Unauthorized", "application/json", body).await;
        let client = client_for(base);

        let err = client.complete(&[Message::user("ping")]).await.unwrap_err();
        assert!(matches!(err, RelayError::Upstream { status: 401, ref message } if message == "bad key"));
    }

    #[tokio::test]
    async fn generate_image_returns_url() {
        let body = r#"{"created":1,"data":[{"url":"https://images.test/fox.png"}]}"#;
        let (base, server) = serve_once("200 OK", "application/json", body).await;
        let client = client_for(base);

        let url = client.generate_image("a red fox").await.unwrap();
        assert_eq!(url, "https://images.test/fox.png");
        let request = server.await.unwrap();
        assert!(request.to_ascii_lowercase().starts_with("post /v1/images/generations"));
        assert!(request.contains(r#""size":"256x256""#));
    }

    #[tokio::test]
    async fn generate_image_without_url_is_malformed() {
        let (base, _server) = serve_once("200 OK", "application/json", r#"{"data":[]}"#).await;
        let client = client_for(base);

        let err = client.generate_image("a red fox").await.unwrap_err();
        assert!(matches!(err, RelayError::MalformedResponse(_)));
    }
}
