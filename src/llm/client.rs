//! HTTP client for the hosted chat completions endpoint.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, warn};

use super::backend::{ChatBackend, check_history};
use super::credential::Credential;
use super::error::{ChatError, ServiceError};
use super::streaming::FragmentStream;
use super::types::{ChatCompletionRequest, Completion, GenerationOptions, Message};
use crate::config::Config;

/// Talks to `{endpoint}/chat/completions` with a bearer credential.
///
/// Construction never touches the network. Every call is a single attempt;
/// failures are returned as-is.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    credential: Credential,
    url: String,
    endpoint: String,
    model: String,
}

impl ChatClient {
    pub fn new(credential: Credential, config: &Config) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ServiceError::Transport {
                endpoint: config.endpoint.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            credential,
            url: config.completions_url(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn headers(&self, stream: bool) -> Result<HeaderMap, ChatError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(if stream {
                "text/event-stream"
            } else {
                "application/json"
            }),
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", self.credential.expose()))
            .map_err(|_| ChatError::authentication("credential is not a valid header value"))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        Ok(headers)
    }

    /// Sends the request and checks the status; the body is left unread.
    async fn send(
        &self,
        messages: &[Message],
        options: GenerationOptions,
        stream: bool,
    ) -> Result<reqwest::Response, ChatError> {
        check_history(messages)?;

        let body = ChatCompletionRequest {
            messages,
            model: &self.model,
            max_tokens: options.max_tokens,
            stream,
        };

        debug!(
            model = %self.model,
            messages = messages.len(),
            max_tokens = options.max_tokens,
            stream,
            "sending chat completion request"
        );

        let response = self
            .http
            .post(&self.url)
            .headers(self.headers(stream)?)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "inference service rejected request");
            return Err(ChatError::from_status(status.as_u16(), body));
        }

        debug!(status = status.as_u16(), "inference service accepted request");
        Ok(response)
    }

    fn transport(&self, e: reqwest::Error) -> ChatError {
        ServiceError::Transport {
            endpoint: self.endpoint.clone(),
            reason: e.without_url().to_string(),
        }
        .into()
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn complete(
        &self,
        messages: &[Message],
        options: GenerationOptions,
    ) -> Result<Completion, ChatError> {
        let response = self.send(messages, options, false).await?;
        let text = response.text().await.map_err(|e| self.transport(e))?;
        let completion: Completion =
            serde_json::from_str(&text).map_err(|e| ServiceError::MalformedResponse {
                reason: format!("failed to parse completion: {e}"),
            })?;
        if completion.content().is_none() {
            return Err(ServiceError::MalformedResponse {
                reason: "completion carried no message content".into(),
            }
            .into());
        }
        Ok(completion)
    }

    async fn stream(
        &self,
        messages: &[Message],
        options: GenerationOptions,
    ) -> Result<FragmentStream, ChatError> {
        let response = self.send(messages, options, true).await?;
        Ok(FragmentStream::from_sse(response.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ChatClient {
        let config = Config {
            // Nothing listens here; requests must fail before or at connect.
            endpoint: "http://127.0.0.1:9".into(),
            ..Config::default()
        };
        ChatClient::new(Credential::new("test-token").unwrap(), &config).unwrap()
    }

    #[test]
    fn url_includes_api_version() {
        let c = client();
        assert_eq!(
            c.url,
            "http://127.0.0.1:9/chat/completions?api-version=2024-05-01-preview"
        );
        assert_eq!(c.model(), "DeepSeek-V3");
    }

    #[test]
    fn authorization_header_is_sensitive() {
        let headers = client().headers(true).unwrap();
        let auth = headers.get(AUTHORIZATION).unwrap();
        assert!(auth.is_sensitive());
        assert_eq!(auth.to_str().unwrap(), "Bearer test-token");
        assert_eq!(headers.get(ACCEPT).unwrap(), "text/event-stream");
    }

    #[tokio::test]
    async fn empty_history_rejected_before_network() {
        let err = client()
            .get_response(&[], false, GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let err = client()
            .complete(&[Message::user("hi")], GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChatError::Service(ServiceError::Transport { .. })
        ));
    }

    #[test]
    fn debug_does_not_leak_credential() {
        assert!(!format!("{:?}", client()).contains("test-token"));
    }
}
