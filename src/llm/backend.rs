//! The seam between the entry points and the inference service.

use async_trait::async_trait;

use super::error::ChatError;
use super::streaming::FragmentStream;
use super::types::{Completion, GenerationOptions, Message};

/// What a single call produced.
#[derive(Debug)]
pub enum ChatResponse {
    /// The whole reply, for `stream = false`.
    Complete(Completion),
    /// Fragments as the service generates them, for `stream = true`.
    Stream(FragmentStream),
}

impl ChatResponse {
    /// Resolves either variant to the full reply text.
    pub async fn into_text(self) -> Result<String, ChatError> {
        match self {
            Self::Complete(completion) => Ok(completion.content().unwrap_or_default().to_owned()),
            Self::Stream(stream) => stream.collect_text().await,
        }
    }
}

/// Anything that can answer a conversation.
///
/// [`ChatClient`](super::ChatClient) talks to the hosted endpoint; tests
/// plug in scripted implementations.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Requests the whole reply at once.
    async fn complete(
        &self,
        messages: &[Message],
        options: GenerationOptions,
    ) -> Result<Completion, ChatError>;

    /// Requests the reply as a stream of fragments.
    async fn stream(
        &self,
        messages: &[Message],
        options: GenerationOptions,
    ) -> Result<FragmentStream, ChatError>;

    /// Given a conversation history, returns a response or a lazy sequence
    /// of response fragments depending on `stream`.
    async fn get_response(
        &self,
        messages: &[Message],
        stream: bool,
        options: GenerationOptions,
    ) -> Result<ChatResponse, ChatError> {
        if stream {
            self.stream(messages, options).await.map(ChatResponse::Stream)
        } else {
            self.complete(messages, options)
                .await
                .map(ChatResponse::Complete)
        }
    }
}

/// Rejects histories the service cannot answer.
pub(crate) fn check_history(messages: &[Message]) -> Result<(), ChatError> {
    if messages.is_empty() {
        return Err(ChatError::invalid_request(
            "conversation history must contain at least one message",
        ));
    }
    Ok(())
}
