//! A scripted [`ChatBackend`] for exercising the entry points offline.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    ChatBackend, ChatError, Completion, Fragment, FragmentStream, GenerationOptions, Message,
    ServiceError,
};

pub(crate) enum Reply {
    /// Answers with this text; streamed word by word.
    Text(&'static str),
    /// The request itself fails with this HTTP status.
    Status(u16),
    /// Streams the text, then breaks.
    BreakAfter(&'static str),
    /// Accepts the request and never answers.
    Stall,
}

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    pub(crate) fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            seen: Mutex::default(),
        }
    }

    /// Every history the backend was called with, in call order.
    pub(crate) fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }

    fn next(&self, messages: &[Message]) -> Reply {
        self.seen.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Status(500))
    }
}

fn words(text: &str) -> std::vec::IntoIter<Result<Fragment, ChatError>> {
    text.split_inclusive(' ')
        .map(|w| Ok(Fragment::new(w)))
        .collect::<Vec<_>>()
        .into_iter()
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(
        &self,
        messages: &[Message],
        _options: GenerationOptions,
    ) -> Result<Completion, ChatError> {
        match self.next(messages) {
            Reply::Text(text) | Reply::BreakAfter(text) => Ok(serde_json::from_value(
                serde_json::json!({
                    "id": "scripted",
                    "model": "DeepSeek-V3",
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}]
                }),
            )
            .unwrap()),
            Reply::Status(status) => Err(ChatError::from_status(status, "scripted".into())),
            Reply::Stall => std::future::pending().await,
        }
    }

    async fn stream(
        &self,
        messages: &[Message],
        _options: GenerationOptions,
    ) -> Result<FragmentStream, ChatError> {
        match self.next(messages) {
            Reply::Text(text) => Ok(FragmentStream::from_items(words(text))),
            Reply::BreakAfter(text) => {
                let broken: Result<Fragment, ChatError> = Err(ServiceError::Stream {
                    reason: "connection reset".into(),
                }
                .into());
                Ok(FragmentStream::from_items(
                    words(text).chain(std::iter::once(broken)),
                ))
            }
            Reply::Status(status) => Err(ChatError::from_status(status, "scripted".into())),
            Reply::Stall => Ok(FragmentStream::from_sse(futures::stream::pending::<
                Result<bytes::Bytes, Infallible>,
            >())),
        }
    }
}
