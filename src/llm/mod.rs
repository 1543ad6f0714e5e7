//! Client wrapper around the remote inference call.
//!
//! Both entry points depend only on [`ChatBackend`]; [`ChatClient`] is the
//! implementation that talks to the hosted endpoint.

mod backend;
mod client;
mod credential;
mod error;
mod streaming;
mod types;

pub use backend::{ChatBackend, ChatResponse};
pub use client::ChatClient;
pub use credential::{CREDENTIAL_ENV_VARS, Credential};
pub use error::{ChatError, ServiceError};
pub use streaming::FragmentStream;
pub use types::{
    Choice, Completion, DEFAULT_MAX_TOKENS, Fragment, GenerationOptions, Message, ResponseMessage,
    Role, Usage,
};

#[cfg(test)]
pub(crate) mod testing;
