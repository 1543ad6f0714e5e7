//! # deepseek-chat
//!
//! Command-line and browser chat clients for the DeepSeek-V3 model hosted on
//! the Azure AI Inference endpoint.
//!
//! Both entry points share one [`ChatBackend`]: given a conversation
//! history it returns the whole reply or a stream of text fragments.
//!
//! ```rust,no_run
//! use deepseek_chat::config::Config;
//! use deepseek_chat::llm::{ChatBackend, ChatClient, Credential, GenerationOptions, Message};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let client = ChatClient::new(Credential::from_env()?, &config)?;
//!     let history = [Message::user("What is the capital of France?")];
//!     let completion = client.complete(&history, GenerationOptions::default()).await?;
//!     println!("{}", completion.content().unwrap_or_default());
//!     Ok(())
//! }
//! ```

// ── Client wrapper and entry points ──────────────────────────────────────────
pub mod cli;
pub mod config;
pub mod llm;
pub mod logging;
pub mod ui;

// ── HTTP server behind the UI ────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use llm::{ChatBackend, ChatClient, ChatError, Credential, FragmentStream, Message};
pub use router::Router;
pub use server::{Server, ServerError};
