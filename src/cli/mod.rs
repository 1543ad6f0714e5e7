//! The `deepseek-cli` entry point.
//!
//! Two modes: a one-shot prompt (optionally streamed) and an interactive
//! loop that keeps the conversation history for the length of the session.
//! Output goes to any [`Write`] so the loop can be driven from tests.

use std::io::Write;

use clap::{CommandFactory, Parser};
use futures::StreamExt;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::config::{Config, ConfigError};
use crate::llm::{
    ChatBackend, ChatClient, ChatError, ChatResponse, Credential, GenerationOptions, Message,
};

pub const BANNER: &str = "DeepSeek-V3 Interactive Mode (Type 'exit' to quit)";

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "deepseek-cli", version, about = "Chat with DeepSeek-V3 from the terminal")]
pub struct Args {
    /// The prompt to send to DeepSeek
    pub prompt: Option<String>,

    /// Stream the response as it is generated
    #[arg(long)]
    pub stream: bool,

    /// Interactive mode
    #[arg(short, long)]
    pub interactive: bool,

    /// Model to query (overrides DEEPSEEK_MODEL)
    #[arg(long)]
    pub model: Option<String>,

    /// Maximum tokens per reply (overrides DEEPSEEK_MAX_TOKENS)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_tokens: Option<u32>,
}

impl Args {
    /// True when there is nothing to do but print usage: no interactive flag
    /// and no prompt, where a blank prompt counts as none.
    pub fn wants_help(&self) -> bool {
        !self.interactive && self.prompt.as_deref().is_none_or(|p| p.trim().is_empty())
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs the CLI against the hosted endpoint, writing to stdout.
///
/// Loads `.env` first, then reads settings and the credential from the
/// process environment.
pub async fn run(args: Args) -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    run_with(args, |name| std::env::var(name).ok()).await
}

/// Same as [`run`] with an injectable variable source.
pub async fn run_with<F>(args: Args, lookup: F) -> Result<(), CliError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::from_lookup(&lookup)?;
    if let Some(model) = &args.model {
        config.model.clone_from(model);
    }
    if let Some(max_tokens) = args.max_tokens {
        config.max_tokens = max_tokens;
    }

    if args.wants_help() {
        Args::command().print_help()?;
        return Ok(());
    }

    let credential = Credential::from_lookup(&lookup)?;
    let client = ChatClient::new(credential, &config)?;
    let options = GenerationOptions {
        max_tokens: config.max_tokens,
    };
    debug!(model = %config.model, endpoint = %config.endpoint, "client ready");

    let mut stdout = std::io::stdout();
    if args.interactive {
        let input = BufReader::new(tokio::io::stdin());
        interactive(&client, options, input, ctrl_c(), &mut stdout).await?;
    } else if let Some(prompt) = args.prompt {
        one_shot(&client, &prompt, args.stream, options, &mut stdout).await?;
    }
    Ok(())
}

/// Sends a single prompt with no history and prints the reply.
///
/// Returns the full reply text.
pub async fn one_shot<B, W>(
    backend: &B,
    prompt: &str,
    stream: bool,
    options: GenerationOptions,
    out: &mut W,
) -> Result<String, CliError>
where
    B: ChatBackend + ?Sized,
    W: Write,
{
    let history = [Message::user(prompt)];
    match backend.get_response(&history, stream, options).await? {
        ChatResponse::Complete(completion) => {
            let text = completion.content().unwrap_or_default().to_owned();
            writeln!(out, "{text}")?;
            Ok(text)
        }
        ChatResponse::Stream(fragments) => print_fragments(fragments, out).await,
    }
}

// Resolves on the first Ctrl-C. If the handler cannot be installed it never
// resolves, leaving SIGINT with its default behavior.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// The read-eval-print loop.
///
/// Reads prompts from `input` until `exit`, `quit`, end of input or
/// `interrupt` resolving, whether that happens at the prompt or while a
/// reply is streaming. Each
/// turn streams the reply for the whole history so far. A turn's user
/// message and reply join the history together once the reply completes,
/// so a failed turn leaves it untouched.
///
/// Returns the final history.
pub async fn interactive<B, R, I, W>(
    backend: &B,
    options: GenerationOptions,
    input: R,
    interrupt: I,
    out: &mut W,
) -> Result<Vec<Message>, CliError>
where
    B: ChatBackend + ?Sized,
    R: AsyncBufRead + Unpin,
    I: Future<Output = ()>,
    W: Write,
{
    let mut history: Vec<Message> = Vec::new();
    let mut lines = input.lines();
    let mut interrupt = std::pin::pin!(interrupt);

    writeln!(out, "{BANNER}")?;
    writeln!(out, "{}", "-".repeat(50))?;

    loop {
        write!(out, "\nYou: ")?;
        out.flush()?;

        let read = tokio::select! {
            biased;
            () = &mut interrupt => None,
            read = lines.next_line() => read?,
        };
        let Some(line) = read else {
            writeln!(out, "\nExiting...")?;
            break;
        };
        let prompt = line.trim();
        if is_exit(prompt) {
            break;
        }
        if prompt.is_empty() {
            continue;
        }

        write!(out, "\nDeepSeek: ")?;
        out.flush()?;

        let user = Message::user(prompt);
        let mut turn = history.clone();
        turn.push(user.clone());

        let outcome = tokio::select! {
            biased;
            () = &mut interrupt => None,
            outcome = stream_turn(backend, &turn, options, out) => Some(outcome),
        };
        let Some(outcome) = outcome else {
            writeln!(out, "\nExiting...")?;
            break;
        };

        match outcome {
            Ok(reply) => {
                history.push(user);
                history.push(Message::assistant(reply));
            }
            Err(CliError::Chat(e)) => {
                warn!(error = %e, "turn failed");
                writeln!(out)?;
                writeln!(out, "Error: {e}")?;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(history)
}

fn is_exit(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

async fn stream_turn<B, W>(
    backend: &B,
    history: &[Message],
    options: GenerationOptions,
    out: &mut W,
) -> Result<String, CliError>
where
    B: ChatBackend + ?Sized,
    W: Write,
{
    let fragments = backend.stream(history, options).await?;
    print_fragments(fragments, out).await
}

// Fragments are flushed as they arrive; the newline is only written when the
// stream ends cleanly.
async fn print_fragments<W: Write>(
    mut fragments: crate::llm::FragmentStream,
    out: &mut W,
) -> Result<String, CliError> {
    let mut text = String::new();
    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        write!(out, "{}", fragment.text)?;
        out.flush()?;
        text.push_str(&fragment.text);
    }
    writeln!(out)?;
    Ok(text)
}
