//! The browser chat UI served by `deepseek-chat`.
//!
//! | Route                                  | Purpose                                 |
//! |----------------------------------------|-----------------------------------------|
//! | `GET /`                                | the single-page interface               |
//! | `POST /api/sessions`                   | start a session                         |
//! | `GET /api/sessions/:id`                | history and auth state                  |
//! | `DELETE /api/sessions/:id`             | end a session (sent on page unload)     |
//! | `DELETE /api/sessions/:id/messages`    | new conversation                        |
//! | `POST /api/sessions/:id/messages`      | send a turn (JSON or `text/event-stream`) |
//! | `POST /api/sessions/:id/credential`    | connect with a token                    |
//! | `DELETE /api/sessions/:id/credential`  | disconnect                              |
//!
//! A streamed turn emits `fragment` events as text arrives, then exactly one
//! `done` event carrying the whole reply, or one `error` event.
//!
//! Sessions left idle for [`SESSION_IDLE_TIMEOUT`] are swept in the
//! background, so tabs that close without saying goodbye do not pile up.

mod session;

pub use session::{AppState, Connector, Session, SharedSession};

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::context::Context;
use crate::llm::{
    ChatError, Credential, FragmentStream, GenerationOptions, Message, DEFAULT_MAX_TOKENS,
};
use crate::middleware::LoggerMiddleware;
use crate::router::{IntoHandler, Router};
use crate::server::{Server, ServerError};
use crate::{Response, StatusCode};

const INDEX_HTML: &str = include_str!("static/index.html");

/// Bounds of the "max response length" setting.
pub const MAX_TOKENS_RANGE: std::ops::RangeInclusive<u32> = 100..=4000;

/// How long a session may go untouched before it is dropped.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Binds `config.listen_addr` and serves the UI until the listener fails.
pub async fn serve(config: &Config, env_credential: Option<Credential>) -> Result<(), ServerError> {
    let state = Arc::new(AppState::new(config, env_credential));
    tokio::spawn(sweep_idle_sessions(Arc::clone(&state), SWEEP_INTERVAL));
    let router = Arc::new(router(state));
    let server = Server::bind(config.listen_addr.to_string()).await?;
    info!(url = %format!("http://{}", server.local_addr()), "open the chat UI in a browser");
    server
        .run(move |request| {
            let router = Arc::clone(&router);
            async move { router.route(request).await }
        })
        .await
}

async fn sweep_idle_sessions(state: Arc<AppState>, every: Duration) {
    let mut ticks = tokio::time::interval(every);
    loop {
        ticks.tick().await;
        let evicted = state.evict_idle(SESSION_IDLE_TIMEOUT).await;
        if evicted > 0 {
            let remaining = state.session_count().await;
            info!(evicted, remaining, "idle sessions dropped");
        }
    }
}

/// All UI routes, wrapped in request logging.
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new();
    router.layer(LoggerMiddleware);

    router.get("/", |_ctx| async {
        Response::new(StatusCode::Ok)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(INDEX_HTML)
    });
    router.post("/api/sessions", with_state(&state, create_session));
    router.get("/api/sessions/:id", with_state(&state, get_session));
    router.delete("/api/sessions/:id", with_state(&state, end_session));
    router.delete("/api/sessions/:id/messages", with_state(&state, clear_messages));
    router.post("/api/sessions/:id/messages", with_state(&state, send_message));
    router.post("/api/sessions/:id/credential", with_state(&state, connect));
    router.delete("/api/sessions/:id/credential", with_state(&state, disconnect));
    router
}

fn with_state<F, Fut>(state: &Arc<AppState>, f: F) -> impl IntoHandler
where
    F: Fn(Arc<AppState>, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    let state = Arc::clone(state);
    move |ctx: Context| f(Arc::clone(&state), ctx)
}

fn error(status: StatusCode, message: impl std::fmt::Display) -> Response {
    Response::json(status, &json!({ "error": message.to_string() }))
}

fn chat_error(e: &ChatError) -> Response {
    let status = match e {
        ChatError::Authentication { .. } => StatusCode::Unauthorized,
        ChatError::InvalidRequest { .. } => StatusCode::BadRequest,
        ChatError::Service(_) => StatusCode::BadGateway,
    };
    error(status, e)
}

fn session_id(ctx: &Context) -> Result<Uuid, Response> {
    ctx.params()
        .get("id")
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| error(StatusCode::NotFound, "unknown session"))
}

async fn lookup(state: &AppState, ctx: &Context) -> Result<SharedSession, Response> {
    let id = session_id(ctx)?;
    state
        .session(&id)
        .await
        .ok_or_else(|| error(StatusCode::NotFound, "unknown session"))
}

#[derive(Serialize)]
struct SessionView<'a> {
    id: String,
    authenticated: bool,
    model: &'a str,
    messages: &'a [Message],
}

async fn create_session(state: Arc<AppState>, _ctx: Context) -> Response {
    match state.create_session().await {
        Ok((id, authenticated)) => {
            info!(session = %id, authenticated, "session created");
            Response::json(
                StatusCode::Created,
                &SessionView {
                    id: id.to_string(),
                    authenticated,
                    model: state.model(),
                    messages: &[],
                },
            )
        }
        Err(e) => chat_error(&e),
    }
}

async fn get_session(state: Arc<AppState>, ctx: Context) -> Response {
    let session = match lookup(&state, &ctx).await {
        Ok(session) => session,
        Err(res) => return res,
    };
    let session = session.lock().await;
    Response::json(
        StatusCode::Ok,
        &SessionView {
            id: ctx.params().get("id").unwrap_or_default().to_owned(),
            authenticated: session.is_authenticated(),
            model: state.model(),
            messages: &session.history,
        },
    )
}

async fn end_session(state: Arc<AppState>, ctx: Context) -> Response {
    let id = match session_id(&ctx) {
        Ok(id) => id,
        Err(res) => return res,
    };
    if state.remove_session(&id).await {
        info!(session = %id, "session ended");
        Response::new(StatusCode::NoContent)
    } else {
        error(StatusCode::NotFound, "unknown session")
    }
}

async fn clear_messages(state: Arc<AppState>, ctx: Context) -> Response {
    match lookup(&state, &ctx).await {
        Ok(session) => {
            session.lock().await.history.clear();
            Response::new(StatusCode::NoContent)
        }
        Err(res) => res,
    }
}

#[derive(Deserialize)]
struct CredentialBody {
    token: String,
}

async fn connect(state: Arc<AppState>, ctx: Context) -> Response {
    let session = match lookup(&state, &ctx).await {
        Ok(session) => session,
        Err(res) => return res,
    };
    let body: CredentialBody = match ctx.json() {
        Ok(body) => body,
        Err(e) => return error(StatusCode::BadRequest, format!("invalid body: {e}")),
    };
    let backend = match Credential::new(body.token).and_then(|c| state.connect(c)) {
        Ok(backend) => backend,
        Err(e) => return chat_error(&e),
    };
    session.lock().await.backend = Some(backend);
    Response::json(StatusCode::Ok, &json!({ "authenticated": true }))
}

async fn disconnect(state: Arc<AppState>, ctx: Context) -> Response {
    match lookup(&state, &ctx).await {
        Ok(session) => {
            session.lock().await.backend = None;
            Response::new(StatusCode::NoContent)
        }
        Err(res) => res,
    }
}

fn default_stream() -> bool {
    true
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

#[derive(Deserialize)]
struct TurnBody {
    content: String,
    #[serde(default = "default_stream")]
    stream: bool,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
}

async fn send_message(state: Arc<AppState>, ctx: Context) -> Response {
    let session = match lookup(&state, &ctx).await {
        Ok(session) => session,
        Err(res) => return res,
    };
    let body: TurnBody = match ctx.json() {
        Ok(body) => body,
        Err(e) => return error(StatusCode::BadRequest, format!("invalid body: {e}")),
    };
    let content = body.content.trim();
    if content.is_empty() {
        return error(StatusCode::BadRequest, "message is empty");
    }
    if !MAX_TOKENS_RANGE.contains(&body.max_tokens) {
        return error(
            StatusCode::UnprocessableEntity,
            format!(
                "max_tokens must be between {} and {}",
                MAX_TOKENS_RANGE.start(),
                MAX_TOKENS_RANGE.end()
            ),
        );
    }
    let options = GenerationOptions {
        max_tokens: body.max_tokens,
    };

    // Held until the turn finishes, streamed or not.
    let mut session = session.lock_owned().await;
    let Some(backend) = session.backend.clone() else {
        return error(
            StatusCode::Unauthorized,
            "not connected; supply a GitHub token or Azure key first",
        );
    };

    session.history.push(Message::user(content));

    if body.stream {
        let started = backend.stream(&session.history, options).await;
        match started {
            Ok(fragments) => Response::stream(StatusCode::Ok, sse_turn(fragments, session))
                .header("Content-Type", "text/event-stream")
                .header("Cache-Control", "no-cache"),
            Err(e) => {
                warn!(error = %e, "turn failed");
                chat_error(&e)
            }
        }
    } else {
        let completed = backend.complete(&session.history, options).await;
        match completed {
            Ok(completion) => {
                let reply = Message::assistant(completion.content().unwrap_or_default());
                session.history.push(reply.clone());
                Response::json(StatusCode::Ok, &json!({ "message": reply }))
            }
            Err(e) => {
                warn!(error = %e, "turn failed");
                chat_error(&e)
            }
        }
    }
}

fn sse_event(name: &str, data: &serde_json::Value) -> Bytes {
    Bytes::from(format!("event: {name}\ndata: {data}\n\n"))
}

struct Turn {
    fragments: FragmentStream,
    text: String,
    session: OwnedMutexGuard<Session>,
}

/// Relays fragments as SSE events. The reply joins the history only if the
/// stream finishes cleanly; the session lock is released when this stream
/// ends or is dropped.
fn sse_turn(
    fragments: FragmentStream,
    session: OwnedMutexGuard<Session>,
) -> impl futures::Stream<Item = Bytes> + Send + 'static {
    let turn = Turn {
        fragments,
        text: String::new(),
        session,
    };
    stream::unfold(Some(turn), |turn| async move {
        let mut turn = turn?;
        match turn.fragments.next().await {
            Some(Ok(fragment)) => {
                let event = sse_event("fragment", &json!({ "text": fragment.text }));
                turn.text.push_str(&fragment.text);
                Some((event, Some(turn)))
            }
            Some(Err(e)) => {
                warn!(error = %e, "stream broke mid-turn");
                Some((sse_event("error", &json!({ "error": e.to_string() })), None))
            }
            None => {
                let Turn {
                    text, mut session, ..
                } = turn;
                let event = sse_event("done", &json!({ "text": text }));
                session.history.push(Message::assistant(text));
                Some((event, None))
            }
        }
    })
}
