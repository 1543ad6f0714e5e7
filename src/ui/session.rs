//! In-memory chat sessions.
//!
//! Nothing here outlives the process. Each session sits behind its own
//! async mutex, which serializes its turns; the map lock is only held long
//! enough to look a session up, insert one or sweep idle ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::Config;
use crate::llm::{ChatBackend, ChatClient, ChatError, Credential, Message};

/// Builds a backend from a credential.
pub type Connector =
    Arc<dyn Fn(Credential) -> Result<Arc<dyn ChatBackend>, ChatError> + Send + Sync + 'static>;

/// One browser conversation.
#[derive(Default)]
pub struct Session {
    pub history: Vec<Message>,
    /// `None` until a credential has been supplied.
    pub backend: Option<Arc<dyn ChatBackend>>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.backend.is_some()
    }
}

pub type SharedSession = Arc<Mutex<Session>>;

struct Entry {
    session: SharedSession,
    last_used: Instant,
}

/// Shared state behind every UI route.
pub struct AppState {
    model: String,
    env_credential: Option<Credential>,
    /// Built on first use, then shared by every session that starts with
    /// the environment credential.
    env_backend: OnceCell<Arc<dyn ChatBackend>>,
    connector: Connector,
    sessions: Mutex<HashMap<Uuid, Entry>>,
}

impl AppState {
    /// State whose sessions talk to the hosted endpoint described by `config`.
    pub fn new(config: &Config, env_credential: Option<Credential>) -> Self {
        let model = config.model.clone();
        let config = config.clone();
        let connector: Connector = Arc::new(
            move |credential: Credential| -> Result<Arc<dyn ChatBackend>, ChatError> {
                Ok(Arc::new(ChatClient::new(credential, &config)?))
            },
        );
        Self::with_connector(model, env_credential, connector)
    }

    /// State with a custom backend factory.
    pub fn with_connector(
        model: impl Into<String>,
        env_credential: Option<Credential>,
        connector: Connector,
    ) -> Self {
        Self {
            model: model.into(),
            env_credential,
            env_backend: OnceCell::new(),
            connector,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Creates a session, already connected if a credential came from the
    /// environment.
    pub async fn create_session(&self) -> Result<(Uuid, bool), ChatError> {
        let mut session = Session::default();
        if let Some(credential) = &self.env_credential {
            let backend = self
                .env_backend
                .get_or_try_init(|| async { (self.connector)(credential.clone()) })
                .await?;
            session.backend = Some(Arc::clone(backend));
        }
        let authenticated = session.is_authenticated();

        let id = Uuid::new_v4();
        let entry = Entry {
            session: Arc::new(Mutex::new(session)),
            last_used: Instant::now(),
        };
        self.sessions.lock().await.insert(id, entry);
        Ok((id, authenticated))
    }

    /// Looks a session up and marks it as used.
    pub async fn session(&self, id: &Uuid) -> Option<SharedSession> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(id)?;
        entry.last_used = Instant::now();
        Some(Arc::clone(&entry.session))
    }

    /// Forgets a session. A turn already in flight finishes on its own copy.
    pub async fn remove_session(&self, id: &Uuid) -> bool {
        self.sessions.lock().await.remove(id).is_some()
    }

    /// Drops sessions untouched for at least `max_idle`, except ones a
    /// request still holds. Returns how many were dropped.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| {
            entry.last_used.elapsed() < max_idle || Arc::strong_count(&entry.session) > 1
        });
        before - sessions.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub fn connect(&self, credential: Credential) -> Result<Arc<dyn ChatBackend>, ChatError> {
        (self.connector)(credential)
    }
}
