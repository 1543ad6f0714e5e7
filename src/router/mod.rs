//! Request routing: map URL patterns and HTTP methods to handler functions.
//!
//! Two pattern styles are supported:
//!
//! | Pattern                      | Example match               | Captured params |
//! |------------------------------|-----------------------------|-----------------|
//! | `/api/sessions`              | `/api/sessions`             | *(none)*        |
//! | `/api/sessions/:id/messages` | `/api/sessions/7/messages`  | `id → "7"`      |
//!
//! Trailing slashes are normalized on both patterns and incoming paths.
//! Routes are matched in registration order; the first route whose method
//! and pattern both match wins. A path that matches some route under a
//! different method gets `405 Method Not Allowed`, anything else `404`.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::middleware::{Middleware, MiddlewareHandler, Next, from_middleware};
use crate::{Method, Request, Response, StatusCode};

/// Type-erased async handler stored by the router.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this through the blanket impl below.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

fn into_handler(handler: impl IntoHandler) -> Handler {
    Arc::new(move |ctx| handler.call(ctx))
}

#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

/// Compiled route pattern.
#[derive(Debug, Clone)]
struct Pattern {
    segments: Vec<Segment>,
}

impl Pattern {
    fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Parameter(name.to_string()),
                None => Segment::Static(s.to_string()),
            })
            .collect();
        Self { segments }
    }

    // Matches `path`, returning the captured parameters.
    fn matches(&self, path: &str) -> Option<PathParams> {
        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if path_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = PathParams::new();
        for (seg, path_seg) in self.segments.iter().zip(path_segments) {
            match seg {
                Segment::Static(s) if s == path_seg => {}
                Segment::Static(_) => return None,
                Segment::Parameter(name) => {
                    params.insert(name.clone(), path_seg.to_string());
                }
            }
        }
        Some(params)
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

/// HTTP request router with a middleware stack.
///
/// # Examples
///
/// ```rust,no_run
/// use deepseek_chat::{Router, Response, StatusCode, context::Context};
///
/// let mut router = Router::new();
/// router.get("/api/sessions/:id", |ctx: Context| async move {
///     let id = ctx.params().get("id").unwrap_or("unknown").to_owned();
///     Response::new(StatusCode::Ok).body(id)
/// });
/// ```
pub struct Router {
    routes: Vec<Route>,
    middlewares: Arc<[MiddlewareHandler]>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            middlewares: Arc::from(Vec::new()),
        }
    }

    /// Register a handler for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Register a handler for `POST` requests matching `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    /// Register a handler for `DELETE` requests matching `path`.
    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Delete, path, handler);
    }

    /// Appends a middleware; layers run in the order they were added.
    pub fn layer<M>(&mut self, middleware: M)
    where
        M: Middleware + 'static,
    {
        let mut stack = self.middlewares.to_vec();
        stack.push(from_middleware(Arc::new(middleware)));
        self.middlewares = Arc::from(stack);
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler: into_handler(handler),
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Runs `request` through the middleware stack and the first matching route.
    pub async fn route(&self, request: Request) -> Response {
        let (endpoint, params) = self.resolve(request.method(), request.path());
        let ctx = Context::with_params(request, params);
        Next::new(Arc::clone(&self.middlewares), endpoint)
            .run(ctx)
            .await
    }

    fn resolve(&self, method: &Method, path: &str) -> (Handler, PathParams) {
        let mut path_known = false;
        for route in &self.routes {
            if let Some(params) = route.pattern.matches(path) {
                if &route.method == method {
                    return (Arc::clone(&route.handler), params);
                }
                path_known = true;
            }
        }

        let status = if path_known {
            StatusCode::MethodNotAllowed
        } else {
            StatusCode::NotFound
        };
        let fallback = into_handler(move |_ctx: Context| async move { Response::new(status) });
        (fallback, PathParams::new())
    }
}
