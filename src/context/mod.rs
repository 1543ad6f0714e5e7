//! Per-request context handed to route handlers.

use std::collections::HashMap;

use crate::Request;

/// Path parameters captured by the matched route (`/api/sessions/:id`).
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }
}

/// A request plus whatever the router extracted from its path.
pub struct Context {
    request: Request,
    params: PathParams,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self { request, params }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Deserializes the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Turn {
        content: String,
    }

    #[test]
    fn json_body_decodes() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 17\r\n\r\n{\"content\":\"hi\"}\n";
        let (req, _) = Request::parse(raw).unwrap();
        let turn: Turn = Context::new(req).json().unwrap();
        assert_eq!(turn.content, "hi");
    }

    #[test]
    fn params_are_exposed() {
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let mut params = PathParams::new();
        params.insert("id".into(), "42".into());
        let ctx = Context::with_params(req, params);
        assert_eq!(ctx.params().get("id"), Some("42"));
        assert_eq!(ctx.params().get("missing"), None);
    }
}
