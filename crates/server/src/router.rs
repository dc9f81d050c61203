//! Request router for the resource and share APIs.
//!
//! The router takes a transport-neutral [`ApiRequest`], resolves the acting
//! user, dispatches on path prefix and method, and renders an
//! [`ApiResponse`]. Filesystem and store work is blocking, so each request
//! runs on the blocking thread pool.

use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::ResourceError;
use crate::resources::{PatchAction, ReadOptions, ResourceEngine, WriteMethod, Written};
use crate::runner::{HookError, RunOutcome};
use crate::shares::{CreatedLink, ShareService};
use crate::users::{User, UserResolver};

/// Prefix of the resource API.
pub const RESOURCES_PREFIX: &str = "/api/resources";

/// Prefix of the share API.
pub const SHARE_PREFIX: &str = "/api/share";

/// Header carrying hook failures.
pub const HOOK_ERROR_HEADER: &str = "X-Hook-Error";

/// Errors that can occur during routing.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The operation itself failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// No route matches the path.
    #[error("no route for {0}")]
    UnknownRoute(String),

    /// The response payload could not be encoded.
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The blocking worker did not complete.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl RouterError {
    pub fn status_code(&self) -> u16 {
        match self {
            RouterError::Resource(e) => e.status_code(),
            RouterError::UnknownRoute(_) => 404,
            RouterError::Encode(_) | RouterError::Worker(_) => 500,
        }
    }

    /// Message safe to return to a client.
    pub fn public_message(&self) -> String {
        match self {
            RouterError::Resource(e) => e.public_message(),
            RouterError::UnknownRoute(_) => "not found".to_string(),
            RouterError::Encode(_) | RouterError::Worker(_) => "internal error".to_string(),
        }
    }
}

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(format!("unsupported method: {}", other)),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// An inbound request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Full request path including the API prefix.
    pub path: String,
    /// Decoded query parameters.
    pub query: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    /// Identity established by the transport, if any.
    pub username: Option<String>,
    /// The request arrived over an encrypted connection.
    pub secure: bool,
    pub body: Vec<u8>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            cookies: HashMap::new(),
            username: None,
            secure: false,
            body: Vec::new(),
        }
    }

    pub fn user(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    fn query_str(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}

/// Response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(serde_json::Value),
    Text(String),
}

/// An outbound response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn empty() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: ResponseBody::Empty,
        }
    }

    pub fn json<T: Serialize>(value: &T) -> Result<Self, RouterError> {
        Ok(Self {
            status: 200,
            headers: Vec::new(),
            body: ResponseBody::Json(serde_json::to_value(value)?),
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: ResponseBody::Text(text.into()),
        }
    }

    pub fn error(err: &RouterError) -> Self {
        Self {
            status: err.status_code(),
            headers: Vec::new(),
            body: ResponseBody::Text(err.public_message()),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a header.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Render the body as text for display.
    pub fn body_text(&self) -> String {
        match &self.body {
            ResponseBody::Empty => String::new(),
            ResponseBody::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            ResponseBody::Text(text) => text.clone(),
        }
    }
}

/// Router for the resource and share APIs.
#[derive(Clone)]
pub struct ApiRouter {
    users: Arc<dyn UserResolver>,
    engine: Arc<ResourceEngine>,
    shares: Arc<ShareService>,
}

impl fmt::Debug for ApiRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRouter")
            .field("engine", &self.engine)
            .field("shares", &self.shares)
            .finish_non_exhaustive()
    }
}

impl ApiRouter {
    pub fn new(
        users: Arc<dyn UserResolver>,
        engine: ResourceEngine,
        shares: Arc<ShareService>,
    ) -> Self {
        Self {
            users,
            engine: Arc::new(engine),
            shares,
        }
    }

    /// Route a request and render the response.
    pub async fn route(&self, req: ApiRequest) -> ApiResponse {
        let router = self.clone();
        let result = tokio::task::spawn_blocking(move || router.handle(req))
            .await
            .unwrap_or_else(|e| Err(RouterError::Worker(e.to_string())));

        match result {
            Ok(response) => response,
            Err(e) => {
                if e.status_code() >= 500 {
                    error!(error = %e, "Request failed");
                }
                ApiResponse::error(&e)
            }
        }
    }

    /// Route a request on the current thread.
    pub fn handle(&self, req: ApiRequest) -> Result<ApiResponse, RouterError> {
        debug!(method = %req.method, path = %req.path, "Routing request");

        let user = req
            .username
            .as_deref()
            .and_then(|name| self.users.resolve(name))
            .ok_or(ResourceError::Unauthorized)?;

        if let Some(rel) = strip_route(&req.path, RESOURCES_PREFIX) {
            let rel = rel.to_string();
            return self.handle_resource(&user, &rel, req);
        }

        if let Some(rel) = strip_route(&req.path, SHARE_PREFIX) {
            let rel = rel.to_string();
            return self.handle_share(&user, &rel, req);
        }

        Err(RouterError::UnknownRoute(req.path))
    }

    // =========================================================================
    // Resources
    // =========================================================================

    fn handle_resource(
        &self,
        user: &User,
        rel: &str,
        req: ApiRequest,
    ) -> Result<ApiResponse, RouterError> {
        match req.method {
            Method::Get => {
                let opts = ReadOptions {
                    query: req.query,
                    cookies: req.cookies,
                    secure: req.secure,
                };
                let read = self.engine.get(user, rel, &opts)?;

                let mut response = ApiResponse::json(&read.info)?;
                for cookie in &read.cookies {
                    response = response.with_header("Set-Cookie", cookie.to_header());
                }
                Ok(response)
            }
            Method::Delete => {
                let outcome = self.engine.delete(user, rel)?;
                finish(outcome, |()| ApiResponse::empty())
            }
            Method::Post | Method::Put => {
                let method = if req.method == Method::Post {
                    WriteMethod::Post
                } else {
                    WriteMethod::Put
                };
                let override_existing = req.query_str("override") == Some("true");
                let mut body = Cursor::new(req.body);

                let outcome = self
                    .engine
                    .write(user, rel, method, override_existing, &mut body)?;
                finish(outcome, |written| match written {
                    Written::File { etag } => ApiResponse::empty().with_header("ETag", etag),
                    Written::Directory => ApiResponse::empty(),
                })
            }
            Method::Patch => {
                let destination = req.query_str("destination").unwrap_or_default();
                let action = PatchAction::parse(req.query_str("action"));

                let outcome = self.engine.patch(user, rel, destination, action)?;
                finish(outcome, |()| ApiResponse::empty())
            }
        }
    }

    // =========================================================================
    // Shares
    // =========================================================================

    fn handle_share(
        &self,
        user: &User,
        rel: &str,
        req: ApiRequest,
    ) -> Result<ApiResponse, RouterError> {
        match req.method {
            Method::Get => {
                let links = self.shares.list(user, rel)?;
                ApiResponse::json(&links)
            }
            Method::Post => {
                let created = self.shares.create(
                    user,
                    rel,
                    req.query_str("expires"),
                    req.query_str("unit"),
                )?;
                match created {
                    CreatedLink::Reused(link) => Ok(ApiResponse::text(self.shares.url_for(&link))),
                    CreatedLink::Created(link) => ApiResponse::json(&link),
                }
            }
            Method::Delete => {
                self.shares.delete(user, rel)?;
                Ok(ApiResponse::empty())
            }
            Method::Put | Method::Patch => Err(ResourceError::MethodNotAllowed.into()),
        }
    }
}

/// Strip a route prefix, matching only at a segment boundary.
fn strip_route<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Render a hook-wrapped outcome, attaching hook failures as headers.
fn finish<T>(
    outcome: RunOutcome<T>,
    render: impl FnOnce(T) -> ApiResponse,
) -> Result<ApiResponse, RouterError> {
    let RunOutcome {
        result,
        hook_errors,
    } = outcome;

    let mut response = match result {
        Ok(value) => render(value),
        Err(e) => ApiResponse::error(&RouterError::Resource(e)),
    };

    for err in &hook_errors {
        warn!(error = %err, "Hook failed");
        response = response.with_header(HOOK_ERROR_HEADER, hook_error_header(err));
    }

    Ok(response)
}

fn hook_error_header(err: &HookError) -> String {
    match err {
        HookError::Spawn { event, .. } | HookError::Failed { event, .. } => {
            format!("{}: {}", event, err)
        }
    }
}
