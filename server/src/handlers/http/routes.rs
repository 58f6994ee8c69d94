use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Method, Request, Response, StatusCode};
use tracing::warn;

use crate::AppState;
use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::handlers::http::utils::deliver_text;
use crate::handlers::http::{account, token, users};

pub type HttpBody = BoxBody<Bytes, Infallible>;
pub type HttpResponse = Response<HttpBody>;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send>>;

// ---------------------------------------------------------------------------
// Handler type aliases
// ---------------------------------------------------------------------------
//
// Handlers receive the request with its body already collected.
//
//   RouteHandler  - no auth. Receives (req, state).
//                   Use for: /account/register, /api/token.
//
//   AuthHandler   - bearer token verified by the router first.
//                   Receives (req, state, auth).

type RouteHandler = Box<dyn Fn(Request<Bytes>, AppState) -> HandlerFuture + Send + Sync>;

type AuthHandler =
    Box<dyn Fn(Request<Bytes>, AppState, AuthContext) -> HandlerFuture + Send + Sync>;

enum RouteKind {
    Open(RouteHandler),
    Authenticated(AuthHandler),
}

struct Route {
    method: Method,
    pattern: String,
    kind: RouteKind,
}

/// Values captured by `:name` / `#name` segments, stored in the request
/// extensions before the handler runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(HashMap<String, String>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

pub struct Router {
    routes: Vec<Route>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes_count", &self.routes.len())
            .finish()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    fn open<F, Fut>(mut self, method: Method, pattern: &str, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            pattern: pattern.to_string(),
            kind: RouteKind::Open(Box::new(move |req, state| Box::pin(handler(req, state)))),
        });
        self
    }

    /// POST with no authentication.
    pub fn post<F, Fut>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.open(Method::POST, pattern, handler)
    }

    /// GET behind the bearer token gate.
    pub fn get_auth<F, Fut>(mut self, pattern: &str, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState, AuthContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.routes.push(Route {
            method: Method::GET,
            pattern: pattern.to_string(),
            kind: RouteKind::Authenticated(Box::new(move |req, state, auth| {
                Box::pin(handler(req, state, auth))
            })),
        });
        self
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    pub async fn route(&self, mut req: Request<Bytes>, state: AppState) -> Result<HttpResponse> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let mut other_method = false;

        for route in &self.routes {
            let Some(params) = Self::match_path(&route.pattern, &path) else {
                continue;
            };
            if route.method != method {
                other_method = true;
                continue;
            }
            req.extensions_mut().insert(params);

            return match &route.kind {
                RouteKind::Open(h) => h(req, state).await,

                RouteKind::Authenticated(h) => {
                    let auth = state.verifier.authenticate(req.headers());
                    match auth {
                        Some(auth) => h(req, state, auth).await,
                        None => {
                            warn!("Auth rejected {} {}", method, path);
                            Ok(ApiError::Unauthenticated.to_response())
                        }
                    }
                }
            };
        }

        if other_method {
            return Ok(deliver_text(
                StatusCode::METHOD_NOT_ALLOWED,
                "Method not allowed",
            ));
        }
        Ok(ApiError::NotFound.to_response())
    }

    /// Segment-wise match. `:name` takes any non-empty segment, `#name` only
    /// ASCII digits.
    pub fn match_path(pattern: &str, request_path: &str) -> Option<PathParams> {
        let clean = request_path.split('?').next().unwrap_or(request_path);

        let pattern_segs: Vec<&str> = pattern.split('/').collect();
        let path_segs: Vec<&str> = clean.split('/').collect();

        if pattern_segs.len() != path_segs.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (p, s) in pattern_segs.iter().zip(path_segs.iter()) {
            if let Some(name) = p.strip_prefix(':') {
                if s.is_empty() {
                    return None;
                }
                params.insert(name.to_string(), s.to_string());
            } else if let Some(name) = p.strip_prefix('#') {
                if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                params.insert(name.to_string(), s.to_string());
            } else if p != s {
                return None;
            }
        }
        Some(PathParams(params))
    }
}

pub fn build_router() -> Router {
    Router::new()
        .post("/account/register", |req, state| async move {
            account::handle_register(req, state)
                .await
                .context("Registration failed")
        })
        .post("/api/token", |req, state| async move {
            token::handle_token(req, state)
                .await
                .context("Token grant failed")
        })
        .get_auth("/api/users", |req, state, auth| async move {
            users::handle_list_users(req, state, auth)
                .await
                .context("User listing failed")
        })
        .get_auth("/api/users/#id", |req, state, auth| async move {
            users::handle_get_user(req, state, auth)
                .await
                .context("User lookup failed")
        })
}
