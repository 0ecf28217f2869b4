//! Request middleware chain.
//!
//! Middleware run in registration order before the request reaches its
//! module. Each one either passes the (possibly modified) request on or
//! answers it directly, which ends the chain.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// What a middleware decided about a request.
pub enum Flow {
    Next(Request<Body>),
    Respond(Response),
}

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: Request<Body>) -> Flow;
}

/// Adapter turning an async closure into a [`Middleware`].
pub struct FnMiddleware<F>(pub F);

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync,
    Fut: Future<Output = Flow> + Send,
{
    async fn handle(&self, req: Request<Body>) -> Flow {
        (self.0)(req).await
    }
}

#[derive(Clone, Default)]
pub struct MiddlewareChain {
    stack: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the end of the chain.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.stack.push(middleware);
    }

    /// Insert ahead of everything registered so far.
    pub fn prepend(&mut self, middleware: Arc<dyn Middleware>) {
        self.stack.insert(0, middleware);
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Run the chain, then `next` exactly once unless a middleware answered.
    pub async fn route<F, Fut>(&self, mut req: Request<Body>, next: F) -> Response
    where
        F: FnOnce(Request<Body>) -> Fut,
        Fut: Future<Output = Response>,
    {
        for middleware in &self.stack {
            match middleware.handle(req).await {
                Flow::Next(passed) => req = passed,
                Flow::Respond(response) => return response,
            }
        }
        next(req).await
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.stack.len())
            .finish()
    }
}

/// Axum adapter, installed with `middleware::from_fn_with_state`.
pub async fn chain_layer(
    State(chain): State<Arc<MiddlewareChain>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if chain.is_empty() {
        return next.run(req).await;
    }
    chain.route(req, |req| next.run(req)).await
}

/// Redirects slash-less `GET` paths to their trailing-slash form.
#[derive(Debug, Clone, Copy, Default)]
pub struct Endslash;

#[async_trait]
impl Middleware for Endslash {
    async fn handle(&self, req: Request<Body>) -> Flow {
        let uri = req.uri();
        if req.method() != Method::GET || uri.query().is_some() || uri.path().ends_with('/') {
            return Flow::Next(req);
        }
        let location = format!("{}/", uri.path());
        tracing::debug!(from = %uri.path(), to = %location, "Trailing slash redirect");
        Flow::Respond((StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response())
    }
}
