//! Method-scoped route table.
//!
//! The [`Router`] keeps one prefix tree per HTTP method and a table of handlers keyed by
//! method and pattern. The tree only answers *which pattern* matched a path; the handler
//! table is the single source of truth for *what runs*.
//!
//! # Example
//! ```
//! use gk::{handler_fn, Router};
//! use http::Method;
//!
//! let mut router = Router::new();
//! router.add_route(Method::GET, "/p/:lang/doc", handler_fn(|_ctx| {})).unwrap();
//!
//! let route = router.match_route(&Method::GET, "/p/rust/doc").unwrap();
//! assert_eq!(route.pattern(), "/p/:lang/doc");
//! assert_eq!(route.params()["lang"], "rust");
//! assert!(router.match_route(&Method::POST, "/p/rust/doc").is_none());
//! ```

use crate::context::{Context, Params};
use crate::error::RouteError;
use crate::handler::{HandlerFn, handler_fn};
use crate::tree::Node;
use http::{Method, StatusCode, header};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Per-method routing trees plus the handlers registered on them.
pub struct Router {
    roots: HashMap<Method, Node>,
    handlers: HashMap<String, HandlerFn>,
    not_found: HandlerFn,
    handle_method_not_allowed: bool,
}

/// A successful lookup: the matched pattern, its handler and the extracted parameters.
pub struct RouteMatch<'router> {
    pattern: &'router str,
    handler: &'router HandlerFn,
    params: Params,
}

impl Router {
    pub fn new() -> Self {
        Self {
            roots: HashMap::new(),
            handlers: HashMap::new(),
            not_found: handler_fn(default_not_found),
            handle_method_not_allowed: false,
        }
    }

    pub(crate) fn set_not_found(&mut self, handler: HandlerFn) {
        self.not_found = handler;
    }

    pub(crate) fn set_handle_method_not_allowed(&mut self, enabled: bool) {
        self.handle_method_not_allowed = enabled;
    }

    /// Registers `handler` for `method` and `pattern`.
    ///
    /// Registering the same method and pattern again replaces the handler and leaves the
    /// tree untouched. Patterns are stored as `/` joined segments, so `/p/` and `/p` are the
    /// same route.
    pub fn add_route(&mut self, method: Method, pattern: &str, handler: HandlerFn) -> Result<(), RouteError> {
        let parts = parse_pattern(pattern)?;
        let pattern = format!("/{}", parts.join("/"));
        debug!(method = %method, pattern = %pattern, "add route");

        let key = handler_key(&method, &pattern);
        self.roots.entry(method).or_default().insert(&pattern, &parts, 0);
        self.handlers.insert(key, handler);
        Ok(())
    }

    /// Finds the node of the route matching `path` under `method`, with its parameters.
    pub fn get_route(&self, method: &Method, path: &str) -> Option<(&Node, Params)> {
        let root = self.roots.get(method)?;
        let search_parts = split_path(path);
        let node = root.search(&search_parts, 0)?;
        let params = extract_params(node.pattern(), &search_parts);
        Some((node, params))
    }

    /// Resolves `method` and `path` to a registered handler.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        let (node, params) = self.get_route(method, path)?;
        let handler = self.handlers.get(&handler_key(method, node.pattern()))?;
        Some(RouteMatch { pattern: node.pattern(), handler, params })
    }

    /// Patterns registered under `method`, in tree order.
    pub fn routes(&self, method: &Method) -> Vec<&str> {
        let mut nodes = vec![];
        if let Some(root) = self.roots.get(method) {
            root.travel(&mut nodes);
        }
        nodes.into_iter().map(Node::pattern).collect()
    }

    /// Every registered route, grouped by method name.
    pub fn all_routes(&self) -> Vec<(&Method, &str)> {
        let mut methods = self.roots.keys().collect::<Vec<_>>();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        methods.into_iter().flat_map(|method| self.routes(method).into_iter().map(move |pattern| (method, pattern))).collect()
    }

    /// Methods under which `path` matches a route, sorted by name.
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let search_parts = split_path(path);
        let mut methods = self
            .roots
            .iter()
            .filter(|(_, root)| root.search(&search_parts, 0).is_some())
            .map(|(method, _)| method.clone())
            .collect::<Vec<_>>();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }

    /// Number of tree nodes under `method`, root included; zero for an unknown method.
    pub fn node_count(&self, method: &Method) -> usize {
        self.roots.get(method).map_or(0, Node::node_count)
    }

    /// Resolves the route of `ctx`, appends its handler (or the miss responder) to the chain
    /// and runs the chain.
    pub fn handle(&self, ctx: &mut Context<'_>) {
        let method = ctx.method().clone();
        match self.match_route(&method, ctx.path()) {
            Some(route) => {
                ctx.set_params(route.params);
                ctx.push_handler(Arc::clone(route.handler));
            }
            None => {
                let handler = self.miss_handler(ctx.path());
                ctx.push_handler(handler);
            }
        }
        ctx.next();
    }

    fn miss_handler(&self, path: &str) -> HandlerFn {
        if self.handle_method_not_allowed {
            let allowed = self.allowed_methods(path);
            if !allowed.is_empty() {
                return method_not_allowed(&allowed);
            }
        }
        Arc::clone(&self.not_found)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.all_routes())
            .field("handle_method_not_allowed", &self.handle_method_not_allowed)
            .finish_non_exhaustive()
    }
}

impl<'router> RouteMatch<'router> {
    pub fn pattern(&self) -> &'router str {
        self.pattern
    }

    pub fn handler(&self) -> &'router HandlerFn {
        self.handler
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn into_params(self) -> Params {
        self.params
    }
}

impl fmt::Debug for RouteMatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch").field("pattern", &self.pattern).field("params", &self.params).finish_non_exhaustive()
    }
}

/// Splits a route pattern into segments, rejecting malformed wildcards.
///
/// `"/"` yields no segment and registers the root itself.
pub(crate) fn parse_pattern(pattern: &str) -> Result<Vec<&str>, RouteError> {
    if pattern.is_empty() {
        return Err(RouteError::EmptyPattern);
    }

    let parts = split_path(pattern);
    for (index, part) in parts.iter().enumerate() {
        if *part == ":" || *part == "*" {
            return Err(RouteError::unnamed_param(pattern, *part));
        }
        if part.starts_with('*') && index + 1 != parts.len() {
            return Err(RouteError::wildcard_not_last(pattern, *part));
        }
    }
    Ok(parts)
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

fn handler_key(method: &Method, pattern: &str) -> String {
    format!("{method}-{pattern}")
}

/// Binds `:name` segments to one request segment and `*name` to the rest of the path.
fn extract_params(pattern: &str, search_parts: &[&str]) -> Params {
    let mut params = Params::new();
    for (index, part) in split_path(pattern).into_iter().enumerate() {
        if let Some(name) = part.strip_prefix(':') {
            if let Some(value) = search_parts.get(index) {
                params.insert(name.to_string(), (*value).to_string());
            }
        } else if let Some(name) = part.strip_prefix('*') {
            let rest = search_parts.get(index..).map(|rest| rest.join("/")).unwrap_or_default();
            params.insert(name.to_string(), rest);
            break;
        }
    }
    params
}

fn default_not_found(ctx: &mut Context<'_>) {
    let message = format!("404 NOT FOUND: {}", ctx.path());
    ctx.fail(StatusCode::NOT_FOUND, message);
}

fn method_not_allowed(allowed: &[Method]) -> HandlerFn {
    let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
    handler_fn(move |ctx| {
        ctx.set_header(header::ALLOW, allow.as_str());
        ctx.fail(StatusCode::METHOD_NOT_ALLOWED, "405 METHOD NOT ALLOWED");
    })
}
