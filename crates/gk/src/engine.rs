//! The [`Engine`]: a [`Router`] plus route groups carrying middleware.
//!
//! Every group owns a path prefix and a list of middleware. When a request comes in, the
//! middleware of each group whose prefix is a prefix of the request path runs first, in group
//! creation order. The matched route handler runs after them.
//!
//! # Example
//! ```
//! use bytes::Bytes;
//! use gk::{Engine, middleware};
//! use http::{Request, StatusCode};
//!
//! let mut engine = Engine::new();
//! engine.use_middleware(middleware::recovery());
//! engine.get("/", |ctx| ctx.html(StatusCode::OK, "<h1>Hello gk</h1>")).unwrap();
//!
//! let mut v1 = engine.group("/v1");
//! v1.get("/hello/:name", |ctx| {
//!     let greeting = format!("hello {}", ctx.param("name"));
//!     ctx.string(StatusCode::OK, greeting);
//! })
//! .unwrap();
//!
//! let response = engine.serve(Request::get("/v1/hello/gk").body(Bytes::new()).unwrap());
//! assert_eq!(response.status(), StatusCode::OK);
//! assert_eq!(response.body().as_ref(), b"hello gk");
//! ```

use crate::context::{Context, decode_path};
use crate::error::RouteError;
use crate::handler::{HandlerFn, handler_fn};
use crate::middleware;
use crate::router::Router;
use crate::writer::{ResponseRecorder, ResponseWriter};
use arc_swap::ArcSwap;
use bytes::Bytes;
use http::{Method, Request, Response};
use std::fmt;
use std::sync::Arc;

/// Index of the group every engine starts with.
const ROOT_GROUP: usize = 0;

struct GroupEntry {
    prefix: String,
    middlewares: Vec<HandlerFn>,
}

impl GroupEntry {
    fn new(prefix: String) -> Self {
        Self { prefix, middlewares: vec![] }
    }
}

/// Route table, groups and the request entry points.
///
/// Registration needs `&mut Engine`; serving only needs `&Engine`, so a fully built engine can
/// be shared behind an [`Arc`] or a [`SharedEngine`].
pub struct Engine {
    router: Router,
    groups: Vec<GroupEntry>,
}

/// Registers routes and middleware under a common path prefix.
///
/// Obtained from [`Engine::group`] or [`RouterGroup::group`]. The group itself lives inside the
/// engine; this value only borrows it for registration.
pub struct RouterGroup<'e> {
    engine: &'e mut Engine,
    index: usize,
}

macro_rules! method_route {
    ($method:ident, $upper_case_method:ident) => {
        #[doc = concat!("Registers a `", stringify!($upper_case_method), "` route.")]
        #[inline]
        pub fn $method<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, RouteError>
        where
            F: Fn(&mut Context<'_>) + Send + Sync + 'static,
        {
            self.add_route(Method::$upper_case_method, pattern, handler)
        }
    };
}

macro_rules! method_routes {
    () => {
        method_route!(get, GET);
        method_route!(post, POST);
        method_route!(put, PUT);
        method_route!(delete, DELETE);
        method_route!(patch, PATCH);
        method_route!(head, HEAD);
        method_route!(options, OPTIONS);
    };
}

impl Engine {
    /// An engine without middleware, answering misses with a JSON `404`.
    pub fn new() -> Self {
        Self { router: Router::new(), groups: vec![GroupEntry::new(String::new())] }
    }

    /// An engine with [`middleware::logger`] and [`middleware::recovery`] installed.
    pub fn with_defaults() -> Self {
        Self::builder().with_default_middleware().build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Starts a group whose prefix is `prefix`, relative to the root.
    pub fn group(&mut self, prefix: &str) -> RouterGroup<'_> {
        self.push_group(prefix.to_string())
    }

    /// Adds middleware running for every request, matched or not.
    pub fn use_middleware<F>(&mut self, middleware: F) -> &mut Self
    where
        F: Fn(&mut Context<'_>) + Send + Sync + 'static,
    {
        self.root().use_middleware(middleware);
        self
    }

    pub fn add_route<F>(&mut self, method: Method, pattern: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: Fn(&mut Context<'_>) + Send + Sync + 'static,
    {
        self.root().add_route(method, pattern, handler)?;
        Ok(self)
    }

    method_routes!();

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Runs the chain of `request` and writes the response into `writer`.
    pub fn handle(&self, request: &Request<Bytes>, writer: &mut dyn ResponseWriter) {
        let path = decode_path(request.uri().path());
        let middlewares = self
            .groups
            .iter()
            .filter(|group| path.starts_with(group.prefix.as_str()))
            .flat_map(|group| group.middlewares.iter().map(Arc::clone))
            .collect::<Vec<_>>();

        let mut ctx = Context::new(request, writer, middlewares);
        self.router.handle(&mut ctx);
    }

    /// Handles `request` against an in-memory recorder and returns the recorded response.
    pub fn serve(&self, request: Request<Bytes>) -> Response<Bytes> {
        let mut recorder = ResponseRecorder::new();
        self.handle(&request, &mut recorder);
        recorder.into_response()
    }

    fn root(&mut self) -> RouterGroup<'_> {
        RouterGroup { engine: self, index: ROOT_GROUP }
    }

    fn push_group(&mut self, prefix: String) -> RouterGroup<'_> {
        self.groups.push(GroupEntry::new(prefix));
        let index = self.groups.len() - 1;
        RouterGroup { engine: self, index }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefixes = self.groups.iter().map(|group| group.prefix.as_str()).collect::<Vec<_>>();
        f.debug_struct("Engine").field("router", &self.router).field("groups", &prefixes).finish()
    }
}

impl RouterGroup<'_> {
    /// The full prefix of this group.
    pub fn prefix(&self) -> &str {
        &self.entry().prefix
    }

    /// Starts a nested group; its prefix is this group's prefix followed by `prefix`.
    ///
    /// The nested group starts without middleware. The middleware of this group still runs
    /// for its routes since their paths share this group's prefix.
    pub fn group(&mut self, prefix: &str) -> RouterGroup<'_> {
        let prefix = format!("{}{prefix}", self.prefix());
        self.engine.push_group(prefix)
    }

    pub fn use_middleware<F>(&mut self, middleware: F) -> &mut Self
    where
        F: Fn(&mut Context<'_>) + Send + Sync + 'static,
    {
        let index = self.index;
        self.engine.groups[index].middlewares.push(handler_fn(middleware));
        self
    }

    /// Registers `handler` for `method` at this group's prefix followed by `pattern`.
    pub fn add_route<F>(&mut self, method: Method, pattern: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: Fn(&mut Context<'_>) + Send + Sync + 'static,
    {
        let pattern = format!("{}{pattern}", self.prefix());
        self.engine.router.add_route(method, &pattern, handler_fn(handler))?;
        Ok(self)
    }

    method_routes!();

    fn entry(&self) -> &GroupEntry {
        &self.engine.groups[self.index]
    }
}

impl fmt::Debug for RouterGroup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entry = self.entry();
        f.debug_struct("RouterGroup")
            .field("prefix", &entry.prefix)
            .field("middlewares", &entry.middlewares.len())
            .finish()
    }
}

/// Configures an [`Engine`] before any route is registered.
pub struct EngineBuilder {
    not_found: Option<HandlerFn>,
    handle_method_not_allowed: bool,
    default_middleware: bool,
}

impl EngineBuilder {
    fn new() -> Self {
        Self { not_found: None, handle_method_not_allowed: false, default_middleware: false }
    }

    /// Replaces the responder used when no route matches.
    pub fn not_found_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Context<'_>) + Send + Sync + 'static,
    {
        self.not_found = Some(handler_fn(handler));
        self
    }

    /// Answers `405 Method Not Allowed` with an `Allow` header when the path matches under
    /// other methods only. Off by default, such requests get a `404`.
    pub fn handle_method_not_allowed(mut self, enabled: bool) -> Self {
        self.handle_method_not_allowed = enabled;
        self
    }

    /// Installs [`middleware::logger`] and [`middleware::recovery`] on the root group.
    pub fn with_default_middleware(mut self) -> Self {
        self.default_middleware = true;
        self
    }

    pub fn build(self) -> Engine {
        let mut engine = Engine::new();
        if let Some(not_found) = self.not_found {
            engine.router.set_not_found(not_found);
        }
        engine.router.set_handle_method_not_allowed(self.handle_method_not_allowed);
        if self.default_middleware {
            engine.use_middleware(middleware::logger()).use_middleware(middleware::recovery());
        }
        engine
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("custom_not_found", &self.not_found.is_some())
            .field("handle_method_not_allowed", &self.handle_method_not_allowed)
            .field("default_middleware", &self.default_middleware)
            .finish()
    }
}

/// An [`Engine`] that can be replaced while serving.
///
/// Each request runs against the engine loaded when it started; [`SharedEngine::store`]
/// only affects later requests.
pub struct SharedEngine {
    inner: ArcSwap<Engine>,
}

impl SharedEngine {
    pub fn new(engine: Engine) -> Self {
        Self { inner: ArcSwap::from_pointee(engine) }
    }

    /// The current engine.
    pub fn load(&self) -> Arc<Engine> {
        self.inner.load_full()
    }

    /// Replaces the engine seen by later requests.
    pub fn store(&self, engine: Engine) {
        self.inner.store(Arc::new(engine));
    }

    pub fn handle(&self, request: &Request<Bytes>, writer: &mut dyn ResponseWriter) {
        self.load().handle(request, writer);
    }

    pub fn serve(&self, request: Request<Bytes>) -> Response<Bytes> {
        self.load().serve(request)
    }
}

impl From<Engine> for SharedEngine {
    fn from(engine: Engine) -> Self {
        Self::new(engine)
    }
}

impl fmt::Debug for SharedEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedEngine").field(&*self.inner.load()).finish()
    }
}
