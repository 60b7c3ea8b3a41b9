//! An embeddable HTTP request router with a middleware dispatch chain
//!
//! This crate maps `(method, path)` pairs to handlers through a per-method prefix tree and
//! runs each request through an ordered chain of middleware before the matched handler.
//! It never opens a socket: whatever accepts connections hands the [`Engine`] an
//! [`http::Request`] and a [`ResponseWriter`].
//!
//! # Features
//!
//! - Static segments, `:name` parameters and `*name` catch-all wildcards
//! - Literal segments take precedence over parameters, with backtracking
//! - Route groups sharing a path prefix and their own middleware
//! - Onion-style middleware: code after [`Context::next`] runs once the rest of the chain is done
//! - Panic recovery and request logging middleware
//! - Hot swapping of a fully built engine through [`SharedEngine`]
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use gk::{Context, Engine, middleware};
//! use http::{Request, StatusCode};
//!
//! let mut engine = Engine::new();
//! engine.use_middleware(middleware::logger()).use_middleware(middleware::recovery());
//!
//! engine.get("/hello", |ctx: &mut Context<'_>| {
//!     let greeting = format!("hello {}, you're at {}", ctx.query("name"), ctx.path());
//!     ctx.string(StatusCode::OK, greeting);
//! })
//! .unwrap();
//!
//! let request = Request::get("/hello?name=gk").body(Bytes::new()).unwrap();
//! let response = engine.serve(request);
//! assert_eq!(response.body().as_ref(), b"hello gk, you're at /hello");
//! ```

mod context;
mod engine;
mod error;
mod handler;
mod router;
mod tree;
mod writer;

pub mod middleware;

pub use context::Context;
pub use context::Params;
pub use engine::Engine;
pub use engine::EngineBuilder;
pub use engine::RouterGroup;
pub use engine::SharedEngine;
pub use error::BindError;
pub use error::RouteError;
pub use handler::HandlerFn;
pub use handler::HandlersChain;
pub use handler::handler_fn;
pub use router::RouteMatch;
pub use router::Router;
pub use tree::Node;
pub use writer::ResponseRecorder;
pub use writer::ResponseWriter;
