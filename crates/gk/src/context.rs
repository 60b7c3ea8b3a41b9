//! Per-request state shared by every handler of a dispatch chain.
//!
//! A [`Context`] is created for each inbound request and dropped once the response is
//! written. It carries:
//! - a snapshot of the request (method, path) and the path parameters found by the router
//! - the ordered handlers of the request and a cursor into them
//! - the response sink plus helpers writing status, headers and bodies into it
//! - a small key/value store middleware use to pass data downstream
//!
//! # Dispatch
//!
//! [`Context::next`] runs the remaining handlers in order. A handler calling `next` itself
//! suspends until everything after it has run, so code before `next` executes in chain
//! order and code after it in reverse order:
//!
//! ```
//! use gk::{Engine, Context};
//!
//! let mut engine = Engine::new();
//! engine.use_middleware(|ctx: &mut Context<'_>| {
//!     // runs first
//!     ctx.next();
//!     // runs last
//! });
//! ```
//!
//! [`Context::abort`] and [`Context::fail`] move the cursor past the end, so no handler
//! runs afterwards, including the ones still suspended inside `next`.

use crate::error::BindError;
use crate::handler::HandlersChain;
use crate::writer::ResponseWriter;
use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, Request, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Path parameters extracted by the router, keyed by parameter name.
pub type Params = HashMap<String, String>;

/// The mutable state of one request, handed to every handler of its chain.
pub struct Context<'a> {
    request: &'a Request<Bytes>,
    writer: &'a mut dyn ResponseWriter,

    path: String,
    method: Method,
    params: Params,

    status_code: StatusCode,

    handlers: HandlersChain,
    /// index of the next handler to run
    index: usize,
    aborted: bool,

    keys: HashMap<String, Value>,
}

impl<'a> Context<'a> {
    /// Creates a context for `request` writing into `writer`, with the given handlers.
    ///
    /// Nothing runs until [`Context::next`] is called.
    pub fn new(request: &'a Request<Bytes>, writer: &'a mut dyn ResponseWriter, handlers: HandlersChain) -> Self {
        Self {
            request,
            writer,
            path: decode_path(request.uri().path()).into_owned(),
            method: request.method().clone(),
            params: Params::new(),
            status_code: StatusCode::OK,
            handlers,
            index: 0,
            aborted: false,
            keys: HashMap::new(),
        }
    }

    pub(crate) fn push_handler(&mut self, handler: crate::HandlerFn) {
        self.handlers.push(handler);
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Runs the remaining handlers of the chain.
    ///
    /// Calling it once the chain is exhausted, or after an abort, does nothing.
    pub fn next(&mut self) {
        while self.index < self.handlers.len() {
            let handler = Arc::clone(&self.handlers[self.index]);
            self.index += 1;
            handler(self);
        }
    }

    /// Stops the chain: no further handler runs. Nothing is written.
    pub fn abort(&mut self) {
        self.index = self.handlers.len();
        self.aborted = true;
    }

    /// Stops the chain and writes `code` as the response status.
    pub fn abort_with_status(&mut self, code: StatusCode) {
        self.abort();
        self.status(code);
    }

    /// Stops the chain and responds with `{"message": <message>}`.
    pub fn fail(&mut self, code: StatusCode, message: impl Into<String>) {
        self.abort();
        self.json(code, &json!({ "message": message.into() }));
    }

    /// True once [`Context::abort`] or one of its variants was called.
    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    // request side

    pub fn request(&self) -> &Request<Bytes> {
        self.request
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Value of the path parameter `key`, or `""` when the route has no such parameter.
    pub fn param(&self, key: &str) -> &str {
        self.params.get(key).map_or("", String::as_str)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// First value of the query parameter `key`, or an empty string.
    pub fn query(&self, key: &str) -> String {
        self.request.uri().query().and_then(|query| lookup(query.as_bytes(), key)).unwrap_or_default()
    }

    /// First value of the form field `key`: urlencoded body fields first, then the query.
    pub fn post_form(&self, key: &str) -> String {
        if self.has_content_type(&mime::APPLICATION_WWW_FORM_URLENCODED) {
            if let Some(value) = lookup(self.request.body(), key) {
                return value;
            }
        }
        self.query(key)
    }

    /// Request header value, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers().get(name).and_then(|value| value.to_str().ok())
    }

    /// Deserializes the query string with `serde_qs`.
    pub fn bind_query<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        let query = self.request.uri().query().ok_or(BindError::MissingQuery)?;
        Ok(serde_qs::from_str::<T>(query)?)
    }

    /// Deserializes an `application/x-www-form-urlencoded` body.
    pub fn bind_form<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        Ok(serde_urlencoded::from_bytes::<T>(self.request.body())?)
    }

    /// Deserializes a JSON body.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        Ok(serde_json::from_slice::<T>(self.request.body())?)
    }

    fn has_content_type(&self, mime: &mime::Mime) -> bool {
        self.header(header::CONTENT_TYPE.as_str())
            .and_then(|value| value.parse::<mime::Mime>().ok())
            .is_some_and(|value| value.essence_str() == mime.essence_str())
    }

    // key/value store

    /// Stores a value for the handlers further down the chain.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.keys.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.keys.get(key)
    }

    // response side

    /// Status last written through this context.
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    /// True once the response status has been committed.
    pub fn written(&self) -> bool {
        self.writer.status().is_some()
    }

    /// Sets a response header. Invalid names or values are logged and skipped.
    pub fn set_header<K, V>(&mut self, key: K, value: V)
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = match HeaderName::try_from(key) {
            Ok(name) => name,
            Err(e) => {
                let e: http::Error = e.into();
                warn!(cause = %e, "invalid response header name");
                return;
            }
        };
        let value = match HeaderValue::try_from(value) {
            Ok(value) => value,
            Err(e) => {
                let e: http::Error = e.into();
                warn!(cause = %e, header = %name, "invalid response header value");
                return;
            }
        };
        self.writer.headers_mut().insert(name, value);
    }

    /// Writes the status line. Only the first status reaches the client.
    pub fn status(&mut self, code: StatusCode) {
        self.status_code = code;
        self.writer.write_header(code);
    }

    /// Writes a `text/plain` response; pass `format_args!` for formatted output.
    pub fn string(&mut self, code: StatusCode, body: impl fmt::Display) {
        self.set_header(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.as_ref());
        self.status(code);
        self.writer.write(body.to_string().as_bytes());
    }

    /// Serializes `value` as an `application/json` response.
    ///
    /// A value that fails to serialize turns into a `500` plain-text response.
    pub fn json<T: Serialize + ?Sized>(&mut self, code: StatusCode, value: &T) {
        match serde_json::to_vec(value) {
            Ok(body) => {
                self.set_header(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref());
                self.status(code);
                self.writer.write(&body);
            }
            Err(e) => {
                error!(cause = %e, path = %self.path, "serialize json response error");
                self.set_header(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.as_ref());
                self.status(StatusCode::INTERNAL_SERVER_ERROR);
                self.writer.write(e.to_string().as_bytes());
            }
        }
    }

    /// Writes raw bytes without touching the content type.
    pub fn data(&mut self, code: StatusCode, data: &[u8]) {
        self.status(code);
        self.writer.write(data);
    }

    /// Writes already rendered markup as `text/html`.
    pub fn html(&mut self, code: StatusCode, markup: impl fmt::Display) {
        self.set_header(header::CONTENT_TYPE, mime::TEXT_HTML_UTF_8.as_ref());
        self.status(code);
        self.writer.write(markup.to_string().as_bytes());
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.params)
            .field("status_code", &self.status_code)
            .field("index", &self.index)
            .field("handlers", &self.handlers.len())
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}

/// Percent-decodes a request path. A path that does not decode to UTF-8 is kept as sent.
pub(crate) fn decode_path(raw: &str) -> Cow<'_, str> {
    match urlencoding::decode(raw) {
        Ok(path) => path,
        Err(e) => {
            debug!(cause = %e, path = raw, "request path is not valid utf-8 once decoded");
            Cow::Borrowed(raw)
        }
    }
}

/// First value of `key` in urlencoded `input`.
fn lookup(input: &[u8], key: &str) -> Option<String> {
    serde_urlencoded::from_bytes::<Vec<(String, String)>>(input)
        .ok()?
        .into_iter()
        .find_map(|(name, value)| (name == key).then_some(value))
}

#[cfg(test)]
mod tests {
    use super::{Context, Params, decode_path};
    use crate::handler::{HandlerFn, handler_fn};
    use crate::writer::{MockResponseWriter, ResponseRecorder};
    use bytes::Bytes;
    use http::{HeaderMap, Method, Request, StatusCode, header};
    use mockall::predicate::eq;
    use serde::Deserialize;
    use std::sync::{Arc, Mutex};

    type Events = Arc<Mutex<Vec<&'static str>>>;

    fn get(uri: &str) -> Request<Bytes> {
        Request::builder().method(Method::GET).uri(uri).body(Bytes::new()).unwrap()
    }

    fn around(events: &Events, before: &'static str, after: &'static str) -> HandlerFn {
        let events = Arc::clone(events);
        handler_fn(move |ctx| {
            events.lock().unwrap().push(before);
            ctx.next();
            events.lock().unwrap().push(after);
        })
    }

    fn leaf(events: &Events, name: &'static str) -> HandlerFn {
        let events = Arc::clone(events);
        handler_fn(move |_ctx| events.lock().unwrap().push(name))
    }

    fn run(request: &Request<Bytes>, handlers: Vec<HandlerFn>) -> ResponseRecorder {
        let mut recorder = ResponseRecorder::new();
        let mut ctx = Context::new(request, &mut recorder, handlers);
        ctx.next();
        recorder
    }

    #[test]
    fn test_before_in_order_after_in_reverse() {
        let events = Events::default();
        let handlers = vec![around(&events, "A-before", "A-after"), around(&events, "B-before", "B-after"), leaf(&events, "H")];

        run(&get("/"), handlers);

        assert_eq!(*events.lock().unwrap(), vec!["A-before", "B-before", "H", "B-after", "A-after"]);
    }

    #[test]
    fn test_fail_skips_the_rest_of_the_chain() {
        let events = Events::default();
        let inner = Arc::clone(&events);
        let abort = handler_fn(move |ctx| {
            inner.lock().unwrap().push("B-before");
            ctx.fail(StatusCode::UNAUTHORIZED, "unauthorized");
            ctx.next();
            inner.lock().unwrap().push("B-after");
        });
        let handlers = vec![around(&events, "A-before", "A-after"), abort, leaf(&events, "H")];

        let response = run(&get("/"), handlers).into_response();

        assert_eq!(*events.lock().unwrap(), vec!["A-before", "B-before", "B-after", "A-after"]);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.body().as_ref(), br#"{"message":"unauthorized"}"#);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_handlers_without_next_run_sequentially() {
        let events = Events::default();
        let handlers = vec![leaf(&events, "A"), leaf(&events, "B"), leaf(&events, "H")];

        run(&get("/"), handlers);

        assert_eq!(*events.lock().unwrap(), vec!["A", "B", "H"]);
    }

    #[test]
    fn test_next_twice_runs_each_handler_once() {
        let events = Events::default();
        let twice = handler_fn(|ctx| {
            ctx.next();
            ctx.next();
        });
        let handlers = vec![twice, leaf(&events, "B"), leaf(&events, "H")];

        let request = get("/");
        let mut recorder = ResponseRecorder::new();
        let mut ctx = Context::new(&request, &mut recorder, handlers);
        ctx.next();
        ctx.next();

        assert!(!ctx.is_aborted());
        assert_eq!(*events.lock().unwrap(), vec!["B", "H"]);
    }

    #[test]
    fn test_abort_writes_nothing() {
        let handlers = vec![handler_fn(|ctx| ctx.abort()), handler_fn(|ctx| ctx.string(StatusCode::OK, "unreachable"))];

        let recorder = run(&get("/"), handlers);

        assert!(recorder.body().is_empty());
        assert_eq!(recorder.into_response().status(), StatusCode::OK);
    }

    #[test]
    fn test_abort_with_status() {
        let request = get("/");
        let mut recorder = ResponseRecorder::new();
        let mut ctx = Context::new(&request, &mut recorder, vec![handler_fn(|ctx| ctx.abort_with_status(StatusCode::FORBIDDEN))]);
        ctx.next();

        assert!(ctx.is_aborted());
        assert!(ctx.written());
        assert_eq!(ctx.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_param_defaults_to_empty() {
        let request = get("/p/go/doc");
        let mut recorder = ResponseRecorder::new();
        let mut ctx = Context::new(&request, &mut recorder, vec![]);
        ctx.set_params(Params::from([("lang".to_string(), "go".to_string())]));

        assert_eq!(ctx.param("lang"), "go");
        assert_eq!(ctx.param("missing"), "");
        assert_eq!(ctx.path(), "/p/go/doc");
        assert_eq!(ctx.method(), &Method::GET);
    }

    #[test]
    fn test_path_is_percent_decoded() {
        let request = get("/hello/a%20b/caf%C3%A9");
        let mut recorder = ResponseRecorder::new();
        let ctx = Context::new(&request, &mut recorder, vec![]);

        assert_eq!(ctx.path(), "/hello/a b/café");
    }

    #[test]
    fn test_undecodable_path_is_kept_as_sent() {
        assert_eq!(decode_path("/bytes/%FF"), "/bytes/%FF");
        assert_eq!(decode_path("/plain"), "/plain");
    }

    #[test]
    fn test_query_and_post_form() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/login?name=query&page=2")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
            .body(Bytes::from_static(b"name=form&password=123"))
            .unwrap();
        let mut recorder = ResponseRecorder::new();
        let ctx = Context::new(&request, &mut recorder, vec![]);

        assert_eq!(ctx.query("name"), "query");
        assert_eq!(ctx.query("missing"), "");
        assert_eq!(ctx.post_form("name"), "form");
        assert_eq!(ctx.post_form("page"), "2");
        assert_eq!(ctx.post_form("password"), "123");
        assert_eq!(ctx.header("content-type"), Some("application/x-www-form-urlencoded; charset=utf-8"));
    }

    #[test]
    fn test_post_form_ignores_non_form_body() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/login?name=query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Bytes::from_static(b"name=form"))
            .unwrap();
        let mut recorder = ResponseRecorder::new();
        let ctx = Context::new(&request, &mut recorder, vec![]);

        assert_eq!(ctx.post_form("name"), "query");
    }

    #[derive(Deserialize, Debug, PartialEq)]
    struct User {
        name: String,
        age: u32,
    }

    #[test]
    fn test_binders() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/users?name=tom&age=7")
            .body(Bytes::from_static(br#"{"name":"jerry","age":3}"#))
            .unwrap();
        let mut recorder = ResponseRecorder::new();
        let ctx = Context::new(&request, &mut recorder, vec![]);

        assert_eq!(ctx.bind_query::<User>().unwrap(), User { name: "tom".into(), age: 7 });
        assert_eq!(ctx.bind_json::<User>().unwrap(), User { name: "jerry".into(), age: 3 });
        assert!(ctx.bind_form::<User>().is_err());
    }

    #[test]
    fn test_bind_form() {
        let request = Request::builder().method(Method::POST).uri("/users").body(Bytes::from_static(b"name=tom&age=7")).unwrap();
        let mut recorder = ResponseRecorder::new();
        let ctx = Context::new(&request, &mut recorder, vec![]);

        assert_eq!(ctx.bind_form::<User>().unwrap(), User { name: "tom".into(), age: 7 });
        assert!(matches!(ctx.bind_query::<User>(), Err(crate::BindError::MissingQuery)));
    }

    #[test]
    fn test_keys_flow_downstream() {
        let handlers = vec![
            handler_fn(|ctx| {
                ctx.set("user", "admin");
                ctx.next();
            }),
            handler_fn(|ctx| {
                let user = ctx.get("user").and_then(|value| value.as_str()).unwrap_or_default().to_string();
                ctx.string(StatusCode::OK, format_args!("hello {user}"));
            }),
        ];

        let response = run(&get("/"), handlers).into_response();

        assert_eq!(response.body().as_ref(), b"hello admin");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    }

    #[test]
    fn test_set_header_skips_invalid_input() {
        let handlers = vec![handler_fn(|ctx| {
            ctx.set_header("x-request-id", "42");
            ctx.set_header("bad header", "value");
            ctx.set_header("x-bad-value", "line\nbreak");
            ctx.html(StatusCode::OK, "<h1>hi</h1>");
        })];

        let response = run(&get("/"), handlers).into_response();

        assert_eq!(response.headers()["x-request-id"], "42");
        assert!(!response.headers().contains_key("x-bad-value"));
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(response.body().as_ref(), b"<h1>hi</h1>");
    }

    #[test]
    fn test_data_keeps_content_type_untouched() {
        let handlers = vec![handler_fn(|ctx| ctx.data(StatusCode::ACCEPTED, b"raw"))];

        let response = run(&get("/"), handlers).into_response();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(!response.headers().contains_key(header::CONTENT_TYPE));
        assert_eq!(response.body().as_ref(), b"raw");
    }

    #[test]
    fn test_fail_commits_once_on_writer() {
        let mut writer = MockResponseWriter::new();
        writer.expect_headers_mut().return_var(HeaderMap::new());
        writer.expect_write_header().with(eq(StatusCode::FORBIDDEN)).times(1).return_const(());
        writer.expect_write().withf(|data: &[u8]| data == &br#"{"message":"forbidden"}"#[..]).times(1).return_const(());

        let request = get("/admin");
        let handlers = vec![handler_fn(|ctx| ctx.fail(StatusCode::FORBIDDEN, "forbidden")), handler_fn(|ctx| ctx.string(StatusCode::OK, "unreachable"))];
        let mut ctx = Context::new(&request, &mut writer, handlers);
        ctx.next();

        assert!(ctx.is_aborted());
        assert_eq!(ctx.status_code(), StatusCode::FORBIDDEN);
    }
}
