use bytes::Bytes;
use gk::{Context, Engine, SharedEngine};
use http::{Method, Request, StatusCode, header};
use serde::Deserialize;
use serde_json::json;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Deserialize, Debug)]
pub struct User {
    name: String,
    zip: String,
}

fn index(ctx: &mut Context<'_>) {
    ctx.html(StatusCode::OK, "<h1>Hello gk</h1>");
}

fn hello(ctx: &mut Context<'_>) {
    let greeting = format!("hello {}, you're at {}", ctx.param("name"), ctx.path());
    ctx.string(StatusCode::OK, greeting);
}

fn create_user(ctx: &mut Context<'_>) {
    match ctx.bind_json::<User>() {
        Ok(user) => ctx.json(StatusCode::CREATED, &json!({ "name": user.name, "zip": user.zip })),
        Err(e) => ctx.fail(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

fn assets(ctx: &mut Context<'_>) {
    let value = json!({ "filepath": ctx.param("filepath") });
    ctx.json(StatusCode::OK, &value);
}

fn require_token(ctx: &mut Context<'_>) {
    if ctx.header(header::AUTHORIZATION.as_str()).is_none() {
        ctx.fail(StatusCode::UNAUTHORIZED, "missing token");
    }
}

fn build_engine() -> Engine {
    let mut engine = Engine::builder().with_default_middleware().handle_method_not_allowed(true).build();

    engine.get("/", index).expect("valid pattern");
    engine.get("/panic", |_ctx| panic!("something went wrong")).expect("valid pattern");
    engine.get("/assets/*filepath", assets).expect("valid pattern");

    let mut v1 = engine.group("/v1");
    v1.get("/hello/:name", hello).expect("valid pattern");

    let mut admin = v1.group("/admin");
    admin.use_middleware(require_token);
    admin.post("/users", create_user).expect("valid pattern");

    engine
}

fn request(method: Method, uri: &str, body: &'static str) -> Request<Bytes> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
        .header(header::AUTHORIZATION, "Bearer demo")
        .body(Bytes::from_static(body.as_bytes()))
        .expect("valid request")
}

fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let engine = SharedEngine::new(build_engine());

    let requests = [
        request(Method::GET, "/", ""),
        request(Method::GET, "/v1/hello/gk", ""),
        request(Method::GET, "/assets/css/gk.css", ""),
        request(Method::POST, "/v1/admin/users", r#"{"name":"hello","zip":"world"}"#),
        request(Method::POST, "/v1/admin/users", "not json"),
        request(Method::DELETE, "/v1/hello/gk", ""),
        request(Method::GET, "/missing", ""),
        request(Method::GET, "/panic", ""),
    ];

    for request in requests {
        let (method, uri) = (request.method().clone(), request.uri().clone());
        let response = engine.serve(request);
        info!(%method, %uri, status = %response.status(), body = %String::from_utf8_lossy(response.body()), "response");
    }

    let mut next = Engine::with_defaults();
    next.get("/", |ctx| ctx.string(StatusCode::OK, "reloaded")).expect("valid pattern");
    engine.store(next);

    let response = engine.serve(request(Method::GET, "/", ""));
    info!(status = %response.status(), body = %String::from_utf8_lossy(response.body()), "after reload");
}
