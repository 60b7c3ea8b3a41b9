use crate::Context;
use http::StatusCode;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use tracing::error;

thread_local! {
    /// backtrace of the last panic raised on this thread
    static PANIC_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

/// Symbol prefixes of the frames the panic runtime and the hook add above the panic site.
const PANIC_MACHINERY: &[&str] = &[
    "std::panicking::",
    "core::panicking::",
    "std::sys::backtrace::",
    "std::sys_common::backtrace::",
    "rust_begin_unwind",
    "__rustc::rust_begin_unwind",
];

/// Chains a panic hook recording the backtrace at the panic site, while the panicking
/// frames are still on the stack. The previous hook still runs.
fn install_backtrace_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            PANIC_BACKTRACE.with(|cell| *cell.borrow_mut() = Some(Backtrace::force_capture()));
            previous(info);
        }));
    });
}

/// Recovers from panics raised by the handlers after it in the chain.
///
/// The panic is logged with its message and backtrace, then the chain is failed with
/// `500 Internal Server Error`. This relies on unwinding; with `panic = "abort"` nothing
/// can be recovered.
pub fn recovery() -> impl Fn(&mut Context<'_>) + Send + Sync + 'static {
    install_backtrace_hook();

    |ctx: &mut Context<'_>| {
        let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| ctx.next())) else {
            return;
        };

        let message = panic_message(payload.as_ref());
        let backtrace = PANIC_BACKTRACE
            .with(|cell| cell.borrow_mut().take())
            .map_or_else(|| Backtrace::force_capture().to_string(), |backtrace| trim_panic_frames(&backtrace.to_string()));

        error!(
            method = %ctx.method(),
            path = %ctx.path(),
            panic_message = %message,
            backtrace = %backtrace,
            "handler panicked, recovered"
        );

        ctx.fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
    }
}

/// Drops the frames above the panic site from a rendered backtrace: the capture itself, the
/// hook and the panic runtime. Returns the input unchanged when no runtime frame is found.
fn trim_panic_frames(rendered: &str) -> String {
    let lines = rendered.lines().collect::<Vec<_>>();
    let start = lines
        .iter()
        .rposition(|line| frame_symbol(line).is_some_and(is_panic_machinery))
        .and_then(|last| lines[last + 1..].iter().position(|line| frame_symbol(line).is_some()).map(|offset| last + 1 + offset))
        .unwrap_or(0);
    lines[start..].join("\n")
}

/// Symbol of a frame header line such as `  12: app::handler`.
fn frame_symbol(line: &str) -> Option<&str> {
    let (index, symbol) = line.trim_start().split_once(": ")?;
    (!index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())).then_some(symbol)
}

fn is_panic_machinery(symbol: &str) -> bool {
    PANIC_MACHINERY.iter().any(|prefix| symbol.starts_with(prefix))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
