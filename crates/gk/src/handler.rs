use crate::Context;
use std::sync::Arc;

/// A route handler or a middleware.
///
/// Both share the same shape: they receive the request [`Context`] and return nothing.
/// A middleware calls [`Context::next`] to run the rest of the chain; code placed after
/// that call runs once every downstream handler has returned.
pub type HandlerFn = Arc<dyn Fn(&mut Context<'_>) + Send + Sync>;

/// The ordered handlers run for one request: group middleware first, route handler last.
pub type HandlersChain = Vec<HandlerFn>;

/// Wraps a closure or a `fn` into a [`HandlerFn`].
pub fn handler_fn<F>(f: F) -> HandlerFn
where
    F: Fn(&mut Context<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use crate::handler::{HandlerFn, handler_fn};
    use crate::Context;

    fn assert_is_handler(_handler: &HandlerFn) {
        // no op
    }

    #[test]
    fn assert_fn_is_handler() {
        fn index(ctx: &mut Context<'_>) {
            ctx.next();
        }

        assert_is_handler(&handler_fn(index));
    }

    #[test]
    fn assert_closure_is_handler() {
        let greeting = String::from("hello");
        let handler = handler_fn(move |ctx| ctx.set("greeting", greeting.as_str()));

        assert_is_handler(&handler);
    }
}
