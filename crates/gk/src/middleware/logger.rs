use crate::Context;
use std::time::Instant;
use tracing::info;

/// Logs every request once the rest of the chain has run.
pub fn logger() -> impl Fn(&mut Context<'_>) + Send + Sync + 'static {
    |ctx: &mut Context<'_>| {
        let start = Instant::now();
        ctx.next();
        info!(
            status = ctx.status_code().as_u16(),
            method = %ctx.method(),
            path = %ctx.path(),
            elapsed = ?start.elapsed(),
            "request completed"
        );
    }
}
