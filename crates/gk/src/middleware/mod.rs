//! Middleware shipped with the crate.
//!
//! Both are plain handlers meant to be installed with `use_middleware`:
//! - [`logger`] logs method, path, status and latency of every request
//! - [`recovery`] turns a panic in any downstream handler into a `500` response
//!
//! Install [`recovery`] before anything that may panic; it only guards the handlers that
//! run after it.

mod logger;
mod recovery;

pub use logger::logger;
pub use recovery::recovery;
