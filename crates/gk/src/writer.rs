//! The response sink a [`crate::Context`] writes into.
//!
//! The router never touches a connection. Whatever serves the request hands the engine a
//! [`ResponseWriter`]; status and headers are committed once, by the first
//! [`ResponseWriter::write_header`] call or implicitly by the first body write.

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use tracing::warn;

/// Abstract response sink.
///
/// Implementations must honour only the first status commit; later calls are ignored.
#[cfg_attr(test, mockall::automock)]
pub trait ResponseWriter {
    /// Headers that will be sent with the response.
    fn headers(&self) -> &HeaderMap;

    /// Mutable access to the headers; changes after the commit have no effect on the wire.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commits the status line and the current headers.
    fn write_header(&mut self, status: StatusCode);

    /// Appends bytes to the body, committing `200 OK` first if nothing was committed yet.
    fn write(&mut self, data: &[u8]);

    /// The committed status, if any.
    fn status(&self) -> Option<StatusCode>;
}

/// An in-memory [`ResponseWriter`] that records the response.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    headers: HeaderMap,
    committed: Option<(StatusCode, HeaderMap)>,
    body: BytesMut,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded body so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Builds the recorded response. A recorder nothing was written to yields an empty
    /// `200 OK`.
    pub fn into_response(self) -> Response<Bytes> {
        let (status, headers) = self.committed.unwrap_or((StatusCode::OK, self.headers));

        let mut response = Response::new(self.body.freeze());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers(&self) -> &HeaderMap {
        match &self.committed {
            Some((_, headers)) => headers,
            None => &self.headers,
        }
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if let Some((committed, _)) = &self.committed {
            warn!(committed = %committed, ignored = %status, "superfluous write_header call");
            return;
        }
        self.committed = Some((status, self.headers.clone()));
    }

    fn write(&mut self, data: &[u8]) {
        if self.committed.is_none() {
            self.write_header(StatusCode::OK);
        }
        self.body.extend_from_slice(data);
    }

    fn status(&self) -> Option<StatusCode> {
        self.committed.as_ref().map(|(status, _)| *status)
    }
}

impl From<ResponseRecorder> for Response<Bytes> {
    fn from(recorder: ResponseRecorder) -> Self {
        recorder.into_response()
    }
}
