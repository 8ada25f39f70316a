//! Immutable response values handed back to intercepted callers.

mod builder;

pub use builder::ResponseBuilder;

use bytes::Bytes;
use hyper::{HeaderMap, StatusCode};
use std::borrow::Cow;

/// A completed response as seen by the caller.
///
/// Never mutated after construction: rewriting a response builds a new value
/// through [`ResponseBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl InterceptedResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }
}
