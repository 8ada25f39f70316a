use bytes::Bytes;
use hyper::http::{HeaderName, HeaderValue};
use hyper::{HeaderMap, StatusCode};
use std::str::FromStr;

use super::InterceptedResponse;

/// Builds a fresh [`InterceptedResponse`]. Invalid header names or values are skipped.
pub struct ResponseBuilder {
    status: StatusCode,
    body: Option<Bytes>,
    headers: HeaderMap,
}

impl ResponseBuilder {
    pub fn new(status_code: StatusCode) -> Self {
        ResponseBuilder {
            status: status_code,
            body: None,
            headers: Default::default(),
        }
    }

    /// Numeric status; out-of-range codes fall back to 500.
    pub fn from_status(status: u16) -> Self {
        Self::new(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
                self
            }
            _ => self,
        }
    }

    /// Replace the whole header map.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn build(self) -> InterceptedResponse {
        InterceptedResponse {
            status: self.status,
            headers: self.headers,
            body: self.body.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::CONTENT_TYPE;

    #[test]
    fn test_empty_body_by_default() {
        let response = ResponseBuilder::new(StatusCode::NO_CONTENT).build();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_mock_status_out_of_range_falls_back() {
        assert_eq!(
            ResponseBuilder::from_status(1000).build().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ResponseBuilder::from_status(418).build().status().as_u16(), 418);
    }

    #[test]
    fn test_invalid_headers_are_skipped() {
        let response = ResponseBuilder::new(StatusCode::OK)
            .header("content-type", "application/json")
            .header("bad header", "ignored")
            .header("x-ok", "line\nbreak")
            .build();

        assert_eq!(response.header(CONTENT_TYPE.as_str()), Some("application/json"));
        assert_eq!(response.headers().len(), 1);
    }

    #[test]
    fn test_headers_replace_previous_map() {
        let mut headers = HeaderMap::new();
        headers.insert("x-mock", HeaderValue::from_static("1"));

        let response = ResponseBuilder::new(StatusCode::OK)
            .header("x-dropped", "yes")
            .headers(headers)
            .body("{}")
            .build();

        assert_eq!(response.header("x-mock"), Some("1"));
        assert!(response.header("x-dropped").is_none());
        assert_eq!(response.text(), "{}");
    }
}
