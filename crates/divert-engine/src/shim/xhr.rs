//! Event-driven surface: the open / set-header / send triad.
//!
//! Headers set between `open` and `send` are buffered on the call. `send`
//! resolves the rule against the buffered URL and method, re-opens the call
//! when the rule rewrites the URL, then drives the shared dispatch. The caller
//! observes the outcome through [`XhrCall::events`] and the response accessors.

use super::context::ExecutionContext;
use super::interceptor::{dispatch, Decision, Surface};
use super::transport::Transport;
use crate::error::ShimError;
use crate::request::{Credentials, OutgoingRequest};
use crate::response::InterceptedResponse;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use hyper::http::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method};
use std::borrow::Cow;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XhrEvent {
    ReadyStateChange(ReadyState),
    Load,
    Error,
    LoadEnd,
}

/// Arguments of the most recent `open`, replayed when the call is re-opened.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenArgs {
    pub method: Method,
    pub url: String,
    pub is_async: bool,
    pub credentials: Option<Credentials>,
}

pub struct XhrCall {
    context: Arc<ExecutionContext>,
    transport: Arc<dyn Transport>,
    open: Option<OpenArgs>,
    headers: HeaderMap,
    ready_state: ReadyState,
    sent: bool,
    reopened: bool,
    response: Option<InterceptedResponse>,
    events: Vec<XhrEvent>,
}

impl XhrCall {
    pub fn new(context: Arc<ExecutionContext>, transport: Arc<dyn Transport>) -> Self {
        Self {
            context,
            transport,
            open: None,
            headers: HeaderMap::new(),
            ready_state: ReadyState::Unsent,
            sent: false,
            reopened: false,
            response: None,
            events: Vec::new(),
        }
    }

    /// Start (or restart) the call. Any buffered headers are discarded.
    pub fn open(
        &mut self,
        method: &str,
        url: &str,
        is_async: bool,
        credentials: Option<Credentials>,
    ) -> Result<(), ShimError> {
        let method =
            Method::from_str(method).map_err(|_| ShimError::InvalidState("invalid method"))?;
        self.open = Some(OpenArgs {
            method,
            url: url.to_string(),
            is_async,
            credentials,
        });
        self.headers.clear();
        self.sent = false;
        self.reopened = false;
        self.response = None;
        self.set_ready_state(ReadyState::Opened);
        Ok(())
    }

    /// Buffer a request header against the open call. Repeated names append.
    pub fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), ShimError> {
        if self.ready_state != ReadyState::Opened || self.sent {
            return Err(ShimError::InvalidState("setRequestHeader before open or after send"));
        }
        let name =
            HeaderName::from_str(name).map_err(|_| ShimError::InvalidState("invalid header name"))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ShimError::InvalidState("invalid header value"))?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Resolve the rule now and return the future that completes the call.
    ///
    /// A blocked call ends with `Error`/`LoadEnd` events and
    /// [`ShimError::Blocked`]; a transport failure ends the same way with the
    /// transport error.
    pub fn send(&mut self, body: Option<Bytes>) -> BoxFuture<'_, Result<(), ShimError>> {
        let prepared = self.prepare(body);
        async move {
            let (request, decision) = prepared?;
            let result = dispatch(Surface::Xhr, decision, request, self.transport.as_ref()).await;
            self.complete(result)
        }
        .boxed()
    }

    fn prepare(
        &mut self,
        body: Option<Bytes>,
    ) -> Result<(OutgoingRequest, Option<Decision>), ShimError> {
        if self.sent {
            return Err(ShimError::InvalidState("send called twice"));
        }
        let open = self
            .open
            .clone()
            .ok_or(ShimError::InvalidState("send before open"))?;
        self.sent = true;

        let decision = self
            .context
            .interceptor()
            .and_then(|interceptor| interceptor.resolve(&open.url, open.method.as_str()));
        if let Some(decision) = &decision {
            self.context.report_match(decision.rule_id, &open.url);
            if let Some(url) = decision.plan.request.rewritten_url() {
                self.reopen(url);
            }
        }

        let request = OutgoingRequest {
            method: open.method,
            url: open.url,
            headers: self.headers.clone(),
            body,
            credentials: open.credentials,
        };
        Ok((request, decision))
    }

    /// Re-open against a rewritten URL, keeping method, async flag and
    /// credentials, and replay the buffered headers.
    fn reopen(&mut self, url: &str) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        debug!("Re-opening {} as {}", open.url, url);
        open.url = url.to_string();
        self.reopened = true;
        self.set_ready_state(ReadyState::Opened);
    }

    fn complete(&mut self, result: Result<InterceptedResponse, ShimError>) -> Result<(), ShimError> {
        match result {
            Ok(response) => {
                self.response = Some(response);
                self.set_ready_state(ReadyState::HeadersReceived);
                self.set_ready_state(ReadyState::Loading);
                self.set_ready_state(ReadyState::Done);
                self.events.push(XhrEvent::Load);
                self.events.push(XhrEvent::LoadEnd);
                Ok(())
            }
            Err(e) => {
                self.set_ready_state(ReadyState::Done);
                self.events.push(XhrEvent::Error);
                self.events.push(XhrEvent::LoadEnd);
                Err(e)
            }
        }
    }

    fn set_ready_state(&mut self, state: ReadyState) {
        self.ready_state = state;
        self.events.push(XhrEvent::ReadyStateChange(state));
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    /// Arguments the call is currently opened with, after any re-open.
    pub fn open_args(&self) -> Option<&OpenArgs> {
        self.open.as_ref()
    }

    pub fn was_reopened(&self) -> bool {
        self.reopened
    }

    /// Response status, or 0 when no response is available.
    pub fn status(&self) -> u16 {
        self.response.as_ref().map_or(0, |r| r.status().as_u16())
    }

    pub fn response_text(&self) -> Cow<'_, str> {
        self.response
            .as_ref()
            .map_or(Cow::Borrowed(""), |r| r.text())
    }

    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response.as_ref().and_then(|r| r.header(name))
    }

    pub fn response(&self) -> Option<&InterceptedResponse> {
        self.response.as_ref()
    }

    pub fn events(&self) -> &[XhrEvent] {
        &self.events
    }
}
