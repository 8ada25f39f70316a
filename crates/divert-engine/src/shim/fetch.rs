//! Promise-style surface: a request goes in, a response future comes back.

use super::context::ExecutionContext;
use super::interceptor::{dispatch, Surface};
use super::transport::Transport;
use crate::error::ShimError;
use crate::request::OutgoingRequest;
use crate::response::InterceptedResponse;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

#[derive(Clone)]
pub struct FetchShim {
    context: Arc<ExecutionContext>,
    transport: Arc<dyn Transport>,
}

impl FetchShim {
    pub fn new(context: Arc<ExecutionContext>, transport: Arc<dyn Transport>) -> Self {
        Self { context, transport }
    }

    /// Resolve the rule now and return the future that carries it out.
    ///
    /// The decision is taken before this returns, so a rule update that lands
    /// while the call is suspended in its delay does not affect it.
    pub fn fetch(
        &self,
        request: OutgoingRequest,
    ) -> BoxFuture<'static, Result<InterceptedResponse, ShimError>> {
        let decision = self
            .context
            .interceptor()
            .and_then(|interceptor| interceptor.resolve(&request.url, request.method.as_str()));
        if let Some(decision) = &decision {
            self.context.report_match(decision.rule_id, &request.url);
        }

        let transport = Arc::clone(&self.transport);
        async move { dispatch(Surface::Fetch, decision, request, transport.as_ref()).await }.boxed()
    }
}
