use crate::error::TransportError;
use crate::request::OutgoingRequest;
use crate::response::InterceptedResponse;
use async_trait::async_trait;
use std::sync::Arc;

/// The real network underneath the shim.
///
/// Errors are handed back to the caller of the wrapped surface unchanged.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutgoingRequest) -> Result<InterceptedResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: OutgoingRequest) -> Result<InterceptedResponse, TransportError> {
        (**self).send(request).await
    }
}
