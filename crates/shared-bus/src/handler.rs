//! # Message Handlers
//!
//! One contract for everything that consumes broker deliveries, plus
//! adapters so plain closures can register without a wrapper type.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use shared_types::Envelope;
use thiserror::Error;

/// A handler rejected a delivery.
///
/// The broker logs and counts it; the message is not redelivered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Handler failed: {0}")]
pub struct HandlerError(pub String);

impl From<&str> for HandlerError {
    fn from(reason: &str) -> Self {
        Self(reason.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(reason: String) -> Self {
        Self(reason)
    }
}

/// Consumer of decoded envelopes.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one delivery.
    async fn handle(&self, envelope: Envelope) -> Result<(), HandlerError>;
}

/// Adapter for synchronous closures.
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Envelope) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    /// Wrap `f` as a shareable handler.
    pub fn new(f: F) -> Arc<dyn MessageHandler> {
        Arc::new(Self { f })
    }
}

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(Envelope) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    async fn handle(&self, envelope: Envelope) -> Result<(), HandlerError> {
        (self.f)(envelope)
    }
}

/// Adapter for closures returning a future.
pub struct AsyncFnHandler<F, Fut> {
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnHandler<F, Fut>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    /// Wrap `f` as a shareable handler.
    pub fn new(f: F) -> Arc<dyn MessageHandler> {
        Arc::new(Self {
            f,
            _future: PhantomData,
        })
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for AsyncFnHandler<F, Fut>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, envelope: Envelope) -> Result<(), HandlerError> {
        (self.f)(envelope).await
    }
}
