//! Fixed-delay retry executor.
//!
//! Runs an async operation up to `retry + 1` times, sleeping `delay` between
//! attempts. Each attempt is isolated behind [`invoke`], so a panic inside the
//! operation is reported as [`RetryError::Panicked`] and retried like any other
//! failure. Cancelling the token during a wait ends the run with
//! [`RetryError::Cancelled`].

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::RetrySettings;
use crate::errors::RetryError;

/// Receives retry notifications so callers decide where they end up.
pub trait RetryObserver: Send + Sync {
    fn on_retry(&self, _attempt: u8, _delay: Duration, _error: &dyn fmt::Display) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RetryObserver for NoopObserver {}

/// Forwards retry notifications to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_retry(&self, attempt: u8, delay: Duration, error: &dyn fmt::Display) {
        warn!(
            "{}. try failed. Will wait {:?} and try again: {}",
            attempt, delay, error
        );
    }
}

#[derive(Clone)]
pub struct Retrier {
    settings: RetrySettings,
    observer: Arc<dyn RetryObserver>,
}

impl Retrier {
    pub fn new(settings: RetrySettings) -> Self {
        Self {
            settings,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn settings(&self) -> RetrySettings {
        self.settings
    }

    pub async fn execute<F, Fut, E>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<(), RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        self.execute_and_return(cancel, operation).await
    }

    pub async fn execute_and_return<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let delay = self.settings.delay();
        let mut attempt: u8 = 0;

        loop {
            let err = match invoke(&mut operation).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if attempt >= self.settings.retry {
                return Err(err);
            }
            attempt += 1;
            self.observer.on_retry(attempt, delay, &err);
            wait(cancel, delay).await?;
        }
    }
}

/// Runs `operation` with the default (silent) observer.
pub async fn execute<F, Fut, E>(
    cancel: &CancellationToken,
    settings: &RetrySettings,
    operation: F,
) -> Result<(), RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: fmt::Display,
{
    Retrier::new(*settings).execute(cancel, operation).await
}

pub async fn execute_and_return<F, Fut, T, E>(
    cancel: &CancellationToken,
    settings: &RetrySettings,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    Retrier::new(*settings).execute_and_return(cancel, operation).await
}

/// One attempt. Panics raised while building or polling the future become errors.
async fn invoke<F, Fut, T, E>(operation: &mut F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match AssertUnwindSafe(async { operation().await }).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(RetryError::Failed(err)),
        Err(payload) => Err(RetryError::Panicked(panic_message(payload))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn wait<E>(cancel: &CancellationToken, delay: Duration) -> Result<(), RetryError<E>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RetryError::Cancelled),
        _ = sleep(delay) => Ok(()),
    }
}
