//! # Request Context
//!
//! Purpose: Carry a caller's deadline and cancellation token through one
//! dispatch so the admission wait and socket I/O can honor both.

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

/// Deadline and cancellation scope for a request.
///
/// The default context never expires and is never cancelled.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    token: Option<CancellationToken>,
}

impl Context {
    /// Context without deadline or cancellation.
    pub fn background() -> Self {
        Context::default()
    }

    /// Context expiring `timeout` from now. Never expires when `timeout` is
    /// too large to represent.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Context::with_deadline(deadline),
            None => Context::background(),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Context {
            deadline: Some(deadline),
            token: None,
        }
    }

    /// Attaches a cancellation token.
    pub fn cancelled_by(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the error this context already reports, if any.
    pub fn err(&self) -> Option<ClientError> {
        if self.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Some(ClientError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ClientError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the token fires or the deadline passes.
    pub async fn done(&self) -> ClientError {
        let deadline = async {
            match self.deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = self.cancelled() => ClientError::Cancelled,
            _ = deadline => ClientError::DeadlineExceeded,
        }
    }

    /// Resolves once the token fires. Pending forever without a token.
    pub async fn cancelled(&self) {
        match &self.token {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Runs `fut` unless the token fires first.
    pub(crate) async fn run<F, T>(&self, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(ClientError::Cancelled),
            result = fut => result,
        }
    }
}
