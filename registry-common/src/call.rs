use std::future::Future;
use std::time;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Outcome of an external call that did not succeed.
#[derive(Error, Debug)]
pub enum CallError<E> {
    #[error("{0}")]
    Failed(E),
    #[error("timed out after {0:?}")]
    TimedOut(time::Duration),
    #[error("cancelled by the caller")]
    Cancelled,
}

/// Run `call` until it completes, `deadline` elapses, or `cancel` fires, whichever comes first.
pub async fn bounded<F, T, E>(
    cancel: &CancellationToken,
    deadline: time::Duration,
    call: F,
) -> Result<T, CallError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(CallError::Cancelled),
        result = tokio::time::timeout(deadline, call) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(CallError::Failed(error)),
            Err(_) => Err(CallError::TimedOut(deadline)),
        },
    }
}
