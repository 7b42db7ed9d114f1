//! Timeout helpers for callers that want a bounded wait.
//!
//! The session itself never arms a timer: dialing waits for the server as long
//! as the transport stays open. These wrappers are what `Dialer::dial_timeout`
//! and the tests use to impose a deadline from the outside.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Default bound for `Dialer::dial_timeout`
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound used when closing the transport on shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run `fut` with a deadline, mapping expiry to `ProtocolError::Timeout`
pub async fn with_timeout<T, F>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = T>,
{
    timeout(duration, fut)
        .await
        .map_err(|_| ProtocolError::Timeout)
}

/// Run a fallible `fut` with a deadline, flattening its error with the timeout error
pub async fn with_timeout_error<T, F>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_expires() {
        let result = with_timeout(
            tokio::time::sleep(Duration::from_millis(200)),
            Duration::from_millis(10),
        )
        .await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn test_inner_error_preserved() {
        let result: Result<()> = with_timeout_error(
            async { Err(ProtocolError::ConnectionClosed) },
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }
}
