//! Time bounds for calling-service operations

use std::future::Future;
use std::time::Duration;

use tracing::error;

use crate::error::{CoordinatorError, CoordinatorResult};

/// Run `future`, failing with [`CoordinatorError::OperationTimeout`] if it
/// does not complete within `timeout`
pub async fn with_timeout<T, F>(operation_name: &str, timeout: Duration, future: F) -> CoordinatorResult<T>
where
    F: Future<Output = CoordinatorResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            error!(
                operation = operation_name,
                timeout_ms = timeout.as_millis() as u64,
                "Operation timed out"
            );
            Err(CoordinatorError::OperationTimeout {
                operation: operation_name.to_string(),
                duration_ms: timeout.as_millis() as u64,
            })
        }
    }
}
