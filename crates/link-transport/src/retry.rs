//! Retry of link operations while the stack is not ready

use std::thread;

use tracing::warn;

use crate::{RetryPolicy, TransportError, TransportResult};

/// Run `op`, retrying with exponential backoff on `LinkUnavailable`
///
/// Every other error is returned immediately.
pub fn retry_link<T, F>(policy: &RetryPolicy, what: &str, mut op: F) -> TransportResult<T>
where
    F: FnMut() -> TransportResult<T>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Err(TransportError::LinkUnavailable(reason)) if attempt < attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    "{}: link unavailable ({}), retry {}/{} in {:?}",
                    what, reason, attempt, attempts - 1, delay
                );
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    #[test]
    fn test_recovers_after_unavailable() {
        let mut calls = 0;
        let result = retry_link(&policy(3), "write", || {
            calls += 1;
            if calls < 3 {
                Err(TransportError::LinkUnavailable("warming up".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: TransportResult<()> = retry_link(&policy(4), "write", || {
            calls += 1;
            Err(TransportError::LinkUnavailable("down".into()))
        });
        assert!(matches!(result, Err(TransportError::LinkUnavailable(_))));
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_other_errors_not_retried() {
        let mut calls = 0;
        let result: TransportResult<()> = retry_link(&policy(4), "write", || {
            calls += 1;
            Err(TransportError::NotConnected)
        });
        assert!(matches!(result, Err(TransportError::NotConnected)));
        assert_eq!(calls, 1);
    }
}
