//! Retry policy for network operations.

use crate::error::InstallError;

/// Maximum number of attempts for a download.
pub const MAX_RETRIES: usize = 3;

/// Delay between retry attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Maximum number of redirects followed for one download.
pub const MAX_REDIRECTS: usize = 10;

/// Whether an HTTP status is worth retrying: server errors, request timeout
/// and rate limiting.
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

/// Checks whether a failed attempt should be retried.
///
/// Transport errors without a status (connection refused, DNS, reset) are
/// retried; client errors, redirect exhaustion and anything that is not a
/// transport failure (local I/O) are not.
pub fn is_retryable(error: &anyhow::Error) -> bool {
    match error.downcast_ref::<InstallError>() {
        Some(InstallError::Transport {
            status: Some(status),
            ..
        }) => is_retryable_status(*status),
        Some(InstallError::Transport { status: None, .. }) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(status: Option<u16>) -> anyhow::Error {
        InstallError::Transport {
            url: "https://example.test".into(),
            status,
            message: "x".into(),
        }
        .into()
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(408));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(403));
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&transport(None)));
        assert!(is_retryable(&transport(Some(502))));
        assert!(!is_retryable(&transport(Some(404))));

        let redirects: anyhow::Error = InstallError::TooManyRedirects {
            url: "https://example.test".into(),
            limit: MAX_REDIRECTS,
        }
        .into();
        assert!(!is_retryable(&redirects));

        assert!(!is_retryable(&anyhow::anyhow!("disk full")));
    }
}
