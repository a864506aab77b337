//! HTTP transport with bounded redirects and retry logic.

mod client;
mod retry;

pub use client::{HttpClient, USER_AGENT, client_builder};
pub use retry::{MAX_REDIRECTS, MAX_RETRIES, RETRY_DELAY_MS, is_retryable, is_retryable_status};
