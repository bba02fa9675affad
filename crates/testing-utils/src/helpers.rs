//! Configuration presets that keep tests fast

use enricher_core::models::JobDefaults;
use enricher_core::retry::RetryConfig;

/// Retry config with millisecond delays and no jitter
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        backoff_factor: 2.0,
        timeout_ms: 1_000,
        jitter: 0.0,
        retryable_errors: Vec::new(),
    }
}

/// Job defaults without the inter-batch pause
pub fn test_job_defaults() -> JobDefaults {
    JobDefaults {
        inter_batch_delay_ms: 0,
        ..JobDefaults::default()
    }
}
