//! 带指数退避的重试执行器
//!
//! `with_retry` 重复执行一个可能失败的异步操作，直到成功、错误不可重试、
//! 重试次数用尽或超出整体时间预算。最终失败时返回最后一次尝试的原始错误，
//! 不做任何包装，调用方可以按原始错误类型分支。
//!
//! 执行器本身不发告警，每次重试的日志由调用方通过 `on_retry` 钩子负责。

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use enricher_errors::EnricherError;

/// 可被重试执行器分类的错误
pub trait RetryableError: fmt::Display + Send + Sync {
    /// 用于白名单匹配的稳定错误签名
    fn signature(&self) -> &str;

    /// 内置默认分类：网络重置、超时、HTTP 429 和 5xx
    fn is_transient(&self) -> bool;
}

impl RetryableError for EnricherError {
    fn signature(&self) -> &str {
        EnricherError::signature(self)
    }

    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

/// 重试配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 最大重试次数（不含首次尝试）
    pub max_retries: u32,
    /// 首次重试前的等待时间（毫秒）
    pub initial_delay_ms: u64,
    /// 单次等待上限（毫秒）
    pub max_delay_ms: u64,
    /// 指数退避倍数
    pub backoff_factor: f64,
    /// 整体时间预算（毫秒）
    pub timeout_ms: u64,
    /// 重试间隔的随机抖动范围（0.0-1.0）
    pub jitter: f64,
    /// 可重试的错误签名或消息片段
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 300,
            max_delay_ms: 5000,
            backoff_factor: 2.0,
            timeout_ms: 30_000,
            jitter: 0.2,
            retryable_errors: Vec::new(),
        }
    }
}

impl RetryConfig {
    /// 缓存操作：小预算、短间隔，只重试网络类错误
    pub fn cache() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 100,
            max_delay_ms: 1000,
            timeout_ms: 2000,
            retryable_errors: vec![
                "NetworkError".to_string(),
                "TimeoutError".to_string(),
                "CacheError".to_string(),
            ],
            ..Self::default()
        }
    }

    /// 任务记录等簿记写入
    pub fn bookkeeping() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 200,
            max_delay_ms: 1000,
            timeout_ms: 3000,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retryable_errors<I, S>(mut self, errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_errors = errors.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn uncapped_delay_ms(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        self.initial_delay_ms as f64 * self.backoff_factor.powi(exponent)
    }

    /// 第 `attempt` 次失败后的基础等待时间（未加抖动，已封顶）
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let ms = self.uncapped_delay_ms(attempt).min(self.max_delay_ms as f64);
        Duration::from_millis(ms.max(0.0) as u64)
    }

    /// 第 `attempt` 次失败后的实际等待时间
    ///
    /// `min(initial * factor^(attempt-1) * (1 ± jitter), max)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = 1.0 + jitter * (rand::random::<f64>() * 2.0 - 1.0);
        let ms = (self.uncapped_delay_ms(attempt) * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(ms.max(0.0) as u64)
    }
}

pub type RetryCondition = Arc<dyn Fn(&dyn RetryableError) -> bool + Send + Sync>;
pub type OnRetry = Arc<dyn Fn(&dyn RetryableError, u32, Duration) + Send + Sync>;

/// 重试策略：配置加可选的判定函数和重试钩子
#[derive(Clone, Default)]
pub struct RetryPolicy {
    pub config: RetryConfig,
    /// 提供时完全取代白名单和内置分类
    pub retry_condition: Option<RetryCondition>,
    pub on_retry: Option<OnRetry>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("retry_condition", &self.retry_condition.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self::new(config)
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            retry_condition: None,
            on_retry: None,
        }
    }

    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&dyn RetryableError) -> bool + Send + Sync + 'static,
    {
        self.retry_condition = Some(Arc::new(condition));
        self
    }

    pub fn on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&dyn RetryableError, u32, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn should_retry(&self, error: &dyn RetryableError) -> bool {
        if let Some(condition) = &self.retry_condition {
            return condition(error);
        }

        if !self.config.retryable_errors.is_empty() {
            let signature = error.signature();
            let message = error.to_string();
            let listed = self
                .config
                .retryable_errors
                .iter()
                .any(|pattern| pattern == signature || message.contains(pattern.as_str()));
            if listed {
                return true;
            }
        }

        error.is_transient()
    }
}

/// 按策略执行操作，失败时指数退避重试
///
/// 以下任一情况直接返回最后一次的原始错误：
/// - 错误不可重试
/// - 已重试 `max_retries` 次
/// - 已用时间加下一次等待会超出 `timeout`
pub async fn with_retry<T, E, F, Fut>(mut operation: F, policy: &RetryPolicy) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let started = Instant::now();
    let budget = policy.config.timeout();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !policy.should_retry(&error) {
            debug!(attempt, error.signature = error.signature(), "错误不可重试，放弃");
            return Err(error);
        }

        if attempt > policy.config.max_retries {
            debug!(attempt, "重试次数已用尽: {}", error);
            return Err(error);
        }

        let delay = policy.config.delay_for_attempt(attempt);
        if started.elapsed() + delay > budget {
            debug!(
                attempt,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "超出重试时间预算: {}",
                error
            );
            return Err(error);
        }

        metrics::counter!("enricher_retry_attempts_total", "error" => error.signature().to_string())
            .increment(1);
        if let Some(hook) = &policy.on_retry {
            hook(&error, attempt, delay);
        }

        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_base_delay_is_monotonic_and_capped() {
        let config = RetryConfig::default();
        let delays: Vec<u64> = (1..=5)
            .map(|attempt| config.base_delay(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![300, 600, 1200, 2400, 4800]);
        assert_eq!(config.base_delay(6).as_millis(), 5000);
    }

    #[test]
    fn test_jittered_delay_never_exceeds_cap() {
        let config = RetryConfig::default();
        for _ in 0..200 {
            for attempt in 1..=8 {
                let delay = config.delay_for_attempt(attempt).as_millis() as u64;
                assert!(delay <= 5000, "delay {delay} exceeds cap");
            }
            let first = config.delay_for_attempt(1).as_millis() as u64;
            assert!((240..=360).contains(&first), "first delay {first} outside ±20%");
        }
    }

    #[test]
    fn test_presets() {
        let cache = RetryConfig::cache();
        assert_eq!(cache.max_retries, 2);
        assert_eq!(cache.initial_delay_ms, 100);
        assert!(cache.retryable_errors.contains(&"NetworkError".to_string()));

        let bookkeeping = RetryConfig::bookkeeping();
        assert_eq!(bookkeeping.max_retries, 2);
        assert_eq!(bookkeeping.timeout_ms, 3000);
    }

    #[test]
    fn test_condition_overrides_classification() {
        let policy = RetryPolicy::default().with_condition(|_| false);
        assert!(!policy.should_retry(&EnricherError::network("reset")));

        let policy = RetryPolicy::default().with_condition(|_| true);
        assert!(policy.should_retry(&EnricherError::validation_error("bad")));
    }

    #[test]
    fn test_allowlist_matches_signature_or_message() {
        let policy = RetryPolicy::new(
            RetryConfig::default().with_retryable_errors(["PlatformError", "THROTTLED"]),
        );
        assert!(policy.should_retry(&EnricherError::platform("boom")));
        assert!(policy.should_retry(&EnricherError::job_execution("THROTTLED by upstream")));
        assert!(!policy.should_retry(&EnricherError::validation_error("bad")));
        // 内置分类仍然生效
        assert!(policy.should_retry(&EnricherError::http(503, "unavailable")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(RetryConfig::default());

        let result: Result<(), EnricherError> = with_retry(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(EnricherError::network(format!("reset #{n}"))) }
            },
            &policy,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(EnricherError::Network(msg)) => assert_eq!(msg, "reset #4"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_is_called_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default().with_condition(|_| false);

        let result: Result<(), EnricherError> = with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(EnricherError::validation_error("bad input")) }
            },
            &policy,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(EnricherError::ValidationError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = seen.clone();
        let policy = RetryPolicy::default().on_retry(move |err, attempt, delay| {
            hook_seen
                .lock()
                .unwrap()
                .push((err.signature().to_string(), attempt, delay));
        });

        let result = with_retry(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(EnricherError::timeout_error("slow"))
                    } else {
                        Ok(42)
                    }
                }
            },
            &policy,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "TimeoutError");
        assert_eq!(seen[0].1, 1);
        assert_eq!(seen[1].1, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_budget_stops_retrying() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_retries: 10,
            initial_delay_ms: 1000,
            jitter: 0.0,
            timeout_ms: 2500,
            ..RetryConfig::default()
        };
        let policy = RetryPolicy::new(config);

        let result: Result<(), EnricherError> = with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(EnricherError::network("reset")) }
            },
            &policy,
        )
        .await;

        // 1000ms 后第二次，再等 2000ms 会超出 2500ms 预算
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(result.is_err());
    }
}
