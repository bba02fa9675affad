use crate::*;

#[test]
fn test_enricher_error_display() {
    let db_op_error = EnricherError::DatabaseOperation("Connection failed".to_string());
    assert_eq!(db_op_error.to_string(), "数据库操作错误: Connection failed");

    let not_found = EnricherError::JobNotFound {
        id: "job-1".to_string(),
    };
    assert_eq!(not_found.to_string(), "任务记录未找到: job-1");

    let http_error = EnricherError::http(503, "Service Unavailable");
    assert_eq!(http_error.to_string(), "HTTP错误 503: Service Unavailable");

    let unknown = EnricherError::UnknownJobType("bogus".to_string());
    assert_eq!(unknown.to_string(), "未知的任务类型: bogus");

    let cache_error = EnricherError::CacheError("Connection reset".to_string());
    assert_eq!(cache_error.to_string(), "缓存错误: Connection reset");
}

#[test]
fn test_is_retryable() {
    assert!(EnricherError::Network("ECONNRESET".to_string()).is_retryable());
    assert!(EnricherError::Timeout("request timed out".to_string()).is_retryable());
    assert!(EnricherError::RateLimited("Throttled".to_string()).is_retryable());
    assert!(EnricherError::http(500, "boom").is_retryable());
    assert!(EnricherError::http(502, "bad gateway").is_retryable());
    assert!(EnricherError::http(429, "slow down").is_retryable());

    assert!(!EnricherError::http(404, "missing").is_retryable());
    assert!(!EnricherError::http(401, "unauthorized").is_retryable());
    assert!(!EnricherError::ValidationError("bad".to_string()).is_retryable());
    assert!(!EnricherError::Platform("userErrors".to_string()).is_retryable());
    assert!(!EnricherError::UnknownJobType("x".to_string()).is_retryable());
    assert!(!EnricherError::CacheError("down".to_string()).is_retryable());
}

#[test]
fn test_signature() {
    assert_eq!(EnricherError::network("x").signature(), "NetworkError");
    assert_eq!(EnricherError::timeout_error("x").signature(), "TimeoutError");
    assert_eq!(EnricherError::cache("x").signature(), "CacheError");
    assert_eq!(EnricherError::http(500, "x").signature(), "HttpError");
    assert_eq!(
        EnricherError::validation_error("x").signature(),
        "ValidationError"
    );
}

#[test]
fn test_user_message() {
    assert_eq!(
        EnricherError::job_not_found("job-1").user_message(),
        "请求的任务记录不存在"
    );
    assert_eq!(
        EnricherError::UnknownJobType("x".to_string()).user_message(),
        "不支持的任务类型"
    );
    assert_eq!(
        EnricherError::Internal("Critical error".to_string()).user_message(),
        "系统繁忙，请稍后重试"
    );
}

#[test]
fn test_from_serde_json_error() {
    let json_error = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
    let error: EnricherError = json_error.into();
    assert!(matches!(error, EnricherError::Serialization(_)));
}

#[test]
fn test_is_fatal() {
    assert!(EnricherError::Internal("x".to_string()).is_fatal());
    assert!(EnricherError::config_error("x").is_fatal());
    assert!(!EnricherError::network("x").is_fatal());
}
