use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnricherError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("任务记录未找到: {id}")]
    JobNotFound { id: String },
    #[error("网络错误: {0}")]
    Network(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("请求被限流: {0}")]
    RateLimited(String),
    #[error("HTTP错误 {status}: {message}")]
    Http { status: u16, message: String },
    #[error("电商平台错误: {0}")]
    Platform(String),
    #[error("缓存错误: {0}")]
    CacheError(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("数据验证失败: {0}")]
    ValidationError(String),
    #[error("认证失败: {0}")]
    Unauthorized(String),
    #[error("未知的任务类型: {0}")]
    UnknownJobType(String),
    #[error("任务执行错误: {0}")]
    JobExecution(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type EnricherResult<T> = Result<T, EnricherError>;

impl EnricherError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn job_not_found<S: Into<String>>(id: S) -> Self {
        Self::JobNotFound { id: id.into() }
    }
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }
    pub fn timeout_error<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }
    pub fn platform<S: Into<String>>(msg: S) -> Self {
        Self::Platform(msg.into())
    }
    pub fn cache<S: Into<String>>(msg: S) -> Self {
        Self::CacheError(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }
    pub fn job_execution<S: Into<String>>(msg: S) -> Self {
        Self::JobExecution(msg.into())
    }

    /// 网络重置、超时、HTTP 429 与 5xx 视为瞬时错误
    pub fn is_retryable(&self) -> bool {
        match self {
            EnricherError::Network(_)
            | EnricherError::Timeout(_)
            | EnricherError::RateLimited(_)
            | EnricherError::DatabaseOperation(_) => true,
            EnricherError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// 稳定的错误签名，供重试白名单匹配
    pub fn signature(&self) -> &'static str {
        match self {
            EnricherError::Database(_) | EnricherError::DatabaseOperation(_) => "DatabaseError",
            EnricherError::JobNotFound { .. } => "NotFoundError",
            EnricherError::Network(_) => "NetworkError",
            EnricherError::Timeout(_) => "TimeoutError",
            EnricherError::RateLimited(_) => "RateLimitError",
            EnricherError::Http { .. } => "HttpError",
            EnricherError::Platform(_) => "PlatformError",
            EnricherError::CacheError(_) => "CacheError",
            EnricherError::Serialization(_) => "SerializationError",
            EnricherError::Configuration(_) => "ConfigurationError",
            EnricherError::ValidationError(_) => "ValidationError",
            EnricherError::Unauthorized(_) => "AuthorizationError",
            EnricherError::UnknownJobType(_) => "UnknownJobTypeError",
            EnricherError::JobExecution(_) => "JobExecutionError",
            EnricherError::Internal(_) => "InternalError",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EnricherError::Internal(_) | EnricherError::Configuration(_)
        )
    }

    pub fn user_message(&self) -> &str {
        match self {
            EnricherError::JobNotFound { .. } => "请求的任务记录不存在",
            EnricherError::UnknownJobType(_) => "不支持的任务类型",
            EnricherError::ValidationError(_) => "输入数据验证失败",
            EnricherError::Unauthorized(_) => "认证失败",
            EnricherError::RateLimited(_) => "电商平台限流，请稍后重试",
            EnricherError::Timeout(_) => "操作超时，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for EnricherError {
    fn from(err: serde_json::Error) -> Self {
        EnricherError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for EnricherError {
    fn from(err: anyhow::Error) -> Self {
        EnricherError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests;
