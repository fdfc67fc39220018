use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    #[error("Web server error: {0}")]
    WebServerError(String),
}

impl AppError {
    /// 上游语义错误：请求的起始时间早于 10000 点回看上限。
    /// 命中后当前时间段停止继续倒推，不重试。
    pub fn is_horizon_exceeded(&self) -> bool {
        match self {
            AppError::ApiError(msg) => {
                msg.contains("too long ago") || msg.contains("10000 points")
            }
            _ => false,
        }
    }

    /// 上游语义错误：时间范围参数不被接受，降级为不带 from 的请求。
    pub fn is_range_too_broad(&self) -> bool {
        match self {
            AppError::ApiError(msg) => {
                msg.contains("range too broad") || msg.contains("INVALID_PARAM_VALUE")
            }
            _ => false,
        }
    }

    /// 币种不存在（下架或拼写错误），调用方一般跳过该币种。
    pub fn is_invalid_currency_pair(&self) -> bool {
        match self {
            AppError::ApiError(msg) => msg.contains("INVALID_CURRENCY_PAIR"),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
