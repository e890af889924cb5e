//! 핵심 에러 타입.

use thiserror::Error;

/// 핵심 모듈 에러.
#[derive(Debug, Error)]
pub enum EodError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),
}

/// 핵심 작업을 위한 Result 타입.
pub type EodResult<T> = Result<T, EodError>;

impl From<serde_json::Error> for EodError {
    fn from(err: serde_json::Error) -> Self {
        EodError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for EodError {
    fn from(err: config::ConfigError) -> Self {
        EodError::Config(err.to_string())
    }
}
