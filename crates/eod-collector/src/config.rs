//! Collector 설정 모듈.
//!
//! `.env` → 설정 파일 → `EOD__*` 환경변수 순으로 [`AppConfig`]를 로드하고,
//! DB 연결 문자열은 `DATABASE_URL`에서 읽습니다.

use std::path::Path;

use eod_core::AppConfig;

use crate::error::CollectorError;
use crate::Result;

/// 기본 설정 파일 경로.
pub const DEFAULT_CONFIG_PATH: &str = "config/collector.toml";

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 데이터베이스 URL (인메모리 모드에서는 없어도 됨)
    pub database_url: Option<String>,
    /// 애플리케이션 설정
    pub app: AppConfig,
}

impl CollectorConfig {
    /// 설정 파일 경로를 지정해 로드합니다 (없으면 기본 경로).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let app = match path {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::load(DEFAULT_CONFIG_PATH)?,
        };

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Ok(Self { database_url, app })
    }

    /// 코드로 구성한 설정 (테스트, 인메모리 실행).
    pub fn from_app(app: AppConfig) -> Self {
        Self {
            database_url: None,
            app,
        }
    }

    /// PostgreSQL 명령에 필요한 `DATABASE_URL`.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            CollectorError::Config(
                "DATABASE_URL 환경변수가 설정되지 않았습니다 (--memory로 DB 없이 실행 가능)"
                    .to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_database_url() {
        let config = CollectorConfig::from_app(AppConfig::default());
        assert!(config.require_database_url().is_err());

        let config = CollectorConfig {
            database_url: Some("postgres://localhost/eod".to_string()),
            ..config
        };
        assert_eq!(
            config.require_database_url().unwrap(),
            "postgres://localhost/eod"
        );
    }
}
