//! 로깅 초기화.
//!
//! 필터 우선순위는 CLI `--log-level`, `RUST_LOG`, 설정 파일 `logging.level` 순입니다.
//! 출력 형식은 `LOG_FORMAT` 환경변수가 설정 파일 `logging.format`보다 우선합니다.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{EodError, EodResult};

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// 개발용
    #[default]
    Pretty,
    /// 데몬 운영용 (로그 수집기)
    Json,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = EodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            _ => Err(EodError::Config(format!("알 수 없는 로그 형식: {}", s))),
        }
    }
}

/// 최종 결정된 로깅 설정.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` 지시문 (예: "info", "eod_collector=debug,sqlx=warn")
    pub filter: String,
    pub format: LogFormat,
}

impl LogConfig {
    /// 설정 파일, 환경변수, CLI 인자를 합쳐 로깅 설정을 결정합니다.
    pub fn resolve(settings: &LoggingConfig, cli_level: Option<&str>) -> EodResult<Self> {
        Self::resolve_with(
            settings,
            cli_level,
            std::env::var("RUST_LOG").ok(),
            std::env::var("LOG_FORMAT").ok(),
        )
    }

    fn resolve_with(
        settings: &LoggingConfig,
        cli_level: Option<&str>,
        rust_log: Option<String>,
        log_format: Option<String>,
    ) -> EodResult<Self> {
        let filter = cli_level
            .map(str::to_string)
            .or(rust_log.filter(|value| !value.trim().is_empty()))
            .unwrap_or_else(|| settings.level.clone());
        let format = log_format
            .as_deref()
            .unwrap_or(&settings.format)
            .parse()?;

        Ok(Self { filter, format })
    }
}

/// 전역 tracing 구독자를 설치합니다. 프로세스당 한 번만 호출할 수 있습니다.
pub fn init_logging(config: &LogConfig) -> EodResult<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| EodError::Config(format!("로그 필터 파싱 실패 ({}): {}", config.filter, e)))?;

    let pretty = (config.format == LogFormat::Pretty).then(|| fmt::layer().pretty());
    let json = (config.format == LogFormat::Json).then(|| fmt::layer().json());
    let compact = (config.format == LogFormat::Compact).then(|| fmt::layer().compact());

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .with(compact)
        .try_init()
        .map_err(|e| EodError::Config(format!("로깅 초기화 실패: {}", e)))?;

    tracing::info!(format = ?config.format, filter = %config.filter, "로깅 초기화 완료");
    Ok(())
}

/// 동기화 컨텍스트 필드(날짜, 소스)가 포함된 span을 생성하는 매크로.
#[macro_export]
macro_rules! sync_span {
    ($name:expr, $date:expr) => {
        tracing::info_span!($name, date = %$date)
    };
    ($name:expr, $date:expr, $source:expr) => {
        tracing::info_span!($name, date = %$date, source = %$source)
    };
}
