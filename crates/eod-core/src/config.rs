//! 설정 관리.
//!
//! 기본값 → 설정 파일(선택) → `EOD__` 접두사 환경변수 순서로 덮어씁니다.
//!
//! ```text
//! EOD__SCHEDULE__BASE_TIME=16:00
//! EOD__FETCH__MAX_RETRIES=5
//! EOD__RETENTION__DAYS=45
//! ```

use std::path::Path;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{EodError, EodResult};

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 일일 수집 스케줄
    pub schedule: ScheduleConfig,
    /// 업스트림 요청 정책
    pub fetch: FetchConfig,
    /// 보존 기간
    pub retention: RetentionConfig,
    /// 휴장일 갱신 주기
    pub holidays: HolidayRefreshConfig,
    /// 데이터 소스
    pub sources: SourcesConfig,
    /// 알림
    pub notifications: NotificationConfig,
    /// 로깅
    pub logging: LoggingConfig,
    /// 데이터베이스 연결 풀
    pub database: DatabaseConfig,
}

/// 일일 수집 스케줄 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// 거래소 타임존 (IANA 이름)
    pub timezone: String,
    /// 기본 트리거 시각 (HH:MM, 장 마감 데이터 공개 이후)
    pub base_time: String,
    /// 지터 최소값 (초)
    pub jitter_min_secs: u64,
    /// 지터 최대값 (초)
    pub jitter_max_secs: u64,
    /// 하루 스케줄을 다시 계산하는 시각 (HH:MM)
    pub rearm_time: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Taipei".to_string(),
            base_time: "15:30".to_string(),
            jitter_min_secs: 60,
            jitter_max_secs: 180,
            rearm_time: "00:05".to_string(),
        }
    }
}

impl ScheduleConfig {
    /// 타임존 파싱.
    pub fn tz(&self) -> EodResult<Tz> {
        self.timezone
            .parse()
            .map_err(|e| EodError::Config(format!("잘못된 타임존 {}: {}", self.timezone, e)))
    }

    pub fn base_time(&self) -> EodResult<NaiveTime> {
        parse_hhmm("schedule.base_time", &self.base_time)
    }

    pub fn rearm_time(&self) -> EodResult<NaiveTime> {
        parse_hhmm("schedule.rearm_time", &self.rearm_time)
    }

    /// 지터 범위 검증 후 (최소, 최대) 반환.
    pub fn jitter_bounds(&self) -> EodResult<(Duration, Duration)> {
        if self.jitter_min_secs > self.jitter_max_secs {
            return Err(EodError::Config(format!(
                "jitter_min_secs({})가 jitter_max_secs({})보다 큽니다",
                self.jitter_min_secs, self.jitter_max_secs
            )));
        }
        Ok((
            Duration::from_secs(self.jitter_min_secs),
            Duration::from_secs(self.jitter_max_secs),
        ))
    }
}

/// 업스트림 요청 정책.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 최대 재시도 횟수 (첫 시도 제외)
    pub max_retries: u32,
    /// 재시도 간 고정 대기 (밀리초)
    pub retry_delay_ms: u64,
    /// HTTP User-Agent
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_ms: 5000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
                .to_string(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// 보존 정책.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// 보존 일수 (이보다 오래된 레코드 삭제)
    pub days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { days: 30 }
    }
}

/// 휴장일 갱신 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HolidayRefreshConfig {
    /// 갱신 주기 (일)
    pub interval_days: u64,
}

impl Default for HolidayRefreshConfig {
    fn default() -> Self {
        Self { interval_days: 7 }
    }
}

impl HolidayRefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_days.max(1) * 24 * 60 * 60)
    }
}

/// 데이터 소스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// 증권거래소 OpenAPI 기본 URL
    pub twse_base_url: String,
    /// 선물거래소 OpenAPI 기본 URL
    pub taifex_base_url: String,
    /// 선물거래소 보조 URL (주 엔드포인트 실패 또는 데이터 없음 시 같은 경로로 조회)
    pub taifex_fallback_base_url: Option<String>,
    pub enable_twse_daily_summary: bool,
    pub enable_taifex_large_traders: bool,
    pub enable_taifex_pc_ratio: bool,
    pub enable_taifex_institutional: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            twse_base_url: "https://openapi.twse.com.tw/v1".to_string(),
            taifex_base_url: "https://openapi.taifex.com.tw/v1".to_string(),
            taifex_fallback_base_url: None,
            enable_twse_daily_summary: true,
            enable_taifex_large_traders: true,
            enable_taifex_pc_ratio: true,
            enable_taifex_institutional: true,
        }
    }
}

/// 알림 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// 알림 활성화 여부
    pub enabled: bool,
    /// 텔레그램 설정
    pub telegram: TelegramSettings,
}

/// 텔레그램 알림 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connection_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// 기본값, 설정 파일(없어도 됨), 환경변수 순으로 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> EodResult<Self> {
        let defaults = config::Config::try_from(&AppConfig::default())?;

        let builder = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("EOD")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> EodResult<Self> {
        Self::load("config/collector.toml")
    }

    /// 시간/타임존 문자열이 파싱 가능한지 확인합니다.
    pub fn validate(&self) -> EodResult<()> {
        self.schedule.tz()?;
        self.schedule.base_time()?;
        self.schedule.rearm_time()?;
        self.schedule.jitter_bounds()?;
        if self.retention.days <= 0 {
            return Err(EodError::Config(format!(
                "retention.days는 양수여야 합니다: {}",
                self.retention.days
            )));
        }
        Ok(())
    }
}

fn parse_hhmm(field: &str, value: &str) -> EodResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|e| EodError::Config(format!("{} 파싱 실패 ({}): {}", field, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.schedule.tz().unwrap(), chrono_tz::Asia::Taipei);
        let base = config.schedule.base_time().unwrap();
        assert_eq!((base.hour(), base.minute()), (15, 30));
        assert_eq!(config.fetch.timeout(), Duration::from_secs(30));
        assert_eq!(config.retention.days, 30);
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let mut config = AppConfig::default();
        config.schedule.base_time = "25:99".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.schedule.jitter_min_secs = 300;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.schedule.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = AppConfig::load("does/not/exist.toml").unwrap();
        assert_eq!(config.schedule.base_time, "15:30");
        assert_eq!(config.holidays.interval_days, 7);
    }
}
