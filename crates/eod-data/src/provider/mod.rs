//! 업스트림 데이터 소스.
//!
//! 각 fetcher는 비어 있지 않은 원시 레코드 목록 또는 명시적인 "데이터 없음"을 반환합니다.
//! 네트워크/파싱 실패는 호출자가 "이번 주기 데이터 없음"으로 취급합니다.
//!
//! - [`twse`]: 증권거래소 일별 시장 요약, 휴장일 일정
//! - [`taifex`]: 선물거래소 대규모 트레이더 미결제, 풋/콜 비율, 3대 기관 포지션

pub mod http;
pub mod taifex;
pub mod twse;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use eod_core::{parse_decimal_lenient, DateKey, FetchConfig, RawRecord, SectionPatch, SourceKind};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::Result;

pub use http::OpenApiClient;
pub use taifex::{TaifexInstitutionalFetcher, TaifexLargeTradersFetcher, TaifexPcRatioFetcher};
pub use twse::{TwseDailySummaryFetcher, TwseHolidaySource};

/// 한 번의 fetch 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// 비어 있지 않은 원시 레코드 목록 (업스트림 순서 유지)
    Records(Vec<RawRecord>),
    /// 업스트림에 아직 데이터가 없음
    NoData,
}

impl FetchOutcome {
    /// 빈 목록이면 [`FetchOutcome::NoData`]로 변환합니다.
    pub fn from_records(records: Vec<RawRecord>) -> Self {
        if records.is_empty() {
            Self::NoData
        } else {
            Self::Records(records)
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }
}

/// 특정 날짜에 귀속된 추출 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct DatedSection {
    pub date: DateKey,
    /// 이 날짜에 해당하는 원시 레코드 (rawPayloads 보관용)
    pub raw: Vec<RawRecord>,
    pub section: SectionPatch,
}

impl DatedSection {
    /// 원시 레코드를 JSON 배열로 변환합니다.
    pub fn raw_payload(&self) -> serde_json::Value {
        serde_json::Value::Array(self.raw.iter().map(RawRecord::to_json).collect())
    }
}

/// 업스트림 데이터 소스.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// 소스 식별자.
    fn source(&self) -> SourceKind;

    /// 원시 레코드를 가져옵니다.
    async fn fetch(&self) -> Result<FetchOutcome>;

    /// 원시 레코드에서 날짜별 섹션을 추출합니다.
    ///
    /// 날짜 컬럼이 없는 레코드는 건너뛰고, 개별 숫자 필드 실패는 0으로 대체합니다.
    fn extract(&self, records: &[RawRecord]) -> Vec<DatedSection>;
}

/// 휴장일 원본 행.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolidayRow {
    /// 정규화 전 날짜 토큰
    pub date: String,
    pub name: String,
    pub weekday: Option<String>,
    pub description: Option<String>,
}

/// 휴장일 일정 소스.
#[async_trait]
pub trait HolidaySource: Send + Sync {
    async fn fetch_holidays(&self) -> Result<Vec<HolidayRow>>;
}

// =============================================================================
// Retry
// =============================================================================

/// 고정 간격 재시도 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 첫 시도 이후 최대 재시도 횟수
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay())
    }

    /// 재시도 없음.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

/// 재시도 가능한 오류에 한해 고정 간격으로 재시도합니다.
///
/// 재시도 불가 오류나 재시도 소진 시 마지막 오류를 반환합니다.
pub async fn fetch_with_retry(
    fetcher: &dyn SourceFetcher,
    policy: RetryPolicy,
) -> Result<FetchOutcome> {
    let mut attempt = 0;
    loop {
        match fetcher.fetch().await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(
                    source = %fetcher.source(),
                    attempt = attempt,
                    max_retries = policy.max_retries,
                    error = %e,
                    "fetch 실패, 재시도 대기"
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// =============================================================================
// Field helpers
// =============================================================================

/// 레코드를 정규화된 날짜별로 묶습니다.
///
/// 날짜 컬럼이 없거나 비어 있는 레코드는 경고 후 제외합니다.
/// 결과는 날짜 키 오름차순입니다.
pub fn group_by_date(
    source: SourceKind,
    records: &[RawRecord],
    date_aliases: &[&str],
) -> Vec<(DateKey, Vec<RawRecord>)> {
    let mut groups: BTreeMap<String, (DateKey, Vec<RawRecord>)> = BTreeMap::new();

    for record in records {
        let token = match record.get_any(date_aliases).filter(|t| !t.trim().is_empty()) {
            Some(token) => token,
            None => {
                warn!(source = %source, columns = ?date_aliases, "날짜 컬럼이 없는 레코드 제외");
                continue;
            }
        };
        let key = DateKey::parse(token);
        groups
            .entry(key.as_str().to_string())
            .or_insert_with(|| (key, Vec::new()))
            .1
            .push(record.clone());
    }

    debug!(source = %source, dates = groups.len(), "날짜별 그룹화 완료");
    groups.into_values().collect()
}

/// 숫자 필드를 별칭 목록으로 조회합니다.
///
/// 컬럼이 없거나 파싱에 실패하면 경고 후 0을 반환합니다.
pub fn decimal_field(record: &RawRecord, field: &str, aliases: &[&str]) -> Decimal {
    match record.get_any(aliases) {
        Some(raw) => parse_decimal_lenient(field, raw),
        None => {
            warn!(field = field, "필드 컬럼 없음, 0으로 대체");
            Decimal::ZERO
        }
    }
}

/// 문자열 필드를 별칭 목록으로 조회합니다 (없으면 빈 문자열).
pub fn text_field(record: &RawRecord, aliases: &[&str]) -> String {
    record
        .get_any(aliases)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
