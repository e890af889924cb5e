//! 대만증권거래소(TWSE) OpenAPI 소스.
//!
//! - 일별 시장 요약 (`exchangeReport/FMTQIK`): 날짜는 민국 연도 `RRRMMDD`
//! - 휴장일 일정 (`holidaySchedule/holidaySchedule`)

use async_trait::async_trait;
use eod_core::{MarketSummary, RawRecord, SectionPatch, SourceKind};
use tracing::{info, warn};

use super::{
    decimal_field, group_by_date, text_field, DatedSection, FetchOutcome, HolidayRow,
    HolidaySource, OpenApiClient, SourceFetcher,
};
use crate::error::Result;

const DATE: &[&str] = &["Date", "日期"];
const TRADE_VOLUME: &[&str] = &["TradeVolume", "成交股數"];
const TRADE_VALUE: &[&str] = &["TradeValue", "成交金額"];
const TRANSACTION: &[&str] = &["Transaction", "成交筆數"];
const TAIEX: &[&str] = &["TAIEX", "發行量加權股價指數"];
const CHANGE: &[&str] = &["Change", "漲跌點數"];

const HOLIDAY_NAME: &[&str] = &["Name", "名稱"];
const HOLIDAY_WEEKDAY: &[&str] = &["Weekday", "星期"];
const HOLIDAY_DESCRIPTION: &[&str] = &["Description", "說明"];

/// 일별 시장 요약 fetcher.
///
/// 응답은 당월 거래일 전체를 담고 있으므로 날짜별로 나누어 반환합니다.
pub struct TwseDailySummaryFetcher {
    client: OpenApiClient,
    base_url: String,
}

impl TwseDailySummaryFetcher {
    pub fn new(client: OpenApiClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self) -> String {
        format!("{}/exchangeReport/FMTQIK", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SourceFetcher for TwseDailySummaryFetcher {
    fn source(&self) -> SourceKind {
        SourceKind::TwseDailySummary
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        let records = self.client.get_records(&self.url()).await?;
        Ok(FetchOutcome::from_records(records))
    }

    fn extract(&self, records: &[RawRecord]) -> Vec<DatedSection> {
        group_by_date(self.source(), records, DATE)
            .into_iter()
            .filter_map(|(date, rows)| {
                // 날짜당 한 줄이 정상, 중복 시 마지막 행 사용
                let row = rows.last()?.clone();
                let section = SectionPatch::Market(MarketSummary {
                    trade_volume: decimal_field(&row, "TradeVolume", TRADE_VOLUME),
                    trade_value: decimal_field(&row, "TradeValue", TRADE_VALUE),
                    transaction: decimal_field(&row, "Transaction", TRANSACTION),
                    taiex: decimal_field(&row, "TAIEX", TAIEX),
                    change: decimal_field(&row, "Change", CHANGE),
                });
                Some(DatedSection {
                    date,
                    raw: rows,
                    section,
                })
            })
            .collect()
    }
}

/// 휴장일 일정 소스.
pub struct TwseHolidaySource {
    client: OpenApiClient,
    base_url: String,
}

impl TwseHolidaySource {
    pub fn new(client: OpenApiClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/holidaySchedule/holidaySchedule",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl HolidaySource for TwseHolidaySource {
    async fn fetch_holidays(&self) -> Result<Vec<HolidayRow>> {
        let records = self.client.get_records(&self.url()).await?;
        let rows = holiday_rows(&records);
        info!(rows = rows.len(), "휴장일 일정 조회 완료");
        Ok(rows)
    }
}

fn holiday_rows(records: &[RawRecord]) -> Vec<HolidayRow> {
    records
        .iter()
        .filter_map(|record| {
            let date = text_field(record, DATE);
            if date.is_empty() {
                warn!(record = ?record, "날짜가 없는 휴장일 행 제외");
                return None;
            }
            let optional = |aliases: &[&str]| Some(text_field(record, aliases)).filter(|s| !s.is_empty());
            Some(HolidayRow {
                date,
                name: text_field(record, HOLIDAY_NAME),
                weekday: optional(HOLIDAY_WEEKDAY),
                description: optional(HOLIDAY_DESCRIPTION),
            })
        })
        .collect()
}
