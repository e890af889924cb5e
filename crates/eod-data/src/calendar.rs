//! 거래일 캘린더.
//!
//! 휴장일 집합은 저장소에 보관되고 주말은 저장하지 않습니다.
//! 거래일 = 주말도 아니고 휴장일 집합에도 없는 날짜.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use eod_core::{is_weekend, parse_date_token, HolidayEntry};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::provider::HolidaySource;
use crate::storage::HolidayStore;

/// 다음/이전 거래일 탐색 최대 횟수.
pub const MAX_TRADING_DAY_PROBES: i64 = 10;

/// 휴장일 갱신 결과.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HolidayRefreshStats {
    /// 원본 행 수
    pub fetched: usize,
    /// 저장된 행 수
    pub upserted: usize,
    /// 날짜를 해석할 수 없어 제외된 행 수
    pub malformed: usize,
    /// 주말이라 제외된 행 수
    pub weekend: usize,
    /// 저장 중 오류가 난 행 수
    pub failed: usize,
}

/// 휴장일 저장소 기반 거래일 캘린더.
#[derive(Clone)]
pub struct TradingCalendar {
    store: Arc<dyn HolidayStore>,
}

impl TradingCalendar {
    pub fn new(store: Arc<dyn HolidayStore>) -> Self {
        Self { store }
    }

    /// 휴장일 집합에 있는 날짜인지 확인합니다. 주말은 판단하지 않습니다.
    pub async fn is_holiday(&self, date: NaiveDate) -> Result<bool> {
        self.store.is_holiday(date).await
    }

    pub async fn is_trading_day(&self, date: NaiveDate) -> Result<bool> {
        if is_weekend(date) {
            return Ok(false);
        }
        Ok(!self.is_holiday(date).await?)
    }

    /// `date` 이후 첫 거래일. 10일 안에 없으면 `None`.
    pub async fn next_trading_day(&self, date: NaiveDate) -> Result<Option<NaiveDate>> {
        self.probe(date, 1).await
    }

    /// `date` 이전 마지막 거래일. 10일 안에 없으면 `None`.
    pub async fn previous_trading_day(&self, date: NaiveDate) -> Result<Option<NaiveDate>> {
        self.probe(date, -1).await
    }

    /// `date`가 거래일이면 그대로, 아니면 직전 거래일.
    pub async fn nearest_trading_day(&self, date: NaiveDate) -> Result<Option<NaiveDate>> {
        if self.is_trading_day(date).await? {
            return Ok(Some(date));
        }
        self.previous_trading_day(date).await
    }

    /// `[from, to]` 구간에 등록된 휴장일 (날짜 오름차순).
    pub async fn holidays_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<HolidayEntry>> {
        self.store.list_between(from, to).await
    }

    async fn probe(&self, date: NaiveDate, step: i64) -> Result<Option<NaiveDate>> {
        let mut candidate = date;
        for _ in 0..MAX_TRADING_DAY_PROBES {
            candidate += Duration::days(step);
            if self.is_trading_day(candidate).await? {
                return Ok(Some(candidate));
            }
        }
        debug!(
            from = %date,
            probes = MAX_TRADING_DAY_PROBES,
            "탐색 범위 내 거래일 없음"
        );
        Ok(None)
    }

    /// 휴장일 일정을 가져와 날짜 기준으로 upsert합니다.
    ///
    /// 개별 행 오류는 건너뛰며 배치를 중단하지 않습니다.
    pub async fn refresh(&self, source: &dyn HolidaySource) -> Result<HolidayRefreshStats> {
        let rows = source.fetch_holidays().await?;
        let mut stats = HolidayRefreshStats {
            fetched: rows.len(),
            ..Default::default()
        };

        for row in rows {
            let date = match parse_date_token(&row.date) {
                Some(date) => date,
                None => {
                    warn!(date = %row.date, name = %row.name, "휴장일 날짜 해석 실패, 건너뜀");
                    stats.malformed += 1;
                    continue;
                }
            };
            if is_weekend(date) {
                debug!(date = %date, name = %row.name, "주말 휴장일 행 제외");
                stats.weekend += 1;
                continue;
            }

            let mut entry = HolidayEntry::new(date, row.name);
            entry.weekday = row.weekday;
            entry.description = row.description;

            match self.store.upsert_holiday(&entry).await {
                Ok(()) => stats.upserted += 1,
                Err(e) => {
                    warn!(date = %date, error = %e, "휴장일 저장 실패");
                    stats.failed += 1;
                }
            }
        }

        info!(
            fetched = stats.fetched,
            upserted = stats.upserted,
            malformed = stats.malformed,
            weekend = stats.weekend,
            failed = stats.failed,
            "휴장일 갱신 완료"
        );
        Ok(stats)
    }
}
