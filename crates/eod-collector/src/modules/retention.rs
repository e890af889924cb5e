//! 보존 기간 정리 모듈.

use std::time::Instant;

use chrono::{Duration, NaiveDate};
use eod_data::RecordStore;
use serde::Serialize;

use crate::Result;

/// 정리 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    /// 이 날짜보다 이전인 정규 레코드가 삭제됨
    pub cutoff: NaiveDate,
    pub deleted: u64,
}

/// 삭제 기준일 (`today - days`).
pub fn retention_cutoff(today: NaiveDate, days: i64) -> NaiveDate {
    today - Duration::days(days.max(0))
}

/// 보존 기간이 지난 레코드를 삭제합니다.
///
/// 날짜 키가 정규 형식이 아닌 레코드는 대상이 아닙니다.
pub async fn cleanup_old_records(
    store: &dyn RecordStore,
    today: NaiveDate,
    days: i64,
) -> Result<RetentionReport> {
    let start = Instant::now();
    let cutoff = retention_cutoff(today, days);

    tracing::info!(cutoff = %cutoff, retention_days = days, "오래된 레코드 정리 시작");

    let deleted = store.delete_older_than(cutoff).await?;

    tracing::info!(
        cutoff = %cutoff,
        deleted,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "오래된 레코드 정리 완료"
    );

    Ok(RetentionReport { cutoff, deleted })
}
