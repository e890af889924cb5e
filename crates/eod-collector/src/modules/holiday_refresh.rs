//! 휴장일 일정 갱신 모듈.

use std::time::Instant;

use eod_data::{HolidayRefreshStats, HolidaySource, TradingCalendar};

use crate::Result;

/// 휴장일 일정을 가져와 캘린더 저장소에 반영합니다.
pub async fn refresh_holidays(
    calendar: &TradingCalendar,
    source: &dyn HolidaySource,
) -> Result<HolidayRefreshStats> {
    let start = Instant::now();
    tracing::info!("휴장일 일정 갱신 시작");

    let stats = calendar.refresh(source).await?;

    tracing::info!(
        fetched = stats.fetched,
        upserted = stats.upserted,
        malformed = stats.malformed,
        weekend = stats.weekend,
        failed = stats.failed,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "휴장일 일정 갱신 완료"
    );

    Ok(stats)
}
