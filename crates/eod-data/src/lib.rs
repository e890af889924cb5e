//! 데이터 수집 및 저장.
//!
//! 이 crate는 다음을 제공합니다:
//! - 집계 레코드/휴장일 저장소 (PostgreSQL, 인메모리)
//! - 거래소 OpenAPI fetcher
//! - 거래일 캘린더
//! - 섹션 단위 레코드 병합기

pub mod calendar;
pub mod error;
pub mod provider;
pub mod reconciler;
pub mod storage;

pub use calendar::{HolidayRefreshStats, TradingCalendar, MAX_TRADING_DAY_PROBES};
pub use error::{DataError, Result};
pub use reconciler::{ReconcileOutcome, Reconciler};

pub use provider::{
    fetch_with_retry, DatedSection, FetchOutcome, HolidayRow, HolidaySource, OpenApiClient,
    RetryPolicy, SourceFetcher, TaifexInstitutionalFetcher, TaifexLargeTradersFetcher,
    TaifexPcRatioFetcher, TwseDailySummaryFetcher, TwseHolidaySource,
};
pub use storage::{
    Database, HolidayStore, MemoryHolidayStore, MemoryRecordStore, PgHolidayStore, PgRecordStore,
    RecordStore,
};
