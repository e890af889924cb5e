//! 저장소 추상화.
//!
//! - [`RecordStore`]: 날짜 키 기반 집계 레코드 저장소
//! - [`HolidayStore`]: 휴장일 저장소
//!
//! PostgreSQL 구현과 인메모리 구현을 제공합니다.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use eod_core::{AggregateRecord, HolidayEntry, RecordPatch};

use crate::error::Result;

pub use memory::{MemoryHolidayStore, MemoryRecordStore};
pub use postgres::{Database, PgHolidayStore, PgRecordStore};

/// 집계 레코드 저장소.
///
/// 구현체는 [`RecordStore::upsert_section`]을 문서 단위로 원자적으로 수행해야 합니다.
/// 병합 결과는 [`AggregateRecord::apply`]와 동일해야 합니다.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 패치를 병합합니다 (없으면 생성). 병합 후 레코드를 반환합니다.
    async fn upsert_section(&self, patch: &RecordPatch) -> Result<AggregateRecord>;

    /// 날짜 키로 레코드를 조회합니다.
    async fn find_by_date(&self, date: &str) -> Result<Option<AggregateRecord>>;

    /// 가장 최근 날짜(정규화된 키 기준)의 레코드를 조회합니다.
    async fn find_latest(&self) -> Result<Option<AggregateRecord>>;

    /// `cutoff`보다 이전 날짜의 레코드를 삭제합니다.
    ///
    /// 정규화되지 않은 키는 비교할 수 없으므로 삭제 대상이 아닙니다.
    async fn delete_older_than(&self, cutoff: NaiveDate) -> Result<u64>;
}

/// 휴장일 저장소.
#[async_trait]
pub trait HolidayStore: Send + Sync {
    /// 날짜 기준 upsert.
    async fn upsert_holiday(&self, entry: &HolidayEntry) -> Result<()>;

    /// 휴장일 목록에 있는 날짜인지 확인합니다.
    async fn is_holiday(&self, date: NaiveDate) -> Result<bool>;

    /// 기간 내 휴장일 목록 (양 끝 포함, 날짜 오름차순).
    async fn list_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<HolidayEntry>>;
}
