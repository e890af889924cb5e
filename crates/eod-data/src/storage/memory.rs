//! 인메모리 저장소.
//!
//! 테스트와 DB 없는 드라이런(`--memory`)에서 사용합니다.
//! 쓰기 락 안에서 읽기-수정-쓰기를 수행하므로 문서 단위 원자성이 보장됩니다.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use eod_core::{format_canonical, AggregateRecord, HolidayEntry, RecordPatch};
use tokio::sync::RwLock;

use super::{HolidayStore, RecordStore};
use crate::error::Result;

/// 인메모리 집계 레코드 저장소.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<String, AggregateRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 레코드 수.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// 병합 경로를 거치지 않고 레코드를 그대로 넣습니다 (테스트 시드용).
    pub async fn insert_raw(&self, record: AggregateRecord) {
        self.records
            .write()
            .await
            .insert(record.date.clone(), record);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn upsert_section(&self, patch: &RecordPatch) -> Result<AggregateRecord> {
        let mut records = self.records.write().await;
        let record = records
            .entry(patch.date.as_str().to_string())
            .or_insert_with(|| AggregateRecord::new(&patch.date, patch.applied_at));
        record.apply(patch);
        Ok(record.clone())
    }

    async fn find_by_date(&self, date: &str) -> Result<Option<AggregateRecord>> {
        Ok(self.records.read().await.get(date).cloned())
    }

    async fn find_latest(&self) -> Result<Option<AggregateRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .rev()
            .find(|r| r.canonical)
            .cloned())
    }

    async fn delete_older_than(&self, cutoff: NaiveDate) -> Result<u64> {
        let cutoff = format_canonical(cutoff);
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|date, record| !(record.canonical && date.as_str() < cutoff.as_str()));
        Ok((before - records.len()) as u64)
    }
}

/// 인메모리 휴장일 저장소.
#[derive(Debug, Default)]
pub struct MemoryHolidayStore {
    holidays: RwLock<BTreeMap<NaiveDate, HolidayEntry>>,
}

impl MemoryHolidayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 날짜 목록으로 초기화합니다.
    pub fn with_dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        let holidays = dates
            .into_iter()
            .map(|date| (date, HolidayEntry::new(date, "holiday")))
            .collect();
        Self {
            holidays: RwLock::new(holidays),
        }
    }
}

#[async_trait]
impl HolidayStore for MemoryHolidayStore {
    async fn upsert_holiday(&self, entry: &HolidayEntry) -> Result<()> {
        self.holidays
            .write()
            .await
            .insert(entry.date, entry.clone());
        Ok(())
    }

    async fn is_holiday(&self, date: NaiveDate) -> Result<bool> {
        Ok(self.holidays.read().await.contains_key(&date))
    }

    async fn list_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<HolidayEntry>> {
        Ok(self
            .holidays
            .read()
            .await
            .range(from..=to)
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}
