//! 레코드 병합기.
//!
//! 소스가 가져온 페이로드를 날짜별 집계 레코드에 섹션 단위로 병합합니다.
//! 같은 날짜에 대한 병합은 날짜별 락으로 직렬화되고,
//! 저장소 upsert 자체도 문서 단위로 원자적입니다.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use eod_core::{AggregateRecord, DateKey, RecordPatch, SectionPatch};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::storage::RecordStore;

/// 날짜 키별 비동기 락.
#[derive(Default)]
struct DateLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DateLocks {
    fn get(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(key.to_string()).or_default().clone()
    }

    /// 대기자가 없으면 락 항목을 제거합니다.
    fn release(&self, key: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        // 맵 + 호출자 보유분만 남은 경우
        if Arc::strong_count(&lock) <= 2 {
            map.remove(key);
        }
    }
}

/// 병합 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub record: AggregateRecord,
    /// 이번 병합으로 레코드가 처음 생성되었는지
    pub created: bool,
}

/// 날짜별 집계 레코드 병합기.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    locks: Arc<DateLocks>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            locks: Arc::new(DateLocks::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// 현재 시각으로 병합합니다.
    pub async fn reconcile(
        &self,
        date_token: &str,
        source: &str,
        raw_payload: serde_json::Value,
        sections: Vec<SectionPatch>,
    ) -> Result<ReconcileOutcome> {
        self.reconcile_at(date_token, source, raw_payload, sections, Utc::now())
            .await
    }

    /// 주어진 시각으로 병합합니다.
    ///
    /// 1. 날짜 정규화 (실패 시 원본 토큰을 키로 사용, 비정규 레코드로 표시)
    /// 2. 패치에 포함된 섹션만 덮어씀
    /// 3. `sources[source]`, `rawPayloads[source]` 갱신
    /// 4. 날짜 키로 upsert
    pub async fn reconcile_at(
        &self,
        date_token: &str,
        source: &str,
        raw_payload: serde_json::Value,
        sections: Vec<SectionPatch>,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        let date = DateKey::parse(date_token);
        if !date.is_canonical() {
            warn!(
                token = date_token,
                source = source,
                "정규화되지 않은 날짜 키로 저장, 점검 필요"
            );
        }

        let patch = RecordPatch::new(date, source, raw_payload, sections, now);
        self.apply_patch(&patch).await
    }

    /// 이미 구성된 패치를 병합합니다.
    pub async fn apply_patch(&self, patch: &RecordPatch) -> Result<ReconcileOutcome> {
        let key = patch.date.as_str().to_string();
        let lock = self.locks.get(&key);

        let result: Result<(AggregateRecord, bool)> = async {
            let _guard = lock.lock().await;
            let existed = self.store.find_by_date(&key).await?.is_some();
            let record = self.store.upsert_section(patch).await?;
            Ok((record, !existed))
        }
        .await;
        self.locks.release(&key, lock);

        let (record, created) = result?;
        let sections: Vec<&str> = patch.sections.iter().map(|s| s.kind().as_str()).collect();
        if created {
            info!(date = %key, source = %patch.source, sections = ?sections, "집계 레코드 생성");
        } else {
            debug!(date = %key, source = %patch.source, sections = ?sections, "집계 레코드 병합");
        }

        Ok(ReconcileOutcome { record, created })
    }
}
