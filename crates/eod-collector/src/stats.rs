//! 동기화 실행 결과.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use eod_notification::NotificationEvent;
use serde::{Deserialize, Serialize};

/// 한 번의 일일 동기화 실행 결과
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// 대상 영업일 (`YYYY-MM-DD`)
    pub target_date: String,
    /// 이미 수집된 소스도 다시 가져왔는지
    pub forced: bool,
    /// 대상 날짜에 섹션을 기여한 소스
    pub contributed: BTreeSet<String>,
    /// 이미 최신이라 건너뛴 소스
    pub skipped: BTreeSet<String>,
    /// 소스별 실패 사유 (데이터 없음 포함)
    pub failures: BTreeMap<String, String>,
    /// 병합된 모든 날짜 키
    pub dates_reconciled: BTreeSet<String>,
    /// 저장된 섹션 패치 수
    pub sections_written: usize,
    /// 실행 전에는 대상 날짜에 수집된 소스가 없었고 이번 실행으로 생겼는지
    pub newly_ready: bool,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn new(target_date: impl Into<String>, forced: bool) -> Self {
        Self {
            target_date: target_date.into(),
            forced,
            ..Default::default()
        }
    }

    /// 대상 날짜에 하나 이상의 소스가 기여했거나 이미 최신이면 성공.
    pub fn is_success(&self) -> bool {
        !self.contributed.is_empty() || !self.skipped.is_empty()
    }

    /// `"source: reason"` 형식의 실패 사유 목록.
    pub fn failure_reasons(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|(source, reason)| format!("{}: {}", source, reason))
            .collect()
    }

    /// 실패 사유를 기록합니다. 이미 있으면 덧붙입니다.
    pub fn record_failure(&mut self, source: &str, reason: impl Into<String>) {
        let reason = reason.into();
        self.failures
            .entry(source.to_string())
            .and_modify(|existing| {
                existing.push_str("; ");
                existing.push_str(&reason);
            })
            .or_insert(reason);
    }

    /// 수집 완료 알림 이벤트.
    pub fn ready_event(&self, sections: Vec<String>) -> NotificationEvent {
        NotificationEvent::DailyDataReady {
            date: self.target_date.clone(),
            contributed: self.contributed.union(&self.skipped).cloned().collect(),
            sections,
            failed: self.failures.keys().cloned().collect(),
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            target_date = %self.target_date,
            forced = self.forced,
            success = self.is_success(),
            contributed = ?self.contributed,
            skipped = ?self.skipped,
            failed = self.failures.len(),
            dates = self.dates_reconciled.len(),
            sections = self.sections_written,
            newly_ready = self.newly_ready,
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "동기화 완료"
        );
        for (source, reason) in &self.failures {
            tracing::warn!(source = %source, reason = %reason, "소스 실패");
        }
    }
}
