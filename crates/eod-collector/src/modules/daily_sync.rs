//! 일일 동기화 실행.
//!
//! 모든 소스를 동시에 가져와 날짜별로 병합합니다.
//! 소스 하나의 실패는 다른 소스에 영향을 주지 않으며, 그 소스는 "이번 주기 데이터 없음"이 됩니다.
//! 스케줄러의 자동 트리거와 수동 트리거가 같은 진입점([`DailySync::run`])을 사용합니다.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use eod_core::{format_canonical, sync_span, AggregateRecord, RecordPatch, SourceKind};
use eod_data::{
    fetch_with_retry, FetchOutcome, Reconciler, RetryPolicy, SourceFetcher, TradingCalendar,
};
use futures::future::join_all;
use tracing::{debug, info, warn, Instrument};

use crate::stats::SyncReport;

/// 동기화 옵션
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// 대상 영업일
    pub date: NaiveDate,
    /// 이미 수집된 소스도 다시 가져올지
    pub force: bool,
}

impl SyncOptions {
    pub fn new(date: NaiveDate) -> Self {
        Self { date, force: false }
    }

    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// 소스 하나의 처리 결과.
#[derive(Debug, Default)]
struct SourceRun {
    contributed_target: bool,
    dates: Vec<String>,
    sections_written: usize,
    failures: Vec<String>,
}

/// 일일 동기화 실행기.
#[derive(Clone)]
pub struct DailySync {
    fetchers: Vec<Arc<dyn SourceFetcher>>,
    reconciler: Reconciler,
    retry: RetryPolicy,
}

impl DailySync {
    pub fn new(
        fetchers: Vec<Arc<dyn SourceFetcher>>,
        reconciler: Reconciler,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            fetchers,
            reconciler,
            retry,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// 등록된 소스 목록.
    pub fn sources(&self) -> Vec<SourceKind> {
        self.fetchers.iter().map(|f| f.source()).collect()
    }

    /// 대상 날짜 동기화를 실행합니다.
    ///
    /// 대상 날짜에 하나 이상의 소스가 기여하면(또는 이미 최신이면) 성공입니다.
    pub async fn run(&self, options: SyncOptions) -> SyncReport {
        let target = format_canonical(options.date);
        let span = sync_span!("daily_sync", target);

        async {
            let started = Instant::now();
            let mut report = SyncReport::new(target.clone(), options.force);

            let existing = self.load_existing(&target).await;
            let was_ready = existing.as_ref().is_some_and(|record| {
                self.fetchers
                    .iter()
                    .any(|f| record.has_fresh_source(f.source().as_str()))
            });
            let mut pending = Vec::new();
            for fetcher in &self.fetchers {
                let name = fetcher.source().as_str();
                let fresh = existing
                    .as_ref()
                    .map(|record| record.has_fresh_source(name))
                    .unwrap_or(false);
                if fresh && !options.force {
                    info!(source = name, "이미 수집된 소스, 건너뜀");
                    report.skipped.insert(name.to_string());
                } else {
                    pending.push(fetcher.clone());
                }
            }

            info!(
                sources = pending.len(),
                skipped = report.skipped.len(),
                force = options.force,
                "동기화 시작"
            );

            let runs = join_all(
                pending
                    .iter()
                    .map(|fetcher| self.sync_source(fetcher.as_ref(), &target)),
            )
            .await;

            for (fetcher, run) in pending.iter().zip(runs) {
                let name = fetcher.source().as_str();
                if run.contributed_target {
                    report.contributed.insert(name.to_string());
                }
                for reason in run.failures {
                    report.record_failure(name, reason);
                }
                report.dates_reconciled.extend(run.dates);
                report.sections_written += run.sections_written;
            }

            report.newly_ready = !was_ready && !report.contributed.is_empty();
            report.elapsed = started.elapsed();
            report
        }
        .instrument(span)
        .await
    }

    async fn load_existing(&self, target: &str) -> Option<AggregateRecord> {
        match self.reconciler.store().find_by_date(target).await {
            Ok(record) => record,
            Err(e) => {
                // 신선도를 모르면 모두 다시 가져온다
                warn!(error = %e, "기존 레코드 조회 실패");
                None
            }
        }
    }

    async fn sync_source(&self, fetcher: &dyn SourceFetcher, target: &str) -> SourceRun {
        let source = fetcher.source();
        let span = sync_span!("sync_source", target, source);

        async {
            let mut run = SourceRun::default();

            let records = match fetch_with_retry(fetcher, self.retry).await {
                Ok(FetchOutcome::Records(records)) => records,
                Ok(FetchOutcome::NoData) => {
                    info!("업스트림 데이터 없음");
                    run.failures.push("업스트림 데이터 없음".to_string());
                    return run;
                }
                Err(e) => {
                    warn!(error = %e, "fetch 실패, 이번 주기 데이터 없음으로 처리");
                    run.failures.push(e.to_string());
                    return run;
                }
            };

            let extracted = fetcher.extract(&records);
            debug!(records = records.len(), dates = extracted.len(), "섹션 추출 완료");

            for dated in extracted {
                let patch = RecordPatch::new(
                    dated.date.clone(),
                    source.as_str(),
                    dated.raw_payload(),
                    vec![dated.section.clone()],
                    chrono::Utc::now(),
                );
                match self.reconciler.apply_patch(&patch).await {
                    Ok(_) => {
                        run.sections_written += 1;
                        run.dates.push(dated.date.as_str().to_string());
                        if dated.date.as_str() == target {
                            run.contributed_target = true;
                        }
                    }
                    Err(e) => {
                        warn!(date = %dated.date, error = %e, "병합 저장 실패");
                        run.failures.push(format!("{} 저장 실패: {}", dated.date, e));
                    }
                }
            }

            if !run.contributed_target {
                run.failures.push(format!("{} 데이터 없음", target));
            }
            run
        }
        .instrument(span)
        .await
    }
}

/// 수동 트리거의 기본 대상 날짜.
///
/// 오늘이 거래일이면 오늘, 아니면 직전 거래일. 캘린더 조회 실패 시 오늘.
pub async fn resolve_target_date(calendar: &TradingCalendar, today: NaiveDate) -> NaiveDate {
    match calendar.nearest_trading_day(today).await {
        Ok(Some(date)) => date,
        Ok(None) => {
            warn!(today = %today, "최근 거래일을 찾지 못함, 오늘 날짜 사용");
            today
        }
        Err(e) => {
            warn!(today = %today, error = %e, "캘린더 조회 실패, 오늘 날짜 사용");
            today
        }
    }
}
