//! 수동 트리거 통합 테스트

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{day, harness, taipei, StaticFetcher};
use eod_collector::modules::ScheduleState;
use eod_core::SourceKind;
use eod_data::{MemoryHolidayStore, RecordStore, SourceFetcher};
use eod_notification::NotificationEvent;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_manual_trigger_reports_contributions_and_skips_fresh_sources() {
    // 토요일: 예약 없이 수동 트리거만 사용
    let pc = StaticFetcher::new(SourceKind::TaifexPcRatio, &["1140418"]);
    let market = StaticFetcher::new(SourceKind::TwseDailySummary, &["1140418", "1140417"]);
    let h = harness(
        vec![
            pc.clone() as Arc<dyn SourceFetcher>,
            market.clone() as Arc<dyn SourceFetcher>,
        ],
        Arc::new(MemoryHolidayStore::new()),
        taipei(2025, 4, 19, 11, 0),
    );
    let store = h.store.clone();
    let shutdown = CancellationToken::new();
    let (handle, task) = h.scheduler.spawn(shutdown.clone());

    // 날짜 생략 시 직전 거래일(금요일)
    let first = handle.trigger_now(None, false).await.unwrap();
    assert_eq!(first.target_date, "2025-04-18");
    assert!(first.is_success());
    assert_eq!(first.contributed.len(), 2);
    assert!(first.failures.is_empty());
    assert_eq!(first.dates_reconciled.len(), 2);

    let record = store.find_by_date("2025-04-18").await.unwrap().unwrap();
    assert!(record.sections.market.is_some());
    assert!(record.sections.put_call_ratio.is_some());
    assert_eq!(record.sources.len(), 2);

    // 두 번째 실행은 이미 수집된 소스를 건너뜀
    let second = handle.trigger_now(Some(day(2025, 4, 18)), false).await.unwrap();
    assert!(second.is_success());
    assert!(second.contributed.is_empty());
    assert_eq!(second.skipped.len(), 2);
    assert_eq!(pc.calls(), 1);
    assert_eq!(market.calls(), 1);

    // 수동 트리거는 스케줄 상태를 바꾸지 않음
    assert_eq!(handle.state().await.unwrap(), ScheduleState::Idle);

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_manual_trigger_failure_lists_reasons() {
    let h = harness(
        vec![
            StaticFetcher::failing(SourceKind::TaifexPcRatio) as Arc<dyn SourceFetcher>,
            StaticFetcher::new(SourceKind::TwseDailySummary, &["1140414"]) as Arc<dyn SourceFetcher>,
        ],
        Arc::new(MemoryHolidayStore::new()),
        taipei(2025, 4, 19, 11, 0),
    );
    let recorder = h.recorder.clone();
    let shutdown = CancellationToken::new();
    let (handle, task) = h.scheduler.spawn(shutdown.clone());

    let report = handle
        .trigger_now(Some(day(2025, 4, 15)), false)
        .await
        .unwrap();

    assert!(!report.is_success());
    let reasons = report.failure_reasons();
    assert_eq!(reasons.len(), 2);
    assert!(reasons[0].starts_with("taifex_pc_ratio: "));
    assert!(reasons[0].contains("connection reset"));
    assert!(reasons[1].starts_with("twse_daily_summary: "));
    assert!(reasons[1].contains("2025-04-15"));

    // 다른 날짜 행은 그대로 병합됨
    assert!(report.dates_reconciled.contains("2025-04-14"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(recorder.sent().is_empty());

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_concurrent_manual_triggers_notify_once() {
    let h = harness(
        vec![
            StaticFetcher::new(SourceKind::TaifexPcRatio, &["20250415"]) as Arc<dyn SourceFetcher>,
            StaticFetcher::new(SourceKind::TwseDailySummary, &["1140415"]) as Arc<dyn SourceFetcher>,
        ],
        Arc::new(MemoryHolidayStore::new()),
        taipei(2025, 4, 19, 11, 0),
    );
    let store = h.store.clone();
    let recorder = h.recorder.clone();
    let shutdown = CancellationToken::new();
    let (handle, task) = h.scheduler.spawn(shutdown.clone());

    let date = Some(day(2025, 4, 15));
    let (a, b, c) = tokio::join!(
        handle.trigger_now(date, true),
        handle.trigger_now(date, true),
        handle.trigger_now(date, true),
    );
    for report in [a.unwrap(), b.unwrap(), c.unwrap()] {
        assert!(report.is_success());
    }

    let record = store.find_by_date("2025-04-15").await.unwrap().unwrap();
    assert_eq!(record.sources.len(), 2);
    assert!(record.sections.market.is_some());
    assert!(record.sections.put_call_ratio.is_some());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let sent = recorder.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].business_date(), Some("2025-04-15"));
    assert!(matches!(
        sent[0].event,
        NotificationEvent::DailyDataReady { .. }
    ));

    shutdown.cancel();
    task.await.unwrap();
}
