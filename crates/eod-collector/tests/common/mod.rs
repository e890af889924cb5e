//! 통합 테스트 공용 헬퍼.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use eod_collector::modules::{Clock, DailySync, ScheduleParams, Scheduler};
use eod_core::{
    DateKey, HolidayEntry, MarketSummary, PutCallRatio, RawRecord, ScheduleConfig, SectionPatch,
    SourceKind,
};
use eod_data::{
    DataError, DatedSection, FetchOutcome, HolidayStore, MemoryRecordStore, Reconciler,
    RetryPolicy, SourceFetcher, TradingCalendar,
};
use eod_notification::{
    Notification, NotificationDeduplicator, NotificationManager, NotificationResult,
    NotificationSender,
};
use rust_decimal_macros::dec;

/// 거래소 현지 시각을 UTC로.
pub fn taipei(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    chrono_tz::Asia::Taipei
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn fixed_clock(now: DateTime<Utc>) -> Clock {
    Arc::new(move || now)
}

/// tokio 시간(테스트에서는 paused)을 따라 흐르는 시계.
pub fn advancing_clock(start: DateTime<Utc>) -> Clock {
    let origin = tokio::time::Instant::now();
    Arc::new(move || start + chrono::Duration::from_std(origin.elapsed()).unwrap())
}

pub fn params() -> ScheduleParams {
    ScheduleParams::from_config(&ScheduleConfig::default()).unwrap()
}

/// 고정된 날짜 행을 돌려주는 fetcher.
pub struct StaticFetcher {
    kind: SourceKind,
    dates: Vec<String>,
    fail: bool,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new(kind: SourceKind, dates: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            kind,
            dates: dates.iter().map(|d| d.to_string()).collect(),
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(kind: SourceKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            dates: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn section(&self) -> SectionPatch {
        match self.kind {
            SourceKind::TwseDailySummary => SectionPatch::Market(MarketSummary {
                trade_volume: dec!(7512345678),
                trade_value: dec!(412345678901),
                transaction: dec!(3456789),
                taiex: dec!(19000.12),
                change: dec!(-120.5),
            }),
            _ => SectionPatch::PutCallRatio(PutCallRatio {
                put_volume: dec!(120000),
                call_volume: dec!(100000),
                put_call_volume_ratio: dec!(120.00),
                put_oi: dec!(90000),
                call_oi: dec!(100000),
                put_call_oi_ratio: dec!(90.00),
            }),
        }
    }
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    fn source(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self) -> eod_data::Result<FetchOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DataError::FetchError("connection reset".to_string()));
        }
        Ok(FetchOutcome::from_records(
            self.dates
                .iter()
                .map(|d| RawRecord::new().with("Date", d.as_str()))
                .collect(),
        ))
    }

    fn extract(&self, records: &[RawRecord]) -> Vec<DatedSection> {
        records
            .iter()
            .filter_map(|r| r.get("Date"))
            .map(|token| DatedSection {
                date: DateKey::parse(token),
                raw: vec![RawRecord::new().with("Date", token)],
                section: self.section(),
            })
            .collect()
    }
}

/// 첫 호출은 `delay` 뒤에 응답하고 이후 호출은 패닉하는 fetcher.
pub struct SlowThenPanicFetcher {
    inner: Arc<StaticFetcher>,
    delay: Duration,
    started: AtomicUsize,
}

impl SlowThenPanicFetcher {
    pub fn new(kind: SourceKind, dates: &[&str], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: StaticFetcher::new(kind, dates),
            delay,
            started: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for SlowThenPanicFetcher {
    fn source(&self) -> SourceKind {
        self.inner.source()
    }

    async fn fetch(&self) -> eod_data::Result<FetchOutcome> {
        if self.started.fetch_add(1, Ordering::SeqCst) > 0 {
            panic!("fetcher exploded");
        }
        tokio::time::sleep(self.delay).await;
        self.inner.fetch().await
    }

    fn extract(&self, records: &[RawRecord]) -> Vec<DatedSection> {
        self.inner.extract(records)
    }
}

/// 모든 조회가 실패하는 휴장일 저장소.
pub struct FailingHolidayStore;

#[async_trait]
impl HolidayStore for FailingHolidayStore {
    async fn upsert_holiday(&self, _entry: &HolidayEntry) -> eod_data::Result<()> {
        Err(DataError::ConnectionError("db down".to_string()))
    }

    async fn is_holiday(&self, _date: NaiveDate) -> eod_data::Result<bool> {
        Err(DataError::ConnectionError("db down".to_string()))
    }

    async fn list_between(
        &self,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> eod_data::Result<Vec<HolidayEntry>> {
        Err(DataError::ConnectionError("db down".to_string()))
    }
}

/// 보낸 알림을 기록하는 전송기.
#[derive(Clone, Default)]
pub struct RecordingSender {
    pub sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// 테스트용 스케줄러 조립.
pub struct Harness {
    pub store: Arc<MemoryRecordStore>,
    pub recorder: RecordingSender,
    pub scheduler: Scheduler,
}

pub fn harness(
    fetchers: Vec<Arc<dyn SourceFetcher>>,
    holidays: Arc<dyn HolidayStore>,
    now: DateTime<Utc>,
) -> Harness {
    harness_with_clock(fetchers, holidays, fixed_clock(now))
}

pub fn harness_with_clock(
    fetchers: Vec<Arc<dyn SourceFetcher>>,
    holidays: Arc<dyn HolidayStore>,
    clock: Clock,
) -> Harness {
    let store = Arc::new(MemoryRecordStore::new());
    let sync = DailySync::new(fetchers, Reconciler::new(store.clone()), RetryPolicy::none());

    let recorder = RecordingSender::default();
    let mut manager = NotificationManager::new();
    manager.add_sender(recorder.clone());

    let scheduler = Scheduler::new(sync, TradingCalendar::new(holidays), params())
        .with_notifier(Arc::new(manager), Arc::new(NotificationDeduplicator::new()))
        .with_clock(clock)
        .with_seed(42);

    Harness {
        store,
        recorder,
        scheduler,
    }
}
