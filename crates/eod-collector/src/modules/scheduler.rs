//! 거래일 인식 스케줄러.
//!
//! 하나의 제어 루프(actor)가 스케줄 상태와 단 하나의 대기 트리거를 소유합니다.
//! 외부에서는 [`SchedulerHandle`]을 통해 명령만 보낼 수 있습니다.
//!
//! # 상태 전이
//!
//! ```text
//! Idle ──(거래일)──▶ Armed(t) ──(t 도달)──▶ Running ──(완료)──▶ DoneToday
//!   ▲                                                             │
//!   └──────────────────────(매일 재계산 시각)─────────────────────┘
//! ```
//!
//! - 휴장일/주말이면 그날은 `Idle` 유지
//! - 캘린더 조회 실패 시 기본 시각에 지터 없이 무조건 예약
//! - 재예약은 이전 트리거를 교체 (대기 트리거는 항상 최대 하나)
//! - 휴장일 갱신(주간)과 보존 정리(일간)는 독립된 주기로 실행

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use eod_core::{EodResult, ScheduleConfig};
use eod_data::{HolidaySource, TradingCalendar};
use eod_notification::{
    Notification, NotificationDeduplicator, NotificationEvent, NotificationManager,
    NotificationPriority,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::daily_sync::{resolve_target_date, DailySync, SyncOptions};
use super::holiday_refresh::refresh_holidays;
use super::retention::cleanup_old_records;
use crate::error::CollectorError;
use crate::stats::SyncReport;
use crate::Result;

/// 현재 시각 공급자 (테스트에서 고정 시각 주입).
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// 명령 채널 크기.
const COMMAND_BUFFER: usize = 32;

/// 보존 정리 주기.
const RETENTION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// 스케줄러 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "at", rename_all = "snake_case")]
pub enum ScheduleState {
    /// 예약 없음 (휴장일 또는 시작 직후)
    Idle,
    /// 트리거 예약됨
    Armed(DateTime<Utc>),
    /// 일일 동기화 실행 중
    Running,
    /// 오늘 실행 완료
    DoneToday,
}

impl fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Armed(at) => write!(f, "ARMED({})", at.to_rfc3339()),
            Self::Running => write!(f, "RUNNING"),
            Self::DoneToday => write!(f, "DONE_TODAY"),
        }
    }
}

/// 스케줄 시각 파라미터.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleParams {
    pub tz: Tz,
    /// 기본 트리거 시각 (거래소 현지 시각)
    pub base_time: NaiveTime,
    /// 하루 스케줄 재계산 시각 (거래소 현지 시각)
    pub rearm_time: NaiveTime,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl ScheduleParams {
    pub fn from_config(config: &ScheduleConfig) -> EodResult<Self> {
        let (jitter_min, jitter_max) = config.jitter_bounds()?;
        Ok(Self {
            tz: config.tz()?,
            base_time: config.base_time()?,
            rearm_time: config.rearm_time()?,
            jitter_min,
            jitter_max,
        })
    }

    /// `now` 기준 거래소 현지 날짜.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// 해당 날짜의 기본 트리거 시각.
    pub fn base_trigger(&self, date: NaiveDate) -> DateTime<Utc> {
        self.local_to_utc(date, self.base_time)
    }

    /// `now` 이후 첫 재계산 시각.
    pub fn next_rearm(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.local_date(now);
        let candidate = self.local_to_utc(today, self.rearm_time);
        if candidate > now {
            return candidate;
        }
        match today.succ_opt() {
            Some(tomorrow) => self.local_to_utc(tomorrow, self.rearm_time),
            None => candidate + chrono::Duration::days(1),
        }
    }

    fn local_to_utc(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let naive = date.and_time(time);
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            // 존재하지 않는 현지 시각(DST 공백)은 UTC로 해석
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
    }
}

/// 하루 예약 결정.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmDecision {
    /// 휴장일/주말: 예약하지 않음
    Holiday,
    /// 정상 예약
    Arm { at: DateTime<Utc>, jitter: Duration },
    /// 캘린더 조회 실패: 기본 시각에 지터 없이 예약
    Fallback { at: DateTime<Utc> },
}

impl ArmDecision {
    pub fn trigger_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Holiday => None,
            Self::Arm { at, .. } | Self::Fallback { at } => Some(*at),
        }
    }
}

/// 오늘의 트리거 시각을 계산합니다.
///
/// - 기본 시각 이전: `base + jitter`
/// - 기본 시각 이후: `now + jitter`
/// - 지터는 매번 `[jitter_min, jitter_max]`에서 균등 추출
pub fn plan_arm<R: Rng + ?Sized>(
    now: DateTime<Utc>,
    params: &ScheduleParams,
    trading_day: std::result::Result<bool, String>,
    rng: &mut R,
) -> ArmDecision {
    let base = params.base_trigger(params.local_date(now));

    match trading_day {
        Err(_) => ArmDecision::Fallback { at: base },
        Ok(false) => ArmDecision::Holiday,
        Ok(true) => {
            let jitter_secs =
                rng.gen_range(params.jitter_min.as_secs()..=params.jitter_max.as_secs());
            let jitter = Duration::from_secs(jitter_secs);
            let anchor = if now > base { now } else { base };
            let at = anchor + chrono::Duration::seconds(jitter_secs as i64);
            ArmDecision::Arm { at, jitter }
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

enum SchedulerCommand {
    TriggerNow {
        date: Option<NaiveDate>,
        force: bool,
        reply: oneshot::Sender<SyncReport>,
    },
    Rearm,
    State {
        reply: oneshot::Sender<ScheduleState>,
    },
}

/// 스케줄러 제어 루프로 명령을 보내는 핸들.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// 수동 트리거. 자동 트리거와 같은 동기화 진입점을 사용합니다.
    ///
    /// `date`가 없으면 오늘(휴장일이면 직전 거래일)을 대상으로 합니다.
    pub async fn trigger_now(&self, date: Option<NaiveDate>, force: bool) -> Result<SyncReport> {
        let (reply, rx) = oneshot::channel();
        self.send(SchedulerCommand::TriggerNow { date, force, reply })
            .await?;
        rx.await.map_err(|_| closed())
    }

    /// 오늘의 예약을 다시 계산합니다.
    pub async fn rearm(&self) -> Result<()> {
        self.send(SchedulerCommand::Rearm).await
    }

    pub async fn state(&self) -> Result<ScheduleState> {
        let (reply, rx) = oneshot::channel();
        self.send(SchedulerCommand::State { reply }).await?;
        rx.await.map_err(|_| closed())
    }

    async fn send(&self, command: SchedulerCommand) -> Result<()> {
        self.tx.send(command).await.map_err(|_| closed())
    }
}

fn closed() -> CollectorError {
    CollectorError::Scheduler("스케줄러 루프가 종료되었습니다".to_string())
}

// =============================================================================
// Actor
// =============================================================================

enum RunKind {
    /// 예약 실행 (예약을 계산한 영업일)
    Scheduled(NaiveDate),
    Manual(oneshot::Sender<SyncReport>),
}

struct RunCompletion {
    kind: RunKind,
    report: SyncReport,
    /// 실행 후 대상 레코드에 존재하는 섹션
    sections: Vec<String>,
}

/// 대기 중인 트리거 (단 하나).
#[derive(Debug, Clone, Copy)]
struct PendingTrigger {
    at: DateTime<Utc>,
    /// 예약을 계산한 영업일. 트리거가 자정을 넘겨도 이 날짜를 동기화한다
    date: NaiveDate,
    deadline: Instant,
}

/// 스케줄러 구성.
pub struct Scheduler {
    sync: DailySync,
    calendar: TradingCalendar,
    params: ScheduleParams,
    holiday_source: Option<Arc<dyn HolidaySource>>,
    holiday_interval: Duration,
    retention_days: i64,
    notifier: Arc<NotificationManager>,
    dedup: Arc<NotificationDeduplicator>,
    clock: Clock,
    rng: StdRng,
}

impl Scheduler {
    pub fn new(sync: DailySync, calendar: TradingCalendar, params: ScheduleParams) -> Self {
        Self {
            sync,
            calendar,
            params,
            holiday_source: None,
            holiday_interval: Duration::from_secs(7 * 24 * 60 * 60),
            retention_days: 30,
            notifier: Arc::new(NotificationManager::new()),
            dedup: Arc::new(NotificationDeduplicator::new()),
            clock: Arc::new(Utc::now),
            rng: StdRng::from_entropy(),
        }
    }

    /// 휴장일 일정 소스와 갱신 주기.
    pub fn with_holiday_refresh(mut self, source: Arc<dyn HolidaySource>, every: Duration) -> Self {
        self.holiday_source = Some(source);
        self.holiday_interval = every;
        self
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_notifier(
        mut self,
        notifier: Arc<NotificationManager>,
        dedup: Arc<NotificationDeduplicator>,
    ) -> Self {
        self.notifier = notifier;
        self.dedup = dedup;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// 지터 난수 시드 고정.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// 제어 루프를 시작하고 핸들을 반환합니다.
    pub fn spawn(self, shutdown: CancellationToken) -> (SchedulerHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(self.run(rx, shutdown));
        (SchedulerHandle { tx }, task)
    }

    async fn run(self, rx: mpsc::Receiver<SchedulerCommand>, shutdown: CancellationToken) {
        let mut actor = SchedulerLoop {
            state: ScheduleState::Idle,
            pending: None,
            done_date: None,
            scheduled_task: None,
            runs: JoinSet::new(),
            notifications: JoinSet::new(),
            config: self,
        };
        actor.run(rx, shutdown).await;
    }
}

/// 제어 루프가 소유하는 가변 상태.
struct SchedulerLoop {
    state: ScheduleState,
    pending: Option<PendingTrigger>,
    /// 예약 실행을 마친 현지 날짜
    done_date: Option<NaiveDate>,
    /// 실행 중인 예약 작업의 task id와 영업일
    scheduled_task: Option<(task::Id, NaiveDate)>,
    runs: JoinSet<RunCompletion>,
    notifications: JoinSet<()>,
    config: Scheduler,
}

impl SchedulerLoop {
    async fn run(&mut self, mut rx: mpsc::Receiver<SchedulerCommand>, shutdown: CancellationToken) {
        info!(
            timezone = %self.config.params.tz,
            base_time = %self.config.params.base_time,
            rearm_time = %self.config.params.rearm_time,
            "스케줄러 시작"
        );

        if self.config.holiday_source.is_some() {
            self.refresh_calendar().await;
        }
        self.arm_today().await;

        let mut rearm_at = self.next_rearm_deadline();

        let holiday_every = self.config.holiday_interval;
        let mut holiday_ticker =
            tokio::time::interval_at(Instant::now() + holiday_every, holiday_every);
        holiday_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut retention_ticker =
            tokio::time::interval_at(Instant::now() + RETENTION_INTERVAL, RETENTION_INTERVAL);
        retention_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let trigger = self.pending.map(|p| p.deadline);

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("종료 신호 수신, 스케줄러 종료 중...");
                    break;
                }

                command = rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        info!("모든 핸들이 해제됨, 스케줄러 종료");
                        break;
                    }
                },

                _ = sleep_until(trigger) => {
                    self.fire();
                }

                _ = tokio::time::sleep_until(rearm_at) => {
                    debug!("일일 재계산 시각 도달");
                    self.arm_today().await;
                    rearm_at = self.next_rearm_deadline();
                }

                Some(joined) = self.runs.join_next(), if !self.runs.is_empty() => {
                    self.joined(joined);
                }

                Some(_) = self.notifications.join_next(), if !self.notifications.is_empty() => {}

                _ = holiday_ticker.tick() => {
                    if self.config.holiday_source.is_some() {
                        self.refresh_calendar().await;
                    }
                }

                _ = retention_ticker.tick() => {
                    self.cleanup().await;
                }
            }
        }

        // 진행 중인 fetch는 중단하지 않고 끝까지 기다린다
        if !self.runs.is_empty() {
            info!(in_flight = self.runs.len(), "진행 중인 동기화 완료 대기");
        }
        while let Some(joined) = self.runs.join_next().await {
            self.joined(joined);
        }
        while self.notifications.join_next().await.is_some() {}

        info!("스케줄러 종료");
    }

    async fn handle_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::TriggerNow { date, force, reply } => {
                info!(date = ?date, force, "수동 트리거 수신");
                self.spawn_run(RunKind::Manual(reply), date, force);
            }
            SchedulerCommand::Rearm => {
                self.arm_today().await;
            }
            SchedulerCommand::State { reply } => {
                let _ = reply.send(self.state);
            }
        }
    }

    /// 오늘의 예약을 계산합니다. 기존 예약은 교체됩니다.
    async fn arm_today(&mut self) {
        let now = self.now();
        let today = self.config.params.local_date(now);

        if self.state == ScheduleState::Running {
            info!(today = %today, "동기화 실행 중, 재예약 건너뜀");
            return;
        }
        if self.done_date == Some(today) {
            debug!(today = %today, "오늘 실행 완료, 재예약 건너뜀");
            return;
        }

        let lookup = self
            .config
            .calendar
            .is_trading_day(today)
            .await
            .map_err(|e| e.to_string());
        if let Err(e) = &lookup {
            warn!(
                today = %today,
                error = %e,
                "캘린더 조회 실패, 기본 시각으로 예약 (지터 없음)"
            );
        }

        let decision = plan_arm(now, &self.config.params, lookup, &mut self.config.rng);
        match decision {
            ArmDecision::Holiday => {
                info!(today = %today, "휴장일, 오늘은 예약하지 않음");
                self.pending = None;
                self.state = ScheduleState::Idle;
            }
            ArmDecision::Arm { at, jitter } => {
                info!(
                    today = %today,
                    trigger_at = %at.with_timezone(&self.config.params.tz),
                    jitter_secs = jitter.as_secs(),
                    "일일 동기화 예약"
                );
                self.install(at, now, today);
            }
            ArmDecision::Fallback { at } => {
                info!(
                    today = %today,
                    trigger_at = %at.with_timezone(&self.config.params.tz),
                    "기본 시각으로 예약"
                );
                self.install(at, now, today);
            }
        }
    }

    fn install(&mut self, at: DateTime<Utc>, now: DateTime<Utc>, date: NaiveDate) {
        if let Some(previous) = self.pending.take() {
            debug!(previous = %previous.at, "기존 예약 취소");
        }
        let wait = (at - now).to_std().unwrap_or(Duration::ZERO);
        self.pending = Some(PendingTrigger {
            at,
            date,
            deadline: Instant::now() + wait,
        });
        self.state = ScheduleState::Armed(at);
    }

    fn fire(&mut self) {
        let Some(trigger) = self.pending.take() else {
            return;
        };
        let date = trigger.date;
        info!(date = %date, "예약 시각 도달, 일일 동기화 실행");
        self.state = ScheduleState::Running;
        let id = self.spawn_run(RunKind::Scheduled(date), Some(date), false);
        self.scheduled_task = Some((id, date));
    }

    fn spawn_run(&mut self, kind: RunKind, date: Option<NaiveDate>, force: bool) -> task::Id {
        let sync = self.config.sync.clone();
        let calendar = self.config.calendar.clone();
        let today = self.config.params.local_date(self.now());

        self.runs.spawn(async move {
            let date = match date {
                Some(date) => date,
                None => resolve_target_date(&calendar, today).await,
            };
            let report = sync.run(SyncOptions { date, force }).await;
            let sections = match sync.reconciler().store().find_by_date(&report.target_date).await
            {
                Ok(Some(record)) => record
                    .sections
                    .present()
                    .iter()
                    .map(|kind| kind.as_str().to_string())
                    .collect(),
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!(error = %e, "실행 후 레코드 조회 실패");
                    Vec::new()
                }
            };
            RunCompletion {
                kind,
                report,
                sections,
            }
        })
        .id()
    }

    fn joined(&mut self, joined: std::result::Result<RunCompletion, task::JoinError>) {
        match joined {
            Ok(completion) => self.complete(completion),
            Err(e) => {
                error!(error = %e, "동기화 작업 비정상 종료");
                // 수동 실행의 패닉은 예약 상태에 영향 없음
                if let Some((id, date)) = self.scheduled_task {
                    if id == e.id() {
                        self.finish_today(date);
                    }
                }
            }
        }
    }

    fn complete(&mut self, completion: RunCompletion) {
        let RunCompletion {
            kind,
            report,
            sections,
        } = completion;

        let scheduled = matches!(kind, RunKind::Scheduled(_));
        report.log_summary(if scheduled {
            "예약 동기화"
        } else {
            "수동 동기화"
        });

        if let RunKind::Scheduled(date) = kind {
            self.finish_today(date);
            if !report.is_success() {
                self.dispatch(
                    Notification::new(NotificationEvent::SyncFailed {
                        date: report.target_date.clone(),
                        reasons: report.failure_reasons(),
                    })
                    .with_priority(NotificationPriority::High),
                );
            }
        }

        if report.is_success() && self.config.dedup.should_notify(&report.target_date) {
            self.dispatch(Notification::new(report.ready_event(sections)));
        }

        if let RunKind::Manual(reply) = kind {
            let _ = reply.send(report);
        }
    }

    fn finish_today(&mut self, date: NaiveDate) {
        self.scheduled_task = None;
        self.state = ScheduleState::DoneToday;
        self.done_date = Some(date);
    }

    fn dispatch(&mut self, notification: Notification) {
        let notifier = self.config.notifier.clone();
        self.notifications.spawn(async move {
            notifier.notify(&notification).await;
        });
    }

    async fn refresh_calendar(&self) {
        let Some(source) = self.config.holiday_source.as_ref() else {
            return;
        };
        if let Err(e) = refresh_holidays(&self.config.calendar, source.as_ref()).await {
            error!(error = %e, "휴장일 일정 갱신 실패");
        }
    }

    async fn cleanup(&self) {
        let today = self.config.params.local_date(self.now());
        let store = self.config.sync.reconciler().store().clone();
        if let Err(e) = cleanup_old_records(store.as_ref(), today, self.config.retention_days).await
        {
            error!(error = %e, "보존 기간 정리 실패");
        }
    }

    fn next_rearm_deadline(&self) -> Instant {
        let now = self.now();
        let at = self.config.params.next_rearm(now);
        Instant::now() + (at - now).to_std().unwrap_or(Duration::ZERO)
    }

    fn now(&self) -> DateTime<Utc> {
        (self.config.clock)()
    }
}

/// 대기 트리거가 없으면 영원히 대기합니다.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
