//! 장 마감 데이터 수집기 CLI.

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use chrono::{Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use eod_collector::modules::{self, SyncOptions};
use eod_collector::{CollectorConfig, CollectorContext};
use eod_core::{parse_date_token, DateKey, LogConfig};
use eod_notification::Notification;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "eod-collector")]
#[command(about = "End-of-day market data collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error). 설정 파일 값을 덮어씀
    #[arg(long)]
    log_level: Option<String>,

    /// 설정 파일 경로 (기본: config/collector.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// DB 없이 인메모리 저장소로 실행
    #[arg(long)]
    memory: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 데몬 모드: 거래일마다 예약 실행 (Ctrl-C로 종료)
    Daemon,

    /// 일일 동기화 즉시 실행
    Sync {
        /// 대상 날짜 (예: "2025-04-15", "1140415", "20250415"). 기본: 최근 거래일
        #[arg(long)]
        date: Option<String>,

        /// 이미 수집된 소스도 다시 가져옴
        #[arg(long)]
        force: bool,
    },

    /// 휴장일 일정 갱신
    RefreshHolidays,

    /// 저장된 휴장일 목록 출력 (연도 생략 시 올해)
    Holidays {
        #[arg(long)]
        year: Option<i32>,
    },

    /// 보존 기간이 지난 레코드 삭제
    Cleanup {
        /// 보존 일수 (기본: 설정값)
        #[arg(long)]
        days: Option<i64>,
    },

    /// 저장된 레코드를 JSON으로 출력 (날짜 생략 시 최신)
    Show {
        #[arg(long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CollectorConfig::load(cli.config.as_deref()).context("설정 로드 실패")?;

    // 로깅 초기화
    let log_config = LogConfig::resolve(&config.app.logging, cli.log_level.as_deref())?;
    eod_core::init_logging(&log_config)?;

    tracing::info!("EOD Collector 시작");

    let context = CollectorContext::connect(config, cli.memory).await?;
    let outcome = run_command(&context, cli.command).await;
    context.close().await;

    tracing::info!("EOD Collector 종료");
    outcome
}

async fn run_command(context: &CollectorContext, command: Commands) -> anyhow::Result<()> {
    let app = &context.config.app;
    let tz = app.schedule.tz()?;
    let today = Utc::now().with_timezone(&tz).date_naive();

    match command {
        Commands::Daemon => {
            let shutdown = CancellationToken::new();
            let (handle, task) = context.scheduler()?.spawn(shutdown.clone());

            tracing::info!(state = %handle.state().await?, "=== 데몬 모드 시작 ===");

            tokio::signal::ctrl_c().await?;
            tracing::info!("종료 신호 수신, 데몬 종료 중...");
            shutdown.cancel();
            task.await?;
        }
        Commands::Sync { date, force } => {
            let date = match date {
                Some(token) => parse_date_arg(&token)?,
                None => modules::resolve_target_date(&context.calendar(), today).await,
            };

            let sync = context.daily_sync()?;
            let report = sync.run(SyncOptions { date, force }).await;
            report.log_summary("수동 동기화");
            println!("{}", serde_json::to_string_pretty(&report)?);

            if !report.is_success() {
                return Err(anyhow!(
                    "{} 동기화 실패: {}",
                    report.target_date,
                    report.failure_reasons().join(", ")
                ));
            }

            // 처음 준비된 날짜만 알림 (같은 날 재실행 시 중복 방지)
            if !report.newly_ready {
                tracing::info!(date = %report.target_date, "이미 수집된 날짜, 알림 생략");
                return Ok(());
            }

            let notifier = context.notifier();
            if notifier.enabled_count() > 0 {
                let sections = context
                    .records
                    .find_by_date(&report.target_date)
                    .await?
                    .map(|record| {
                        record
                            .sections
                            .present()
                            .iter()
                            .map(|kind| kind.as_str().to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                notifier
                    .notify(&Notification::new(report.ready_event(sections)))
                    .await;
            }
        }
        Commands::RefreshHolidays => {
            let source = context.holiday_source()?;
            let stats = modules::refresh_holidays(&context.calendar(), source.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Holidays { year } => {
            let year = year.unwrap_or_else(|| today.year());
            let (from, to) = NaiveDate::from_ymd_opt(year, 1, 1)
                .zip(NaiveDate::from_ymd_opt(year, 12, 31))
                .ok_or_else(|| anyhow!("지원하지 않는 연도: {}", year))?;
            let holidays = context.calendar().holidays_between(from, to).await?;
            println!("{}", serde_json::to_string_pretty(&holidays)?);
        }
        Commands::Cleanup { days } => {
            let days = days.unwrap_or(app.retention.days);
            let report =
                modules::cleanup_old_records(context.records.as_ref(), today, days).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Show { date } => {
            let record = match date {
                Some(token) => {
                    let key = DateKey::parse(&token);
                    context.records.find_by_date(key.as_str()).await?
                }
                None => context.records.find_latest().await?,
            };
            match record {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => tracing::warn!("저장된 레코드가 없습니다"),
            }
        }
    }

    Ok(())
}

fn parse_date_arg(token: &str) -> anyhow::Result<NaiveDate> {
    parse_date_token(token).ok_or_else(|| anyhow!("날짜 형식을 해석할 수 없습니다: {}", token))
}
