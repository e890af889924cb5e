//! 실행 컨텍스트.
//!
//! 저장소(PostgreSQL 또는 인메모리), fetcher, 캘린더, 알림 관리자를 설정에서 조립합니다.

use std::sync::Arc;

use eod_core::SourcesConfig;
use eod_data::{
    Database, HolidaySource, HolidayStore, MemoryHolidayStore, MemoryRecordStore, OpenApiClient,
    PgHolidayStore, PgRecordStore, Reconciler, RecordStore, RetryPolicy, SourceFetcher,
    TaifexInstitutionalFetcher, TaifexLargeTradersFetcher, TaifexPcRatioFetcher, TradingCalendar,
    TwseDailySummaryFetcher, TwseHolidaySource,
};
use eod_notification::{
    NotificationDeduplicator, NotificationManager, TelegramConfig, TelegramSender,
};

use crate::config::CollectorConfig;
use crate::error::CollectorError;
use crate::modules::{DailySync, ScheduleParams, Scheduler};
use crate::Result;

/// 명령 실행에 필요한 의존성 묶음.
pub struct CollectorContext {
    pub config: CollectorConfig,
    pub records: Arc<dyn RecordStore>,
    pub holidays: Arc<dyn HolidayStore>,
    database: Option<Database>,
}

impl CollectorContext {
    /// 저장소를 연결합니다. `memory`이면 DB 없이 인메모리 저장소를 사용합니다.
    pub async fn connect(config: CollectorConfig, memory: bool) -> Result<Self> {
        if memory {
            tracing::warn!("인메모리 저장소 사용, 종료 시 데이터가 사라집니다");
            return Ok(Self::in_memory(config));
        }

        let url = config.require_database_url()?.to_string();
        let database = Database::connect(&url, &config.app.database).await?;
        database.migrate().await?;
        if !database.health_check().await? {
            return Err(CollectorError::Config(
                "데이터베이스 상태 확인 실패".to_string(),
            ));
        }

        let pool = database.pool().clone();
        Ok(Self {
            records: Arc::new(PgRecordStore::new(pool.clone())),
            holidays: Arc::new(PgHolidayStore::new(pool)),
            database: Some(database),
            config,
        })
    }

    pub fn in_memory(config: CollectorConfig) -> Self {
        Self {
            config,
            records: Arc::new(MemoryRecordStore::new()),
            holidays: Arc::new(MemoryHolidayStore::new()),
            database: None,
        }
    }

    pub fn calendar(&self) -> TradingCalendar {
        TradingCalendar::new(self.holidays.clone())
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.records.clone())
    }

    fn client(&self) -> Result<OpenApiClient> {
        Ok(OpenApiClient::new(&self.config.app.fetch)?)
    }

    /// 설정에서 활성화된 소스로 일일 동기화 실행기를 만듭니다.
    pub fn daily_sync(&self) -> Result<DailySync> {
        let fetchers = build_fetchers(&self.config.app.sources, &self.client()?);
        if fetchers.is_empty() {
            tracing::warn!("활성화된 데이터 소스가 없습니다");
        }
        Ok(DailySync::new(
            fetchers,
            self.reconciler(),
            RetryPolicy::from_config(&self.config.app.fetch),
        ))
    }

    pub fn holiday_source(&self) -> Result<Arc<dyn HolidaySource>> {
        Ok(Arc::new(TwseHolidaySource::new(
            self.client()?,
            self.config.app.sources.twse_base_url.clone(),
        )))
    }

    /// 알림 설정이 켜져 있으면 텔레그램 전송기를 등록합니다.
    pub fn notifier(&self) -> NotificationManager {
        let mut manager = NotificationManager::new();
        let settings = &self.config.app.notifications;
        if !settings.enabled {
            return manager;
        }

        let telegram = if settings.telegram.enabled {
            Some(TelegramConfig::from_settings(&settings.telegram))
        } else {
            TelegramConfig::from_env()
        };

        match telegram.map(TelegramSender::new) {
            Some(Ok(sender)) => {
                manager.add_sender(sender);
                tracing::info!("텔레그램 알림 활성화");
            }
            Some(Err(e)) => tracing::warn!(error = %e, "텔레그램 전송기 생성 실패"),
            None => tracing::warn!("알림이 켜져 있지만 텔레그램 설정이 없습니다"),
        }
        manager
    }

    /// 데몬용 스케줄러를 조립합니다.
    pub fn scheduler(&self) -> Result<Scheduler> {
        let app = &self.config.app;
        let params = ScheduleParams::from_config(&app.schedule)?;

        Ok(Scheduler::new(self.daily_sync()?, self.calendar(), params)
            .with_holiday_refresh(self.holiday_source()?, app.holidays.interval())
            .with_retention_days(app.retention.days)
            .with_notifier(
                Arc::new(self.notifier()),
                Arc::new(NotificationDeduplicator::new()),
            ))
    }

    /// DB 연결을 닫습니다.
    pub async fn close(self) {
        if let Some(database) = self.database {
            database.pool().close().await;
        }
    }
}

/// 활성화 플래그에 따라 fetcher 목록을 만듭니다.
pub fn build_fetchers(
    sources: &SourcesConfig,
    client: &OpenApiClient,
) -> Vec<Arc<dyn SourceFetcher>> {
    let mut fetchers: Vec<Arc<dyn SourceFetcher>> = Vec::new();

    if sources.enable_twse_daily_summary {
        fetchers.push(Arc::new(TwseDailySummaryFetcher::new(
            client.clone(),
            sources.twse_base_url.clone(),
        )));
    }
    if sources.enable_taifex_large_traders {
        fetchers.push(Arc::new(
            TaifexLargeTradersFetcher::new(client.clone(), sources.taifex_base_url.clone())
                .with_fallback(sources.taifex_fallback_base_url.clone()),
        ));
    }
    if sources.enable_taifex_pc_ratio {
        fetchers.push(Arc::new(
            TaifexPcRatioFetcher::new(client.clone(), sources.taifex_base_url.clone())
                .with_fallback(sources.taifex_fallback_base_url.clone()),
        ));
    }
    if sources.enable_taifex_institutional {
        fetchers.push(Arc::new(
            TaifexInstitutionalFetcher::new(client.clone(), sources.taifex_base_url.clone())
                .with_fallback(sources.taifex_fallback_base_url.clone()),
        ));
    }

    fetchers
}

#[cfg(test)]
mod tests {
    use super::*;
    use eod_core::{AppConfig, FetchConfig, SourceKind};

    #[test]
    fn test_build_fetchers_respects_flags() {
        let client = OpenApiClient::new(&FetchConfig::default()).unwrap();
        let mut sources = SourcesConfig::default();
        assert_eq!(build_fetchers(&sources, &client).len(), 4);

        sources.enable_taifex_large_traders = false;
        sources.enable_twse_daily_summary = false;
        let kinds: Vec<SourceKind> = build_fetchers(&sources, &client)
            .iter()
            .map(|f| f.source())
            .collect();
        assert_eq!(
            kinds,
            vec![SourceKind::TaifexPcRatio, SourceKind::TaifexInstitutional]
        );
    }

    #[tokio::test]
    async fn test_in_memory_context() {
        let context = CollectorContext::in_memory(CollectorConfig::from_app(AppConfig::default()));
        let sync = context.daily_sync().unwrap();
        assert_eq!(sync.sources().len(), 4);
        assert_eq!(context.notifier().enabled_count(), 0);
        assert!(context.scheduler().is_ok());
        context.close().await;
    }
}
