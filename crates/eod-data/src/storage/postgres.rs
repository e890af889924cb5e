//! PostgreSQL 스토리지 구현.
//!
//! 섹션 병합은 JSONB `||` 연산자로 단일 `INSERT ... ON CONFLICT` 문 안에서 수행됩니다.
//! 동일 날짜에 대한 동시 쓰기가 있어도 서로의 섹션을 지우지 않습니다.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use eod_core::{format_canonical, AggregateRecord, DatabaseConfig, HolidayEntry, RecordPatch, Sections, SourceStatus};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::{debug, info, instrument};

use super::{HolidayStore, RecordStore};
use crate::error::{DataError, Result};

/// 데이터베이스 연결 풀 래퍼.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 새로운 데이터베이스 연결 풀을 생성합니다.
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self> {
        info!("데이터베이스 연결 중...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        info!(max_connections = config.max_connections, "데이터베이스 연결 완료");

        Ok(Self { pool })
    }

    /// 기존 연결 풀에서 인스턴스를 생성합니다.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 데이터베이스 마이그레이션을 실행합니다.
    pub async fn migrate(&self) -> Result<()> {
        info!("마이그레이션 실행 중...");
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("마이그레이션 완료");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }
}

// =============================================================================
// Record Store
// =============================================================================

/// `market_daily_records` 행.
#[derive(Debug, Clone, FromRow)]
struct DailyRecordRow {
    date: String,
    canonical: bool,
    data_timestamp: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    sections: Json<Value>,
    sources: Json<Value>,
    raw_payloads: Json<Value>,
}

impl TryFrom<DailyRecordRow> for AggregateRecord {
    type Error = DataError;

    fn try_from(row: DailyRecordRow) -> Result<Self> {
        let sections: Sections = serde_json::from_value(row.sections.0)?;
        let sources: BTreeMap<String, SourceStatus> = serde_json::from_value(row.sources.0)?;
        let raw_payloads: BTreeMap<String, Value> = serde_json::from_value(row.raw_payloads.0)?;

        Ok(AggregateRecord {
            date: row.date,
            canonical: row.canonical,
            data_timestamp: row.data_timestamp,
            last_updated: row.last_updated,
            sections,
            sources,
            raw_payloads,
        })
    }
}

const RECORD_COLUMNS: &str =
    "date, canonical, data_timestamp, last_updated, sections, sources, raw_payloads";

/// PostgreSQL 집계 레코드 저장소.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    #[instrument(skip(self, patch), fields(date = %patch.date, source = %patch.source))]
    async fn upsert_section(&self, patch: &RecordPatch) -> Result<AggregateRecord> {
        let status = SourceStatus {
            updated: true,
            update_time: patch.applied_at,
        };
        let mut sources = serde_json::Map::new();
        sources.insert(patch.source.clone(), serde_json::to_value(&status)?);
        let mut raw_payloads = serde_json::Map::new();
        raw_payloads.insert(patch.source.clone(), patch.raw_payload.clone());

        let sql = format!(
            r#"
            INSERT INTO market_daily_records
                (date, canonical, data_timestamp, last_updated, sections, sources, raw_payloads)
            VALUES ($1, $2, $3, $3, $4, $5, $6)
            ON CONFLICT (date) DO UPDATE SET
                sections = market_daily_records.sections || EXCLUDED.sections,
                sources = market_daily_records.sources || EXCLUDED.sources,
                raw_payloads = market_daily_records.raw_payloads || EXCLUDED.raw_payloads,
                last_updated = GREATEST(market_daily_records.last_updated, EXCLUDED.last_updated)
            RETURNING {}
            "#,
            RECORD_COLUMNS
        );

        let row: DailyRecordRow = sqlx::query_as(&sql)
            .bind(patch.date.as_str())
            .bind(patch.date.is_canonical())
            .bind(patch.applied_at)
            .bind(Json(patch.sections_json()))
            .bind(Json(Value::Object(sources)))
            .bind(Json(Value::Object(raw_payloads)))
            .fetch_one(&self.pool)
            .await?;

        debug!(sections = patch.sections.len(), "섹션 병합 완료");
        row.try_into()
    }

    async fn find_by_date(&self, date: &str) -> Result<Option<AggregateRecord>> {
        let sql = format!(
            "SELECT {} FROM market_daily_records WHERE date = $1",
            RECORD_COLUMNS
        );
        let row: Option<DailyRecordRow> = sqlx::query_as(&sql)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AggregateRecord::try_from).transpose()
    }

    async fn find_latest(&self) -> Result<Option<AggregateRecord>> {
        let sql = format!(
            "SELECT {} FROM market_daily_records WHERE canonical ORDER BY date DESC LIMIT 1",
            RECORD_COLUMNS
        );
        let row: Option<DailyRecordRow> = sqlx::query_as(&sql)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AggregateRecord::try_from).transpose()
    }

    async fn delete_older_than(&self, cutoff: NaiveDate) -> Result<u64> {
        // 정규화된 키는 사전순과 날짜순이 같다
        let result =
            sqlx::query("DELETE FROM market_daily_records WHERE canonical AND date < $1")
                .bind(format_canonical(cutoff))
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Holiday Store
// =============================================================================

#[derive(Debug, Clone, FromRow)]
struct HolidayRow {
    date: NaiveDate,
    name: String,
    weekday: Option<String>,
    description: Option<String>,
    last_updated: DateTime<Utc>,
}

impl From<HolidayRow> for HolidayEntry {
    fn from(row: HolidayRow) -> Self {
        Self {
            date: row.date,
            name: row.name,
            weekday: row.weekday,
            description: row.description,
            last_updated: row.last_updated,
        }
    }
}

/// PostgreSQL 휴장일 저장소.
#[derive(Clone)]
pub struct PgHolidayStore {
    pool: PgPool,
}

impl PgHolidayStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HolidayStore for PgHolidayStore {
    async fn upsert_holiday(&self, entry: &HolidayEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO market_holidays (date, name, weekday, description, last_updated)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (date) DO UPDATE SET
                name = EXCLUDED.name,
                weekday = EXCLUDED.weekday,
                description = EXCLUDED.description,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(entry.date)
        .bind(&entry.name)
        .bind(&entry.weekday)
        .bind(&entry.description)
        .bind(entry.last_updated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_holiday(&self, date: NaiveDate) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM market_holidays WHERE date = $1)")
                .bind(date)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists.0)
    }

    async fn list_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<HolidayEntry>> {
        let rows: Vec<HolidayRow> = sqlx::query_as(
            r#"
            SELECT date, name, weekday, description, last_updated
            FROM market_holidays
            WHERE date BETWEEN $1 AND $2
            ORDER BY date
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(HolidayEntry::from).collect())
    }
}
