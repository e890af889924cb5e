//! 장 마감 시장 데이터 수집기.
//!
//! 이 crate는 다음을 제공합니다:
//! - 거래일 인식 스케줄러 (지터, 일일 재예약, 단일 대기 트리거)
//! - 다중 소스 일일 동기화 (수동 트리거와 공용 진입점)
//! - 휴장일 일정 갱신, 보존 기간 정리
//! - CLI 바이너리 (`eod-collector`)

pub mod config;
pub mod context;
pub mod error;
pub mod modules;
pub mod stats;

pub use config::CollectorConfig;
pub use context::CollectorContext;
pub use error::{CollectorError, Result};
pub use stats::SyncReport;
