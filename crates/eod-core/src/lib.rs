//! # EOD Core
//!
//! 장 마감(end-of-day) 시장 데이터 수집기의 핵심 도메인 모델과 유틸리티를 제공합니다.
//!
//! - 거래소 날짜 토큰 정규화 (민국 연도, 숫자형, ISO)
//! - 날짜별 집계 레코드와 섹션 패치
//! - 휴장일 항목
//! - 쉼표 구분 숫자 문자열 파싱
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod date;
pub mod domain;
pub mod error;
pub mod logging;
pub mod number;

pub use config::*;
pub use date::{
    format_canonical, is_canonical, normalize_date, parse_canonical, parse_date_token, DateKey,
};
pub use domain::*;
pub use error::{EodError, EodResult};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use number::{parse_decimal, parse_decimal_lenient};
