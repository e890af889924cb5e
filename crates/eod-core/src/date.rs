//! 거래소 날짜 토큰 정규화.
//!
//! 거래소 API는 날짜를 여러 형식으로 내려줍니다:
//! - 민국(ROC) 연도 슬래시 형식: `114/04/15`
//! - 서기 슬래시 형식: `2025/4/15`
//! - 민국 연도 숫자 형식: `1140415` (RRRMMDD)
//! - 서기 숫자 형식: `20250415`
//! - ISO 형식: `2025-04-15`
//!
//! 정규화 결과(`YYYY-MM-DD`)는 집계 레코드의 조인 키이므로
//! 같은 입력에 대해 항상 같은 출력을 반환해야 합니다.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 정규화된 날짜 문자열 형식.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d";

/// 민국 연도와 서기 연도의 차이.
pub const ROC_YEAR_OFFSET: i32 = 1911;

/// 슬래시 형식에서 첫 성분이 이 값보다 작으면 민국 연도로 해석합니다.
const ROC_SLASH_THRESHOLD: i32 = 200;

/// 규칙에 맞지 않을 때 마지막으로 시도하는 일반 형식들.
const FALLBACK_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y.%m.%d", "%Y%m%d", "%d %b %Y", "%b %d, %Y"];
const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// 날짜 토큰을 `YYYY-MM-DD`로 정규화합니다.
///
/// 어떤 규칙에도 맞지 않으면 원본 토큰을 그대로 반환하고 경고를 남깁니다.
/// 호출자는 결과가 [`is_canonical`]을 만족하지 않으면 "파싱 실패"로 취급해야 합니다.
pub fn normalize_date(token: &str) -> String {
    match parse_date_token(token) {
        Some(date) => date.format(CANONICAL_FORMAT).to_string(),
        None => {
            warn!(token = token, "날짜 토큰 정규화 실패, 원본 유지");
            token.to_string()
        }
    }
}

/// 날짜 토큰을 파싱합니다 (규칙 순서대로, 첫 매칭 우선).
pub fn parse_date_token(token: &str) -> Option<NaiveDate> {
    let s = token.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(parts) = slash_triplet(s) {
        let (first, month, day) = parts;
        let year = if first < ROC_SLASH_THRESHOLD {
            first + ROC_YEAR_OFFSET
        } else {
            first
        };
        if let Some(date) = ymd(year, month, day) {
            return Some(date);
        }
    } else if s.len() == 7 && all_digits(s) {
        let year: i32 = s[0..3].parse().ok()?;
        let month: u32 = s[3..5].parse().ok()?;
        let day: u32 = s[5..7].parse().ok()?;
        if let Some(date) = ymd(year + ROC_YEAR_OFFSET, month, day) {
            return Some(date);
        }
    } else if s.len() == 8 && all_digits(s) {
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y%m%d") {
            return Some(date);
        }
    } else if s.len() == 10 && s.contains('-') {
        if let Ok(date) = NaiveDate::parse_from_str(s, CANONICAL_FORMAT) {
            return Some(date);
        }
    }

    fallback_parse(s)
}

/// 이미 정규화된 `YYYY-MM-DD` 문자열인지 확인합니다.
pub fn is_canonical(s: &str) -> bool {
    parse_canonical(s).is_some()
}

/// 정규화된 문자열을 날짜로 변환합니다.
pub fn parse_canonical(s: &str) -> Option<NaiveDate> {
    if s.len() != 10 {
        return None;
    }
    let bytes = s.as_bytes();
    if bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    NaiveDate::parse_from_str(s, CANONICAL_FORMAT).ok()
}

/// 날짜를 정규화 문자열로 변환합니다.
pub fn format_canonical(date: NaiveDate) -> String {
    date.format(CANONICAL_FORMAT).to_string()
}

fn slash_triplet(s: &str) -> Option<(i32, u32, u32)> {
    let parts: Vec<&str> = s.split('/').map(str::trim).collect();
    if parts.len() != 3 || !parts.iter().all(|p| !p.is_empty() && all_digits(p)) {
        return None;
    }
    Some((
        parts[0].parse().ok()?,
        parts[1].parse().ok()?,
        parts[2].parse().ok()?,
    ))
}

fn fallback_parse(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in FALLBACK_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    FALLBACK_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

fn all_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

/// 집계 레코드의 날짜 키.
///
/// 정규화에 실패한 토큰도 유실하지 않도록 원본을 키로 보존하고
/// `canonical = false`로 표시합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateKey {
    key: String,
    canonical: bool,
}

impl DateKey {
    /// 임의의 날짜 토큰에서 키를 생성합니다.
    pub fn parse(token: &str) -> Self {
        let key = normalize_date(token);
        let canonical = is_canonical(&key);
        Self { key, canonical }
    }

    /// 날짜에서 키를 생성합니다.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            key: format_canonical(date),
            canonical: true,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn is_canonical(&self) -> bool {
        self.canonical
    }

    /// 정규화된 키일 때만 날짜를 반환합니다.
    pub fn date(&self) -> Option<NaiveDate> {
        if self.canonical {
            parse_canonical(&self.key)
        } else {
            None
        }
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl From<NaiveDate> for DateKey {
    fn from(date: NaiveDate) -> Self {
        Self::from_date(date)
    }
}
