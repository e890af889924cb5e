//! 휴장일 항목.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// 거래소 휴장일.
///
/// 토요일/일요일은 저장하지 않으며 호출자가 별도로 판단합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolidayEntry {
    pub date: NaiveDate,
    pub name: String,
    pub weekday: Option<String>,
    pub description: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl HolidayEntry {
    pub fn new(date: NaiveDate, name: impl Into<String>) -> Self {
        Self {
            date,
            name: name.into(),
            weekday: None,
            description: None,
            last_updated: Utc::now(),
        }
    }
}

/// 주말 여부 확인.
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}
