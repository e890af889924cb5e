//! 날짜 정규화 속성 테스트

use chrono::{Datelike, NaiveDate};
use eod_core::{is_canonical, normalize_date};
use proptest::prelude::*;

fn valid_date() -> impl Strategy<Value = NaiveDate> {
    // 민국 1년(1912) ~ 민국 199년(2110)
    (1912i32..=2110, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

proptest! {
    #[test]
    fn roc_numeric_adds_1911(date in valid_date()) {
        let roc_year = date.year() - 1911;
        let token = format!("{:03}{:02}{:02}", roc_year, date.month(), date.day());
        prop_assert_eq!(normalize_date(&token), date.format("%Y-%m-%d").to_string());
    }

    #[test]
    fn roc_slash_adds_1911(date in valid_date()) {
        let token = format!("{}/{}/{}", date.year() - 1911, date.month(), date.day());
        prop_assert_eq!(normalize_date(&token), date.format("%Y-%m-%d").to_string());
    }

    #[test]
    fn gregorian_numeric_matches(date in valid_date()) {
        let token = date.format("%Y%m%d").to_string();
        prop_assert_eq!(normalize_date(&token), date.format("%Y-%m-%d").to_string());
    }

    #[test]
    fn canonical_is_fixed_point(date in valid_date()) {
        let canonical = date.format("%Y-%m-%d").to_string();
        prop_assert!(is_canonical(&canonical));
        prop_assert_eq!(normalize_date(&canonical), canonical.clone());
    }

    #[test]
    fn normalization_is_deterministic(token in "\\PC{0,12}") {
        prop_assert_eq!(normalize_date(&token), normalize_date(&token));
    }
}

#[test]
fn test_documented_example() {
    assert_eq!(normalize_date("1140415"), "2025-04-15");
}
