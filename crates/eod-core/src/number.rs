//! 거래소 숫자 문자열 파싱.
//!
//! 거래소 응답의 숫자 필드는 천 단위 쉼표가 포함된 문자열입니다 (`"1,234,567.89"`).
//! 개별 필드 파싱 실패는 레코드 전체를 버리지 않고 해당 필드만 0으로 대체합니다.

use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::warn;

/// 쉼표 구분 숫자 문자열을 엄격하게 파싱합니다.
///
/// 빈 문자열과 `"-"`는 0으로 취급합니다.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" || trimmed == "--" {
        return Some(Decimal::ZERO);
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| *c != ',' && *c != '%' && *c != '+')
        .collect();

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

/// 필드 단위 관대 파싱: 실패 시 경고를 남기고 0을 반환합니다.
pub fn parse_decimal_lenient(field: &str, raw: &str) -> Decimal {
    match parse_decimal(raw) {
        Some(value) => value,
        None => {
            warn!(field = field, value = raw, "숫자 필드 파싱 실패, 0으로 대체");
            Decimal::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("1,234,567"), Some(dec!(1234567)));
        assert_eq!(parse_decimal("1,234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_decimal("-12,345"), Some(dec!(-12345)));
        assert_eq!(parse_decimal("+88.5"), Some(dec!(88.5)));
        assert_eq!(parse_decimal("95.23%"), Some(dec!(95.23)));
        assert_eq!(parse_decimal(""), Some(Decimal::ZERO));
        assert_eq!(parse_decimal("-"), Some(Decimal::ZERO));
        assert_eq!(parse_decimal("N/A"), None);
    }

    #[test]
    fn test_parse_lenient_degrades_to_zero() {
        assert_eq!(parse_decimal_lenient("PutVolume", "N/A"), Decimal::ZERO);
        assert_eq!(parse_decimal_lenient("PutVolume", "12,000"), dec!(12000));
    }
}
