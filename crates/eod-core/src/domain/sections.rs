//! 집계 레코드의 도메인 섹션.
//!
//! 섹션은 서로 독립적으로 존재하거나 비어 있을 수 있습니다.
//! 섹션이 없다는 것은 "아직 어떤 소스도 제공하지 않았다"는 의미이지 0이 아닙니다.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 섹션 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Market,
    LargeTraders,
    PutCallRatio,
    Institutional,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::LargeTraders => "large_traders",
            Self::PutCallRatio => "put_call_ratio",
            Self::Institutional => "institutional",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 일별 시장 요약 (지수 및 거래량).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSummary {
    /// 거래량 (주)
    pub trade_volume: Decimal,
    /// 거래대금
    pub trade_value: Decimal,
    /// 체결 건수
    pub transaction: Decimal,
    /// 가권지수 종가
    pub taiex: Decimal,
    /// 전일 대비
    pub change: Decimal,
}

/// 대규모 트레이더 선물 미결제약정.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LargeTraderPositions {
    /// 계약 (예: TX)
    pub contract: String,
    /// 결제월 (전체 합산이면 "999999")
    pub settlement_month: String,
    /// 상위 5인 매수 미결제
    pub top5_buy: Decimal,
    /// 상위 5인 매도 미결제
    pub top5_sell: Decimal,
    /// 상위 10인 매수 미결제
    pub top10_buy: Decimal,
    /// 상위 10인 매도 미결제
    pub top10_sell: Decimal,
    /// 전체 시장 미결제약정
    pub market_oi: Decimal,
}

impl LargeTraderPositions {
    /// 상위 10인 순포지션 (매수 - 매도).
    pub fn top10_net(&self) -> Decimal {
        self.top10_buy - self.top10_sell
    }
}

/// 옵션 풋/콜 비율.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutCallRatio {
    pub put_volume: Decimal,
    pub call_volume: Decimal,
    /// 풋/콜 거래량 비율 (%)
    pub put_call_volume_ratio: Decimal,
    pub put_oi: Decimal,
    pub call_oi: Decimal,
    /// 풋/콜 미결제약정 비율 (%)
    pub put_call_oi_ratio: Decimal,
}

/// 기관별 선물 포지션 한 줄.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionalEntry {
    /// 투자자 구분 (자영상, 투신, 외자 등)
    pub investor_type: String,
    pub long_trade_volume: Decimal,
    pub long_trade_value: Decimal,
    pub short_trade_volume: Decimal,
    pub short_trade_value: Decimal,
    pub net_trade_volume: Decimal,
    pub net_trade_value: Decimal,
    pub long_oi_volume: Decimal,
    pub long_oi_value: Decimal,
    pub short_oi_volume: Decimal,
    pub short_oi_value: Decimal,
    pub net_oi_volume: Decimal,
    pub net_oi_value: Decimal,
}

/// 3대 기관 선물 포지션.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionalPositions {
    /// 계약명 (필터 결과가 없으면 빈 문자열)
    pub contract: String,
    pub entries: Vec<InstitutionalEntry>,
}

impl InstitutionalPositions {
    /// 전체 기관 미결제 순포지션 합계.
    pub fn total_net_oi_volume(&self) -> Decimal {
        self.entries.iter().map(|e| e.net_oi_volume).sum()
    }
}

/// 섹션 단위 패치.
///
/// 레코드 병합은 항상 이 값을 통해서만 이루어지며, 패치에 담긴 섹션만 덮어씁니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "section", content = "data", rename_all = "snake_case")]
pub enum SectionPatch {
    Market(MarketSummary),
    LargeTraders(LargeTraderPositions),
    PutCallRatio(PutCallRatio),
    Institutional(InstitutionalPositions),
}

impl SectionPatch {
    pub fn kind(&self) -> SectionKind {
        match self {
            Self::Market(_) => SectionKind::Market,
            Self::LargeTraders(_) => SectionKind::LargeTraders,
            Self::PutCallRatio(_) => SectionKind::PutCallRatio,
            Self::Institutional(_) => SectionKind::Institutional,
        }
    }

    /// 섹션 본문을 JSON으로 직렬화합니다.
    pub fn data_json(&self) -> serde_json::Value {
        let result = match self {
            Self::Market(s) => serde_json::to_value(s),
            Self::LargeTraders(s) => serde_json::to_value(s),
            Self::PutCallRatio(s) => serde_json::to_value(s),
            Self::Institutional(s) => serde_json::to_value(s),
        };
        result.unwrap_or(serde_json::Value::Null)
    }
}

/// 레코드가 보유한 섹션 집합.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sections {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<MarketSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_traders: Option<LargeTraderPositions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put_call_ratio: Option<PutCallRatio>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institutional: Option<InstitutionalPositions>,
}

impl Sections {
    /// 패치에 해당하는 섹션만 덮어씁니다. 다른 섹션은 건드리지 않습니다.
    pub fn apply(&mut self, patch: &SectionPatch) {
        match patch {
            SectionPatch::Market(s) => self.market = Some(s.clone()),
            SectionPatch::LargeTraders(s) => self.large_traders = Some(s.clone()),
            SectionPatch::PutCallRatio(s) => self.put_call_ratio = Some(s.clone()),
            SectionPatch::Institutional(s) => self.institutional = Some(s.clone()),
        }
    }

    pub fn contains(&self, kind: SectionKind) -> bool {
        match kind {
            SectionKind::Market => self.market.is_some(),
            SectionKind::LargeTraders => self.large_traders.is_some(),
            SectionKind::PutCallRatio => self.put_call_ratio.is_some(),
            SectionKind::Institutional => self.institutional.is_some(),
        }
    }

    /// 존재하는 섹션 목록.
    pub fn present(&self) -> Vec<SectionKind> {
        [
            SectionKind::Market,
            SectionKind::LargeTraders,
            SectionKind::PutCallRatio,
            SectionKind::Institutional,
        ]
        .into_iter()
        .filter(|kind| self.contains(*kind))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.present().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pc_ratio() -> PutCallRatio {
        PutCallRatio {
            put_volume: dec!(100),
            call_volume: dec!(200),
            put_call_volume_ratio: dec!(50),
            put_oi: dec!(300),
            call_oi: dec!(400),
            put_call_oi_ratio: dec!(75),
        }
    }

    #[test]
    fn test_apply_only_touches_patched_section() {
        let mut sections = Sections::default();
        sections.apply(&SectionPatch::Market(MarketSummary {
            trade_volume: dec!(1),
            trade_value: dec!(2),
            transaction: dec!(3),
            taiex: dec!(20000),
            change: dec!(-12.5),
        }));
        sections.apply(&SectionPatch::PutCallRatio(pc_ratio()));

        assert_eq!(
            sections.present(),
            vec![SectionKind::Market, SectionKind::PutCallRatio]
        );
        assert_eq!(sections.market.as_ref().unwrap().taiex, dec!(20000));
    }

    #[test]
    fn test_sections_json_omits_absent() {
        let mut sections = Sections::default();
        sections.apply(&SectionPatch::PutCallRatio(pc_ratio()));
        let json = serde_json::to_value(&sections).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["put_call_ratio"]);
    }
}
