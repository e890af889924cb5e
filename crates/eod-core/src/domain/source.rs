//! 데이터 소스 식별자.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::sections::SectionKind;

/// 업스트림 데이터 소스.
///
/// 각 소스는 정확히 하나의 섹션을 기여합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// 증권거래소 일별 시장 요약 (지수, 거래량, 거래대금)
    TwseDailySummary,
    /// 선물거래소 대규모 트레이더 미결제약정
    TaifexLargeTraders,
    /// 선물거래소 풋/콜 비율
    TaifexPcRatio,
    /// 선물거래소 3대 기관 선물 포지션
    TaifexInstitutional,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::TwseDailySummary,
        SourceKind::TaifexLargeTraders,
        SourceKind::TaifexPcRatio,
        SourceKind::TaifexInstitutional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TwseDailySummary => "twse_daily_summary",
            Self::TaifexLargeTraders => "taifex_large_traders",
            Self::TaifexPcRatio => "taifex_pc_ratio",
            Self::TaifexInstitutional => "taifex_institutional",
        }
    }

    /// 이 소스가 채우는 섹션.
    pub fn section(&self) -> SectionKind {
        match self {
            Self::TwseDailySummary => SectionKind::Market,
            Self::TaifexLargeTraders => SectionKind::LargeTraders,
            Self::TaifexPcRatio => SectionKind::PutCallRatio,
            Self::TaifexInstitutional => SectionKind::Institutional,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown source: {}", s))
    }
}
