//! 날짜별 집계 레코드.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sections::{SectionPatch, Sections};
use crate::date::DateKey;

/// 소스별 갱신 상태.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub updated: bool,
    pub update_time: DateTime<Utc>,
}

/// 하나의 소스가 하나의 날짜에 기여하는 병합 단위.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    pub date: DateKey,
    pub source: String,
    /// 감사/재처리용 원본 페이로드
    pub raw_payload: serde_json::Value,
    pub sections: Vec<SectionPatch>,
    pub applied_at: DateTime<Utc>,
}

impl RecordPatch {
    pub fn new(
        date: DateKey,
        source: impl Into<String>,
        raw_payload: serde_json::Value,
        sections: Vec<SectionPatch>,
        applied_at: DateTime<Utc>,
    ) -> Self {
        Self {
            date,
            source: source.into(),
            raw_payload,
            sections,
            applied_at,
        }
    }

    /// 섹션 부분만 JSON 객체로 변환합니다 (`{"put_call_ratio": {...}}`).
    pub fn sections_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .sections
            .iter()
            .map(|patch| (patch.kind().as_str().to_string(), patch.data_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// 날짜당 하나만 존재하는 집계 레코드.
///
/// 레코드는 통째로 교체되지 않으며, 모든 쓰기는 [`AggregateRecord::apply`]를 통한
/// 섹션 단위 병합입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRecord {
    /// `YYYY-MM-DD` (정규화 실패 시 원본 토큰)
    pub date: String,
    /// 정규화된 날짜 키인지 여부 (false면 점검 대상)
    pub canonical: bool,
    /// 최초 생성 시각
    pub data_timestamp: DateTime<Utc>,
    /// 마지막 병합 시각
    pub last_updated: DateTime<Utc>,
    pub sections: Sections,
    pub sources: BTreeMap<String, SourceStatus>,
    pub raw_payloads: BTreeMap<String, serde_json::Value>,
}

impl AggregateRecord {
    /// 빈 레코드를 생성합니다.
    pub fn new(date: &DateKey, now: DateTime<Utc>) -> Self {
        Self {
            date: date.as_str().to_string(),
            canonical: date.is_canonical(),
            data_timestamp: now,
            last_updated: now,
            sections: Sections::default(),
            sources: BTreeMap::new(),
            raw_payloads: BTreeMap::new(),
        }
    }

    /// 패치로부터 새 레코드를 생성합니다.
    pub fn from_patch(patch: &RecordPatch) -> Self {
        let mut record = Self::new(&patch.date, patch.applied_at);
        record.apply(patch);
        record
    }

    /// 패치를 병합합니다.
    ///
    /// - 패치에 포함된 섹션만 덮어씀
    /// - `sources[source]`, `raw_payloads[source]` 갱신
    /// - `last_updated`는 뒤로 가지 않음
    pub fn apply(&mut self, patch: &RecordPatch) {
        for section in &patch.sections {
            self.sections.apply(section);
        }
        self.sources.insert(
            patch.source.clone(),
            SourceStatus {
                updated: true,
                update_time: patch.applied_at,
            },
        );
        self.raw_payloads
            .insert(patch.source.clone(), patch.raw_payload.clone());
        if patch.applied_at > self.last_updated {
            self.last_updated = patch.applied_at;
        }
    }

    /// 해당 소스가 이미 이 날짜에 기여했는지 확인합니다.
    pub fn has_fresh_source(&self, source: &str) -> bool {
        self.sources.get(source).map(|s| s.updated).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sections::{MarketSummary, PutCallRatio, SectionKind};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn market_patch(at: DateTime<Utc>) -> RecordPatch {
        RecordPatch::new(
            DateKey::parse("1140415"),
            "twse_daily_summary",
            json!([{"Date": "1140415", "TAIEX": "19,000.12"}]),
            vec![SectionPatch::Market(MarketSummary {
                trade_volume: dec!(1000),
                trade_value: dec!(2000),
                transaction: dec!(30),
                taiex: dec!(19000.12),
                change: dec!(10),
            })],
            at,
        )
    }

    fn pc_patch(at: DateTime<Utc>) -> RecordPatch {
        RecordPatch::new(
            DateKey::parse("20250415"),
            "taifex_pc_ratio",
            json!([{"Date": "20250415"}]),
            vec![SectionPatch::PutCallRatio(PutCallRatio {
                put_volume: dec!(1),
                call_volume: dec!(2),
                put_call_volume_ratio: dec!(50),
                put_oi: dec!(3),
                call_oi: dec!(4),
                put_call_oi_ratio: dec!(75),
            })],
            at,
        )
    }

    #[test]
    fn test_patches_compose() {
        let now = Utc::now();
        let mut record = AggregateRecord::from_patch(&market_patch(now));
        record.apply(&pc_patch(now + Duration::seconds(5)));

        assert_eq!(record.date, "2025-04-15");
        assert!(record.canonical);
        assert_eq!(
            record.sections.present(),
            vec![SectionKind::Market, SectionKind::PutCallRatio]
        );
        assert!(record.has_fresh_source("twse_daily_summary"));
        assert!(record.has_fresh_source("taifex_pc_ratio"));
        assert_eq!(record.data_timestamp, now);
        assert_eq!(record.last_updated, now + Duration::seconds(5));
    }

    #[test]
    fn test_last_updated_never_moves_backwards() {
        let now = Utc::now();
        let mut record = AggregateRecord::from_patch(&market_patch(now));
        record.apply(&pc_patch(now - Duration::hours(1)));
        assert_eq!(record.last_updated, now);
    }

    #[test]
    fn test_sections_json_shape() {
        let patch = pc_patch(Utc::now());
        let json = patch.sections_json();
        assert!(json.get("put_call_ratio").is_some());
        assert_eq!(json.as_object().unwrap().len(), 1);
    }
}
