//! 업스트림 원시 레코드.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 업스트림이 내려주는 평면(flat) 레코드.
///
/// 모든 값은 문자열로 보관합니다. 숫자 필드 역시 천 단위 쉼표가 포함된 문자열입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(BTreeMap<String, String>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// 필드를 추가합니다 (빌더 스타일).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// 별칭 목록 중 처음으로 존재하는 필드 값을 반환합니다.
    ///
    /// 거래소는 같은 컬럼을 영문명과 중문 헤더로 번갈아 내려주므로
    /// 필드마다 별칭 목록으로 조회합니다.
    pub fn get_any(&self, aliases: &[&str]) -> Option<&str> {
        aliases.iter().find_map(|alias| self.get(alias))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// JSON 객체를 평면 레코드로 변환합니다.
    ///
    /// 중첩 값은 JSON 문자열로 보관하고, `null`은 빈 문자열로 취급합니다.
    /// 객체가 아니면 `None`을 반환합니다.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let object = value.as_object()?;
        let fields = object
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    serde_json::Value::String(s) => s.trim().to_string(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                (key.trim().to_string(), text)
            })
            .collect();
        Some(Self(fields))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or(serde_json::Value::Null)
    }
}

impl FromIterator<(String, String)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
