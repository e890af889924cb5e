//! 거래소 OpenAPI 공통 HTTP 클라이언트.

use eod_core::{FetchConfig, RawRecord};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use tracing::{debug, warn};

use crate::error::{DataError, Result};

/// 업스트림이 데이터가 없을 때 내려주는 안내 문구 (조회 결과 없음, 조회 일시 오류).
const NO_DATA_MARKERS: &[&str] = &["查無資料", "日期時間錯誤"];

/// 평면 JSON 배열을 반환하는 OpenAPI 엔드포인트용 클라이언트.
#[derive(Clone)]
pub struct OpenApiClient {
    client: reqwest::Client,
}

impl OpenApiClient {
    /// 타임아웃과 User-Agent를 적용한 클라이언트를 생성합니다.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| DataError::ConfigError(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self { client })
    }

    /// URL에서 평면 레코드 목록을 가져옵니다.
    ///
    /// "查無資料"/"日期時間錯誤" 응답과 빈 본문은 빈 목록으로 반환합니다.
    pub async fn get_records(&self, url: &str) -> Result<Vec<RawRecord>> {
        debug!(url = url, "OpenAPI 요청");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DataError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        parse_records(url, &body)
    }
}

/// 응답 본문을 평면 레코드로 변환합니다.
fn parse_records(url: &str, body: &str) -> Result<Vec<RawRecord>> {
    let trimmed = body.trim();
    if trimmed.is_empty() || NO_DATA_MARKERS.iter().any(|marker| trimmed.contains(marker)) {
        debug!(url = url, "업스트림 데이터 없음");
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(trimmed)
        .map_err(|e| DataError::ParseError(format!("{}: {}", url, e)))?;

    let rows = match value {
        serde_json::Value::Array(rows) => rows,
        serde_json::Value::Object(mut object) => match object.remove("data") {
            Some(serde_json::Value::Array(rows)) => rows,
            _ => {
                return Err(DataError::ParseError(format!(
                    "{}: JSON 배열이 아닌 응답",
                    url
                )))
            }
        },
        _ => {
            return Err(DataError::ParseError(format!(
                "{}: JSON 배열이 아닌 응답",
                url
            )))
        }
    };

    let total = rows.len();
    let records: Vec<RawRecord> = rows.iter().filter_map(RawRecord::from_json).collect();
    if records.len() < total {
        warn!(
            url = url,
            skipped = total - records.len(),
            "객체가 아닌 행 제외"
        );
    }
    Ok(records)
}
