//! 거래소 OpenAPI fetcher HTTP 통합 테스트
//!
//! mockito 서버로 업스트림 응답을 흉내 냅니다.

use eod_core::{FetchConfig, SectionPatch, SourceKind};
use eod_data::{
    fetch_with_retry, DataError, FetchOutcome, HolidaySource, OpenApiClient, RetryPolicy,
    SourceFetcher, TaifexInstitutionalFetcher, TaifexPcRatioFetcher, TwseDailySummaryFetcher,
    TwseHolidaySource,
};
use rust_decimal_macros::dec;
use std::time::Duration;

fn client() -> OpenApiClient {
    let config = FetchConfig {
        timeout_secs: 5,
        ..Default::default()
    };
    OpenApiClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_pc_ratio_fetch_and_extract() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/PutCallRatio")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {"Date":"20250415","PutVolume":"123,456","CallVolume":"234,567",
                 "PutCallVolumeRatio%":"52.63","PutOI":"98,765","CallOI":"87,654",
                 "PutCallOIRatio%":"112.68"},
                {"Date":"20250414","PutVolume":"100","CallVolume":"200",
                 "PutCallVolumeRatio%":"50.00","PutOI":"300","CallOI":"400",
                 "PutCallOIRatio%":"75.00"}
            ]"#,
        )
        .create_async()
        .await;

    let fetcher = TaifexPcRatioFetcher::new(client(), server.url());
    assert_eq!(fetcher.source(), SourceKind::TaifexPcRatio);

    let records = match fetcher.fetch().await.unwrap() {
        FetchOutcome::Records(records) => records,
        FetchOutcome::NoData => panic!("expected records"),
    };
    assert_eq!(records.len(), 2);

    let sections = fetcher.extract(&records);
    assert_eq!(sections.len(), 2);
    let latest = sections
        .iter()
        .find(|s| s.date.as_str() == "2025-04-15")
        .unwrap();
    match &latest.section {
        SectionPatch::PutCallRatio(pc) => {
            assert_eq!(pc.put_volume, dec!(123456));
            assert_eq!(pc.put_call_volume_ratio, dec!(52.63));
        }
        other => panic!("unexpected section: {:?}", other),
    }
    assert_eq!(latest.raw_payload().as_array().unwrap().len(), 1);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_no_data_marker_is_no_data() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/exchangeReport/FMTQIK")
        .with_status(200)
        .with_body("查無資料")
        .create_async()
        .await;

    let fetcher = TwseDailySummaryFetcher::new(client(), server.url());
    let outcome = fetcher.fetch().await.unwrap();
    assert_eq!(outcome, FetchOutcome::NoData);
}

#[tokio::test]
async fn test_empty_array_is_no_data() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/exchangeReport/FMTQIK")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let fetcher = TwseDailySummaryFetcher::new(client(), server.url());
    assert!(fetcher.fetch().await.unwrap().is_no_data());
}

#[tokio::test]
async fn test_server_error_is_retryable_and_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/PutCallRatio")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let fetcher = TaifexPcRatioFetcher::new(client(), server.url());
    let result = fetch_with_retry(&fetcher, RetryPolicy::new(2, Duration::from_millis(10))).await;

    match result {
        Err(DataError::HttpStatus { status, .. }) => assert_eq!(status, 503),
        other => panic!("unexpected result: {:?}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/PutCallRatio")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let fetcher = TaifexPcRatioFetcher::new(client(), server.url());
    let result = fetch_with_retry(&fetcher, RetryPolicy::new(3, Duration::from_millis(10))).await;

    assert!(matches!(result, Err(DataError::HttpStatus { status: 404, .. })));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_holiday_schedule() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/holidaySchedule/holidaySchedule")
        .with_status(200)
        .with_body(
            r#"[
                {"Name":"中華民國開國紀念日","Date":"1140101","Weekday":"三","Description":"依規定放假1日。"},
                {"Name":"農曆春節前最後交易日","Date":"1140122","Weekday":"三","Description":""}
            ]"#,
        )
        .create_async()
        .await;

    let source = TwseHolidaySource::new(client(), server.url());
    let rows = source.fetch_holidays().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].date, "1140101");
    assert_eq!(rows[0].weekday.as_deref(), Some("三"));
    assert_eq!(rows[1].description, None);
}

const INSTITUTIONAL_PATH: &str =
    "/MarketDataOfMajorInstitutionalTradersDetailsOfFuturesContractsBytheDate";

const INSTITUTIONAL_BODY: &str = r#"[
    {"Date":"20250415","ContractName":"臺股期貨","Item":"外資",
     "LongTradeVolume":"50,000","ShortTradeVolume":"48,000","NetTradeVolume":"2,000",
     "LongOIVolume":"30,000","ShortOIVolume":"40,000","NetOIVolume":"-10,000"}
]"#;

#[tokio::test]
async fn test_date_time_error_response_is_no_data() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", INSTITUTIONAL_PATH)
        .with_status(200)
        .with_body("日期時間錯誤")
        .create_async()
        .await;

    let fetcher = TaifexInstitutionalFetcher::new(client(), server.url());
    assert_eq!(fetcher.fetch().await.unwrap(), FetchOutcome::NoData);
}

#[tokio::test]
async fn test_fallback_used_when_primary_fails() {
    let mut primary = mockito::Server::new_async().await;
    let mut fallback = mockito::Server::new_async().await;
    let primary_mock = primary
        .mock("GET", INSTITUTIONAL_PATH)
        .with_status(502)
        .expect(1)
        .create_async()
        .await;
    let fallback_mock = fallback
        .mock("GET", INSTITUTIONAL_PATH)
        .with_status(200)
        .with_body(INSTITUTIONAL_BODY)
        .expect(1)
        .create_async()
        .await;

    let fetcher = TaifexInstitutionalFetcher::new(client(), primary.url())
        .with_fallback(Some(fallback.url()));
    let records = match fetcher.fetch().await.unwrap() {
        FetchOutcome::Records(records) => records,
        FetchOutcome::NoData => panic!("expected records"),
    };

    let sections = fetcher.extract(&records);
    assert_eq!(sections.len(), 1);
    match &sections[0].section {
        SectionPatch::Institutional(positions) => {
            assert_eq!(positions.contract, "臺股期貨");
            assert_eq!(positions.entries[0].net_oi_volume, dec!(-10000));
        }
        other => panic!("unexpected section: {:?}", other),
    }

    primary_mock.assert_async().await;
    fallback_mock.assert_async().await;
}

#[tokio::test]
async fn test_fallback_used_when_primary_has_no_data() {
    let mut primary = mockito::Server::new_async().await;
    let mut fallback = mockito::Server::new_async().await;
    primary
        .mock("GET", INSTITUTIONAL_PATH)
        .with_status(200)
        .with_body("日期時間錯誤")
        .create_async()
        .await;
    fallback
        .mock("GET", INSTITUTIONAL_PATH)
        .with_status(200)
        .with_body(INSTITUTIONAL_BODY)
        .create_async()
        .await;

    let fetcher = TaifexInstitutionalFetcher::new(client(), primary.url())
        .with_fallback(Some(fallback.url()));
    assert!(!fetcher.fetch().await.unwrap().is_no_data());
}

#[tokio::test]
async fn test_primary_error_kept_when_fallback_also_fails() {
    let mut primary = mockito::Server::new_async().await;
    let mut fallback = mockito::Server::new_async().await;
    primary
        .mock("GET", "/PutCallRatio")
        .with_status(503)
        .create_async()
        .await;
    fallback
        .mock("GET", "/PutCallRatio")
        .with_status(404)
        .create_async()
        .await;

    let fetcher =
        TaifexPcRatioFetcher::new(client(), primary.url()).with_fallback(Some(fallback.url()));
    let result = fetcher.fetch().await;

    // 재시도 판단은 주 엔드포인트 오류 기준
    assert!(matches!(result, Err(DataError::HttpStatus { status: 503, .. })));
}
