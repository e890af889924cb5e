//! 대만선물거래소(TAIFEX) OpenAPI 소스.
//!
//! 컬럼명은 영문명과 중문 헤더 모두 허용합니다.

use std::collections::BTreeSet;

use async_trait::async_trait;
use eod_core::{
    InstitutionalEntry, InstitutionalPositions, LargeTraderPositions, PutCallRatio, RawRecord,
    SectionPatch, SourceKind,
};
use tracing::{debug, info, warn};

use super::{
    decimal_field, group_by_date, text_field, DatedSection, FetchOutcome, OpenApiClient,
    SourceFetcher,
};
use crate::error::Result;

const DATE: &[&str] = &["Date", "日期"];

/// TAIFEX OpenAPI 엔드포인트 공통 부분.
///
/// 보조 URL이 있으면 주 엔드포인트가 실패하거나 데이터가 없을 때 같은 경로로 한 번 더 조회합니다.
struct TaifexEndpoint {
    client: OpenApiClient,
    base_url: String,
    fallback_base_url: Option<String>,
    path: &'static str,
}

impl TaifexEndpoint {
    fn new(client: OpenApiClient, base_url: String, path: &'static str) -> Self {
        Self {
            client,
            base_url,
            fallback_base_url: None,
            path,
        }
    }

    fn url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.path)
    }

    async fn fetch_from(&self, base_url: &str) -> Result<FetchOutcome> {
        let records = self.client.get_records(&self.url(base_url)).await?;
        Ok(FetchOutcome::from_records(records))
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        let primary = self.fetch_from(&self.base_url).await;
        let Some(fallback) = self.fallback_base_url.as_deref() else {
            return primary;
        };

        match primary {
            Ok(FetchOutcome::NoData) => {
                info!(path = self.path, "주 엔드포인트 데이터 없음, 보조 엔드포인트 조회");
                match self.fetch_from(fallback).await {
                    Ok(outcome) => Ok(outcome),
                    Err(e) => {
                        warn!(path = self.path, error = %e, "보조 엔드포인트 조회 실패");
                        Ok(FetchOutcome::NoData)
                    }
                }
            }
            Err(primary_err) => {
                warn!(
                    path = self.path,
                    error = %primary_err,
                    "주 엔드포인트 실패, 보조 엔드포인트 조회"
                );
                match self.fetch_from(fallback).await {
                    Ok(outcome) => Ok(outcome),
                    Err(e) => {
                        warn!(path = self.path, error = %e, "보조 엔드포인트 조회 실패");
                        Err(primary_err)
                    }
                }
            }
            records => records,
        }
    }
}

// =============================================================================
// Put/Call ratio
// =============================================================================

mod pc_columns {
    pub const CALL_VOLUME: &[&str] = &["CallVolume", "買權成交量"];
    pub const PUT_VOLUME: &[&str] = &["PutVolume", "賣權成交量"];
    pub const VOLUME_RATIO: &[&str] = &["PutCallVolumeRatio%", "買賣權成交量比率%"];
    pub const CALL_OI: &[&str] = &["CallOI", "買權未平倉量"];
    pub const PUT_OI: &[&str] = &["PutOI", "賣權未平倉量"];
    pub const OI_RATIO: &[&str] = &["PutCallOIRatio%", "買賣權未平倉量比率%"];
}

/// 옵션 풋/콜 비율 fetcher.
pub struct TaifexPcRatioFetcher {
    endpoint: TaifexEndpoint,
}

impl TaifexPcRatioFetcher {
    pub fn new(client: OpenApiClient, base_url: impl Into<String>) -> Self {
        Self {
            endpoint: TaifexEndpoint::new(client, base_url.into(), "PutCallRatio"),
        }
    }

    /// 보조 엔드포인트 기본 URL.
    pub fn with_fallback(mut self, base_url: Option<String>) -> Self {
        self.endpoint.fallback_base_url = base_url;
        self
    }
}

/// 풋/콜 비율 한 행을 섹션으로 변환합니다.
pub fn parse_pc_ratio(row: &RawRecord) -> PutCallRatio {
    use pc_columns::*;

    PutCallRatio {
        put_volume: decimal_field(row, "PutVolume", PUT_VOLUME),
        call_volume: decimal_field(row, "CallVolume", CALL_VOLUME),
        put_call_volume_ratio: decimal_field(row, "PutCallVolumeRatio%", VOLUME_RATIO),
        put_oi: decimal_field(row, "PutOI", PUT_OI),
        call_oi: decimal_field(row, "CallOI", CALL_OI),
        put_call_oi_ratio: decimal_field(row, "PutCallOIRatio%", OI_RATIO),
    }
}

#[async_trait]
impl SourceFetcher for TaifexPcRatioFetcher {
    fn source(&self) -> SourceKind {
        SourceKind::TaifexPcRatio
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        self.endpoint.fetch().await
    }

    fn extract(&self, records: &[RawRecord]) -> Vec<DatedSection> {
        group_by_date(self.source(), records, DATE)
            .into_iter()
            .filter_map(|(date, rows)| {
                let section = SectionPatch::PutCallRatio(parse_pc_ratio(rows.first()?));
                Some(DatedSection {
                    date,
                    raw: rows,
                    section,
                })
            })
            .collect()
    }
}

// =============================================================================
// Large traders
// =============================================================================

mod lt_columns {
    pub const CONTRACT: &[&str] = &["Contract", "商品(契約)"];
    pub const SETTLEMENT_MONTH: &[&str] = &["SettlementMonth", "到期月份(週別)"];
    pub const TRADER_TYPE: &[&str] = &["TypeOfTraders", "交易人類別"];
    pub const TOP5_BUY: &[&str] = &["Top5Buy", "前五大交易人買方"];
    pub const TOP5_SELL: &[&str] = &["Top5Sell", "前五大交易人賣方"];
    pub const TOP10_BUY: &[&str] = &["Top10Buy", "前十大交易人買方"];
    pub const TOP10_SELL: &[&str] = &["Top10Sell", "前十大交易人賣方"];
    pub const MARKET_OI: &[&str] = &["OIOfMarket", "全市場未沖銷部位數"];
}

/// 대상 계약 (대만 가권지수 선물).
const LARGE_TRADER_CONTRACT: &str = "TX";
/// 전체 결제월 합산 행의 결제월 표기.
const ALL_MONTHS: &str = "999999";

/// 대규모 트레이더 선물 미결제약정 fetcher.
pub struct TaifexLargeTradersFetcher {
    endpoint: TaifexEndpoint,
}

impl TaifexLargeTradersFetcher {
    pub fn new(client: OpenApiClient, base_url: impl Into<String>) -> Self {
        Self {
            endpoint: TaifexEndpoint::new(client, base_url.into(), "OpenInterestOfLargeTradersFutures"),
        }
    }

    /// 보조 엔드포인트 기본 URL.
    pub fn with_fallback(mut self, base_url: Option<String>) -> Self {
        self.endpoint.fallback_base_url = base_url;
        self
    }
}

/// 한 날짜의 행 중 TX 전체 결제월(없으면 첫 TX 행)을 고릅니다.
///
/// 교역인 구분이 있으면 전체("0") 행을 우선합니다.
fn select_large_trader_row(rows: &[RawRecord]) -> Option<&RawRecord> {
    use lt_columns::*;

    let tx_rows: Vec<&RawRecord> = rows
        .iter()
        .filter(|row| text_field(row, CONTRACT) == LARGE_TRADER_CONTRACT)
        .collect();

    let all_traders = |row: &&RawRecord| {
        let kind = text_field(row, TRADER_TYPE);
        kind.is_empty() || kind == "0"
    };

    tx_rows
        .iter()
        .copied()
        .filter(all_traders)
        .find(|row| text_field(row, SETTLEMENT_MONTH) == ALL_MONTHS)
        .or_else(|| tx_rows.iter().copied().find(all_traders))
        .or_else(|| tx_rows.first().copied())
}

#[async_trait]
impl SourceFetcher for TaifexLargeTradersFetcher {
    fn source(&self) -> SourceKind {
        SourceKind::TaifexLargeTraders
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        self.endpoint.fetch().await
    }

    fn extract(&self, records: &[RawRecord]) -> Vec<DatedSection> {
        use lt_columns::*;

        group_by_date(self.source(), records, DATE)
            .into_iter()
            .filter_map(|(date, rows)| {
                let row = match select_large_trader_row(&rows) {
                    Some(row) => row.clone(),
                    None => {
                        warn!(date = %date, contract = LARGE_TRADER_CONTRACT, "대상 계약 행 없음");
                        return None;
                    }
                };
                let section = SectionPatch::LargeTraders(LargeTraderPositions {
                    contract: text_field(&row, CONTRACT),
                    settlement_month: text_field(&row, SETTLEMENT_MONTH),
                    top5_buy: decimal_field(&row, "Top5Buy", TOP5_BUY),
                    top5_sell: decimal_field(&row, "Top5Sell", TOP5_SELL),
                    top10_buy: decimal_field(&row, "Top10Buy", TOP10_BUY),
                    top10_sell: decimal_field(&row, "Top10Sell", TOP10_SELL),
                    market_oi: decimal_field(&row, "OIOfMarket", MARKET_OI),
                });
                Some(DatedSection {
                    date,
                    raw: rows,
                    section,
                })
            })
            .collect()
    }
}

// =============================================================================
// Institutional
// =============================================================================

mod inst_columns {
    pub const CONTRACT: &[&str] = &["Contract", "ContractName", "契約", "商品名稱"];
    pub const CONTRACT_CODE: &[&str] = &["ContractCode", "商品代號"];
    pub const INVESTOR_TYPE: &[&str] = &["InvestorType", "Item", "身份別"];
    pub const LONG_TRADE_VOLUME: &[&str] = &["LongTradeVolume", "多方交易口數"];
    pub const LONG_TRADE_VALUE: &[&str] = &["LongTradeValue", "多方交易契約金額(千元)"];
    pub const SHORT_TRADE_VOLUME: &[&str] = &["ShortTradeVolume", "空方交易口數"];
    pub const SHORT_TRADE_VALUE: &[&str] = &["ShortTradeValue", "空方交易契約金額(千元)"];
    pub const NET_TRADE_VOLUME: &[&str] = &["NetTradeVolume", "多空交易口數淨額"];
    pub const NET_TRADE_VALUE: &[&str] = &["NetTradeValue", "多空交易契約金額淨額(千元)"];
    pub const LONG_OI_VOLUME: &[&str] = &["LongOIVolume", "多方未平倉口數"];
    pub const LONG_OI_VALUE: &[&str] = &["LongOIValue", "多方未平倉契約金額(千元)"];
    pub const SHORT_OI_VOLUME: &[&str] = &["ShortOIVolume", "空方未平倉口數"];
    pub const SHORT_OI_VALUE: &[&str] = &["ShortOIValue", "空方未平倉契約金額(千元)"];
    pub const NET_OI_VOLUME: &[&str] = &["NetOIVolume", "多空未平倉口數淨額"];
    pub const NET_OI_VALUE: &[&str] = &["NetOIValue", "多空未平倉契約金額淨額(千元)"];
}

/// 대상 계약명과 코드.
const INSTITUTIONAL_CONTRACT_NAME: &str = "臺股期貨";
const INSTITUTIONAL_CONTRACT_CODE: &str = "TXF";

/// 3대 기관 선물 포지션 fetcher.
pub struct TaifexInstitutionalFetcher {
    endpoint: TaifexEndpoint,
}

impl TaifexInstitutionalFetcher {
    pub fn new(client: OpenApiClient, base_url: impl Into<String>) -> Self {
        Self {
            endpoint: TaifexEndpoint::new(client, base_url.into(), "MarketDataOfMajorInstitutionalTradersDetailsOfFuturesContractsBytheDate"),
        }
    }

    /// 보조 엔드포인트 기본 URL.
    pub fn with_fallback(mut self, base_url: Option<String>) -> Self {
        self.endpoint.fallback_base_url = base_url;
        self
    }
}

/// 계약명의 첫 토큰 (`"臺股期貨 TX"` → `"臺股期貨"`).
fn contract_name(row: &RawRecord) -> String {
    text_field(row, inst_columns::CONTRACT)
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

/// 대상 계약 행만 남깁니다. 일치하는 행이 없으면 전체 행을 사용합니다.
pub fn filter_institutional_rows(rows: &[RawRecord]) -> (String, Vec<RawRecord>) {
    let matched: Vec<RawRecord> = rows
        .iter()
        .filter(|row| {
            contract_name(row) == INSTITUTIONAL_CONTRACT_NAME
                || text_field(row, inst_columns::CONTRACT_CODE) == INSTITUTIONAL_CONTRACT_CODE
        })
        .cloned()
        .collect();

    if !matched.is_empty() {
        debug!(rows = matched.len(), "대상 계약 행 선택");
        return (INSTITUTIONAL_CONTRACT_NAME.to_string(), matched);
    }

    let available: BTreeSet<String> = rows.iter().map(contract_name).collect();
    warn!(
        contract = INSTITUTIONAL_CONTRACT_NAME,
        available = ?available,
        "대상 계약 행 없음, 전체 행 사용"
    );
    (String::new(), rows.to_vec())
}

fn parse_institutional_entry(row: &RawRecord) -> InstitutionalEntry {
    use inst_columns::*;

    InstitutionalEntry {
        investor_type: text_field(row, INVESTOR_TYPE),
        long_trade_volume: decimal_field(row, "LongTradeVolume", LONG_TRADE_VOLUME),
        long_trade_value: decimal_field(row, "LongTradeValue", LONG_TRADE_VALUE),
        short_trade_volume: decimal_field(row, "ShortTradeVolume", SHORT_TRADE_VOLUME),
        short_trade_value: decimal_field(row, "ShortTradeValue", SHORT_TRADE_VALUE),
        net_trade_volume: decimal_field(row, "NetTradeVolume", NET_TRADE_VOLUME),
        net_trade_value: decimal_field(row, "NetTradeValue", NET_TRADE_VALUE),
        long_oi_volume: decimal_field(row, "LongOIVolume", LONG_OI_VOLUME),
        long_oi_value: decimal_field(row, "LongOIValue", LONG_OI_VALUE),
        short_oi_volume: decimal_field(row, "ShortOIVolume", SHORT_OI_VOLUME),
        short_oi_value: decimal_field(row, "ShortOIValue", SHORT_OI_VALUE),
        net_oi_volume: decimal_field(row, "NetOIVolume", NET_OI_VOLUME),
        net_oi_value: decimal_field(row, "NetOIValue", NET_OI_VALUE),
    }
}

#[async_trait]
impl SourceFetcher for TaifexInstitutionalFetcher {
    fn source(&self) -> SourceKind {
        SourceKind::TaifexInstitutional
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        self.endpoint.fetch().await
    }

    fn extract(&self, records: &[RawRecord]) -> Vec<DatedSection> {
        group_by_date(self.source(), records, DATE)
            .into_iter()
            .map(|(date, rows)| {
                let (contract, selected) = filter_institutional_rows(&rows);
                let entries = selected.iter().map(parse_institutional_entry).collect();
                DatedSection {
                    date,
                    raw: selected,
                    section: SectionPatch::Institutional(InstitutionalPositions {
                        contract,
                        entries,
                    }),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eod_core::FetchConfig;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn client() -> OpenApiClient {
        OpenApiClient::new(&FetchConfig::default()).unwrap()
    }

    #[test]
    fn test_pc_ratio_chinese_headers() {
        let row = RawRecord::new()
            .with("日期", "2025/04/15")
            .with("賣權成交量", "123,456")
            .with("買權成交量", "234,567")
            .with("買賣權成交量比率%", "52.63")
            .with("賣權未平倉量", "98,765")
            .with("買權未平倉量", "87,654")
            .with("買賣權未平倉量比率%", "112.68");

        let sections = TaifexPcRatioFetcher::new(client(), "http://x").extract(&[row]);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].date.as_str(), "2025-04-15");
        match &sections[0].section {
            SectionPatch::PutCallRatio(pc) => {
                assert_eq!(pc.put_volume, dec!(123456));
                assert_eq!(pc.call_volume, dec!(234567));
                assert_eq!(pc.put_call_oi_ratio, dec!(112.68));
            }
            other => panic!("unexpected section: {:?}", other),
        }
    }

    #[test]
    fn test_pc_ratio_malformed_field_degrades_to_zero() {
        let row = RawRecord::new()
            .with("Date", "20250415")
            .with("PutVolume", "N/A")
            .with("CallVolume", "234,567")
            .with("PutCallVolumeRatio%", "52.63")
            .with("PutOI", "98,765")
            .with("CallOI", "87,654")
            .with("PutCallOIRatio%", "112.68");

        let pc = parse_pc_ratio(&row);
        assert_eq!(pc.put_volume, Decimal::ZERO);
        assert_eq!(pc.call_volume, dec!(234567));
        assert_eq!(pc.put_oi, dec!(98765));
        assert_eq!(pc.put_call_volume_ratio, dec!(52.63));
    }

    #[test]
    fn test_large_traders_prefers_all_months_row() {
        let base = |month: &str, top10_buy: &str| {
            RawRecord::new()
                .with("Date", "20250415")
                .with("Contract", "TX")
                .with("SettlementMonth", month)
                .with("TypeOfTraders", "0")
                .with("Top5Buy", "1,000")
                .with("Top5Sell", "2,000")
                .with("Top10Buy", top10_buy)
                .with("Top10Sell", "4,000")
                .with("OIOfMarket", "90,000")
        };
        let records = vec![
            base("202504", "1"),
            base("999999", "3,000"),
            RawRecord::new()
                .with("Date", "20250415")
                .with("Contract", "MTX")
                .with("SettlementMonth", "999999"),
        ];

        let sections = TaifexLargeTradersFetcher::new(client(), "http://x").extract(&records);
        assert_eq!(sections.len(), 1);
        match &sections[0].section {
            SectionPatch::LargeTraders(lt) => {
                assert_eq!(lt.settlement_month, "999999");
                assert_eq!(lt.top10_buy, dec!(3000));
                assert_eq!(lt.top10_net(), dec!(-1000));
            }
            other => panic!("unexpected section: {:?}", other),
        }
    }

    #[test]
    fn test_large_traders_without_target_contract_skips_date() {
        let records = vec![RawRecord::new().with("Date", "20250415").with("Contract", "MTX")];
        let sections = TaifexLargeTradersFetcher::new(client(), "http://x").extract(&records);
        assert!(sections.is_empty());
    }

    fn institutional_row(contract: &str, investor: &str, net_oi: &str) -> RawRecord {
        RawRecord::new()
            .with("日期", "114/04/15")
            .with("契約", contract)
            .with("身份別", investor)
            .with("多空未平倉口數淨額", net_oi)
    }

    #[test]
    fn test_institutional_filters_target_contract() {
        let records = vec![
            institutional_row("臺股期貨", "自營商", "-1,200"),
            institutional_row("臺股期貨", "外資", "-23,456"),
            institutional_row("小型臺指期貨", "外資", "500"),
        ];

        let sections = TaifexInstitutionalFetcher::new(client(), "http://x").extract(&records);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].date.as_str(), "2025-04-15");
        assert_eq!(sections[0].raw.len(), 2);
        match &sections[0].section {
            SectionPatch::Institutional(inst) => {
                assert_eq!(inst.contract, "臺股期貨");
                assert_eq!(inst.entries.len(), 2);
                assert_eq!(inst.total_net_oi_volume(), dec!(-24656));
            }
            other => panic!("unexpected section: {:?}", other),
        }
    }

    #[test]
    fn test_institutional_falls_back_to_all_rows() {
        let records = vec![
            institutional_row("電子期貨", "外資", "10"),
            institutional_row("金融期貨", "外資", "20"),
        ];
        let (contract, rows) = filter_institutional_rows(&records);
        assert_eq!(contract, "");
        assert_eq!(rows.len(), 2);
    }
}
