use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, StatusCode};

use super::types::{ApiErrorResponse, KlineRow, PremiumIndexResponse};
use super::{FetchError, MarketDataGateway};
use crate::models::{Candle, CandleSeries, Interval};

const INVALID_SYMBOL_CODE: i64 = -1121;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseUrl {
    Spot,
    UsdFutures,
}

impl BaseUrl {
    pub fn get_url(&self) -> String {
        match self {
            BaseUrl::Spot => "https://api.binance.com".to_string(),
            BaseUrl::UsdFutures => "https://fapi.binance.com".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BinanceGateway {
    client: Client,
    spot_url: String,
    futures_url: String,
}

impl BinanceGateway {
    pub fn new(client: Option<Client>) -> Self {
        Self::with_urls(client, BaseUrl::Spot.get_url(), BaseUrl::UsdFutures.get_url())
    }

    pub fn with_urls(
        client: Option<Client>,
        spot_url: impl Into<String>,
        futures_url: impl Into<String>,
    ) -> Self {
        Self {
            client: client.unwrap_or_default(),
            spot_url: spot_url.into(),
            futures_url: futures_url.into(),
        }
    }

    fn klines_request(&self, symbol: &str, interval: Interval, limit: usize) -> RequestBuilder {
        self.client
            .get(format!("{}/api/v3/klines", self.spot_url))
            .query(&[
                ("symbol", symbol.to_string()),
                ("interval", interval.to_string()),
                ("limit", limit.to_string()),
            ])
    }

    fn premium_index_request(&self, symbol: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/fapi/v1/premiumIndex", self.futures_url))
            .query(&[("symbol", symbol)])
    }

    async fn get(&self, request: RequestBuilder, symbol: &str) -> Result<String, FetchError> {
        let request = request.build().map_err(from_reqwest)?;
        debug!("GET {}", request.url());
        let response = self.client.execute(request).await.map_err(from_reqwest)?;
        let status = response.status();
        let body = response.text().await.map_err(from_reqwest)?;
        check_status(status, &body, symbol)?;
        Ok(body)
    }
}

#[async_trait]
impl MarketDataGateway for BinanceGateway {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<CandleSeries, FetchError> {
        let request = self.klines_request(symbol, interval, limit);
        let body = self.get(request, symbol).await?;
        parse_klines(symbol, interval, &body)
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<f64, FetchError> {
        let request = self.premium_index_request(symbol);
        let body = self.get(request, symbol).await?;
        parse_funding_rate(&body)
    }
}

fn from_reqwest(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(e.to_string())
    }
}

pub(crate) fn check_status(status: StatusCode, body: &str, symbol: &str) -> Result<(), FetchError> {
    if status.is_success() {
        return Ok(());
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::IM_A_TEAPOT => Err(FetchError::RateLimited),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Err(FetchError::Timeout),
        StatusCode::NOT_FOUND => Err(FetchError::NotFound(symbol.to_string())),
        StatusCode::BAD_REQUEST => match serde_json::from_str::<ApiErrorResponse>(body) {
            Ok(api_error) if api_error.code == INVALID_SYMBOL_CODE => {
                Err(FetchError::NotFound(symbol.to_string()))
            }
            Ok(api_error) => Err(FetchError::Transport(format!(
                "{status}: {} ({})",
                api_error.msg, api_error.code
            ))),
            Err(_) => Err(FetchError::Transport(format!("{status}: {body}"))),
        },
        _ => Err(FetchError::Transport(format!("{status}: {body}"))),
    }
}

fn parse_number(field: &str, value: &str) -> Result<f64, FetchError> {
    value
        .parse::<f64>()
        .map_err(|e| FetchError::Transport(format!("invalid {field} '{value}': {e}")))
}

pub(crate) fn parse_klines(
    symbol: &str,
    interval: Interval,
    body: &str,
) -> Result<CandleSeries, FetchError> {
    let rows: Vec<Vec<serde_json::Value>> =
        serde_json::from_str(body).map_err(|e| FetchError::Transport(e.to_string()))?;

    let candles = rows
        .into_iter()
        .map(|row| -> Result<Candle, FetchError> {
            let row = KlineRow::try_from(row).map_err(FetchError::Transport)?;
            Ok(Candle {
                timestamp: row.open_time,
                open: parse_number("open", &row.open)?,
                high: parse_number("high", &row.high)?,
                low: parse_number("low", &row.low)?,
                close: parse_number("close", &row.close)?,
                volume: parse_number("volume", &row.volume)?,
            })
        })
        .collect::<Result<Vec<Candle>, FetchError>>()?;

    CandleSeries::new(symbol, interval, candles).map_err(|e| FetchError::Transport(e.to_string()))
}

pub(crate) fn parse_funding_rate(body: &str) -> Result<f64, FetchError> {
    let response: PremiumIndexResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Transport(e.to_string()))?;
    parse_number("lastFundingRate", &response.last_funding_rate)
}
