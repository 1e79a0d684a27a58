use crate::api::MarketDataSource;
use crate::config::ExchangeConfig;
use crate::error::ExchangeError;
use crate::models::{AccountBalance, Candle, Position, PositionSide, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
const QUOTE_ASSET: &str = "USDT";

type HmacSha256 = Hmac<Sha256>;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// "BTC/USDT" -> "BTCUSDT"
pub fn to_exchange_symbol(symbol: &str) -> String {
    symbol.replace('/', "").to_uppercase()
}

/// "BTCUSDT" -> "BTC/USDT"
pub fn from_exchange_symbol(symbol: &str) -> String {
    match symbol.strip_suffix(QUOTE_ASSET) {
        Some(base) if !base.is_empty() => format!("{}/{}", base, QUOTE_ASSET),
        _ => symbol.to_string(),
    }
}

/// USDⓈ-M futures REST client
///
/// Cloneable; clones share the HTTP pool and rate limiter.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    secret_key: Option<String>,
    recv_window_ms: u64,
    initial_backoff_ms: u64,
    rate_limiter: Arc<BinanceRateLimiter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRiskEntry {
    symbol: String,
    position_amt: String,
    entry_price: String,
    mark_price: String,
    un_realized_profit: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    total_wallet_balance: String,
    available_balance: String,
    total_unrealized_profit: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

fn parse_num(field: &str, value: &str) -> Result<f64, ExchangeError> {
    value
        .parse::<f64>()
        .map_err(|e| ExchangeError::Decode(format!("{field} = {value:?}: {e}")))
}

fn is_retryable(err: &ExchangeError) -> bool {
    match err {
        ExchangeError::Http(_) | ExchangeError::Timeout(_) => true,
        ExchangeError::Status { status, .. } => *status == 429 || *status >= 500,
        ExchangeError::Decode(_) | ExchangeError::Auth(_) => false,
    }
}

impl BinanceFuturesClient {
    pub fn new(config: &ExchangeConfig, request_timeout_secs: u64) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()?;

        let quota = Quota::per_minute(NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            secret_key: config.secret_key.clone().filter(|s| !s.is_empty()),
            recv_window_ms: config.recv_window_ms,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Overrides the first retry delay (doubles on each attempt)
    pub fn with_backoff(mut self, initial_backoff_ms: u64) -> Self {
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.secret_key.is_some()
    }

    /// Appends timestamp, recvWindow and the HMAC-SHA256 signature
    fn sign_params(&self, mut params: Vec<(String, String)>) -> Result<String, ExchangeError> {
        let secret = self
            .secret_key
            .as_ref()
            .ok_or_else(|| ExchangeError::Auth("API secret required for signed requests".to_string()))?;

        params.push(("timestamp".into(), Utc::now().timestamp_millis().to_string()));
        if self.recv_window_ms > 0 {
            params.push(("recvWindow".into(), self.recv_window_ms.to_string()));
        }
        let query = serde_urlencoded::to_string(&params).map_err(|e| ExchangeError::Decode(e.to_string()))?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ExchangeError::Auth(format!("failed to init signer: {e}")))?;
        mac.update(query.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{query}&signature={signature}"))
    }

    async fn get_once<T: DeserializeOwned>(&self, path: &str, query: &str, signed: bool) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}?{}", self.base_url, path, query);
        let mut request = self.client.get(&url);
        if signed {
            let key = self
                .api_key
                .as_ref()
                .ok_or_else(|| ExchangeError::Auth("API key required for signed requests".to_string()))?;
            request = request.header("X-MBX-APIKEY", key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(ExchangeError::Auth(body));
            }
            // -2014 / -2015: bad key, signature or permissions
            if let Ok(api) = serde_json::from_str::<ApiErrorBody>(&body) {
                if api.code == -2014 || api.code == -2015 || api.code == -1022 {
                    return Err(ExchangeError::Auth(format!("{} ({})", api.msg, api.code)));
                }
            }
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ExchangeError::Decode(format!("{path}: {e}")))
    }

    /// GET with retry and exponential backoff for transient failures
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Vec<(String, String)>,
        signed: bool,
    ) -> Result<T, ExchangeError> {
        let mut attempt = 1;
        loop {
            // Signed queries carry a timestamp, so re-sign on every attempt
            let query = if signed {
                self.sign_params(params.clone())?
            } else {
                serde_urlencoded::to_string(&params).map_err(|e| ExchangeError::Decode(e.to_string()))?
            };

            match self.get_once(path, &query, signed).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("✓ {} succeeded after {} attempts", path, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < MAX_RETRIES && is_retryable(&e) => {
                    let backoff_ms = self.initial_backoff_ms * 2_u64.pow(attempt - 1);
                    tracing::warn!(
                        "Attempt {}/{} failed for {}: {}. Retrying in {}ms...",
                        attempt,
                        MAX_RETRIES,
                        path,
                        e,
                        backoff_ms
                    );
                    sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn parse_kline(row: &serde_json::Value) -> Option<Candle> {
        let arr = row.as_array()?;
        if arr.len() < 6 {
            return None;
        }
        let open_time: DateTime<Utc> = DateTime::from_timestamp_millis(arr[0].as_i64()?)?;
        Some(Candle {
            open_time,
            open: arr[1].as_str()?.parse().ok()?,
            high: arr[2].as_str()?.parse().ok()?,
            low: arr[3].as_str()?.parse().ok()?,
            close: arr[4].as_str()?.parse().ok()?,
            volume: arr[5].as_str()?.parse().ok()?,
        })
    }
}

#[async_trait]
impl MarketDataSource for BinanceFuturesClient {
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>, ExchangeError> {
        let params = vec![
            ("symbol".to_string(), to_exchange_symbol(symbol)),
            ("interval".to_string(), timeframe.as_str().to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        let raw: Vec<serde_json::Value> = self.get("/fapi/v1/klines", params, false).await?;

        let candles: Vec<Candle> = raw.iter().filter_map(Self::parse_kline).collect();
        if candles.len() != raw.len() {
            return Err(ExchangeError::Decode(format!(
                "{} {}: {} of {} klines malformed",
                symbol,
                timeframe,
                raw.len() - candles.len(),
                raw.len()
            )));
        }

        tracing::debug!("Fetched {} {} candles for {}", candles.len(), timeframe, symbol);
        Ok(candles)
    }

    async fn get_open_positions(&self) -> Result<Vec<Position>, ExchangeError> {
        let entries: Vec<PositionRiskEntry> = self.get("/fapi/v2/positionRisk", Vec::new(), true).await?;

        let mut positions = Vec::new();
        for entry in entries {
            let amount = parse_num("positionAmt", &entry.position_amt)?;
            if amount == 0.0 {
                continue;
            }
            positions.push(Position {
                symbol: from_exchange_symbol(&entry.symbol),
                side: if amount > 0.0 { PositionSide::Long } else { PositionSide::Short },
                entry_price: parse_num("entryPrice", &entry.entry_price)?,
                size: amount.abs(),
                mark_price: parse_num("markPrice", &entry.mark_price)?,
                unrealized_pnl: parse_num("unRealizedProfit", &entry.un_realized_profit)?,
            });
        }
        Ok(positions)
    }

    async fn get_account_balance(&self) -> Result<AccountBalance, ExchangeError> {
        let info: AccountInfo = self.get("/fapi/v2/account", Vec::new(), true).await?;
        Ok(AccountBalance {
            wallet: parse_num("totalWalletBalance", &info.total_wallet_balance)?,
            available: parse_num("availableBalance", &info.available_balance)?,
            unrealized_pnl: parse_num("totalUnrealizedProfit", &info.total_unrealized_profit)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_mapping() {
        assert_eq!(to_exchange_symbol("BTC/USDT"), "BTCUSDT");
        assert_eq!(to_exchange_symbol("eth/usdt"), "ETHUSDT");
        assert_eq!(from_exchange_symbol("SOLUSDT"), "SOL/USDT");
        assert_eq!(from_exchange_symbol("BTCBUSD"), "BTCBUSD");
    }

    #[test]
    fn test_signature_is_appended() {
        let config = ExchangeConfig {
            api_key: Some("key".to_string()),
            secret_key: Some("secret".to_string()),
            ..Default::default()
        };
        let client = BinanceFuturesClient::new(&config, 5).unwrap();
        let query = client.sign_params(vec![("symbol".into(), "BTCUSDT".into())]).unwrap();

        assert!(query.starts_with("symbol=BTCUSDT&timestamp="));
        assert!(query.contains("&recvWindow=5000&signature="));
        let signature = query.rsplit("signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn test_signing_without_secret_is_auth_error() {
        let client = BinanceFuturesClient::new(&ExchangeConfig::default(), 5).unwrap();
        assert!(!client.has_credentials());
        assert!(matches!(client.sign_params(Vec::new()), Err(ExchangeError::Auth(_))));
    }

    #[test]
    fn test_parse_kline_row() {
        let row = serde_json::json!([1722470400000i64, "100.5", "101.0", "99.5", "100.8", "1234.5", 1722473999999i64]);
        let candle = BinanceFuturesClient::parse_kline(&row).unwrap();
        assert_eq!(candle.open, 100.5);
        assert_eq!(candle.volume, 1234.5);
        assert_eq!(candle.open_time.timestamp_millis(), 1722470400000);

        assert!(BinanceFuturesClient::parse_kline(&serde_json::json!([1, "x"])).is_none());
    }
}
