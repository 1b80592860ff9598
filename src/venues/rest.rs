//! Public REST ticker sources.
//!
//! Read-only, unauthenticated endpoints:
//! - Binance   `GET /api/v3/ticker/price?symbol=SOLUSDC`
//! - Coinbase  `GET /products/SOL-USD/ticker`
//! - Kraken    `GET /0/public/Ticker?pair=SOLUSD`
//! - CoinGecko `GET /api/v3/simple/price?ids=solana&vs_currencies=usd`
//!
//! None of these report pool depth, so quotes carry no liquidity and the
//! arbitrage evaluator falls back to spread-only confidence.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::PriceSource;
use crate::types::{d, GateResult, Pair, TradeGateError, Venue, VenueQuote};

/// Per-request timeout. A timeout is reported as `DataUnavailable`.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BinanceTicker {
    price: String,
}

#[derive(Debug, Deserialize)]
struct CoinbaseTicker {
    price: String,
}

#[derive(Debug, Deserialize)]
struct KrakenResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, KrakenTicker>,
}

#[derive(Debug, Deserialize)]
struct KrakenTicker {
    /// Last trade: `[price, lot volume]`.
    c: Vec<String>,
}

type CoinGeckoResponse = HashMap<String, HashMap<String, f64>>;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct RestPriceSource {
    venue: Venue,
    http: Client,
    base_url: String,
}

impl RestPriceSource {
    pub fn new(venue: Venue) -> Result<Self> {
        Self::with_base_url(venue, default_base_url(venue))
    }

    /// Point the source at a different host (mirrors, local stubs).
    pub fn with_base_url(venue: Venue, base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("TradeGate/0.1.0 (paper-trading-engine)")
            .build()
            .with_context(|| format!("Failed to build HTTP client for {venue}"))?;

        Ok(Self {
            venue,
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn unavailable(&self, message: impl Into<String>) -> TradeGateError {
        TradeGateError::DataUnavailable {
            source_name: self.venue.to_string(),
            message: message.into(),
        }
    }

    /// Venue-specific request URL for `pair`.
    fn ticker_url(&self, pair: &Pair) -> GateResult<String> {
        let base = pair.base();
        let url = match self.venue {
            Venue::Binance => format!(
                "{}/api/v3/ticker/price?symbol={}",
                self.base_url,
                urlencoding::encode(&format!("{base}{}", pair.quote()))
            ),
            Venue::Coinbase => format!(
                "{}/products/{}/ticker",
                self.base_url,
                urlencoding::encode(&format!("{base}-{}", usd_quote(pair.quote())))
            ),
            Venue::Kraken => format!(
                "{}/0/public/Ticker?pair={}",
                self.base_url,
                urlencoding::encode(&format!("{base}{}", usd_quote(pair.quote())))
            ),
            Venue::CoinGecko => {
                let id = coingecko_id(base)
                    .ok_or_else(|| self.unavailable(format!("no CoinGecko id for {base}")))?;
                format!(
                    "{}/api/v3/simple/price?ids={id}&vs_currencies={}",
                    self.base_url,
                    urlencoding::encode(&usd_quote(pair.quote()).to_lowercase())
                )
            }
        };
        Ok(url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> GateResult<T> {
        let resp = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                self.unavailable("request timed out")
            } else {
                self.unavailable(format!("request failed: {e}"))
            }
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(self.unavailable(format!("HTTP {status}: {body}")));
        }

        resp.json::<T>()
            .await
            .map_err(|e| self.unavailable(format!("invalid response body: {e}")))
    }

    fn parse_price(&self, raw: &str) -> GateResult<Decimal> {
        Decimal::from_str(raw.trim()).map_err(|e| self.unavailable(format!("bad price '{raw}': {e}")))
    }
}

#[async_trait]
impl PriceSource for RestPriceSource {
    async fn quote(&self, pair: &Pair) -> GateResult<VenueQuote> {
        let url = self.ticker_url(pair)?;
        debug!(venue = %self.venue, pair = %pair, url = %url, "Fetching ticker");

        let price = match self.venue {
            Venue::Binance => {
                let t: BinanceTicker = self.get_json(&url).await?;
                self.parse_price(&t.price)?
            }
            Venue::Coinbase => {
                let t: CoinbaseTicker = self.get_json(&url).await?;
                self.parse_price(&t.price)?
            }
            Venue::Kraken => {
                let r: KrakenResponse = self.get_json(&url).await?;
                if !r.error.is_empty() {
                    return Err(self.unavailable(r.error.join(", ")));
                }
                let last = r
                    .result
                    .values()
                    .next()
                    .and_then(|t| t.c.first())
                    .ok_or_else(|| self.unavailable("empty ticker result"))?;
                self.parse_price(last)?
            }
            Venue::CoinGecko => {
                let r: CoinGeckoResponse = self.get_json(&url).await?;
                let value = r
                    .values()
                    .next()
                    .and_then(|m| m.values().next())
                    .copied()
                    .ok_or_else(|| self.unavailable("empty price result"))?;
                d(value)
            }
        };

        VenueQuote::new(self.venue, price, None).validate()
    }

    fn venue(&self) -> Venue {
        self.venue
    }
}

fn default_base_url(venue: Venue) -> &'static str {
    match venue {
        Venue::Binance => "https://api.binance.com",
        Venue::Coinbase => "https://api.exchange.coinbase.com",
        Venue::Kraken => "https://api.kraken.com",
        Venue::CoinGecko => "https://api.coingecko.com",
    }
}

/// Coinbase, Kraken and CoinGecko quote stablecoin pairs against USD.
fn usd_quote(quote: &str) -> &str {
    match quote {
        "USDC" | "USDT" => "USD",
        other => other,
    }
}

fn coingecko_id(symbol: &str) -> Option<&'static str> {
    match symbol {
        "BTC" => Some("bitcoin"),
        "ETH" => Some("ethereum"),
        "WETH" => Some("weth"),
        "SOL" => Some("solana"),
        "RAY" => Some("raydium"),
        "USDC" => Some("usd-coin"),
        _ => None,
    }
}
