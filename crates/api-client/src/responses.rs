use crate::error::ApiError;
use core_types::{ContractSpec, ExchangePosition, Ticker};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

// Bitget serializes every number as a string, so the DTOs hold `String`s and the
// conversions below decide what an unparseable field means.

/// The code Bitget returns for a successful request.
pub const SUCCESS_CODE: &str = "00000";

/// The envelope around every Bitget v2 response.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn into_data(self) -> Result<T, ApiError> {
        if self.code != SUCCESS_CODE {
            return Err(ApiError::Exchange { code: self.code, msg: self.msg });
        }
        self.data
            .ok_or_else(|| ApiError::InvalidData("response has no data field".to_string()))
    }
}

/// One row of `GET /api/v2/mix/market/tickers`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerResponse {
    pub symbol: String,
    pub last_pr: Option<String>,
    pub mark_price: Option<String>,
    #[serde(rename = "change24h")]
    pub change_24h: Option<String>,
}

/// One row of `GET /api/v2/mix/market/contracts`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractResponse {
    pub symbol: String,
    pub min_trade_num: Option<String>,
    pub size_multiplier: Option<String>,
}

/// One row of `GET /api/v2/mix/position/all-position`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    pub symbol: String,
    pub hold_side: Option<String>,
    pub open_price_avg: Option<String>,
    pub total: Option<String>,
    pub margin_size: Option<String>,
    pub leverage: Option<String>,
    pub mark_price: Option<String>,
    #[serde(rename = "unrealizedPL")]
    pub unrealized_pl: Option<String>,
}

/// One row of `GET /api/v2/mix/account/accounts`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub margin_coin: String,
    pub account_equity: Option<String>,
    pub usdt_equity: Option<String>,
}

/// The `data` of `POST /api/v2/mix/order/place-order`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderResponse {
    pub order_id: Option<String>,
}

fn parse(field: &Option<String>) -> Option<Decimal> {
    field
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| Decimal::from_str(s.trim()).ok())
}

impl TickerResponse {
    /// `None` when the last price or the 24h change cannot be read.
    pub fn to_ticker(&self) -> Option<Ticker> {
        Some(Ticker {
            symbol: self.symbol.clone(),
            last_price: parse(&self.last_pr)?,
            mark_price: parse(&self.mark_price),
            change_24h: parse(&self.change_24h)?,
        })
    }
}

impl ContractResponse {
    /// `None` unless both the minimum and a positive size step can be read.
    pub fn to_spec(&self) -> Option<ContractSpec> {
        Some(ContractSpec {
            min_size: parse(&self.min_trade_num).filter(|min| *min >= Decimal::ZERO)?,
            size_step: parse(&self.size_multiplier).filter(|step| *step > Decimal::ZERO)?,
        })
    }
}

impl PositionResponse {
    /// Hedge-mode accounts report a hold side; one-way accounts leave it empty.
    pub fn is_short(&self) -> bool {
        match self.hold_side.as_deref() {
            None | Some("") => true,
            Some(side) => side.eq_ignore_ascii_case("short"),
        }
    }

    /// `None` only when the size is unreadable or flat. The position is open as long as
    /// the exchange reports a size, so prices it cannot parse are left empty.
    pub fn to_position(&self) -> Option<ExchangePosition> {
        let qty = parse(&self.total)?;
        if qty <= Decimal::ZERO {
            return None;
        }
        let positive = |raw: &Option<String>| parse(raw).filter(|v| *v > Decimal::ZERO);
        Some(ExchangePosition {
            symbol: self.symbol.clone(),
            entry_price: positive(&self.open_price_avg),
            qty,
            margin: parse(&self.margin_size).unwrap_or(Decimal::ZERO),
            leverage: parse(&self.leverage).unwrap_or(Decimal::ZERO),
            mark_price: positive(&self.mark_price),
            unrealized_pnl: parse(&self.unrealized_pl).unwrap_or(Decimal::ZERO),
        })
    }
}

impl AccountResponse {
    pub fn equity(&self) -> Option<Decimal> {
        parse(&self.account_equity).or_else(|| parse(&self.usdt_equity))
    }
}
