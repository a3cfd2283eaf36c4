use crate::auth::sign_request;
use crate::error::ApiError;
use async_trait::async_trait;
use configuration::ApiConfig;
use core_types::{ContractSpec, ExchangePosition, OrderAction, OrderSide, Ticker};
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

mod auth;
pub mod error;
pub mod responses;
// --- Public API ---
pub use responses::{
    AccountResponse, ContractResponse, Envelope, PlaceOrderResponse, PositionResponse,
    TickerResponse,
};

const PRODUCT_TYPE: &str = "USDT-FUTURES";
const MARGIN_COIN: &str = "USDT";

/// The exchange's answer to an order submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub accepted: bool,
    /// Market orders are acknowledged before they fill, so this is usually unknown.
    pub fill_price: Option<Decimal>,
    pub order_id: Option<String>,
    /// The exchange's reason when the order was refused.
    pub message: Option<String>,
}

impl OrderAck {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self { accepted: false, fill_price: None, order_id: None, message: Some(message.into()) }
    }
}

/// The generic, abstract interface for the market data and execution gateway.
/// This trait is the contract the run controllers use, allowing the
/// underlying implementation (live or scripted) to be swapped out.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// The 24h ticker snapshot of every USDT perpetual.
    async fn get_tickers(&self) -> Result<Vec<Ticker>, ApiError>;

    /// Sizing constraints for the requested symbols. Unknown symbols are absent from the map.
    async fn get_contract_specs(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, ContractSpec>, ApiError>;

    /// Open short positions. (Authenticated)
    async fn get_open_positions(&self) -> Result<Vec<ExchangePosition>, ApiError>;

    /// USDT account equity. (Authenticated)
    async fn get_account_equity(&self) -> Result<Decimal, ApiError>;

    /// Places a market order. (Authenticated)
    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        size: Decimal,
        action: OrderAction,
    ) -> Result<OrderAck, ApiError>;

    /// Buys back `qty` of a short. (Authenticated)
    async fn close_position(&self, symbol: &str, qty: Decimal) -> Result<OrderAck, ApiError> {
        self.place_order(symbol, OrderAction::Close.side(), qty, OrderAction::Close).await
    }

    /// Sets the symbol's leverage. (Authenticated)
    async fn set_leverage(&self, symbol: &str, leverage: Decimal) -> Result<(), ApiError>;
}

/// A concrete implementation of the `Gateway` for Bitget USDT-M futures.
#[derive(Clone)]
pub struct BitgetClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    api_passphrase: String,
    hold_side: Option<String>,
}

impl BitgetClient {
    pub fn new(api_config: &ApiConfig, timeout: Duration) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if api_config.use_testnet {
            // Demo trading is selected per request, not by host.
            headers.insert("paptrading", HeaderValue::from_static("1"));
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: api_config.base_url.trim_end_matches('/').to_string(),
            api_key: api_config.api_key.clone(),
            api_secret: api_config.api_secret.clone(),
            api_passphrase: api_config.api_passphrase.clone(),
            hold_side: api_config.hold_side.clone().filter(|s| !s.is_empty()),
        })
    }

    fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty() && !self.api_passphrase.is_empty()
    }

    fn require_credentials(&self) -> Result<(), ApiError> {
        if self.has_credentials() {
            Ok(())
        } else {
            Err(ApiError::MissingCredentials(
                "api_key, api_secret and api_passphrase are required".to_string(),
            ))
        }
    }

    /// Sends one request and decodes the envelope. Requests are signed whenever
    /// credentials are configured; public market data also works without them.
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &BTreeMap<&str, String>,
        body: Option<serde_json::Value>,
    ) -> Result<Envelope<T>, ApiError> {
        let query_string = serde_qs::to_string(params)
            .map_err(|e| ApiError::RequestBuild(e.to_string()))?;
        let body_string = match &body {
            Some(value) => value.to_string(),
            None => String::new(),
        };

        let url = if query_string.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query_string)
        };

        let mut request = self.client.request(method.clone(), &url);
        if self.has_credentials() {
            let timestamp = chrono::Utc::now().timestamp_millis().to_string();
            let signature = sign_request(
                &self.api_secret,
                &timestamp,
                method.as_str(),
                path,
                &query_string,
                &body_string,
            )?;
            request = request
                .header("ACCESS-KEY", &self.api_key)
                .header("ACCESS-SIGN", signature)
                .header("ACCESS-TIMESTAMP", timestamp)
                .header("ACCESS-PASSPHRASE", &self.api_passphrase);
        }
        if !body_string.is_empty() {
            request = request.body(body_string);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str::<Envelope<T>>(&text) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => Err(ApiError::Exchange {
                code: status.as_u16().to_string(),
                msg: text,
            }),
            Err(e) => Err(ApiError::Deserialization(format!(
                "{}: {}. Original text: {}",
                path, e, text
            ))),
        }
    }

    fn product_params() -> BTreeMap<&'static str, String> {
        let mut params = BTreeMap::new();
        params.insert("productType", PRODUCT_TYPE.to_string());
        params
    }
}

#[async_trait]
impl Gateway for BitgetClient {
    async fn get_tickers(&self) -> Result<Vec<Ticker>, ApiError> {
        let rows: Vec<TickerResponse> = self
            .send(Method::GET, "/api/v2/mix/market/tickers", &Self::product_params(), None)
            .await?
            .into_data()?;

        let tickers: Vec<Ticker> = rows
            .iter()
            .filter_map(|row| {
                let ticker = row.to_ticker();
                if ticker.is_none() {
                    tracing::debug!(symbol = %row.symbol, "Skipping ticker with unreadable fields.");
                }
                ticker
            })
            .collect();
        Ok(tickers)
    }

    async fn get_contract_specs(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, ContractSpec>, ApiError> {
        let rows: Vec<ContractResponse> = self
            .send(Method::GET, "/api/v2/mix/market/contracts", &Self::product_params(), None)
            .await?
            .into_data()?;

        Ok(rows
            .into_iter()
            .filter(|row| symbols.iter().any(|s| s == &row.symbol))
            .filter_map(|row| row.to_spec().map(|spec| (row.symbol.clone(), spec)))
            .collect())
    }

    async fn get_open_positions(&self) -> Result<Vec<ExchangePosition>, ApiError> {
        self.require_credentials()?;
        let rows: Vec<PositionResponse> = self
            .send(Method::GET, "/api/v2/mix/position/all-position", &Self::product_params(), None)
            .await?
            .into_data()?;

        Ok(rows
            .iter()
            .filter(|row| row.is_short())
            .filter_map(PositionResponse::to_position)
            .collect())
    }

    async fn get_account_equity(&self) -> Result<Decimal, ApiError> {
        self.require_credentials()?;
        let rows: Vec<AccountResponse> = self
            .send(Method::GET, "/api/v2/mix/account/accounts", &Self::product_params(), None)
            .await?
            .into_data()?;

        rows.iter()
            .find(|row| row.margin_coin == MARGIN_COIN)
            .and_then(AccountResponse::equity)
            .ok_or_else(|| ApiError::InvalidData("no USDT account equity reported".to_string()))
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        size: Decimal,
        action: OrderAction,
    ) -> Result<OrderAck, ApiError> {
        self.require_credentials()?;
        let reduce_only = if action == OrderAction::Close { "YES" } else { "NO" };
        let body = json!({
            "symbol": symbol,
            "productType": PRODUCT_TYPE,
            "marginMode": "crossed",
            "marginCoin": MARGIN_COIN,
            "size": size.normalize().to_string(),
            "side": side.as_str(),
            "tradeSide": action.as_str(),
            "orderType": "market",
            "reduceOnly": reduce_only,
        });

        let envelope: Envelope<PlaceOrderResponse> = self
            .send(Method::POST, "/api/v2/mix/order/place-order", &BTreeMap::new(), Some(body))
            .await?;

        if envelope.code != responses::SUCCESS_CODE {
            return Ok(OrderAck::rejected(format!("{} {}", envelope.code, envelope.msg)));
        }
        Ok(OrderAck {
            accepted: true,
            fill_price: None,
            order_id: envelope.data.and_then(|d| d.order_id),
            message: None,
        })
    }

    async fn set_leverage(&self, symbol: &str, leverage: Decimal) -> Result<(), ApiError> {
        self.require_credentials()?;
        let mut body = json!({
            "symbol": symbol,
            "productType": PRODUCT_TYPE,
            "marginCoin": MARGIN_COIN,
            "leverage": leverage.normalize().to_string(),
        });
        if let Some(hold_side) = &self.hold_side {
            body["holdSide"] = json!(hold_side);
        }

        let envelope: Envelope<serde_json::Value> = self
            .send(Method::POST, "/api/v2/mix/account/set-leverage", &BTreeMap::new(), Some(body))
            .await?;
        if envelope.code != responses::SUCCESS_CODE {
            return Err(ApiError::Exchange { code: envelope.code, msg: envelope.msg });
        }
        Ok(())
    }
}
