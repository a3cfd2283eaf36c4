//! In-process fakes shared by the controller and scheduler tests.

use crate::controller::RunController;
use api_client::error::ApiError;
use api_client::{Gateway, OrderAck};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use configuration::{Config, RuntimeSettings};
use core_types::{ContractSpec, ExchangePosition, OrderAction, OrderSide, RunMode, Ticker};
use database::MemoryStore;
use executor::{LiveExecutor, SimulatedExecutor};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) fn ticker(symbol: &str, change: Decimal, price: Decimal) -> Ticker {
    Ticker { symbol: symbol.into(), last_price: price, mark_price: None, change_24h: change }
}

/// Two pumped names and six eligible ones, all priced at 10.
pub(crate) fn basket() -> Vec<Ticker> {
    vec![
        ticker("AUSDT", dec!(0.20), dec!(10)),
        ticker("BUSDT", dec!(0.18), dec!(10)),
        ticker("CUSDT", dec!(0.10), dec!(10)),
        ticker("L1USDT", dec!(0.01), dec!(10)),
        ticker("L2USDT", dec!(0.02), dec!(10)),
        ticker("L3USDT", dec!(0.03), dec!(10)),
        ticker("L4USDT", dec!(0.04), dec!(10)),
        ticker("L5USDT", dec!(0.05), dec!(10)),
    ]
}

/// A Tuesday.
pub(crate) fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    on(4, hour, minute)
}

pub(crate) fn on(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, minute, 0).unwrap()
}

pub(crate) fn paper_settings() -> RuntimeSettings {
    Config::default().runtime(RunMode::Paper).unwrap()
}

pub(crate) fn live_settings(initial_balance: Option<Decimal>) -> RuntimeSettings {
    let mut settings = Config::default().runtime(RunMode::Live).unwrap();
    settings.enabled = true;
    settings.initial_balance = initial_balance;
    settings
}

pub(crate) fn paper_controller(
    store: &Arc<MemoryStore>,
    gateway: &Arc<FakeGateway>,
    settings: RuntimeSettings,
) -> RunController {
    RunController::new(settings, gateway.clone(), Arc::new(SimulatedExecutor::new()), store.clone()).unwrap()
}

pub(crate) fn live_controller(
    store: &Arc<MemoryStore>,
    gateway: &Arc<FakeGateway>,
    settings: RuntimeSettings,
) -> RunController {
    let executor = Arc::new(LiveExecutor::new(gateway.clone()));
    RunController::new(settings, gateway.clone(), executor, store.clone()).unwrap()
}

/// A scripted exchange. Accepted opens appear as short positions at the current
/// ticker price; accepted closes remove them.
#[derive(Default)]
pub(crate) struct FakeGateway {
    tickers: Mutex<Vec<Ticker>>,
    positions: Mutex<Vec<ExchangePosition>>,
    equity: Mutex<Option<Decimal>>,
    rejected: Mutex<HashSet<String>>,
    fail_tickers: AtomicBool,
    pub orders: Mutex<Vec<(String, OrderSide, Decimal, OrderAction)>>,
}

impl FakeGateway {
    pub(crate) fn with_tickers(tickers: Vec<Ticker>) -> Self {
        Self { tickers: Mutex::new(tickers), ..Default::default() }
    }

    pub(crate) fn set_price(&self, symbol: &str, price: Decimal) {
        for t in self.tickers.lock().unwrap().iter_mut().filter(|t| t.symbol == symbol) {
            t.last_price = price;
        }
    }

    pub(crate) fn set_all_prices(&self, price: Decimal) {
        for t in self.tickers.lock().unwrap().iter_mut() {
            t.last_price = price;
        }
    }

    pub(crate) fn set_equity(&self, equity: Decimal) {
        *self.equity.lock().unwrap() = Some(equity);
    }

    pub(crate) fn reject(&self, symbol: &str) {
        self.rejected.lock().unwrap().insert(symbol.to_string());
    }

    pub(crate) fn fail_tickers(&self, fail: bool) {
        self.fail_tickers.store(fail, Ordering::SeqCst);
    }

    /// Simulates an operator closing the position by hand on the exchange.
    pub(crate) fn drop_position(&self, symbol: &str) {
        self.positions.lock().unwrap().retain(|p| p.symbol != symbol);
    }

    pub(crate) fn position_symbols(&self) -> Vec<String> {
        self.positions.lock().unwrap().iter().map(|p| p.symbol.clone()).collect()
    }

    fn price(&self, symbol: &str) -> Option<Decimal> {
        self.tickers.lock().unwrap().iter().find(|t| t.symbol == symbol).map(|t| t.last_price)
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn get_tickers(&self) -> Result<Vec<Ticker>, ApiError> {
        if self.fail_tickers.load(Ordering::SeqCst) {
            return Err(ApiError::InvalidData("request timed out".into()));
        }
        Ok(self.tickers.lock().unwrap().clone())
    }

    async fn get_contract_specs(&self, symbols: &[String]) -> Result<HashMap<String, ContractSpec>, ApiError> {
        Ok(symbols
            .iter()
            .map(|s| (s.clone(), ContractSpec { min_size: Decimal::ONE, size_step: Decimal::ONE }))
            .collect())
    }

    async fn get_open_positions(&self) -> Result<Vec<ExchangePosition>, ApiError> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn get_account_equity(&self) -> Result<Decimal, ApiError> {
        (*self.equity.lock().unwrap()).ok_or_else(|| ApiError::InvalidData("no equity".into()))
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        size: Decimal,
        action: OrderAction,
    ) -> Result<OrderAck, ApiError> {
        self.orders.lock().unwrap().push((symbol.to_string(), side, size, action));
        if self.rejected.lock().unwrap().contains(symbol) {
            return Ok(OrderAck::rejected("insufficient balance"));
        }
        let price = self.price(symbol).unwrap_or(Decimal::ONE);
        match action {
            OrderAction::Open => self.positions.lock().unwrap().push(ExchangePosition {
                symbol: symbol.to_string(),
                entry_price: Some(price),
                qty: size,
                margin: Decimal::ZERO,
                leverage: Decimal::ZERO,
                mark_price: None,
                unrealized_pnl: Decimal::ZERO,
            }),
            OrderAction::Close => self.drop_position(symbol),
        }
        Ok(OrderAck { accepted: true, fill_price: Some(price), order_id: Some("1".into()), message: None })
    }

    async fn set_leverage(&self, _symbol: &str, _leverage: Decimal) -> Result<(), ApiError> {
        Ok(())
    }
}
