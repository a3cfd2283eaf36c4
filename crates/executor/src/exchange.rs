use crate::error::ExecutorError;
use api_client::Gateway;
use async_trait::async_trait;
use core_types::{ExchangePosition, LegPlan, OrderAction, OrderStatus, RunMode};
use rust_decimal::Decimal;
use std::sync::Arc;

/// The outcome of one open or close submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub status: OrderStatus,
    /// The price the leg is booked at. For a rejected order this is the intent price.
    pub price: Decimal,
    /// The exchange's reason for a rejection.
    pub message: Option<String>,
    /// Set when the leverage could not be configured before an open.
    pub leverage_warning: Option<String>,
}

impl Fill {
    pub fn is_rejected(&self) -> bool {
        self.status == OrderStatus::Rejected
    }

    fn filled(price: Decimal) -> Self {
        Self { status: OrderStatus::Filled, price, message: None, leverage_warning: None }
    }
}

/// Where a tick's position figures come from.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionSource {
    /// Positions exist only in the local book; prices come from the ticker snapshot.
    Simulated,
    /// The exchange's open shorts, authoritative over the local book.
    Exchange(Vec<ExchangePosition>),
}

/// What an executor observed at the start of a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub positions: PositionSource,
    pub account_equity: Option<Decimal>,
}

/// A generic trait for a leg-execution strategy.
///
/// This trait lets one run controller drive both modes without knowing whether it
/// is booking simulated fills or talking to the real exchange.
#[async_trait]
pub trait LegExecutor: Send + Sync {
    fn mode(&self) -> RunMode;

    /// Reads whatever position state the mode treats as authoritative.
    async fn observe(&self) -> Result<Observation, ExecutorError>;

    /// Opens one short leg of the plan.
    async fn open_leg(&self, plan: &LegPlan) -> Result<Fill, ExecutorError>;

    /// Buys back `qty` of a short. `mark_price` is the price the caller marked it at.
    async fn close_leg(
        &self,
        symbol: &str,
        qty: Decimal,
        mark_price: Decimal,
    ) -> Result<Fill, ExecutorError>;
}

/// The "virtual exchange" for paper runs. Every order fills at the reference price.
#[derive(Debug, Default, Clone)]
pub struct SimulatedExecutor;

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LegExecutor for SimulatedExecutor {
    fn mode(&self) -> RunMode {
        RunMode::Paper
    }

    async fn observe(&self) -> Result<Observation, ExecutorError> {
        Ok(Observation { positions: PositionSource::Simulated, account_equity: None })
    }

    async fn open_leg(&self, plan: &LegPlan) -> Result<Fill, ExecutorError> {
        if plan.reference_price <= Decimal::ZERO {
            return Err(ExecutorError::MissingPrice(plan.symbol.clone()));
        }
        tracing::debug!(symbol = %plan.symbol, price = %plan.reference_price, size = %plan.size, "Simulated open.");
        Ok(Fill::filled(plan.reference_price))
    }

    async fn close_leg(
        &self,
        symbol: &str,
        qty: Decimal,
        mark_price: Decimal,
    ) -> Result<Fill, ExecutorError> {
        if mark_price <= Decimal::ZERO {
            return Err(ExecutorError::MissingPrice(symbol.to_string()));
        }
        tracing::debug!(symbol, price = %mark_price, %qty, "Simulated close.");
        Ok(Fill::filled(mark_price))
    }
}

/// The "live" executor that sends real orders to the exchange via the gateway.
pub struct LiveExecutor {
    gateway: Arc<dyn Gateway>,
}

impl LiveExecutor {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl LegExecutor for LiveExecutor {
    fn mode(&self) -> RunMode {
        RunMode::Live
    }

    async fn observe(&self) -> Result<Observation, ExecutorError> {
        let positions = self.gateway.get_open_positions().await?;
        // Equity only feeds the balance column; missing it must not cost the tick.
        let account_equity = match self.gateway.get_account_equity().await {
            Ok(equity) => Some(equity),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read account equity.");
                None
            }
        };
        Ok(Observation { positions: PositionSource::Exchange(positions), account_equity })
    }

    async fn open_leg(&self, plan: &LegPlan) -> Result<Fill, ExecutorError> {
        let leverage_warning = match self.gateway.set_leverage(&plan.symbol, plan.leverage).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(symbol = %plan.symbol, error = %e, "set_leverage failed, opening anyway.");
                Some(e.to_string())
            }
        };

        let ack = self
            .gateway
            .place_order(&plan.symbol, OrderAction::Open.side(), plan.size, OrderAction::Open)
            .await?;

        tracing::debug!(symbol = %plan.symbol, ?ack, "Open order acknowledged.");
        let status = if ack.accepted { OrderStatus::Filled } else { OrderStatus::Rejected };
        Ok(Fill {
            status,
            price: ack.fill_price.unwrap_or(plan.reference_price),
            message: ack.message,
            leverage_warning,
        })
    }

    async fn close_leg(
        &self,
        symbol: &str,
        qty: Decimal,
        mark_price: Decimal,
    ) -> Result<Fill, ExecutorError> {
        let ack = self.gateway.close_position(symbol, qty).await?;
        tracing::debug!(symbol, ?ack, "Close order acknowledged.");
        let status = if ack.accepted { OrderStatus::Filled } else { OrderStatus::Rejected };
        Ok(Fill {
            status,
            price: ack.fill_price.unwrap_or(mark_price),
            message: ack.message,
            leverage_warning: None,
        })
    }
}
