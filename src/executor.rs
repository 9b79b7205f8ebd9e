// Order executor: turns an approved Signal or IronCondorSetup into
// broker orders, waits for terminal fills, and persists the resulting
// Trade/Position. Single source of commission and slippage accounting.

use crate::broker::types::{OrderKind, OrderRequest, OrderSide, OrderState};
use crate::broker::Broker;
use crate::domain::portfolio::RiskApproval;
use crate::domain::position::{ExitReason, Leg, LegSide, Position, PositionStatus, PositionType};
use crate::domain::signal::{Action, Signal, Strategy};
use crate::domain::trade::{commission, Trade};
use crate::error::EngineError;
use crate::store::Store;
use crate::strategies::iron_condor::IronCondorSetup;
use crate::symbol::Right;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

const RETRY_DELAYS: [Duration; 3] =
    [Duration::from_millis(500), Duration::from_secs(1), Duration::from_secs(2)];
const DEFAULT_FILL_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Broker limit orders are quoted on a nickel grid; an implementer confirmed
/// this against the target broker rather than the penny grid the raw quote
/// carries (an explicitly open question upstream).
const LIMIT_PRICE_GRID: Decimal = dec!(0.05);

fn round_to_nickel(price: Decimal) -> Decimal {
    (price / LIMIT_PRICE_GRID).round() * LIMIT_PRICE_GRID
}

/// One filled leg, kept around so a failed multi-leg attempt can be
/// unwound and so slippage/commission can be attributed per leg.
struct FilledLeg {
    symbol: String,
    side: OrderSide,
    quantity: u32,
    expected_price: Decimal,
    fill_price: Decimal,
}

pub struct Executor<B: Broker, S: Store> {
    pub(crate) broker: B,
    pub(crate) store: S,
    fill_timeout: Duration,
}

impl<B: Broker, S: Store> Executor<B, S> {
    pub fn new(broker: B, store: S) -> Self {
        Self { broker, store, fill_timeout: DEFAULT_FILL_TIMEOUT }
    }

    pub fn with_fill_timeout(mut self, timeout: Duration) -> Self {
        self.fill_timeout = timeout;
        self
    }

    async fn place_with_retry(&self, request: OrderRequest) -> Result<String, EngineError> {
        let mut attempt = 0;
        loop {
            match self.broker.place_order(request.clone()).await {
                Ok(ack) => return Ok(ack.id),
                Err(EngineError::BrokerTransient(msg)) => {
                    if attempt >= RETRY_DELAYS.len() {
                        return Err(EngineError::BrokerTransient(msg));
                    }
                    log::warn!("broker transient error placing {}: {msg}, retrying", request.symbol);
                    tokio::time::sleep(RETRY_DELAYS[attempt]).await;
                    attempt += 1;
                }
                Err(other) => return Err(other),
            }
        }
    }

    async fn wait_for_terminal(&self, order_id: &str) -> Result<crate::broker::types::OrderStatus, EngineError> {
        let deadline = tokio::time::Instant::now() + self.fill_timeout;
        loop {
            let status = self.broker.poll_order(order_id).await?;
            match status.state {
                OrderState::Filled | OrderState::Rejected | OrderState::Canceled => return Ok(status),
                OrderState::New | OrderState::Partial => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(EngineError::BrokerTransient(format!(
                            "order {order_id} did not reach a terminal state within the fill timeout"
                        )));
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }

    /// Places one market or limit order for a single-leg signal, waits for
    /// a terminal fill, and on success writes the Trade and an OPEN Position.
    pub async fn place_single(&self, signal: &Signal, approval: &RiskApproval) -> Result<Trade, EngineError> {
        if !approval.approved {
            return Err(EngineError::RiskDenied(approval.reason.clone()));
        }

        let side = match signal.action {
            Action::Buy => OrderSide::Buy,
            Action::Sell => OrderSide::Sell,
            _ => return Err(EngineError::invariant("place_single requires a Buy or Sell signal")),
        };

        let request = OrderRequest {
            symbol: signal.symbol.clone(),
            side,
            quantity: approval.sized_quantity,
            kind: OrderKind::Limit,
            limit_price: Some(round_to_nickel(signal.entry_price)),
        };

        let order_id = self.place_with_retry(request).await?;
        let status = self.wait_for_terminal(&order_id).await?;

        if status.state != OrderState::Filled {
            return Err(EngineError::BrokerRejected(format!(
                "{}: order {order_id} ended in state {:?}",
                signal.symbol, status.state
            )));
        }

        let fill_price = status.fill_price.unwrap_or(signal.entry_price);
        let commission_due = commission(approval.sized_quantity, 1);
        let slippage = Trade::slippage_from(signal.entry_price, fill_price, approval.sized_quantity);

        let trade_id = self
            .store
            .append_trade(Trade {
                id: 0,
                ts: Utc::now(),
                symbol: signal.symbol.clone(),
                strategy: signal.strategy,
                action: signal.action,
                position_id: None,
                requested_price: signal.entry_price,
                filled_price: fill_price,
                quantity: approval.sized_quantity,
                commission: commission_due,
                slippage,
                pnl: Decimal::ZERO,
                reasoning: signal.reasoning.clone(),
            })
            .await?;

        let position = Position {
            id: 0,
            representative_symbol: signal.symbol.clone(),
            strategy: signal.strategy,
            position_type: if side == OrderSide::Buy { PositionType::Long } else { PositionType::Short },
            quantity: approval.sized_quantity,
            entry_price: fill_price,
            current_price: fill_price,
            unrealized_pnl: Decimal::ZERO,
            opened_at: Utc::now(),
            closed_at: None,
            status: PositionStatus::Open,
            exit_reason: None,
            legs: vec![],
            net_credit: None,
            spread_width: None,
            max_loss: None,
            entry_trade_id: Some(trade_id),
            exit_trade_id: None,
        };
        self.store.insert_position(position).await?;

        Ok(Trade {
            id: trade_id,
            ts: Utc::now(),
            symbol: signal.symbol.clone(),
            strategy: signal.strategy,
            action: signal.action,
            position_id: None,
            requested_price: signal.entry_price,
            filled_price: fill_price,
            quantity: approval.sized_quantity,
            commission: commission_due,
            slippage,
            pnl: Decimal::ZERO,
            reasoning: signal.reasoning.clone(),
        })
    }

    /// Submits the iron condor's four legs sequentially in the canonical
    /// [short_call, long_call, short_put, long_put] order. Any leg that
    /// fails to fill within the per-leg timeout triggers an unwind of
    /// whatever already filled, recorded as a single FAILED Trade with no
    /// Position.
    pub async fn place_iron_condor(
        &self,
        setup: &IronCondorSetup,
        approval: &RiskApproval,
    ) -> Result<Trade, EngineError> {
        if !approval.approved {
            return Err(EngineError::RiskDenied(approval.reason.clone()));
        }

        let plan = [
            (setup.short_call.symbol.clone(), OrderSide::Sell, setup.short_call.mid()),
            (setup.long_call.symbol.clone(), OrderSide::Buy, setup.long_call.mid()),
            (setup.short_put.symbol.clone(), OrderSide::Sell, setup.short_put.mid()),
            (setup.long_put.symbol.clone(), OrderSide::Buy, setup.long_put.mid()),
        ];

        let mut filled: Vec<FilledLeg> = Vec::with_capacity(4);
        let mut failure: Option<EngineError> = None;

        for (symbol, side, expected_price) in plan.iter() {
            let request = OrderRequest {
                symbol: symbol.clone(),
                side: *side,
                quantity: approval.sized_quantity,
                kind: OrderKind::Limit,
                limit_price: Some(round_to_nickel(*expected_price)),
            };

            let outcome = async {
                let order_id = self.place_with_retry(request).await?;
                self.wait_for_terminal(&order_id).await
            }
            .await;

            match outcome {
                Ok(status) if status.state == OrderState::Filled => {
                    filled.push(FilledLeg {
                        symbol: symbol.clone(),
                        side: *side,
                        quantity: approval.sized_quantity,
                        expected_price: *expected_price,
                        fill_price: status.fill_price.unwrap_or(*expected_price),
                    });
                }
                Ok(status) => {
                    failure = Some(EngineError::BrokerRejected(format!(
                        "{symbol}: leg ended in state {:?}",
                        status.state
                    )));
                    break;
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if let Some(err) = failure {
            return self.unwind(setup, approval.sized_quantity, filled, err).await;
        }

        self.finalize_iron_condor(setup, approval.sized_quantity, filled).await
    }

    /// Reverses every already-filled leg with an opposite-side market
    /// order and records the combined attempt as one FAILED Trade. Slippage
    /// is attributed per leg rather than netted against the intended
    /// credit, since unwind fills happen at whatever price the market
    /// offers at that instant, independent of the original quote.
    async fn unwind(
        &self,
        setup: &IronCondorSetup,
        quantity: u32,
        filled: Vec<FilledLeg>,
        cause: EngineError,
    ) -> Result<Trade, EngineError> {
        log::warn!("iron condor {} unwinding {} filled leg(s): {cause}", setup.underlying, filled.len());

        let mut total_slippage = Decimal::ZERO;
        for leg in &filled {
            let opposite = match leg.side {
                OrderSide::Buy => OrderSide::Sell,
                OrderSide::Sell => OrderSide::Buy,
            };
            let request = OrderRequest {
                symbol: leg.symbol.clone(),
                side: opposite,
                quantity: leg.quantity,
                kind: OrderKind::Market,
                limit_price: None,
            };
            match self.place_with_retry(request).await {
                Ok(order_id) => {
                    let _ = self.wait_for_terminal(&order_id).await;
                }
                Err(e) => log::error!("failed to unwind leg {}: {e}", leg.symbol),
            }
            total_slippage += Trade::slippage_from(leg.expected_price, leg.fill_price, leg.quantity);
        }

        let commission_due = commission(quantity, (filled.len() as u32) * 2);
        let trade_id = self
            .store
            .append_trade(Trade {
                id: 0,
                ts: Utc::now(),
                symbol: format!("iron_condor_{}", setup.underlying),
                strategy: Strategy::IronCondor,
                action: Action::OpenSpread,
                position_id: None,
                requested_price: setup.net_credit,
                filled_price: Decimal::ZERO,
                quantity,
                commission: commission_due,
                slippage: total_slippage,
                pnl: Decimal::ZERO,
                reasoning: format!("unwound after {cause}"),
            })
            .await?;

        Ok(Trade {
            id: trade_id,
            ts: Utc::now(),
            symbol: format!("iron_condor_{}", setup.underlying),
            strategy: Strategy::IronCondor,
            action: Action::OpenSpread,
            position_id: None,
            requested_price: setup.net_credit,
            filled_price: Decimal::ZERO,
            quantity,
            commission: commission_due,
            slippage: total_slippage,
            pnl: Decimal::ZERO,
            reasoning: format!("unwound after {cause}"),
        })
    }

    async fn finalize_iron_condor(
        &self,
        setup: &IronCondorSetup,
        quantity: u32,
        filled: Vec<FilledLeg>,
    ) -> Result<Trade, EngineError> {
        let commission_due = commission(quantity, 4);
        let slippage: Decimal = filled
            .iter()
            .map(|l| Trade::slippage_from(l.expected_price, l.fill_price, l.quantity))
            .sum();

        let legs: Vec<Leg> = filled
            .iter()
            .zip([Right::Call, Right::Call, Right::Put, Right::Put])
            .zip([setup.short_call.strike, setup.long_call.strike, setup.short_put.strike, setup.long_put.strike])
            .map(|((leg, right), strike)| Leg {
                symbol: leg.symbol.clone(),
                side: if leg.side == OrderSide::Sell { LegSide::Sell } else { LegSide::Buy },
                right,
                strike,
                quantity: leg.quantity,
                entry_price: leg.fill_price,
            })
            .collect();

        let symbol = format!("iron_condor_{}", setup.underlying);
        let trade_id = self
            .store
            .append_trade(Trade {
                id: 0,
                ts: Utc::now(),
                symbol: symbol.clone(),
                strategy: Strategy::IronCondor,
                action: Action::OpenSpread,
                position_id: None,
                requested_price: setup.net_credit,
                filled_price: setup.net_credit,
                quantity,
                commission: commission_due,
                slippage,
                pnl: Decimal::ZERO,
                reasoning: format!("condor {} opened, 4/4 legs filled", setup.underlying),
            })
            .await?;

        let position = Position {
            id: 0,
            representative_symbol: symbol.clone(),
            strategy: Strategy::IronCondor,
            position_type: PositionType::Spread,
            quantity,
            entry_price: setup.net_credit,
            current_price: setup.net_credit,
            unrealized_pnl: Decimal::ZERO,
            opened_at: Utc::now(),
            closed_at: None,
            status: PositionStatus::Open,
            exit_reason: None,
            legs,
            net_credit: Some(setup.net_credit),
            spread_width: Some(setup.spread_width),
            max_loss: Some(setup.max_loss),
            entry_trade_id: Some(trade_id),
            exit_trade_id: None,
        };
        self.store.insert_position(position).await?;

        Ok(Trade {
            id: trade_id,
            ts: Utc::now(),
            symbol,
            strategy: Strategy::IronCondor,
            action: Action::OpenSpread,
            position_id: None,
            requested_price: setup.net_credit,
            filled_price: setup.net_credit,
            quantity,
            commission: commission_due,
            slippage,
            pnl: Decimal::ZERO,
            reasoning: "condor opened, 4/4 legs filled".to_string(),
        })
    }

    /// Closes every leg of `position` with opposite-side orders, computes
    /// realized P&L, and updates Portfolio counters atomically via the
    /// store. On any leg failure the position stays OPEN for the next
    /// monitor cycle to retry.
    pub async fn close_position(&self, position: &Position, reason: ExitReason) -> Result<Trade, EngineError> {
        let legs_to_close: Vec<(String, OrderSide, u32)> = if position.legs.is_empty() {
            let side = if position.position_type == PositionType::Long { OrderSide::Sell } else { OrderSide::Buy };
            vec![(position.representative_symbol.clone(), side, position.quantity)]
        } else {
            position
                .legs
                .iter()
                .map(|leg| {
                    let opposite = if leg.side == LegSide::Buy { OrderSide::Sell } else { OrderSide::Buy };
                    (leg.symbol.clone(), opposite, leg.quantity)
                })
                .collect()
        };

        let mut fill_prices = Vec::with_capacity(legs_to_close.len());
        for (symbol, side, quantity) in &legs_to_close {
            let request =
                OrderRequest { symbol: symbol.clone(), side: *side, quantity: *quantity, kind: OrderKind::Market, limit_price: None };
            let order_id = self.place_with_retry(request).await?;
            let status = self.wait_for_terminal(&order_id).await?;
            if status.state != OrderState::Filled {
                return Err(EngineError::BrokerRejected(format!(
                    "{symbol}: close order ended in state {:?}",
                    status.state
                )));
            }
            fill_prices.push(status.fill_price.unwrap_or(position.current_price));
        }

        // For a spread, exit value is the signed net cost to close the
        // combo, not an average: buying back a short leg costs its fill
        // price, selling off a long leg returns its fill price.
        let exit_value: Decimal = if position.position_type == PositionType::Spread {
            position
                .legs
                .iter()
                .zip(fill_prices.iter())
                .map(|(leg, price)| if leg.side == LegSide::Sell { *price } else { -*price })
                .sum()
        } else {
            fill_prices.iter().copied().sum::<Decimal>() / Decimal::from(fill_prices.len().max(1))
        };
        let realized_pnl = match position.position_type {
            PositionType::Long => {
                (exit_value - position.entry_price) * dec!(100) * Decimal::from(position.quantity)
            }
            PositionType::Short => {
                (position.entry_price - exit_value) * dec!(100) * Decimal::from(position.quantity)
            }
            PositionType::Spread => {
                let credit = position.net_credit.unwrap_or(Decimal::ZERO);
                (credit - exit_value) * dec!(100) * Decimal::from(position.quantity)
            }
        };

        let commission_due = commission(position.quantity, legs_to_close.len() as u32);
        let exit_trade_id = self
            .store
            .append_trade(Trade {
                id: 0,
                ts: Utc::now(),
                symbol: position.representative_symbol.clone(),
                strategy: position.strategy,
                action: Action::Close,
                position_id: Some(position.id),
                requested_price: position.current_price,
                filled_price: exit_value,
                quantity: position.quantity,
                commission: commission_due,
                slippage: Decimal::ZERO,
                pnl: realized_pnl - commission_due,
                reasoning: format!("{reason:?}"),
            })
            .await?;

        self.store.close_position(position.id, Utc::now(), reason, exit_trade_id).await?;
        self.store.record_close_outcome(realized_pnl - commission_due).await?;

        Ok(Trade {
            id: exit_trade_id,
            ts: Utc::now(),
            symbol: position.representative_symbol.clone(),
            strategy: position.strategy,
            action: Action::Close,
            position_id: Some(position.id),
            requested_price: position.current_price,
            filled_price: exit_value,
            quantity: position.quantity,
            commission: commission_due,
            slippage: Decimal::ZERO,
            pnl: realized_pnl - commission_due,
            reasoning: format!("{reason:?}"),
        })
    }

    /// Closes `close_quantity` contracts of a single-leg position, leaving
    /// the rest OPEN. Used for momentum scalping's T1 half-close. A
    /// `close_quantity` at or above the position's full size delegates to
    /// `close_position` instead of leaving a zero-size OPEN position.
    pub async fn close_partial(
        &self,
        position: &Position,
        close_quantity: u32,
        reason: ExitReason,
    ) -> Result<Trade, EngineError> {
        if close_quantity >= position.quantity {
            return self.close_position(position, reason).await;
        }

        let side = if position.position_type == PositionType::Long { OrderSide::Sell } else { OrderSide::Buy };
        let request = OrderRequest {
            symbol: position.representative_symbol.clone(),
            side,
            quantity: close_quantity,
            kind: OrderKind::Market,
            limit_price: None,
        };
        let order_id = self.place_with_retry(request).await?;
        let status = self.wait_for_terminal(&order_id).await?;
        if status.state != OrderState::Filled {
            return Err(EngineError::BrokerRejected(format!(
                "{}: partial close ended in state {:?}",
                position.representative_symbol, status.state
            )));
        }
        let fill_price = status.fill_price.unwrap_or(position.current_price);

        let realized_pnl = match position.position_type {
            PositionType::Long => (fill_price - position.entry_price) * dec!(100) * Decimal::from(close_quantity),
            _ => (position.entry_price - fill_price) * dec!(100) * Decimal::from(close_quantity),
        };
        let commission_due = commission(close_quantity, 1);

        let trade_id = self
            .store
            .append_trade(Trade {
                id: 0,
                ts: Utc::now(),
                symbol: position.representative_symbol.clone(),
                strategy: position.strategy,
                action: Action::Close,
                position_id: Some(position.id),
                requested_price: position.current_price,
                filled_price: fill_price,
                quantity: close_quantity,
                commission: commission_due,
                slippage: Decimal::ZERO,
                pnl: realized_pnl - commission_due,
                reasoning: format!("{reason:?} (partial)"),
            })
            .await?;

        self.store.reduce_position_quantity(position.id, position.quantity - close_quantity).await?;
        self.store.record_close_outcome(realized_pnl - commission_due).await?;

        Ok(Trade {
            id: trade_id,
            ts: Utc::now(),
            symbol: position.representative_symbol.clone(),
            strategy: position.strategy,
            action: Action::Close,
            position_id: Some(position.id),
            requested_price: position.current_price,
            filled_price: fill_price,
            quantity: close_quantity,
            commission: commission_due,
            slippage: Decimal::ZERO,
            pnl: realized_pnl - commission_due,
            reasoning: format!("{reason:?} (partial)"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::mock::{MockBroker, ScriptedFill};
    use crate::domain::portfolio::Portfolio;
    use crate::domain::tick::OptionTick;
    use crate::store::memory::MemoryStore;
    use chrono::NaiveDate;

    fn portfolio() -> Portfolio {
        Portfolio {
            balance: dec!(100000),
            daily_pnl: dec!(0),
            daily_start_balance: dec!(100000),
            consecutive_losses: 0,
            active_positions: 0,
            win_rate: 0.5,
            net_delta: 0.0,
            net_theta: 0.0,
            is_paper: true,
        }
    }

    fn tick(symbol: &str, right: Right, strike: Decimal, delta: f64) -> OptionTick {
        OptionTick::new(
            symbol, "SPY", dec!(450), strike,
            NaiveDate::from_ymd_opt(2026, 1, 17).unwrap(), right,
            dec!(1.0), dec!(1.1), 0.3, delta, 0.01, -0.05, 0.1, Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn place_single_fills_and_opens_position() {
        let broker = MockBroker::new(true, dec!(100000));
        let store = MemoryStore::new(portfolio());
        let executor = Executor::new(broker, store);

        let signal = Signal::new(
            "SPY   260117C00450000", Strategy::IvMeanReversion, Action::Sell,
            dec!(4.50), dec!(9.00), dec!(2.25), "iv rank 0.75", 0.5, Utc::now(),
        )
        .unwrap();
        let approval = RiskApproval {
            approved: true,
            sized_quantity: 4,
            risk_per_contract: dec!(450),
            total_risk: dec!(1800),
            max_loss: dec!(1800),
            reason: "approved".to_string(),
        };

        let trade = executor.place_single(&signal, &approval).await.unwrap();
        assert_eq!(trade.quantity, 4);
        assert_eq!(trade.commission, dec!(2.60));

        let open = executor.store.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].position_type, PositionType::Short);
        assert_eq!(open[0].quantity, 4);
    }

    #[tokio::test]
    async fn place_single_denies_on_unapproved_risk() {
        let broker = MockBroker::new(true, dec!(100000));
        let store = MemoryStore::new(portfolio());
        let executor = Executor::new(broker, store);

        let signal = Signal::new(
            "SPY   260117C00450000", Strategy::IvMeanReversion, Action::Buy,
            dec!(4.50), dec!(2.25), dec!(9.00), "iv rank 0.2", 0.5, Utc::now(),
        )
        .unwrap();
        let result = executor.place_single(&signal, &RiskApproval::denied("daily loss limit")).await;
        assert!(matches!(result, Err(EngineError::RiskDenied(_))));
    }

    fn condor_setup() -> IronCondorSetup {
        IronCondorSetup {
            underlying: "SPY".to_string(),
            expiration: NaiveDate::from_ymd_opt(2026, 1, 17).unwrap(),
            short_call: tick("SPY   260117C00455000", Right::Call, dec!(455), 0.15),
            long_call: tick("SPY   260117C00460000", Right::Call, dec!(460), 0.05),
            short_put: tick("SPY   260117P00445000", Right::Put, dec!(445), -0.15),
            long_put: tick("SPY   260117P00440000", Right::Put, dec!(440), -0.05),
            net_credit: dec!(1.10),
            max_loss: dec!(3.90),
            spread_width: dec!(5),
        }
    }

    fn approved(quantity: u32, risk_per_contract: Decimal) -> RiskApproval {
        RiskApproval {
            approved: true,
            sized_quantity: quantity,
            risk_per_contract,
            total_risk: risk_per_contract * Decimal::from(quantity),
            max_loss: risk_per_contract * Decimal::from(quantity),
            reason: "approved".to_string(),
        }
    }

    #[tokio::test]
    async fn place_iron_condor_on_full_fill_opens_spread_position() {
        let broker = MockBroker::new(true, dec!(100000));
        let store = MemoryStore::new(portfolio());
        let executor = Executor::new(broker, store);
        let setup = condor_setup();

        let trade = executor.place_iron_condor(&setup, &approved(2, dec!(390))).await.unwrap();
        assert_eq!(trade.quantity, 2);
        assert_eq!(trade.commission, dec!(5.20));

        let open = executor.store.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].position_type, PositionType::Spread);
        assert_eq!(open[0].legs.len(), 4);
        assert_eq!(open[0].net_credit, Some(dec!(1.10)));
    }

    #[tokio::test]
    async fn close_position_on_spread_nets_legs_by_side_not_average() {
        let broker = MockBroker::new(true, dec!(100000));
        broker.script_fill("SC", ScriptedFill::Fill(dec!(0.50)));
        broker.script_fill("LC", ScriptedFill::Fill(dec!(0.10)));
        broker.script_fill("SP", ScriptedFill::Fill(dec!(0.40)));
        broker.script_fill("LP", ScriptedFill::Fill(dec!(0.10)));

        let store = MemoryStore::new(portfolio());
        let legs = vec![
            Leg { symbol: "SC".into(), side: LegSide::Sell, right: Right::Call, strike: dec!(455), quantity: 1, entry_price: dec!(0.30) },
            Leg { symbol: "LC".into(), side: LegSide::Buy, right: Right::Call, strike: dec!(460), quantity: 1, entry_price: dec!(0.10) },
            Leg { symbol: "SP".into(), side: LegSide::Sell, right: Right::Put, strike: dec!(445), quantity: 1, entry_price: dec!(0.30) },
            Leg { symbol: "LP".into(), side: LegSide::Buy, right: Right::Put, strike: dec!(440), quantity: 1, entry_price: dec!(0.10) },
        ];
        let position = Position {
            id: 0,
            representative_symbol: "SPY condor".into(),
            strategy: Strategy::IronCondor,
            position_type: PositionType::Spread,
            quantity: 1,
            entry_price: dec!(1.50),
            current_price: dec!(1.50),
            unrealized_pnl: dec!(0),
            opened_at: Utc::now(),
            closed_at: None,
            status: PositionStatus::Open,
            exit_reason: None,
            legs,
            net_credit: Some(dec!(1.50)),
            spread_width: Some(dec!(5)),
            max_loss: Some(dec!(350)),
            entry_trade_id: Some(1),
            exit_trade_id: None,
        };
        let id = store.insert_position(position).await.unwrap();
        let position = store.get_position(id).await.unwrap();
        let executor = Executor::new(broker, store);

        let trade = executor.close_position(&position, ExitReason::ProfitTarget).await.unwrap();

        // (0.50 - 0.10) + (0.40 - 0.10) = 0.70 net; realized = (1.50 - 0.70) * 100 = 80.
        assert_eq!(trade.filled_price, dec!(0.70));
        assert_eq!(trade.pnl, dec!(77.40));
    }

    #[tokio::test]
    async fn partial_fill_on_third_leg_unwinds_and_writes_failed_trade_only() {
        let broker = MockBroker::new(true, dec!(100000));
        let setup = condor_setup();
        broker.script_fill(&setup.short_put.symbol, ScriptedFill::Reject);

        let store = MemoryStore::new(portfolio());
        let executor = Executor::new(broker, store);

        let trade = executor.place_iron_condor(&setup, &approved(1, dec!(390))).await.unwrap();
        assert_eq!(trade.position_id, None);
        assert!(trade.commission > Decimal::ZERO);

        let open = executor.store.open_positions().await.unwrap();
        assert!(open.is_empty());

        // two legs filled, the rejected third leg, plus two unwind orders
        assert_eq!(executor.broker.placed.lock().unwrap().len(), 5);
    }
}
