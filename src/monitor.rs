// Position monitor: a fixed 60-second cooperative loop that marks
// every open position, applies the strategy-specific exit rules, and
// drives closing execution. No-overlap and cooperative shutdown are
// handled with a watch channel rather than abort handles, so a cycle
// already in flight always finishes cleanly.

use crate::domain::position::{ExitReason, Position, PositionStatus, PositionType};
use crate::domain::signal::Strategy;
use crate::error::EngineError;
use crate::executor::Executor;
use crate::broker::Broker;
use crate::store::Store;
use crate::symbol::OccSymbol;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const TICK_PERIOD: Duration = Duration::from_secs(60);
const IV_PROFIT_PCT: Decimal = dec!(0.50);
const IV_STOP_PCT: Decimal = dec!(-0.75);
const IV_TIME_DECAY_DTE: i64 = 21;
const CONDOR_PROFIT_PCT: Decimal = dec!(0.50);
const CONDOR_STOP_MULTIPLE: Decimal = dec!(2.0);
const CONDOR_BREACH_PCT: Decimal = dec!(0.02);
const MOMENTUM_T1: Decimal = dec!(1.25);
const MOMENTUM_T2: Decimal = dec!(1.5);
const MOMENTUM_STOP: Decimal = dec!(0.5);

fn condor_time_decay(now: DateTime<Tz>) -> bool {
    now.time() >= NaiveTime::from_hms_opt(15, 50, 0).unwrap()
}

fn momentum_force_close(now: DateTime<Tz>) -> bool {
    now.time() >= NaiveTime::from_hms_opt(11, 30, 0).unwrap()
}

fn momentum_backstop(now: DateTime<Tz>) -> bool {
    now.time() >= NaiveTime::from_hms_opt(15, 50, 0).unwrap()
}

enum ExitDecision {
    None,
    Full(ExitReason),
    PartialThenHold { close_quantity: u32, reason: ExitReason },
}

fn evaluate_iv_mean_reversion(position: &Position, now: DateTime<Utc>) -> ExitDecision {
    let notional = position.entry_price * dec!(100) * Decimal::from(position.quantity);
    if notional.is_zero() {
        return ExitDecision::None;
    }
    let pnl_pct = position.unrealized_pnl / notional;

    if pnl_pct >= IV_PROFIT_PCT {
        return ExitDecision::Full(ExitReason::ProfitTarget);
    }
    if pnl_pct <= IV_STOP_PCT {
        return ExitDecision::Full(ExitReason::StopLoss);
    }
    if let Ok(decoded) = OccSymbol::decode(&position.representative_symbol) {
        let dte = (decoded.expiration - now.date_naive()).num_days();
        if dte <= IV_TIME_DECAY_DTE {
            return ExitDecision::Full(ExitReason::TimeDecay);
        }
    }
    ExitDecision::None
}

fn evaluate_iron_condor(position: &Position, current_spread_value: Decimal, underlying_price: Decimal, now: DateTime<Tz>) -> ExitDecision {
    let net_credit = position.net_credit.unwrap_or(Decimal::ZERO);
    let profit_floor = CONDOR_PROFIT_PCT * net_credit * dec!(100) * Decimal::from(position.quantity);

    if position.unrealized_pnl >= profit_floor {
        return ExitDecision::Full(ExitReason::ProfitTarget);
    }
    if current_spread_value >= CONDOR_STOP_MULTIPLE * net_credit {
        return ExitDecision::Full(ExitReason::StopLoss);
    }
    if condor_time_decay(now) {
        return ExitDecision::Full(ExitReason::TimeDecay);
    }
    if let (Some(short_call), Some(short_put)) = (position.legs.first(), position.legs.get(2)) {
        let call_buffer = (short_call.strike - underlying_price).abs() / short_call.strike;
        let put_buffer = (underlying_price - short_put.strike).abs() / short_put.strike;
        if call_buffer <= CONDOR_BREACH_PCT || put_buffer <= CONDOR_BREACH_PCT {
            return ExitDecision::Full(ExitReason::Breach);
        }
    }
    ExitDecision::None
}

/// Momentum T1/T2/stop are derived from `position.entry_price` directly
/// (not carried over from the originating Signal) since Position has no
/// take-profit/stop-loss fields of its own. The Long/Short multiplier
/// mapping mirrors the swap already made in the signal generator so a
/// short (premium-sold) leg's "profit" direction is falling price, not
/// rising price.
fn evaluate_momentum(position: &Position, mid: Decimal, now: DateTime<Tz>) -> ExitDecision {
    if momentum_backstop(now) || momentum_force_close(now) {
        return ExitDecision::Full(ExitReason::ForceClose);
    }

    let entry = position.entry_price;
    let (t1, t2, stop) = match position.position_type {
        PositionType::Long => (entry * MOMENTUM_T1, entry * MOMENTUM_T2, entry * MOMENTUM_STOP),
        _ => (entry / MOMENTUM_T1, entry / MOMENTUM_T2, entry * (Decimal::ONE + (Decimal::ONE - MOMENTUM_STOP))),
    };

    let hit_t2 = match position.position_type {
        PositionType::Long => mid >= t2,
        _ => mid <= t2,
    };
    let hit_stop = match position.position_type {
        PositionType::Long => mid <= stop,
        _ => mid >= stop,
    };
    let hit_t1 = match position.position_type {
        PositionType::Long => mid >= t1,
        _ => mid <= t1,
    };

    if hit_t2 {
        return ExitDecision::Full(ExitReason::ProfitTarget);
    }
    if hit_stop {
        return ExitDecision::Full(ExitReason::StopLoss);
    }
    if hit_t1 && position.quantity > 1 {
        return ExitDecision::PartialThenHold { close_quantity: position.quantity / 2, reason: ExitReason::ProfitTarget };
    }
    if hit_t1 {
        return ExitDecision::Full(ExitReason::ProfitTarget);
    }
    ExitDecision::None
}

pub struct Monitor<B: Broker, S: Store> {
    executor: Arc<Executor<B, S>>,
    exchange_tz: Tz,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<B: Broker, S: Store> Monitor<B, S> {
    pub fn new(executor: Arc<Executor<B, S>>, exchange_tz: Tz) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self { executor, exchange_tz, running: AtomicBool::new(false), shutdown_tx, shutdown_rx }
    }

    /// Cooperative shutdown: the current cycle finishes, no new cycle starts.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut interval = tokio::time::interval(TICK_PERIOD);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if self.running.swap(true, Ordering::SeqCst) {
                        log::warn!("monitor cycle skipped: previous cycle still running");
                        continue;
                    }
                    if let Err(err) = self.run_cycle().await {
                        log::error!("monitor cycle failed: {err}");
                    }
                    self.running.store(false, Ordering::SeqCst);
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    pub async fn run_cycle(&self) -> Result<(), EngineError> {
        let mut positions = self.executor.store.open_positions().await?;
        positions.sort_by_key(|p| p.id);

        for position in positions {
            if let Err(err) = self.evaluate_one(&position).await {
                log::warn!("skipping position {}: {err}", position.id);
            }
        }
        Ok(())
    }

    async fn evaluate_one(&self, position: &Position) -> Result<(), EngineError> {
        let now_utc = Utc::now();
        let now_local = now_utc.with_timezone(&self.exchange_tz);

        let decision = match position.strategy {
            Strategy::IvMeanReversion => {
                let mid = self.executor.broker.get_quote(&position.representative_symbol).await?.mid();
                self.mark(position, mid).await?;
                evaluate_iv_mean_reversion(position, now_utc)
            }
            Strategy::IronCondor => {
                let short_call = self.executor.broker.get_quote(&position.legs[0].symbol).await?;
                let long_call = self.executor.broker.get_quote(&position.legs[1].symbol).await?;
                let short_put = self.executor.broker.get_quote(&position.legs[2].symbol).await?;
                let long_put = self.executor.broker.get_quote(&position.legs[3].symbol).await?;
                let current_spread_value =
                    (short_call.mid() - long_call.mid()) + (short_put.mid() - long_put.mid());
                let net_credit = position.net_credit.unwrap_or(Decimal::ZERO);
                let commission_due =
                    crate::domain::trade::commission(position.quantity, position.legs.len().max(1) as u32);
                let unrealized =
                    (net_credit - current_spread_value) * dec!(100) * Decimal::from(position.quantity) - commission_due;
                self.mark_value(position, current_spread_value, unrealized).await?;
                evaluate_iron_condor(position, current_spread_value, short_call.underlying_price, now_local)
            }
            Strategy::MomentumScalping => {
                let mid = self.executor.broker.get_quote(&position.representative_symbol).await?.mid();
                self.mark(position, mid).await?;
                evaluate_momentum(position, mid, now_local)
            }
        };

        match decision {
            ExitDecision::None => Ok(()),
            ExitDecision::Full(reason) => {
                self.executor.close_position(position, reason).await?;
                Ok(())
            }
            ExitDecision::PartialThenHold { close_quantity, reason } => {
                self.executor.close_partial(position, close_quantity, reason).await?;
                Ok(())
            }
        }
    }

    async fn mark(&self, position: &Position, mid: Decimal) -> Result<(), EngineError> {
        let commission_due = crate::domain::trade::commission(position.quantity, position.legs.len().max(1) as u32);
        let unrealized = match position.position_type {
            PositionType::Long => {
                (mid - position.entry_price) * dec!(100) * Decimal::from(position.quantity) - commission_due
            }
            _ => (position.entry_price - mid) * dec!(100) * Decimal::from(position.quantity) - commission_due,
        };
        self.executor.store.update_position_mark(position.id, mid, unrealized).await
    }

    async fn mark_value(&self, position: &Position, current_value: Decimal, unrealized: Decimal) -> Result<(), EngineError> {
        self.executor.store.update_position_mark(position.id, current_value, unrealized).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::mock::MockBroker;
    use crate::domain::portfolio::Portfolio;
    use crate::domain::position::{Leg, LegSide};
    use crate::domain::tick::OptionTick;
    use crate::store::memory::MemoryStore;
    use crate::symbol::Right;
    use chrono::{NaiveDate, TimeZone};

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

    fn quote(symbol: &str, bid: Decimal, ask: Decimal) -> OptionTick {
        OptionTick::new(
            symbol, "SPY", dec!(450), dec!(450),
            NaiveDate::from_ymd_opt(2026, 1, 17).unwrap(), Right::Call,
            bid, ask, 0.3, 0.5, 0.01, -0.05, 0.1, Utc::now(),
        )
        .unwrap()
    }

    fn long_position(entry: Decimal) -> Position {
        Position {
            id: 1,
            representative_symbol: "SPY   260117C00450000".into(),
            strategy: Strategy::IvMeanReversion,
            position_type: PositionType::Long,
            quantity: 2,
            entry_price: entry,
            current_price: entry,
            unrealized_pnl: dec!(0),
            opened_at: Utc::now(),
            closed_at: None,
            status: PositionStatus::Open,
            exit_reason: None,
            legs: vec![],
            net_credit: None,
            spread_width: None,
            max_loss: None,
            entry_trade_id: Some(1),
            exit_trade_id: None,
        }
    }

    #[test]
    fn iv_mean_reversion_hits_profit_target() {
        let mut p = long_position(dec!(5.0));
        p.unrealized_pnl = dec!(500); // +50% of entry notional (5*100*2=1000)
        let decision = evaluate_iv_mean_reversion(&p, Utc::now());
        assert!(matches!(decision, ExitDecision::Full(ExitReason::ProfitTarget)));
    }

    #[test]
    fn iv_mean_reversion_hits_stop_loss() {
        let mut p = long_position(dec!(5.0));
        p.unrealized_pnl = dec!(-800); // beyond -75% of 1000
        let decision = evaluate_iv_mean_reversion(&p, Utc::now());
        assert!(matches!(decision, ExitDecision::Full(ExitReason::StopLoss)));
    }

    #[test]
    fn iron_condor_hits_literal_profit_target_scenario() {
        let mut p = long_position(dec!(1.5));
        p.strategy = Strategy::IronCondor;
        p.net_credit = Some(dec!(1.50));
        p.quantity = 1;
        p.unrealized_pnl = dec!(80);
        let tz: Tz = chrono_tz::America::New_York;
        let now = tz.with_ymd_and_hms(2026, 1, 17, 10, 0, 0).unwrap();
        let decision = evaluate_iron_condor(&p, dec!(0.70), dec!(450), now);
        assert!(matches!(decision, ExitDecision::Full(ExitReason::ProfitTarget)));
    }

    #[test]
    fn iron_condor_breach_triggers_close() {
        let mut p = long_position(dec!(1.10));
        p.strategy = Strategy::IronCondor;
        p.net_credit = Some(dec!(1.10));
        p.legs = vec![
            Leg { symbol: "A".into(), side: LegSide::Sell, right: Right::Call, strike: dec!(455), quantity: 1, entry_price: dec!(0.8) },
            Leg { symbol: "B".into(), side: LegSide::Buy, right: Right::Call, strike: dec!(460), quantity: 1, entry_price: dec!(0.25) },
            Leg { symbol: "C".into(), side: LegSide::Sell, right: Right::Put, strike: dec!(445), quantity: 1, entry_price: dec!(0.8) },
            Leg { symbol: "D".into(), side: LegSide::Buy, right: Right::Put, strike: dec!(440), quantity: 1, entry_price: dec!(0.25) },
        ];
        let tz: Tz = chrono_tz::America::New_York;
        let now = tz.with_ymd_and_hms(2026, 1, 17, 10, 0, 0).unwrap();
        // underlying at 454, within 2% of the 455 short call strike
        let decision = evaluate_iron_condor(&p, dec!(0.90), dec!(454), now);
        assert!(matches!(decision, ExitDecision::Full(ExitReason::Breach)));
    }

    #[test]
    fn momentum_t1_triggers_half_close_when_multiple_contracts_open() {
        let mut p = long_position(dec!(2.0));
        p.strategy = Strategy::MomentumScalping;
        p.quantity = 4;
        let tz: Tz = chrono_tz::America::New_York;
        let now = tz.with_ymd_and_hms(2026, 1, 17, 10, 0, 0).unwrap();
        let decision = evaluate_momentum(&p, dec!(2.6), now); // 1.3x entry, past T1=1.25x but below T2=1.5x
        match decision {
            ExitDecision::PartialThenHold { close_quantity, reason } => {
                assert_eq!(close_quantity, 2);
                assert_eq!(reason, ExitReason::ProfitTarget);
            }
            _ => panic!("expected a partial close"),
        }
    }

    #[test]
    fn momentum_short_t1_triggers_half_close_when_multiple_contracts_open() {
        let mut p = long_position(dec!(2.0));
        p.position_type = PositionType::Short;
        p.strategy = Strategy::MomentumScalping;
        p.quantity = 4;
        let tz: Tz = chrono_tz::America::New_York;
        let now = tz.with_ymd_and_hms(2026, 1, 17, 10, 0, 0).unwrap();
        // entry/1.25 = 1.6 (T1), entry/1.5 ~= 1.333 (T2): 1.5 is past T1, short of T2.
        let decision = evaluate_momentum(&p, dec!(1.5), now);
        match decision {
            ExitDecision::PartialThenHold { close_quantity, reason } => {
                assert_eq!(close_quantity, 2);
                assert_eq!(reason, ExitReason::ProfitTarget);
            }
            _ => panic!("expected a partial close"),
        }
    }

    #[test]
    fn momentum_short_hits_profit_target_and_stop_loss() {
        let mut p = long_position(dec!(2.0));
        p.position_type = PositionType::Short;
        p.strategy = Strategy::MomentumScalping;
        let tz: Tz = chrono_tz::America::New_York;
        let now = tz.with_ymd_and_hms(2026, 1, 17, 10, 0, 0).unwrap();

        let profit = evaluate_momentum(&p, dec!(1.3), now); // below T2 = entry/1.5
        assert!(matches!(profit, ExitDecision::Full(ExitReason::ProfitTarget)));

        let stopped = evaluate_momentum(&p, dec!(3.1), now); // above stop = entry*1.5
        assert!(matches!(stopped, ExitDecision::Full(ExitReason::StopLoss)));
    }

    #[test]
    fn momentum_force_closes_at_eleven_thirty() {
        let p = long_position(dec!(2.0));
        let tz: Tz = chrono_tz::America::New_York;
        let now = tz.with_ymd_and_hms(2026, 1, 17, 11, 30, 0).unwrap();
        let decision = evaluate_momentum(&p, dec!(2.0), now);
        assert!(matches!(decision, ExitDecision::Full(ExitReason::ForceClose)));
    }

    #[tokio::test]
    async fn run_cycle_marks_and_closes_profitable_position() {
        let broker = MockBroker::new(true, dec!(100000));
        broker.set_quote(quote("SPY   260117C00450000", dec!(7.5), dec!(7.6)));
        let store = MemoryStore::new(portfolio());
        let mut position = long_position(dec!(5.0));
        position.id = 0;
        let id = store.insert_position(position).await.unwrap();

        let executor = Arc::new(Executor::new(broker, store));
        let monitor = Monitor::new(executor.clone(), chrono_tz::America::New_York);
        monitor.run_cycle().await.unwrap();

        let positions = executor.store.open_positions().await.unwrap();
        assert!(positions.iter().all(|p| p.id != id));
    }
}
