// Risk gate: hardcoded circuit breakers plus half-Kelly-with-cap
// sizing. Pure decision function over (Signal, Portfolio); total, no
// side effects, no external configuration of the thresholds below.

use crate::domain::portfolio::{Portfolio, RiskApproval};
use crate::domain::signal::{Action, Signal};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const MAX_PER_TRADE_RISK_PCT: Decimal = dec!(0.02);
const DAILY_LOSS_LIMIT_PCT: Decimal = dec!(-0.03);
const MAX_CONSECUTIVE_LOSSES: u8 = 3;
const CONTRACT_MULTIPLIER: Decimal = dec!(100);
/// Iron condor wing width is fixed at 5, so a spread's max loss per unit
/// can be recovered from the signal's net credit alone without
/// re-deriving the originating IronCondorSetup.
const CONDOR_WING_WIDTH: Decimal = dec!(5);

/// Evaluates every breaker in priority order and returns the first-failing
/// reason. `None` means all breakers passed.
fn first_tripped_breaker(portfolio: &Portfolio) -> Option<&'static str> {
    if !portfolio.is_paper {
        return Some("paper-trading marker missing");
    }
    if portfolio.daily_pnl_pct() <= DAILY_LOSS_LIMIT_PCT {
        return Some("daily loss limit");
    }
    if portfolio.consecutive_losses >= MAX_CONSECUTIVE_LOSSES {
        return Some("consecutive loss limit");
    }
    None
}

fn risk_per_contract(signal: &Signal) -> Decimal {
    match signal.action {
        Action::Buy => CONTRACT_MULTIPLIER * (signal.entry_price - signal.stop_loss),
        Action::Sell => CONTRACT_MULTIPLIER * (signal.stop_loss - signal.entry_price),
        // entry_price is the net credit; max loss per unit is wing width
        // minus credit received.
        Action::OpenSpread => CONTRACT_MULTIPLIER * (CONDOR_WING_WIDTH - signal.entry_price),
        Action::Close => Decimal::ZERO,
    }
}

pub fn approve(signal: &Signal, portfolio: &Portfolio) -> RiskApproval {
    if let Some(reason) = first_tripped_breaker(portfolio) {
        return RiskApproval::denied(reason);
    }

    let risk_per_contract = risk_per_contract(signal);
    if risk_per_contract <= Decimal::ZERO {
        return RiskApproval::denied("non-positive risk per contract");
    }

    let max_risk = MAX_PER_TRADE_RISK_PCT * portfolio.balance;
    if risk_per_contract > max_risk {
        return RiskApproval::denied("position too large");
    }

    let quantity_units = (max_risk / risk_per_contract).trunc();
    let quantity: u32 = quantity_units.to_u32().unwrap_or(0).max(1);
    let total_risk = risk_per_contract * Decimal::from(quantity);

    RiskApproval {
        approved: true,
        sized_quantity: quantity,
        risk_per_contract,
        total_risk,
        max_loss: total_risk,
        reason: "approved".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::Strategy;
    use chrono::Utc;

    fn portfolio(balance: Decimal, daily_pnl: Decimal, consecutive_losses: u8) -> Portfolio {
        Portfolio {
            balance,
            daily_pnl,
            daily_start_balance: balance - daily_pnl,
            consecutive_losses,
            active_positions: 0,
            win_rate: 0.5,
            net_delta: 0.0,
            net_theta: 0.0,
            is_paper: true,
        }
    }

    #[test]
    fn literal_scenario_iv_sell_sizing() {
        let signal = Signal::new(
            "SPY", Strategy::IvMeanReversion, Action::Sell,
            dec!(4.50), dec!(9.00), dec!(2.25), "iv rank 0.75", 0.5, Utc::now(),
        ).unwrap();
        let portfolio = portfolio(dec!(100000), dec!(0), 0);

        let approval = approve(&signal, &portfolio);
        assert!(approval.approved);
        assert_eq!(approval.risk_per_contract, dec!(450));
        assert_eq!(approval.sized_quantity, 4);
        assert_eq!(approval.max_loss, dec!(1800));
    }

    #[test]
    fn literal_scenario_daily_loss_breaker() {
        let signal = Signal::new(
            "SPY", Strategy::IvMeanReversion, Action::Sell,
            dec!(4.50), dec!(9.00), dec!(2.25), "iv rank 0.75", 0.5, Utc::now(),
        ).unwrap();
        let portfolio = portfolio(dec!(100000), dec!(-3100), 0);

        let approval = approve(&signal, &portfolio);
        assert!(!approval.approved);
        assert_eq!(approval.sized_quantity, 0);
        assert_eq!(approval.reason, "daily loss limit");
    }

    #[test]
    fn consecutive_losses_halt_entries() {
        let signal = Signal::new(
            "SPY", Strategy::IvMeanReversion, Action::Buy,
            dec!(4.50), dec!(2.25), dec!(9.00), "iv rank 0.20", 0.5, Utc::now(),
        ).unwrap();
        let portfolio = portfolio(dec!(100000), dec!(0), 3);

        let approval = approve(&signal, &portfolio);
        assert!(!approval.approved);
        assert_eq!(approval.reason, "consecutive loss limit");
    }

    #[test]
    fn non_paper_portfolio_is_always_denied() {
        let signal = Signal::new(
            "SPY", Strategy::IvMeanReversion, Action::Buy,
            dec!(4.50), dec!(2.25), dec!(9.00), "iv rank 0.20", 0.5, Utc::now(),
        ).unwrap();
        let mut portfolio = portfolio(dec!(100000), dec!(0), 0);
        portfolio.is_paper = false;

        let approval = approve(&signal, &portfolio);
        assert!(!approval.approved);
        assert_eq!(approval.reason, "paper-trading marker missing");
    }

    #[test]
    fn oversized_risk_per_contract_is_denied() {
        let signal = Signal::new(
            "SPY", Strategy::IvMeanReversion, Action::Buy,
            dec!(100.0), dec!(1.0), dec!(500.0), "deep otm", 0.5, Utc::now(),
        ).unwrap();
        let portfolio = portfolio(dec!(1000), dec!(0), 0);

        let approval = approve(&signal, &portfolio);
        assert!(!approval.approved);
        assert_eq!(approval.reason, "position too large");
    }

    #[test]
    fn literal_scenario_iron_condor_sizing() {
        let signal = Signal::new(
            "iron_condor_SPY", Strategy::IronCondor, Action::OpenSpread,
            dec!(1.10), dec!(2.20), dec!(0.55), "condor credit 1.10", 0.5, Utc::now(),
        ).unwrap();
        let portfolio = portfolio(dec!(100000), dec!(0), 0);

        let approval = approve(&signal, &portfolio);
        assert!(approval.approved);
        assert_eq!(approval.risk_per_contract, dec!(390));
    }

    #[test]
    fn approval_is_idempotent_on_identical_inputs() {
        let signal = Signal::new(
            "SPY", Strategy::IvMeanReversion, Action::Sell,
            dec!(4.50), dec!(9.00), dec!(2.25), "iv rank 0.75", 0.5, Utc::now(),
        ).unwrap();
        let portfolio = portfolio(dec!(100000), dec!(0), 0);

        let a1 = approve(&signal, &portfolio);
        let a2 = approve(&signal, &portfolio);
        assert_eq!(a1.sized_quantity, a2.sized_quantity);
        assert_eq!(a1.max_loss, a2.max_loss);
    }
}
