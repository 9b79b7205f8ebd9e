// 0DTE iron condor signal generator: selects short strikes near
// +-0.15 delta, fixes a 5-wide wing, and requires >= 0.50 net credit.

use crate::domain::signal::{Action, Signal, Strategy};
use crate::domain::tick::OptionTick;
use crate::symbol::Right;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const SHORT_DELTA_TARGET: f64 = 0.15;
const SHORT_DELTA_TOLERANCE: f64 = 0.05;
const WING_WIDTH: Decimal = dec!(5);
const MIN_NET_CREDIT: Decimal = dec!(0.50);
const MIN_STRIKES_PER_SIDE: usize = 10;

#[derive(Debug, Clone)]
pub struct IronCondorSetup {
    pub underlying: String,
    pub expiration: NaiveDate,
    pub short_call: OptionTick,
    pub long_call: OptionTick,
    pub short_put: OptionTick,
    pub long_put: OptionTick,
    pub net_credit: Decimal,
    pub max_loss: Decimal,
    pub spread_width: Decimal,
}

fn in_entry_window(now: DateTime<Tz>, override_window: bool) -> bool {
    if override_window {
        return true;
    }
    let t = now.time();
    t >= NaiveTime::from_hms_opt(9, 31, 0).unwrap() && t <= NaiveTime::from_hms_opt(9, 45, 0).unwrap()
}

fn closest_to_target(candidates: &[&OptionTick], target: f64) -> Option<OptionTick> {
    candidates
        .iter()
        .filter(|t| (t.delta.abs() - target).abs() <= SHORT_DELTA_TOLERANCE)
        .min_by(|a, b| {
            (a.delta.abs() - target)
                .abs()
                .partial_cmp(&(b.delta.abs() - target).abs())
                .unwrap()
        })
        .map(|&t| t.clone())
}

fn find_by_strike(chain: &[OptionTick], right: Right, strike: Decimal) -> Option<OptionTick> {
    chain
        .iter()
        .find(|t| t.right == right && t.strike == strike)
        .cloned()
}

/// `now` is the current exchange-local time; `override_window` lets tests
/// bypass the 09:31-09:45 gate deterministically.
pub fn build(
    underlying: &str,
    chain: &[OptionTick],
    now: DateTime<Tz>,
    override_window: bool,
) -> Option<IronCondorSetup> {
    if !in_entry_window(now, override_window) {
        return None;
    }

    let calls: Vec<&OptionTick> = chain.iter().filter(|t| t.right == Right::Call).collect();
    let puts: Vec<&OptionTick> = chain.iter().filter(|t| t.right == Right::Put).collect();
    if calls.len() < MIN_STRIKES_PER_SIDE || puts.len() < MIN_STRIKES_PER_SIDE {
        return None;
    }

    let short_call = closest_to_target(&calls, SHORT_DELTA_TARGET)?;
    let short_put = closest_to_target(&puts, SHORT_DELTA_TARGET)?;

    let long_call_strike = short_call.strike + WING_WIDTH;
    let long_put_strike = short_put.strike - WING_WIDTH;
    let long_call = find_by_strike(chain, Right::Call, long_call_strike)?;
    let long_put = find_by_strike(chain, Right::Put, long_put_strike)?;

    let net_credit =
        (short_call.mid() - long_call.mid()) + (short_put.mid() - long_put.mid());
    if net_credit < MIN_NET_CREDIT {
        return None;
    }

    let max_loss = WING_WIDTH - net_credit;

    Some(IronCondorSetup {
        underlying: underlying.to_string(),
        expiration: short_call.expiration,
        short_call,
        long_call,
        short_put,
        long_put,
        net_credit,
        max_loss,
        spread_width: WING_WIDTH,
    })
}

pub fn signal_from(setup: &IronCondorSetup, now: DateTime<Utc>) -> Option<Signal> {
    Signal::new(
        format!("iron_condor_{}", setup.underlying),
        Strategy::IronCondor,
        Action::OpenSpread,
        setup.net_credit,
        setup.net_credit * dec!(2.0),
        setup.net_credit * dec!(0.5),
        format!(
            "condor {} {}/{} call, {}/{} put, credit={}",
            setup.underlying,
            setup.short_call.strike,
            setup.long_call.strike,
            setup.short_put.strike,
            setup.long_put.strike,
            setup.net_credit
        ),
        0.5,
        now,
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn tick(right: Right, strike: Decimal, mid_bid: Decimal, mid_ask: Decimal, delta: f64) -> OptionTick {
        OptionTick::new(
            format!("SPY   260117{}{:08}", right.code(), 0),
            "SPY",
            dec!(450),
            strike,
            NaiveDate::from_ymd_opt(2026, 1, 17).unwrap(),
            right,
            mid_bid,
            mid_ask,
            0.3,
            delta,
            0.01,
            -0.05,
            0.1,
            Utc::now(),
        )
        .unwrap()
    }

    fn literal_chain() -> Vec<OptionTick> {
        let mut chain = vec![
            tick(Right::Call, dec!(455), dec!(0.75), dec!(0.85), 0.15),
            tick(Right::Call, dec!(460), dec!(0.20), dec!(0.30), 0.05),
            tick(Right::Put, dec!(445), dec!(0.75), dec!(0.85), -0.15),
            tick(Right::Put, dec!(440), dec!(0.20), dec!(0.30), -0.05),
        ];
        // pad out 10 strikes on each side so the breadth precondition holds
        for i in 0..10 {
            let strike = dec!(500) + Decimal::from(i);
            chain.push(tick(Right::Call, strike, dec!(0.01), dec!(0.02), 0.01));
            let pstrike = dec!(400) - Decimal::from(i);
            chain.push(tick(Right::Put, pstrike, dec!(0.01), dec!(0.02), -0.01));
        }
        chain
    }

    #[test]
    fn builds_literal_scenario_setup() {
        let tz: Tz = chrono_tz::America::New_York;
        let now = tz.with_ymd_and_hms(2026, 1, 17, 9, 35, 0).unwrap();
        let chain = literal_chain();

        let setup = build("SPY", &chain, now, false).expect("expected a condor setup");
        assert_eq!(setup.net_credit, dec!(1.10));
        assert_eq!(setup.max_loss, dec!(3.90));
        assert_eq!(setup.spread_width, dec!(5));

        let signal = signal_from(&setup, Utc::now()).unwrap();
        assert_eq!(signal.action, Action::OpenSpread);
        assert_eq!(signal.entry_price, dec!(1.10));
        assert_eq!(signal.take_profit, dec!(0.55));
        assert_eq!(signal.stop_loss, dec!(2.20));
    }

    #[test]
    fn no_signal_outside_entry_window() {
        let tz: Tz = chrono_tz::America::New_York;
        let now = tz.with_ymd_and_hms(2026, 1, 17, 10, 0, 0).unwrap();
        let chain = literal_chain();
        assert!(build("SPY", &chain, now, false).is_none());
    }

    #[test]
    fn override_flag_bypasses_entry_window() {
        let tz: Tz = chrono_tz::America::New_York;
        let now = tz.with_ymd_and_hms(2026, 1, 17, 13, 0, 0).unwrap();
        let chain = literal_chain();
        assert!(build("SPY", &chain, now, true).is_some());
    }

    #[test]
    fn no_signal_when_credit_below_floor() {
        let tz: Tz = chrono_tz::America::New_York;
        let now = tz.with_ymd_and_hms(2026, 1, 17, 9, 35, 0).unwrap();
        let mut chain = literal_chain();
        chain[0] = tick(Right::Call, dec!(455), dec!(0.10), dec!(0.20), 0.15);
        assert!(build("SPY", &chain, now, false).is_none());
    }
}
