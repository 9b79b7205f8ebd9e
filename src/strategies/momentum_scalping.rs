// 0DTE momentum scalping signal generator: six simultaneous
// conditions on 1-minute bars gate entry into a same-day option purchase.

use crate::domain::signal::{Action, Signal, Strategy};
use crate::domain::tick::OptionTick;
use crate::numerics::indicators::{Bar, Ema, RelativeVolume, Rsi, SessionVwap};
use crate::symbol::Right;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use rust_decimal_macros::dec;

const MIN_BARS: usize = 30;
const RETURN_WINDOW: usize = 30;
const MIN_RELATIVE_VOLUME: f64 = 2.0;
const MIN_RETURN_EDGE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Bullish,
    Bearish,
}

struct SideCheck {
    passed: bool,
    relative_volume: f64,
}

fn ema_cross(bars: &[Bar], side: Side) -> bool {
    let mut fast = Ema::new(9);
    let mut slow = Ema::new(21);
    let mut prev_diff = None;
    let mut last_diff = 0.0;
    for bar in bars {
        let f = fast.update(bar.close);
        let s = slow.update(bar.close);
        prev_diff = Some(last_diff);
        last_diff = f - s;
    }
    match prev_diff {
        Some(prev) => match side {
            Side::Bullish => prev <= 0.0 && last_diff > 0.0,
            Side::Bearish => prev >= 0.0 && last_diff < 0.0,
        },
        None => false,
    }
}

fn rsi_cross(bars: &[Bar], side: Side) -> bool {
    let mut rsi = Rsi::new(14);
    let mut prev = None;
    let mut last = None;
    for bar in bars {
        prev = last;
        last = rsi.update(bar.close);
    }
    match (prev, last) {
        (Some(prev), Some(last)) => match side {
            Side::Bullish => prev < 30.0 && last >= 30.0,
            Side::Bearish => prev > 70.0 && last <= 70.0,
        },
        _ => false,
    }
}

fn last_relative_volume(bars: &[Bar]) -> Option<f64> {
    let mut rv = RelativeVolume::new();
    let mut last = None;
    for bar in bars {
        last = rv.update(bar.volume);
    }
    last
}

fn last_vwap_side(bars: &[Bar], exchange_tz: Tz, side: Side) -> bool {
    let mut vwap = SessionVwap::new();
    let mut last_close = 0.0;
    let mut last_vwap = 0.0;
    for bar in bars {
        last_vwap = vwap.update(bar, exchange_tz);
        last_close = bar.close;
    }
    match side {
        Side::Bullish => last_close > last_vwap,
        Side::Bearish => last_close < last_vwap,
    }
}

fn n_bar_return(bars: &[Bar], n: usize) -> Option<f64> {
    if bars.len() < n {
        return None;
    }
    let start = bars[bars.len() - n].close;
    let end = bars[bars.len() - 1].close;
    if start == 0.0 {
        return None;
    }
    Some((end - start) / start)
}

fn in_entry_window(now: DateTime<Tz>) -> bool {
    let t = now.time();
    t >= NaiveTime::from_hms_opt(9, 31, 0).unwrap() && t <= NaiveTime::from_hms_opt(11, 30, 0).unwrap()
}

fn evaluate_side(
    bars: &[Bar],
    benchmark_bars: &[Bar],
    exchange_tz: Tz,
    now: DateTime<Tz>,
    side: Side,
) -> Option<SideCheck> {
    if bars.len() < MIN_BARS || !in_entry_window(now) {
        return None;
    }

    let c1 = ema_cross(bars, side);
    let c2 = rsi_cross(bars, side);
    let relative_volume = last_relative_volume(bars)?;
    let c3 = relative_volume >= MIN_RELATIVE_VOLUME;
    let c4 = last_vwap_side(bars, exchange_tz, side);

    let underlying_return = n_bar_return(bars, RETURN_WINDOW)?;
    let benchmark_return = n_bar_return(benchmark_bars, RETURN_WINDOW)?;
    let c5 = match side {
        Side::Bullish => underlying_return - benchmark_return >= MIN_RETURN_EDGE,
        Side::Bearish => benchmark_return - underlying_return >= MIN_RETURN_EDGE,
    };

    Some(SideCheck {
        passed: c1 && c2 && c3 && c4 && c5,
        relative_volume,
    })
}

/// ATM-to-just-ITM option on the signal side, DTE = 0, tightest spread.
fn pick_option(chain: &[OptionTick], today: chrono::NaiveDate, side: Side) -> Option<&OptionTick> {
    let right = match side {
        Side::Bullish => Right::Call,
        Side::Bearish => Right::Put,
    };
    chain
        .iter()
        .filter(|t| t.right == right && t.expiration == today)
        .filter(|t| match side {
            Side::Bullish => (0.50..=0.70).contains(&t.delta),
            Side::Bearish => (-0.70..=-0.50).contains(&t.delta),
        })
        .min_by(|a, b| (a.ask - a.bid).partial_cmp(&(b.ask - b.bid)).unwrap())
}

fn build_signal(tick: &OptionTick, side: Side, relative_volume: f64, now: DateTime<Utc>) -> Option<Signal> {
    let (action, entry) = match side {
        Side::Bullish => (Action::Buy, tick.ask),
        Side::Bearish => (Action::Sell, tick.bid),
    };
    // T2/stop mirror the monitor's reciprocal mapping for a short
    // (premium-sold) leg: profit is the price falling to entry/1.5, stop
    // is the price rising to entry*1.5. The monitor derives T1 as
    // entry/1.25 itself; take_profit here is the T2 (full-close) level.
    let (take_profit, stop_loss) = match action {
        Action::Buy => (entry * dec!(1.5), entry * dec!(0.5)),
        _ => (entry / dec!(1.5), entry * dec!(1.5)),
    };
    let confidence = (relative_volume / 3.0).min(1.0);
    let (t1_mult, t2_mult) = match action {
        Action::Buy => ("1.25x", "1.5x"),
        _ => ("entry/1.25", "entry/1.5"),
    };
    let reasoning = format!(
        "momentum {:?}: ema9/21 cross, rsi14 cross, relvol={relative_volume:.2}, T1={t1_mult} T2={t2_mult}",
        side
    );

    Signal::new(
        tick.symbol.clone(),
        Strategy::MomentumScalping,
        action,
        entry,
        stop_loss,
        take_profit,
        reasoning,
        confidence,
        now,
    )
    .ok()
}

/// Returns at most one signal per call: the first side (bullish checked
/// before bearish) whose six conditions all pass.
pub fn generate(
    bars: &[Bar],
    benchmark_bars: &[Bar],
    chain: &[OptionTick],
    exchange_tz: Tz,
    now: DateTime<Tz>,
) -> Option<Signal> {
    for side in [Side::Bullish, Side::Bearish] {
        if let Some(check) = evaluate_side(bars, benchmark_bars, exchange_tz, now, side) {
            if check.passed {
                let today = now.date_naive();
                let option = pick_option(chain, today, side)?;
                return build_signal(option, side, check.relative_volume, now.with_timezone(&Utc));
            }
        }
    }
    None
}
