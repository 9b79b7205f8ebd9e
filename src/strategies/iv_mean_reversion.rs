// IV mean reversion signal generator: sells overpriced premium when
// IV rank is high, buys underpriced premium when IV rank is low.

use crate::domain::signal::{Action, Signal, Strategy};
use crate::domain::tick::OptionTick;
use crate::error::as_precondition;
use crate::numerics::iv_rank::percentile_rank;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const MIN_DTE: i64 = 30;
const MAX_DTE: i64 = 45;
const SELL_THRESHOLD: f64 = 0.70;
const BUY_THRESHOLD: f64 = 0.30;

/// `now` is the current exchange-local time, used only to compute DTE
/// against `tick.expiration` — never read from a global clock.
pub fn generate(tick: &OptionTick, iv_history: &[f64], now: DateTime<Utc>) -> Option<Signal> {
    let dte = (tick.expiration - now.date_naive()).num_days();
    if !(MIN_DTE..=MAX_DTE).contains(&dte) {
        return None;
    }

    let rank = match percentile_rank(&tick.symbol, tick.iv, iv_history) {
        Ok(rank) => rank,
        Err(err) => {
            if let Some(reason) = as_precondition(Strategy::IvMeanReversion, &err) {
                log::debug!("{reason}");
            }
            return None;
        }
    };

    let entry = tick.mid();
    let (action, take_profit, stop_loss) = if rank >= SELL_THRESHOLD {
        (Action::Sell, entry * dec!(0.5), entry * dec!(2.0))
    } else if rank <= BUY_THRESHOLD {
        (Action::Buy, entry * dec!(2.0), entry * dec!(0.5))
    } else {
        return None;
    };

    let confidence = (rank - 0.5).abs() * 2.0;
    let reasoning = format!(
        "iv_rank={rank:.2} crossed {} threshold at DTE={dte}",
        if action == Action::Sell { "sell (>=0.70)" } else { "buy (<=0.30)" }
    );

    Signal::new(
        tick.symbol.clone(),
        Strategy::IvMeanReversion,
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
