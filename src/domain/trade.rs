// Filled trade record: one entry or exit leg group, with commission and
// slippage tracked separately from realized P&L.

use crate::domain::signal::{Action, Strategy};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const COMMISSION_PER_CONTRACT_PER_LEG: Decimal = dec!(0.65);

pub fn commission(quantity: u32, legs: u32) -> Decimal {
    COMMISSION_PER_CONTRACT_PER_LEG * Decimal::from(quantity) * Decimal::from(legs)
}

#[derive(Debug, Clone)]
pub struct Trade {
    pub id: u64,
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub strategy: Strategy,
    pub action: Action,
    pub position_id: Option<u64>,
    pub requested_price: Decimal,
    pub filled_price: Decimal,
    pub quantity: u32,
    pub commission: Decimal,
    pub slippage: Decimal,
    pub pnl: Decimal,
    pub reasoning: String,
}

impl Trade {
    pub fn slippage_from(requested_price: Decimal, filled_price: Decimal, quantity: u32) -> Decimal {
        (filled_price - requested_price).abs() * Decimal::from(quantity) * Decimal::from(100u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commission_scales_with_contracts_and_legs() {
        assert_eq!(commission(4, 1), dec!(2.60));
        assert_eq!(commission(2, 4), dec!(5.20));
    }

    #[test]
    fn slippage_is_absolute_per_contract_difference_in_dollars() {
        let slip = Trade::slippage_from(dec!(1.30), dec!(1.35), 4);
        assert_eq!(slip, dec!(20.00));
    }
}
