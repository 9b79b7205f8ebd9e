// Portfolio snapshot and the outcome of a risk-gate evaluation.

use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct Portfolio {
    pub balance: Decimal,
    pub daily_pnl: Decimal,
    pub daily_start_balance: Decimal,
    pub consecutive_losses: u8,
    pub active_positions: u32,
    pub win_rate: f64,
    pub net_delta: f64,
    pub net_theta: f64,
    pub is_paper: bool,
}

impl Portfolio {
    pub fn daily_pnl_pct(&self) -> Decimal {
        if self.daily_start_balance.is_zero() {
            return Decimal::ZERO;
        }
        self.daily_pnl / self.daily_start_balance
    }
}

#[derive(Debug, Clone)]
pub struct RiskApproval {
    pub approved: bool,
    pub sized_quantity: u32,
    pub risk_per_contract: Decimal,
    pub total_risk: Decimal,
    pub max_loss: Decimal,
    pub reason: String,
}

impl RiskApproval {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            sized_quantity: 0,
            risk_per_contract: Decimal::ZERO,
            total_risk: Decimal::ZERO,
            max_loss: Decimal::ZERO,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn daily_pnl_pct_divides_by_start_balance() {
        let p = Portfolio {
            balance: dec!(97000),
            daily_pnl: dec!(-3000),
            daily_start_balance: dec!(100000),
            consecutive_losses: 1,
            active_positions: 2,
            win_rate: 0.5,
            net_delta: 0.0,
            net_theta: 0.0,
            is_paper: true,
        };
        assert_eq!(p.daily_pnl_pct(), dec!(-0.03));
    }

    #[test]
    fn denied_approval_has_zero_sizing() {
        let a = RiskApproval::denied("daily loss breaker tripped");
        assert!(!a.approved);
        assert_eq!(a.sized_quantity, 0);
    }
}
