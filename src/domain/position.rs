// Open/closed position records, including 4-leg iron condor spreads.

use crate::domain::signal::Strategy;
use crate::error::EngineError;
use crate::symbol::Right;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionType {
    Long,
    Short,
    Spread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    ProfitTarget,
    StopLoss,
    TimeDecay,
    Breach,
    ForceClose,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub symbol: String,
    pub side: LegSide,
    pub right: Right,
    pub strike: Decimal,
    pub quantity: u32,
    pub entry_price: Decimal,
}

/// Canonical leg order for a short iron condor, matching how the executor
/// places and the store persists the four legs: short call, long call,
/// short put, long put.
pub fn condor_leg_order(legs: &[Leg]) -> Result<(), EngineError> {
    let expect = [
        (LegSide::Sell, Right::Call),
        (LegSide::Buy, Right::Call),
        (LegSide::Sell, Right::Put),
        (LegSide::Buy, Right::Put),
    ];
    if legs.len() != 4 {
        return Err(EngineError::invariant(format!(
            "iron condor requires 4 legs, got {}",
            legs.len()
        )));
    }
    for (leg, (side, right)) in legs.iter().zip(expect.iter()) {
        if leg.side != *side || leg.right != *right {
            return Err(EngineError::invariant(
                "iron condor legs must be ordered [short call, long call, short put, long put]",
            ));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Position {
    pub id: u64,
    pub representative_symbol: String,
    pub strategy: Strategy,
    pub position_type: PositionType,
    pub quantity: u32,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub status: PositionStatus,
    pub exit_reason: Option<ExitReason>,
    pub legs: Vec<Leg>,
    pub net_credit: Option<Decimal>,
    pub spread_width: Option<Decimal>,
    pub max_loss: Option<Decimal>,
    pub entry_trade_id: Option<u64>,
    pub exit_trade_id: Option<u64>,
}

impl Position {
    pub fn validate(&self) -> Result<(), EngineError> {
        match self.status {
            PositionStatus::Open => {
                if self.closed_at.is_some() || self.exit_reason.is_some() {
                    return Err(EngineError::invariant(
                        "an OPEN position must not carry closed_at/exit_reason",
                    ));
                }
            }
            PositionStatus::Closed => {
                if self.closed_at.is_none() || self.exit_reason.is_none() {
                    return Err(EngineError::invariant(
                        "a CLOSED position requires both closed_at and exit_reason",
                    ));
                }
            }
        }

        if self.position_type == PositionType::Spread {
            condor_leg_order(&self.legs)?;
            let credit = self.net_credit.ok_or_else(|| {
                EngineError::invariant("spread position requires net_credit")
            })?;
            if credit <= Decimal::ZERO {
                return Err(EngineError::invariant("spread net_credit must be positive"));
            }
        } else if !self.legs.is_empty() {
            return Err(EngineError::invariant(
                "single-leg positions must not carry a legs vector",
            ));
        }

        Ok(())
    }

    pub fn close(&mut self, at: DateTime<Utc>, reason: ExitReason, exit_trade_id: u64) {
        self.status = PositionStatus::Closed;
        self.closed_at = Some(at);
        self.exit_reason = Some(reason);
        self.exit_trade_id = Some(exit_trade_id);
    }
}
