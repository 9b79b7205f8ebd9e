// Trade signals emitted by the strategy generators.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    IvMeanReversion,
    IronCondor,
    MomentumScalping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Buy,
    Sell,
    OpenSpread,
    Close,
}

#[derive(Debug, Clone)]
pub struct Signal {
    pub symbol: String,
    pub strategy: Strategy,
    pub action: Action,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub reasoning: String,
    pub confidence: f64,
    pub ts: DateTime<Utc>,
}

impl Signal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        strategy: Strategy,
        action: Action,
        entry_price: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        reasoning: impl Into<String>,
        confidence: f64,
        ts: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        let signal = Self {
            symbol: symbol.into(),
            strategy,
            action,
            entry_price,
            stop_loss,
            take_profit,
            reasoning: reasoning.into(),
            confidence,
            ts,
        };
        signal.validate()?;
        Ok(signal)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(EngineError::InputError(format!(
                "{}: confidence {} not in [0, 1]",
                self.symbol, self.confidence
            )));
        }
        match self.action {
            Action::Buy => {
                if !(self.stop_loss < self.entry_price && self.entry_price < self.take_profit) {
                    return Err(EngineError::InputError(format!(
                        "{}: BUY requires stop_loss < entry_price < take_profit",
                        self.symbol
                    )));
                }
            }
            Action::Sell => {
                if !(self.take_profit < self.entry_price && self.entry_price < self.stop_loss) {
                    return Err(EngineError::InputError(format!(
                        "{}: SELL requires take_profit < entry_price < stop_loss",
                        self.symbol
                    )));
                }
            }
            Action::OpenSpread => {
                if self.entry_price <= Decimal::ZERO {
                    return Err(EngineError::InputError(format!(
                        "{}: OPEN_SPREAD requires a positive net credit",
                        self.symbol
                    )));
                }
            }
            Action::Close => {}
        }
        Ok(())
    }
}
