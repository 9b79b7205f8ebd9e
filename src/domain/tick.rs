// OptionTick: an immutable snapshot quote for one option contract (§3).

use crate::error::EngineError;
use crate::symbol::Right;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub struct OptionTick {
    pub symbol: String,
    pub underlying: String,
    pub underlying_price: Decimal,
    pub strike: Decimal,
    pub expiration: NaiveDate,
    pub right: Right,
    pub bid: Decimal,
    pub ask: Decimal,
    pub iv: f64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub timestamp: DateTime<Utc>,
}

impl OptionTick {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        underlying: impl Into<String>,
        underlying_price: Decimal,
        strike: Decimal,
        expiration: NaiveDate,
        right: Right,
        bid: Decimal,
        ask: Decimal,
        iv: f64,
        delta: f64,
        gamma: f64,
        theta: f64,
        vega: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        let tick = Self {
            symbol: symbol.into(),
            underlying: underlying.into(),
            underlying_price,
            strike,
            expiration,
            right,
            bid,
            ask,
            iv,
            delta,
            gamma,
            theta,
            vega,
            timestamp,
        };
        tick.validate()?;
        Ok(tick)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.bid > self.ask {
            return Err(EngineError::InputError(format!(
                "{}: bid {} > ask {}",
                self.symbol, self.bid, self.ask
            )));
        }
        if !(self.iv > 0.0 && self.iv <= 5.0) {
            return Err(EngineError::InputError(format!(
                "{}: iv {} out of range (0, 5]",
                self.symbol, self.iv
            )));
        }
        if self.delta.abs() > 1.0 {
            return Err(EngineError::InputError(format!(
                "{}: |delta| {} > 1",
                self.symbol, self.delta
            )));
        }
        match self.right {
            Right::Call if self.delta < 0.0 => {
                return Err(EngineError::InputError(format!(
                    "{}: call with negative delta {}",
                    self.symbol, self.delta
                )))
            }
            Right::Put if self.delta > 0.0 => {
                return Err(EngineError::InputError(format!(
                    "{}: put with positive delta {}",
                    self.symbol, self.delta
                )))
            }
            _ => {}
        }
        Ok(())
    }

    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}
