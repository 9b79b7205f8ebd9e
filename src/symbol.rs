// OCC-21 option symbol codec.
//
// Format: `UUUUUU YYMMDD C|P SSSSSSSS` (21 characters, no literal spaces in
// the wire form — the underlying field is itself space-padded).
// `UUUUUU` — underlying, 1-6 chars, left-padded to 6 with spaces.
// `YYMMDD` — expiry date.
// `C|P`    — right.
// `SSSSSSSS` — strike in tenths of a cent (strike_dollars * 1000), 8 digits.

use crate::error::EngineError;
use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

const UNDERLYING_WIDTH: usize = 6;
const SYMBOL_LEN: usize = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Right {
    Call,
    Put,
}

impl Right {
    pub fn code(self) -> char {
        match self {
            Right::Call => 'C',
            Right::Put => 'P',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccSymbol {
    pub underlying: String,
    pub expiration: NaiveDate,
    pub right: Right,
    pub strike: Decimal,
}

impl OccSymbol {
    pub fn new(underlying: impl Into<String>, expiration: NaiveDate, right: Right, strike: Decimal) -> Self {
        Self {
            underlying: underlying.into(),
            expiration,
            right,
            strike,
        }
    }

    /// Emit the 21-character wire form. Fails on an underlying that is
    /// empty, too long, non-alphanumeric, or a strike that cannot be
    /// represented in 8 digits of tenths-of-a-cent.
    pub fn encode(&self) -> Result<String, EngineError> {
        if self.underlying.is_empty() || self.underlying.len() > UNDERLYING_WIDTH {
            return Err(EngineError::InputError(format!(
                "underlying must be 1-{UNDERLYING_WIDTH} chars, got {:?}",
                self.underlying
            )));
        }
        if !self.underlying.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(EngineError::InputError(format!(
                "underlying {:?} contains non-alphanumeric characters",
                self.underlying
            )));
        }

        let padded = format!("{:>width$}", self.underlying, width = UNDERLYING_WIDTH);
        let expiry = self.expiration.format("%y%m%d").to_string();

        let tenths_of_cent = (self.strike * Decimal::from(1000))
            .round()
            .to_i64()
            .ok_or_else(|| EngineError::InputError(format!("strike {} is out of range", self.strike)))?;
        if !(0..=99_999_999).contains(&tenths_of_cent) {
            return Err(EngineError::InputError(format!(
                "strike {} does not fit in 8 OCC digits",
                self.strike
            )));
        }

        Ok(format!("{padded}{expiry}{}{tenths_of_cent:08}", self.right.code()))
    }

    /// Parse a 21-character wire form back into its parts.
    pub fn decode(symbol: &str) -> Result<Self, EngineError> {
        let chars: Vec<char> = symbol.chars().collect();
        if chars.len() != SYMBOL_LEN {
            return Err(EngineError::InputError(format!(
                "OCC-21 symbol must be exactly {SYMBOL_LEN} chars, got {} ({symbol:?})",
                chars.len()
            )));
        }

        let underlying_field: String = chars[0..6].iter().collect();
        let underlying = underlying_field.trim_start().to_string();
        if underlying.is_empty() {
            return Err(EngineError::InputError("underlying field is blank".into()));
        }
        if !underlying.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(EngineError::InputError(format!(
                "underlying field {underlying_field:?} contains non-alphanumeric characters"
            )));
        }

        let expiry_field: String = chars[6..12].iter().collect();
        let expiration = NaiveDate::parse_from_str(&expiry_field, "%y%m%d")
            .map_err(|e| EngineError::InputError(format!("bad expiry {expiry_field:?}: {e}")))?;

        let right = match chars[12] {
            'C' => Right::Call,
            'P' => Right::Put,
            other => return Err(EngineError::InputError(format!("bad right code {other:?}"))),
        };

        let strike_field: String = chars[13..21].iter().collect();
        if !strike_field.chars().all(|c| c.is_ascii_digit()) {
            return Err(EngineError::InputError(format!("bad strike digits {strike_field:?}")));
        }
        let tenths_of_cent: i64 = strike_field
            .parse()
            .map_err(|_| EngineError::InputError(format!("strike field {strike_field:?} overflowed")))?;
        let strike = Decimal::from(tenths_of_cent) / Decimal::from(1000);

        Ok(OccSymbol {
            underlying,
            expiration,
            right,
            strike,
        })
    }
}
