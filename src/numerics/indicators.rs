// Technical indicators on 1-minute bars.
//
// Each indicator is a restartable lazy sequence: it keeps only the state
// it needs to produce the next value (last EMA, Wilder gain/loss
// averages, cumulative VWAP numerator/denominator, a 20-bar ring buffer)
// and never buffers the whole history.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Exponential moving average, `alpha = 2 / (n + 1)`.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(n: usize) -> Self {
        Self { alpha: 2.0 / (n as f64 + 1.0), value: None }
    }

    pub fn update(&mut self, close: f64) -> f64 {
        let next = match self.value {
            None => close,
            Some(prev) => self.alpha * close + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// RSI(14) with Wilder smoothing. Returns `None` until the 14-bar warm-up
/// window has been consumed.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    prev_close: Option<f64>,
    avg_gain: f64,
    avg_loss: f64,
    seen: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self { period, prev_close: None, avg_gain: 0.0, avg_loss: 0.0, seen: 0 }
    }

    pub fn update(&mut self, close: f64) -> Option<f64> {
        let prev = match self.prev_close.replace(close) {
            Some(prev) => prev,
            None => return None,
        };

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        self.seen += 1;

        if self.seen <= self.period {
            self.avg_gain += gain / self.period as f64;
            self.avg_loss += loss / self.period as f64;
            if self.seen < self.period {
                return None;
            }
        } else {
            let n = self.period as f64;
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }

        if self.avg_loss.abs() < 1e-12 {
            return Some(100.0);
        }
        let rs = self.avg_gain / self.avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

/// Cumulative VWAP from session open, resetting when the exchange-local
/// calendar date rolls over.
#[derive(Debug, Clone, Default)]
pub struct SessionVwap {
    session_date: Option<NaiveDate>,
    cum_px_vol: f64,
    cum_vol: f64,
}

impl SessionVwap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bar: &Bar, exchange_tz: Tz) -> f64 {
        let local_date = bar.timestamp.with_timezone(&exchange_tz).date_naive();
        if self.session_date != Some(local_date) {
            self.session_date = Some(local_date);
            self.cum_px_vol = 0.0;
            self.cum_vol = 0.0;
        }

        let typical_price = (bar.high + bar.low + bar.close) / 3.0;
        self.cum_px_vol += typical_price * bar.volume;
        self.cum_vol += bar.volume;

        if self.cum_vol <= 0.0 {
            bar.close
        } else {
            self.cum_px_vol / self.cum_vol
        }
    }
}

/// Relative volume: current bar volume divided by the trailing 20-bar
/// mean volume (the current bar is not counted in its own mean).
#[derive(Debug, Clone)]
pub struct RelativeVolume {
    window: VecDeque<f64>,
    capacity: usize,
}

impl RelativeVolume {
    pub fn new() -> Self {
        Self { window: VecDeque::with_capacity(20), capacity: 20 }
    }

    /// Returns `None` until the trailing window has at least one sample.
    pub fn update(&mut self, current_volume: f64) -> Option<f64> {
        let ratio = if self.window.is_empty() {
            None
        } else {
            let mean: f64 = self.window.iter().sum::<f64>() / self.window.len() as f64;
            if mean <= 0.0 {
                None
            } else {
                Some(current_volume / mean)
            }
        };

        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(current_volume);
        ratio
    }
}
