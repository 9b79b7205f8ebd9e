// In-memory store used by tests and by `trade-oracle-paper --store memory`
// for local dry runs. Not durable across restarts.

use super::Store;
use crate::domain::portfolio::Portfolio;
use crate::domain::position::{ExitReason, Position, PositionStatus};
use crate::domain::tick::OptionTick;
use crate::domain::trade::Trade;
use crate::error::EngineError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub struct MemoryStore {
    ticks: Mutex<Vec<OptionTick>>,
    daily_ivs: Mutex<HashMap<String, Vec<(NaiveDate, f64)>>>,
    trades: Mutex<Vec<Trade>>,
    positions: Mutex<HashMap<u64, Position>>,
    portfolio: Mutex<Portfolio>,
    next_trade_id: AtomicU64,
    next_position_id: AtomicU64,
}

impl MemoryStore {
    pub fn new(portfolio: Portfolio) -> Self {
        Self {
            ticks: Mutex::new(Vec::new()),
            daily_ivs: Mutex::new(HashMap::new()),
            trades: Mutex::new(Vec::new()),
            positions: Mutex::new(HashMap::new()),
            portfolio: Mutex::new(portfolio),
            next_trade_id: AtomicU64::new(1),
            next_position_id: AtomicU64::new(1),
        }
    }

    pub fn seed_daily_iv(&self, symbol: &str, date: NaiveDate, iv: f64) {
        self.daily_ivs.lock().unwrap().entry(symbol.to_string()).or_default().push((date, iv));
    }
}

impl Store for MemoryStore {
    async fn append_tick(&self, tick: &OptionTick) -> Result<(), EngineError> {
        self.ticks.lock().unwrap().push(tick.clone());
        Ok(())
    }

    async fn last_n_ticks(&self, symbol: &str, n: usize) -> Result<Vec<OptionTick>, EngineError> {
        let ticks = self.ticks.lock().unwrap();
        Ok(ticks.iter().rev().filter(|t| t.symbol == symbol).take(n).cloned().collect())
    }

    async fn daily_ivs(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<f64>, EngineError> {
        let ivs = self.daily_ivs.lock().unwrap();
        Ok(ivs
            .get(symbol)
            .map(|series| {
                series
                    .iter()
                    .filter(|(date, _)| *date >= start && *date <= end)
                    .map(|(_, iv)| *iv)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append_trade(&self, mut trade: Trade) -> Result<u64, EngineError> {
        let id = self.next_trade_id.fetch_add(1, Ordering::SeqCst);
        trade.id = id;
        self.trades.lock().unwrap().push(trade);
        Ok(id)
    }

    async fn insert_position(&self, mut position: Position) -> Result<u64, EngineError> {
        let id = self.next_position_id.fetch_add(1, Ordering::SeqCst);
        position.id = id;
        position.validate()?;
        self.positions.lock().unwrap().insert(id, position);
        Ok(id)
    }

    async fn update_position_mark(
        &self,
        id: u64,
        current_price: Decimal,
        unrealized_pnl: Decimal,
    ) -> Result<(), EngineError> {
        let mut positions = self.positions.lock().unwrap();
        let position = positions
            .get_mut(&id)
            .ok_or_else(|| EngineError::invariant(format!("unknown position {id}")))?;
        position.current_price = current_price;
        position.unrealized_pnl = unrealized_pnl;
        Ok(())
    }

    async fn close_position(
        &self,
        id: u64,
        at: DateTime<Utc>,
        reason: ExitReason,
        exit_trade_id: u64,
    ) -> Result<(), EngineError> {
        let mut positions = self.positions.lock().unwrap();
        let position = positions
            .get_mut(&id)
            .ok_or_else(|| EngineError::invariant(format!("unknown position {id}")))?;
        position.close(at, reason, exit_trade_id);
        position.validate()
    }

    async fn open_positions(&self) -> Result<Vec<Position>, EngineError> {
        let positions = self.positions.lock().unwrap();
        let mut open: Vec<Position> =
            positions.values().filter(|p| p.status == PositionStatus::Open).cloned().collect();
        open.sort_by_key(|p| p.id);
        Ok(open)
    }

    async fn get_position(&self, id: u64) -> Result<Position, EngineError> {
        self.positions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::invariant(format!("unknown position {id}")))
    }

    async fn reduce_position_quantity(&self, id: u64, new_quantity: u32) -> Result<(), EngineError> {
        let mut positions = self.positions.lock().unwrap();
        let position = positions
            .get_mut(&id)
            .ok_or_else(|| EngineError::invariant(format!("unknown position {id}")))?;
        position.quantity = new_quantity;
        for leg in &mut position.legs {
            leg.quantity = new_quantity;
        }
        Ok(())
    }

    async fn read_portfolio(&self) -> Result<Portfolio, EngineError> {
        Ok(self.portfolio.lock().unwrap().clone())
    }

    async fn record_close_outcome(&self, realized_pnl: Decimal) -> Result<(), EngineError> {
        let mut portfolio = self.portfolio.lock().unwrap();
        portfolio.daily_pnl += realized_pnl;
        portfolio.balance += realized_pnl;
        if realized_pnl < Decimal::ZERO {
            portfolio.consecutive_losses = (portfolio.consecutive_losses + 1).min(3);
        } else {
            portfolio.consecutive_losses = 0;
        }
        Ok(())
    }
}
