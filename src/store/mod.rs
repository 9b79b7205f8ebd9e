// Persistence adapter: a narrow interface over the data store,
// shared-read by strategy generators and the monitor, appended-only for ticks, and the sole place
// portfolio counters are mutated atomically.

pub mod memory;
pub mod sqlite;

use crate::domain::portfolio::Portfolio;
use crate::domain::position::{ExitReason, Position};
use crate::domain::tick::OptionTick;
use crate::domain::trade::Trade;
use crate::error::EngineError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

#[allow(async_fn_in_trait)]
pub trait Store {
    fn append_tick(&self, tick: &OptionTick) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;
    fn last_n_ticks(&self, symbol: &str, n: usize) -> impl std::future::Future<Output = Result<Vec<OptionTick>, EngineError>> + Send;
    fn daily_ivs(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> impl std::future::Future<Output = Result<Vec<f64>, EngineError>> + Send;

    fn append_trade(&self, trade: Trade) -> impl std::future::Future<Output = Result<u64, EngineError>> + Send;

    fn insert_position(&self, position: Position) -> impl std::future::Future<Output = Result<u64, EngineError>> + Send;
    fn update_position_mark(
        &self,
        id: u64,
        current_price: Decimal,
        unrealized_pnl: Decimal,
    ) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;
    /// Sets `status`, `closed_at`, `exit_reason` in a single atomic write.
    fn close_position(
        &self,
        id: u64,
        at: DateTime<Utc>,
        reason: ExitReason,
        exit_trade_id: u64,
    ) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;
    fn open_positions(&self) -> impl std::future::Future<Output = Result<Vec<Position>, EngineError>> + Send;
    fn get_position(&self, id: u64) -> impl std::future::Future<Output = Result<Position, EngineError>> + Send;
    /// Shrinks an OPEN position's quantity in place, for momentum scalping's
    /// T1 half-close. The position stays OPEN; a full close still goes
    /// through `close_position`.
    fn reduce_position_quantity(&self, id: u64, new_quantity: u32) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;

    fn read_portfolio(&self) -> impl std::future::Future<Output = Result<Portfolio, EngineError>> + Send;
    /// Updates `consecutive_losses` and `daily_pnl` in one atomic write so
    /// concurrent risk-gate reads never see a mixed pre/post-close state.
    fn record_close_outcome(&self, realized_pnl: Decimal) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;
}
