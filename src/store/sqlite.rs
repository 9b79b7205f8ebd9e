// SQLite-backed store. Money fields are stored as TEXT so round-tripping
// through SQLite's dynamic typing never loses fixed-point precision; see
// DESIGN.md for why this crate favors precision over query-side decimal
// predicates.

use super::Store;
use crate::domain::portfolio::Portfolio;
use crate::domain::position::{ExitReason, Leg, LegSide, Position, PositionStatus, PositionType};
use crate::domain::signal::{Action, Strategy};
use crate::domain::tick::OptionTick;
use crate::domain::trade::Trade;
use crate::error::EngineError;
use crate::symbol::Right;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

pub struct SqliteStore {
    pool: SqlitePool,
}

fn store_err(e: sqlx::Error) -> EngineError {
    EngineError::StoreUnavailable(e.to_string())
}

fn parse_decimal(s: &str) -> Result<Decimal, EngineError> {
    Decimal::from_str(s).map_err(|e| EngineError::invariant(format!("corrupt decimal {s:?}: {e}")))
}

fn right_code(right: Right) -> &'static str {
    match right {
        Right::Call => "call",
        Right::Put => "put",
    }
}

fn parse_right(s: &str) -> Result<Right, EngineError> {
    match s {
        "call" => Ok(Right::Call),
        "put" => Ok(Right::Put),
        other => Err(EngineError::invariant(format!("corrupt right code {other:?}"))),
    }
}

fn strategy_code(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::IvMeanReversion => "iv_mean_reversion",
        Strategy::IronCondor => "iron_condor",
        Strategy::MomentumScalping => "momentum_scalping",
    }
}

fn parse_strategy(s: &str) -> Result<Strategy, EngineError> {
    match s {
        "iv_mean_reversion" => Ok(Strategy::IvMeanReversion),
        "iron_condor" => Ok(Strategy::IronCondor),
        "momentum_scalping" => Ok(Strategy::MomentumScalping),
        other => Err(EngineError::invariant(format!("corrupt strategy code {other:?}"))),
    }
}

fn action_code(action: Action) -> &'static str {
    match action {
        Action::Buy => "buy",
        Action::Sell => "sell",
        Action::OpenSpread => "open_spread",
        Action::Close => "close",
    }
}

fn parse_action(s: &str) -> Result<Action, EngineError> {
    match s {
        "buy" => Ok(Action::Buy),
        "sell" => Ok(Action::Sell),
        "open_spread" => Ok(Action::OpenSpread),
        "close" => Ok(Action::Close),
        other => Err(EngineError::invariant(format!("corrupt action code {other:?}"))),
    }
}

fn exit_reason_code(reason: ExitReason) -> &'static str {
    match reason {
        ExitReason::ProfitTarget => "profit_target",
        ExitReason::StopLoss => "stop_loss",
        ExitReason::TimeDecay => "time_decay",
        ExitReason::Breach => "breach",
        ExitReason::ForceClose => "force_close",
        ExitReason::Manual => "manual",
    }
}

fn parse_exit_reason(s: &str) -> Result<ExitReason, EngineError> {
    match s {
        "profit_target" => Ok(ExitReason::ProfitTarget),
        "stop_loss" => Ok(ExitReason::StopLoss),
        "time_decay" => Ok(ExitReason::TimeDecay),
        "breach" => Ok(ExitReason::Breach),
        "force_close" => Ok(ExitReason::ForceClose),
        "manual" => Ok(ExitReason::Manual),
        other => Err(EngineError::invariant(format!("corrupt exit reason {other:?}"))),
    }
}

impl SqliteStore {
    pub async fn connect(url: &str) -> Result<Self, EngineError> {
        let pool = SqlitePool::connect(url).await.map_err(store_err)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), EngineError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS ticks (
                symbol TEXT NOT NULL, underlying TEXT NOT NULL, underlying_price TEXT NOT NULL,
                strike TEXT NOT NULL, expiration TEXT NOT NULL, right TEXT NOT NULL,
                bid TEXT NOT NULL, ask TEXT NOT NULL, iv REAL NOT NULL, delta REAL NOT NULL,
                gamma REAL NOT NULL, theta REAL NOT NULL, vega REAL NOT NULL, ts TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS daily_ivs (symbol TEXT NOT NULL, date TEXT NOT NULL, iv REAL NOT NULL)",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT, ts TEXT NOT NULL, symbol TEXT NOT NULL,
                strategy TEXT NOT NULL, action TEXT NOT NULL, position_id INTEGER,
                requested_price TEXT NOT NULL, filled_price TEXT NOT NULL, quantity INTEGER NOT NULL,
                commission TEXT NOT NULL, slippage TEXT NOT NULL, pnl TEXT NOT NULL, reasoning TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT, representative_symbol TEXT NOT NULL,
                strategy TEXT NOT NULL, position_type TEXT NOT NULL, quantity INTEGER NOT NULL,
                entry_price TEXT NOT NULL, current_price TEXT NOT NULL, unrealized_pnl TEXT NOT NULL,
                opened_at TEXT NOT NULL, closed_at TEXT, status TEXT NOT NULL, exit_reason TEXT,
                net_credit TEXT, spread_width TEXT, max_loss TEXT,
                entry_trade_id INTEGER, exit_trade_id INTEGER
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        // Normalized leg side table, leg_index 1..4 in canonical
        // [short_call, long_call, short_put, long_put] order.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS position_legs (
                position_id INTEGER NOT NULL, leg_index INTEGER NOT NULL, symbol TEXT NOT NULL,
                side TEXT NOT NULL, right TEXT NOT NULL, strike TEXT NOT NULL,
                quantity INTEGER NOT NULL, entry_price TEXT NOT NULL,
                PRIMARY KEY (position_id, leg_index)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS portfolio (
                id INTEGER PRIMARY KEY CHECK (id = 1), balance TEXT NOT NULL, daily_pnl TEXT NOT NULL,
                daily_start_balance TEXT NOT NULL, consecutive_losses INTEGER NOT NULL,
                active_positions INTEGER NOT NULL, win_rate REAL NOT NULL, net_delta REAL NOT NULL,
                net_theta REAL NOT NULL, is_paper INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    pub async fn seed_portfolio(&self, portfolio: &Portfolio) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT OR REPLACE INTO portfolio
             (id, balance, daily_pnl, daily_start_balance, consecutive_losses, active_positions,
              win_rate, net_delta, net_theta, is_paper)
             VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(portfolio.balance.to_string())
        .bind(portfolio.daily_pnl.to_string())
        .bind(portfolio.daily_start_balance.to_string())
        .bind(portfolio.consecutive_losses as i64)
        .bind(portfolio.active_positions as i64)
        .bind(portfolio.win_rate)
        .bind(portfolio.net_delta)
        .bind(portfolio.net_theta)
        .bind(portfolio.is_paper as i64)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn load_legs(&self, position_id: u64) -> Result<Vec<Leg>, EngineError> {
        let rows = sqlx::query(
            "SELECT symbol, side, right, strike, quantity, entry_price FROM position_legs
             WHERE position_id = ? ORDER BY leg_index ASC",
        )
        .bind(position_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter()
            .map(|row| {
                let side_str: String = row.get("side");
                Ok(Leg {
                    symbol: row.get("symbol"),
                    side: if side_str == "buy" { LegSide::Buy } else { LegSide::Sell },
                    right: parse_right(row.get::<String, _>("right").as_str())?,
                    strike: parse_decimal(row.get::<String, _>("strike").as_str())?,
                    quantity: row.get::<i64, _>("quantity") as u32,
                    entry_price: parse_decimal(row.get::<String, _>("entry_price").as_str())?,
                })
            })
            .collect()
    }

    fn row_to_position(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Position, EngineError> {
        let status_str: String = row.get("status");
        Ok(Position {
            id: row.get::<i64, _>("id") as u64,
            representative_symbol: row.get("representative_symbol"),
            strategy: parse_strategy(row.get::<String, _>("strategy").as_str())?,
            position_type: match row.get::<String, _>("position_type").as_str() {
                "long" => PositionType::Long,
                "short" => PositionType::Short,
                _ => PositionType::Spread,
            },
            quantity: row.get::<i64, _>("quantity") as u32,
            entry_price: parse_decimal(row.get::<String, _>("entry_price").as_str())?,
            current_price: parse_decimal(row.get::<String, _>("current_price").as_str())?,
            unrealized_pnl: parse_decimal(row.get::<String, _>("unrealized_pnl").as_str())?,
            opened_at: row.get::<String, _>("opened_at").parse().map_err(|_| {
                EngineError::invariant("corrupt opened_at timestamp")
            })?,
            closed_at: row
                .get::<Option<String>, _>("closed_at")
                .map(|s| s.parse())
                .transpose()
                .map_err(|_| EngineError::invariant("corrupt closed_at timestamp"))?,
            status: if status_str == "open" { PositionStatus::Open } else { PositionStatus::Closed },
            exit_reason: row
                .get::<Option<String>, _>("exit_reason")
                .map(|s| parse_exit_reason(&s))
                .transpose()?,
            legs: vec![],
            net_credit: row.get::<Option<String>, _>("net_credit").map(|s| parse_decimal(&s)).transpose()?,
            spread_width: row
                .get::<Option<String>, _>("spread_width")
                .map(|s| parse_decimal(&s))
                .transpose()?,
            max_loss: row.get::<Option<String>, _>("max_loss").map(|s| parse_decimal(&s)).transpose()?,
            entry_trade_id: row.get::<Option<i64>, _>("entry_trade_id").map(|v| v as u64),
            exit_trade_id: row.get::<Option<i64>, _>("exit_trade_id").map(|v| v as u64),
        })
    }
}

impl Store for SqliteStore {
    async fn append_tick(&self, tick: &OptionTick) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO ticks (symbol, underlying, underlying_price, strike, expiration, right,
             bid, ask, iv, delta, gamma, theta, vega, ts) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(&tick.symbol)
        .bind(&tick.underlying)
        .bind(tick.underlying_price.to_string())
        .bind(tick.strike.to_string())
        .bind(tick.expiration.to_string())
        .bind(right_code(tick.right))
        .bind(tick.bid.to_string())
        .bind(tick.ask.to_string())
        .bind(tick.iv)
        .bind(tick.delta)
        .bind(tick.gamma)
        .bind(tick.theta)
        .bind(tick.vega)
        .bind(tick.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn last_n_ticks(&self, symbol: &str, n: usize) -> Result<Vec<OptionTick>, EngineError> {
        let rows = sqlx::query(
            "SELECT * FROM ticks WHERE symbol = ? ORDER BY ts DESC LIMIT ?",
        )
        .bind(symbol)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter()
            .map(|row| {
                let right = parse_right(row.get::<String, _>("right").as_str())?;
                OptionTick::new(
                    row.get::<String, _>("symbol"),
                    row.get::<String, _>("underlying"),
                    parse_decimal(row.get::<String, _>("underlying_price").as_str())?,
                    parse_decimal(row.get::<String, _>("strike").as_str())?,
                    NaiveDate::parse_from_str(row.get::<String, _>("expiration").as_str(), "%Y-%m-%d")
                        .map_err(|_| EngineError::invariant("corrupt expiration date"))?,
                    right,
                    parse_decimal(row.get::<String, _>("bid").as_str())?,
                    parse_decimal(row.get::<String, _>("ask").as_str())?,
                    row.get("iv"),
                    row.get("delta"),
                    row.get("gamma"),
                    row.get("theta"),
                    row.get("vega"),
                    DateTime::parse_from_rfc3339(row.get::<String, _>("ts").as_str())
                        .map_err(|_| EngineError::invariant("corrupt tick timestamp"))?
                        .with_timezone(&Utc),
                )
            })
            .collect()
    }

    async fn daily_ivs(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<f64>, EngineError> {
        let rows = sqlx::query("SELECT iv FROM daily_ivs WHERE symbol = ? AND date >= ? AND date <= ?")
            .bind(symbol)
            .bind(start.to_string())
            .bind(end.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(rows.into_iter().map(|row| row.get("iv")).collect())
    }

    async fn append_trade(&self, trade: Trade) -> Result<u64, EngineError> {
        let result = sqlx::query(
            "INSERT INTO trades (ts, symbol, strategy, action, position_id, requested_price,
             filled_price, quantity, commission, slippage, pnl, reasoning)
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(trade.ts.to_rfc3339())
        .bind(&trade.symbol)
        .bind(strategy_code(trade.strategy))
        .bind(action_code(trade.action))
        .bind(trade.position_id.map(|v| v as i64))
        .bind(trade.requested_price.to_string())
        .bind(trade.filled_price.to_string())
        .bind(trade.quantity as i64)
        .bind(trade.commission.to_string())
        .bind(trade.slippage.to_string())
        .bind(trade.pnl.to_string())
        .bind(&trade.reasoning)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(result.last_insert_rowid() as u64)
    }

    async fn insert_position(&self, position: Position) -> Result<u64, EngineError> {
        position.validate()?;
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let result = sqlx::query(
            "INSERT INTO positions (representative_symbol, strategy, position_type, quantity,
             entry_price, current_price, unrealized_pnl, opened_at, status, net_credit,
             spread_width, max_loss, entry_trade_id, exit_trade_id)
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(&position.representative_symbol)
        .bind(strategy_code(position.strategy))
        .bind(match position.position_type {
            PositionType::Long => "long",
            PositionType::Short => "short",
            PositionType::Spread => "spread",
        })
        .bind(position.quantity as i64)
        .bind(position.entry_price.to_string())
        .bind(position.current_price.to_string())
        .bind(position.unrealized_pnl.to_string())
        .bind(position.opened_at.to_rfc3339())
        .bind("open")
        .bind(position.net_credit.map(|d| d.to_string()))
        .bind(position.spread_width.map(|d| d.to_string()))
        .bind(position.max_loss.map(|d| d.to_string()))
        .bind(position.entry_trade_id.map(|v| v as i64))
        .bind(position.exit_trade_id.map(|v| v as i64))
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        let id = result.last_insert_rowid() as u64;

        for (index, leg) in position.legs.iter().enumerate() {
            sqlx::query(
                "INSERT INTO position_legs (position_id, leg_index, symbol, side, right, strike,
                 quantity, entry_price) VALUES (?,?,?,?,?,?,?,?)",
            )
            .bind(id as i64)
            .bind(index as i64 + 1)
            .bind(&leg.symbol)
            .bind(if leg.side == LegSide::Buy { "buy" } else { "sell" })
            .bind(right_code(leg.right))
            .bind(leg.strike.to_string())
            .bind(leg.quantity as i64)
            .bind(leg.entry_price.to_string())
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }

        tx.commit().await.map_err(store_err)?;
        Ok(id)
    }

    async fn update_position_mark(
        &self,
        id: u64,
        current_price: Decimal,
        unrealized_pnl: Decimal,
    ) -> Result<(), EngineError> {
        sqlx::query("UPDATE positions SET current_price = ?, unrealized_pnl = ? WHERE id = ?")
            .bind(current_price.to_string())
            .bind(unrealized_pnl.to_string())
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn close_position(
        &self,
        id: u64,
        at: DateTime<Utc>,
        reason: ExitReason,
        exit_trade_id: u64,
    ) -> Result<(), EngineError> {
        sqlx::query(
            "UPDATE positions SET status = 'closed', closed_at = ?, exit_reason = ?, exit_trade_id = ?
             WHERE id = ?",
        )
        .bind(at.to_rfc3339())
        .bind(exit_reason_code(reason))
        .bind(exit_trade_id as i64)
        .bind(id as i64)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn open_positions(&self) -> Result<Vec<Position>, EngineError> {
        let rows = sqlx::query("SELECT * FROM positions WHERE status = 'open' ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        let mut positions = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut position = self.row_to_position(row)?;
            position.legs = self.load_legs(position.id).await?;
            positions.push(position);
        }
        Ok(positions)
    }

    async fn get_position(&self, id: u64) -> Result<Position, EngineError> {
        let row = sqlx::query("SELECT * FROM positions WHERE id = ?")
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .ok_or_else(|| EngineError::invariant(format!("unknown position {id}")))?;
        let mut position = self.row_to_position(&row)?;
        position.legs = self.load_legs(position.id).await?;
        Ok(position)
    }

    async fn reduce_position_quantity(&self, id: u64, new_quantity: u32) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        sqlx::query("UPDATE positions SET quantity = ? WHERE id = ?")
            .bind(new_quantity as i64)
            .bind(id as i64)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        sqlx::query("UPDATE position_legs SET quantity = ? WHERE position_id = ?")
            .bind(new_quantity as i64)
            .bind(id as i64)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        tx.commit().await.map_err(store_err)
    }

    async fn read_portfolio(&self) -> Result<Portfolio, EngineError> {
        let row = sqlx::query("SELECT * FROM portfolio WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .ok_or_else(|| EngineError::StoreUnavailable("portfolio row missing".to_string()))?;

        Ok(Portfolio {
            balance: parse_decimal(row.get::<String, _>("balance").as_str())?,
            daily_pnl: parse_decimal(row.get::<String, _>("daily_pnl").as_str())?,
            daily_start_balance: parse_decimal(row.get::<String, _>("daily_start_balance").as_str())?,
            consecutive_losses: row.get::<i64, _>("consecutive_losses") as u8,
            active_positions: row.get::<i64, _>("active_positions") as u32,
            win_rate: row.get("win_rate"),
            net_delta: row.get("net_delta"),
            net_theta: row.get("net_theta"),
            is_paper: row.get::<i64, _>("is_paper") != 0,
        })
    }

    async fn record_close_outcome(&self, realized_pnl: Decimal) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let row = sqlx::query("SELECT balance, daily_pnl, consecutive_losses FROM portfolio WHERE id = 1")
            .fetch_one(&mut *tx)
            .await
            .map_err(store_err)?;

        let balance = parse_decimal(row.get::<String, _>("balance").as_str())?;
        let daily_pnl = parse_decimal(row.get::<String, _>("daily_pnl").as_str())?;
        let consecutive_losses = row.get::<i64, _>("consecutive_losses");

        let new_consecutive = if realized_pnl < Decimal::ZERO { (consecutive_losses + 1).min(3) } else { 0 };

        sqlx::query("UPDATE portfolio SET balance = ?, daily_pnl = ?, consecutive_losses = ? WHERE id = 1")
            .bind((balance + realized_pnl).to_string())
            .bind((daily_pnl + realized_pnl).to_string())
            .bind(new_consecutive)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)
    }
}
