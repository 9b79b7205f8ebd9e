// Engine: the transport-agnostic inbound interface (§6) wiring the core
// subsystems — numerics, strategies, risk gate, executor, monitor — to a
// concrete Broker and Store. A binary (see `main.rs`) hangs an HTTP or
// CLI surface off this; the engine itself never touches a socket.

use crate::broker::Broker;
use crate::domain::portfolio::RiskApproval;
use crate::domain::position::{ExitReason, Position};
use crate::domain::signal::Signal;
use crate::domain::tick::OptionTick;
use crate::domain::trade::Trade;
use crate::error::EngineError;
use crate::executor::Executor;
use crate::monitor::Monitor;
use crate::numerics::indicators::Bar;
use crate::risk;
use crate::store::Store;
use crate::strategies::{iron_condor, iv_mean_reversion, momentum_scalping};
use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const IV_HISTORY_WINDOW_DAYS: i64 = 90;

pub struct Engine<B: Broker, S: Store> {
    executor: Arc<Executor<B, S>>,
    monitor: Arc<Monitor<B, S>>,
    exchange_tz: Tz,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<B: Broker + Send + Sync + 'static, S: Store + Send + Sync + 'static> Engine<B, S> {
    pub fn new(broker: B, store: S, exchange_tz: Tz) -> Self {
        let executor = Arc::new(Executor::new(broker, store));
        let monitor = Arc::new(Monitor::new(executor.clone(), exchange_tz));
        Self { executor, monitor, exchange_tz, monitor_handle: Mutex::new(None) }
    }

    /// `generate_iv_signal(OptionTick) -> Option<Signal>`. IV history is the
    /// trailing 90-day daily sample window for the tick's symbol, read
    /// fresh on every call so a signal always reflects the latest store state.
    pub async fn generate_iv_signal(&self, tick: &OptionTick) -> Result<Option<Signal>, EngineError> {
        let today = Utc::now().date_naive();
        let start = today - Duration::days(IV_HISTORY_WINDOW_DAYS);
        let history = self.executor.store.daily_ivs(&tick.symbol, start, today).await?;
        Ok(iv_mean_reversion::generate(tick, &history, Utc::now()))
    }

    /// `build_iron_condor(underlying) -> Option<IronCondorSetup>`. Pulls
    /// today's 0DTE chain from the broker and evaluates the 09:31-09:45 ET
    /// entry window at the moment of the call.
    pub async fn build_iron_condor(&self, underlying: &str) -> Result<Option<iron_condor::IronCondorSetup>, EngineError> {
        let today = Utc::now().date_naive();
        let chain = self.executor.broker.get_option_chain(underlying, today).await?;
        let now = Utc::now().with_timezone(&self.exchange_tz);
        Ok(iron_condor::build(underlying, &chain, now, false))
    }

    /// `scan_momentum() -> list<Signal>`. Bar history for the underlying and
    /// its benchmark is supplied by the caller: the core has no bar store
    /// of its own (§6 lists only option ticks), so a concrete binary is
    /// responsible for feeding 1-minute bars from its market data feed.
    pub async fn scan_momentum(
        &self,
        underlying: &str,
        bars: &[Bar],
        benchmark_bars: &[Bar],
        today: NaiveDate,
    ) -> Result<Vec<Signal>, EngineError> {
        let chain = self.executor.broker.get_option_chain(underlying, today).await?;
        let now = Utc::now().with_timezone(&self.exchange_tz);
        Ok(momentum_scalping::generate(bars, benchmark_bars, &chain, self.exchange_tz, now).into_iter().collect())
    }

    /// `approve(signal, portfolio_snapshot) -> RiskApproval`.
    pub async fn approve(&self, signal: &Signal) -> Result<RiskApproval, EngineError> {
        let portfolio = self.executor.store.read_portfolio().await?;
        Ok(risk::approve(signal, &portfolio))
    }

    /// `execute(signal, approval) -> Trade`.
    pub async fn execute(&self, signal: &Signal, approval: &RiskApproval) -> Result<Trade, EngineError> {
        self.executor.place_single(signal, approval).await
    }

    /// `execute_multi_leg(setup, approval) -> Trade`.
    pub async fn execute_multi_leg(
        &self,
        setup: &iron_condor::IronCondorSetup,
        approval: &RiskApproval,
    ) -> Result<Trade, EngineError> {
        self.executor.place_iron_condor(setup, approval).await
    }

    /// `close(position_id, reason) -> Trade`.
    pub async fn close(&self, position_id: u64, reason: ExitReason) -> Result<Trade, EngineError> {
        let position = self.executor.store.get_position(position_id).await?;
        self.executor.close_position(&position, reason).await
    }

    /// Currently open positions, for callers building a dashboard or a
    /// test harness that needs to inspect state the monitor loop owns.
    pub async fn open_positions(&self) -> Result<Vec<Position>, EngineError> {
        self.executor.store.open_positions().await
    }

    /// Runs a single monitor cycle synchronously, independent of the 60s
    /// tick. Exists for deterministic testing and a future "run once" CLI
    /// mode, the same way `iron_condor::build`'s `override_window` flag
    /// lets entry-window tests skip waiting on the clock.
    pub async fn run_monitor_cycle_once(&self) -> Result<(), EngineError> {
        self.monitor.run_cycle().await
    }

    pub async fn start_monitor(&self) {
        let mut handle = self.monitor_handle.lock().await;
        if handle.is_some() {
            return;
        }
        let monitor = self.monitor.clone();
        *handle = Some(tokio::spawn(async move {
            monitor.run().await;
        }));
    }

    pub async fn stop_monitor(&self) {
        self.monitor.stop();
        if let Some(handle) = self.monitor_handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}
