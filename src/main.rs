// Paper-trading binary entry point: parses startup config, runs the
// startup health checks and paper-mode assertion, wires the engine to
// concrete broker/store collaborators, and drives the monitor loop
// until ctrl-c.

use clap::Parser;
use rust_decimal::Decimal;
use std::process::ExitCode;
use trade_oracle::broker::client::HttpBrokerClient;
use trade_oracle::broker::Broker;
use trade_oracle::config::{Cli, StartupConfig};
use trade_oracle::domain::portfolio::Portfolio;
use trade_oracle::engine::Engine;
use trade_oracle::store::memory::MemoryStore;
use trade_oracle::store::sqlite::SqliteStore;
use trade_oracle::store::Store;

fn default_portfolio(starting_balance: i64) -> Portfolio {
    let balance = Decimal::from(starting_balance);
    Portfolio {
        balance,
        daily_pnl: Decimal::ZERO,
        daily_start_balance: balance,
        consecutive_losses: 0,
        active_positions: 0,
        win_rate: 0.5,
        net_delta: 0.0,
        net_theta: 0.0,
        is_paper: true,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let config = match StartupConfig::from_cli(Cli::parse()) {
        Ok(config) => config,
        Err(err) => {
            log::error!("startup assertion failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    let broker = match HttpBrokerClient::new(
        config.api_key.clone(),
        config.api_secret.clone(),
        config.base_url.clone(),
        config.data_url.clone(),
    ) {
        Ok(broker) => broker,
        Err(err) => {
            log::error!("broker construction failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = broker.get_account().await {
        log::error!("broker health check failed: {err}");
        return ExitCode::FAILURE;
    }

    if config.store == "memory" {
        log::warn!("running with the in-memory store; no state survives a restart");
        let store = MemoryStore::new(default_portfolio(config.starting_balance));
        run(broker, store, config).await
    } else {
        let store = match SqliteStore::connect(&config.store).await {
            Ok(store) => store,
            Err(err) => {
                log::error!("store health check failed: {err}");
                return ExitCode::FAILURE;
            }
        };
        if store.read_portfolio().await.is_err() {
            if let Err(err) = store.seed_portfolio(&default_portfolio(config.starting_balance)).await {
                log::error!("failed to seed starting portfolio: {err}");
                return ExitCode::FAILURE;
            }
        }
        run(broker, store, config).await
    }
}

async fn run<B, S>(broker: B, store: S, config: StartupConfig) -> ExitCode
where
    B: Broker + Send + Sync + 'static,
    S: Store + Send + Sync + 'static,
{
    let engine = Engine::new(broker, store, config.exchange_tz);
    engine.start_monitor().await;
    log::info!("trade-oracle-paper running against {} (paper mode confirmed)", config.base_url);

    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for ctrl-c: {err}");
        return ExitCode::FAILURE;
    }

    log::info!("shutdown requested, stopping monitor");
    engine.stop_monitor().await;
    ExitCode::SUCCESS
}
