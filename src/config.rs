// Startup configuration: a clap-derived CLI combined with environment
// variables for credentials, merged into a single config struct the
// binary can assert against before starting the event loop.

use crate::error::EngineError;
use clap::Parser;
use chrono_tz::Tz;

const PAPER_TRADING_URL: &str = "https://paper-api.alpaca.markets";
const MARKET_DATA_URL: &str = "https://data.alpaca.markets";

#[derive(Debug, Clone, Parser)]
#[command(name = "trade-oracle-paper", about = "Paper-trading options execution engine")]
pub struct Cli {
    /// Broker trading endpoint. Must carry a paper-trading marker; refused otherwise.
    #[arg(long, env = "TRADE_ORACLE_BASE_URL", default_value = PAPER_TRADING_URL)]
    pub base_url: String,

    /// Broker market-data endpoint.
    #[arg(long, env = "TRADE_ORACLE_DATA_URL", default_value = MARKET_DATA_URL)]
    pub data_url: String,

    /// SQLite database path; "memory" runs the in-process store with no durability.
    #[arg(long, env = "TRADE_ORACLE_STORE", default_value = "trade_oracle.db")]
    pub store: String,

    /// Starting paper balance, only used when `--store memory`.
    #[arg(long, env = "TRADE_ORACLE_STARTING_BALANCE", default_value_t = 100_000)]
    pub starting_balance: i64,

    /// Exchange calendar the entry/exit windows are computed against.
    #[arg(long, default_value = "America/New_York")]
    pub exchange_tz: String,
}

#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    pub data_url: String,
    pub store: String,
    pub starting_balance: i64,
    pub exchange_tz: Tz,
}

impl StartupConfig {
    /// Reads credentials from `TRADE_ORACLE_API_KEY`/`TRADE_ORACLE_API_SECRET`
    /// and merges them with the parsed CLI. Fails fast
    /// (`EngineError::PreconditionNotMet`) rather than leaving credential
    /// gaps to surface as broker errors later.
    pub fn from_cli(cli: Cli) -> Result<Self, EngineError> {
        let api_key = std::env::var("TRADE_ORACLE_API_KEY")
            .map_err(|_| EngineError::PreconditionNotMet("TRADE_ORACLE_API_KEY not set".into()))?;
        let api_secret = std::env::var("TRADE_ORACLE_API_SECRET")
            .map_err(|_| EngineError::PreconditionNotMet("TRADE_ORACLE_API_SECRET not set".into()))?;

        let exchange_tz: Tz = cli
            .exchange_tz
            .parse()
            .map_err(|_| EngineError::PreconditionNotMet(format!("unknown timezone {}", cli.exchange_tz)))?;

        let config = Self {
            api_key,
            api_secret,
            base_url: cli.base_url,
            data_url: cli.data_url,
            store: cli.store,
            starting_balance: cli.starting_balance,
            exchange_tz,
        };
        config.assert_paper_mode()?;
        Ok(config)
    }

    /// This binary must never point at a live-trading endpoint.
    /// `HttpBrokerClient::new` re-checks this on construction; this is the
    /// earlier, binary-level fail-fast so a misconfigured deploy never
    /// reaches the broker layer.
    fn assert_paper_mode(&self) -> Result<(), EngineError> {
        if !self.base_url.contains("paper-api") {
            return Err(EngineError::PreconditionNotMet(format!(
                "refusing to start: base_url '{}' does not carry the paper-trading marker",
                self.base_url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(base_url: &str) -> Cli {
        Cli {
            base_url: base_url.to_string(),
            data_url: MARKET_DATA_URL.to_string(),
            store: "memory".to_string(),
            starting_balance: 100_000,
            exchange_tz: "America/New_York".to_string(),
        }
    }

    // Single test: std::env is process-global, so asserting credential and
    // paper-mode behavior in one test avoids ordering races with other tests
    // that touch the same variables.
    #[test]
    fn startup_config_validates_credentials_and_paper_marker() {
        std::env::remove_var("TRADE_ORACLE_API_KEY");
        std::env::remove_var("TRADE_ORACLE_API_SECRET");
        assert!(StartupConfig::from_cli(cli(PAPER_TRADING_URL)).is_err());

        std::env::set_var("TRADE_ORACLE_API_KEY", "k");
        std::env::set_var("TRADE_ORACLE_API_SECRET", "s");
        assert!(StartupConfig::from_cli(cli("https://api.alpaca.markets")).is_err());
        assert!(StartupConfig::from_cli(cli(PAPER_TRADING_URL)).is_ok());
    }
}
