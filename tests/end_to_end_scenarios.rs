// End-to-end coverage wiring signal generation, risk approval, execution
// and the monitor together through the public `Engine` surface. Per-module
// unit tests already cover each function in isolation; these exercise the
// full pipeline the way a caller actually drives it.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use trade_oracle::broker::mock::{MockBroker, ScriptedFill};
use trade_oracle::domain::portfolio::Portfolio;
use trade_oracle::domain::tick::OptionTick;
use trade_oracle::engine::Engine;
use trade_oracle::store::memory::MemoryStore;
use trade_oracle::strategies::iron_condor;
use trade_oracle::symbol::Right;

fn portfolio(balance: Decimal, daily_pnl: Decimal) -> Portfolio {
    Portfolio {
        balance,
        daily_pnl,
        daily_start_balance: balance - daily_pnl,
        consecutive_losses: 0,
        active_positions: 0,
        win_rate: 0.5,
        net_delta: 0.0,
        net_theta: 0.0,
        is_paper: true,
    }
}

#[allow(clippy::too_many_arguments)]
fn option_tick(
    symbol: &str,
    underlying: &str,
    underlying_price: Decimal,
    strike: Decimal,
    expiration: NaiveDate,
    right: Right,
    bid: Decimal,
    ask: Decimal,
    iv: f64,
    delta: f64,
) -> OptionTick {
    OptionTick::new(
        symbol, underlying, underlying_price, strike, expiration, right, bid, ask, iv, delta, 0.01, -0.05, 0.1,
        Utc::now(),
    )
    .unwrap()
}

/// Scenario 1: a tick whose 20-sample trailing history puts today's IV
/// exactly at the 0.75 rank a SELL signal requires, approved and executed
/// through the full pipeline.
#[tokio::test]
async fn iv_sell_signal_approves_and_executes_the_literal_scenario() {
    let broker = MockBroker::new(true, dec!(100000));
    let store = MemoryStore::new(portfolio(dec!(100000), dec!(0)));

    let today = Utc::now().date_naive();
    // 15 of 20 trailing samples sit at or below today's level: rank 15/20 = 0.75.
    for i in 0..15 {
        store.seed_daily_iv("SPY   260117C00450000", today - chrono::Duration::days(i + 1), 0.30);
    }
    for i in 15..20 {
        store.seed_daily_iv("SPY   260117C00450000", today - chrono::Duration::days(i + 1), 0.50);
    }

    let engine = Engine::new(broker, store, chrono_tz::America::New_York);

    let tick = option_tick(
        "SPY   260117C00450000", "SPY", dec!(450), dec!(450), today + chrono::Duration::days(42),
        Right::Call, dec!(4.45), dec!(4.55), 0.40, 0.5,
    );

    let signal = engine.generate_iv_signal(&tick).await.unwrap().expect("expected a SELL signal");
    assert_eq!(signal.entry_price, dec!(4.50));

    let approval = engine.approve(&signal).await.unwrap();
    assert!(approval.approved);
    assert!(approval.sized_quantity > 0);

    let trade = engine.execute(&signal, &approval).await.unwrap();
    assert_eq!(trade.quantity, approval.sized_quantity);

    let open = engine.open_positions().await.unwrap();
    assert_eq!(open.len(), 1);
}

/// Scenario 4: a daily loss already past the 3% breaker denies every new
/// entry, no matter how attractive the signal looks.
#[tokio::test]
async fn daily_loss_breaker_denies_new_entries() {
    let broker = MockBroker::new(true, dec!(100000));
    let store = MemoryStore::new(portfolio(dec!(96900), dec!(-3100)));
    let engine = Engine::new(broker, store, chrono_tz::America::New_York);

    let signal = trade_oracle::domain::signal::Signal::new(
        "SPY   260117C00450000",
        trade_oracle::domain::signal::Strategy::IvMeanReversion,
        trade_oracle::domain::signal::Action::Sell,
        dec!(4.50), dec!(9.00), dec!(2.25), "iv rank 0.75", 0.5, Utc::now(),
    )
    .unwrap();

    let approval = engine.approve(&signal).await.unwrap();
    assert!(!approval.approved);
    assert_eq!(approval.sized_quantity, 0);

    let result = engine.execute(&signal, &approval).await;
    assert!(result.is_err());

    let open = engine.open_positions().await.unwrap();
    assert!(open.is_empty());
}

fn iron_condor_chain(expiration: NaiveDate) -> Vec<OptionTick> {
    let mut chain = vec![
        option_tick("SC", "SPY", dec!(450), dec!(455), expiration, Right::Call, dec!(0.95), dec!(1.05), 0.3, 0.15),
        option_tick("LC", "SPY", dec!(450), dec!(460), expiration, Right::Call, dec!(0.15), dec!(0.25), 0.3, 0.05),
        option_tick("SP", "SPY", dec!(450), dec!(445), expiration, Right::Put, dec!(0.95), dec!(1.05), 0.3, -0.15),
        option_tick("LP", "SPY", dec!(450), dec!(440), expiration, Right::Put, dec!(0.25), dec!(0.35), 0.3, -0.05),
    ];
    for i in 0..10 {
        chain.push(option_tick(
            &format!("C{i}"), "SPY", dec!(450), dec!(500) + Decimal::from(i), expiration, Right::Call,
            dec!(0.01), dec!(0.02), 0.3, 0.01,
        ));
        chain.push(option_tick(
            &format!("P{i}"), "SPY", dec!(450), dec!(400) - Decimal::from(i), expiration, Right::Put,
            dec!(0.01), dec!(0.02), 0.3, -0.01,
        ));
    }
    chain
}

/// Scenarios 2 and 3 chained: build the condor (bypassing the 09:31-09:45
/// window gate the same way `iron_condor`'s own unit tests do, since a
/// wall-clock-dependent entry window has no place in a deterministic
/// integration test) against a local chain priced for a 1.50 entry credit,
/// execute it through the engine, then run a monitor cycle against a
/// broker already quoting the four legs at a decayed 0.70 combined value
/// and confirm the position closes on profit target.
///
/// `place_iron_condor` prices and fills each leg off the setup's own
/// quotes, not the broker's live book, so the broker only needs to carry
/// the *post-entry* quotes the monitor will read back.
#[tokio::test]
async fn iron_condor_build_execute_and_profit_target_close() {
    let broker = MockBroker::new(true, dec!(100000));
    let expiration = Utc::now().date_naive();
    broker.set_quote(option_tick("SC", "SPY", dec!(450), dec!(455), expiration, Right::Call, dec!(0.35), dec!(0.45), 0.3, 0.2));
    broker.set_quote(option_tick("LC", "SPY", dec!(450), dec!(460), expiration, Right::Call, dec!(0.05), dec!(0.15), 0.3, 0.07));
    broker.set_quote(option_tick("SP", "SPY", dec!(450), dec!(445), expiration, Right::Put, dec!(0.45), dec!(0.55), 0.3, -0.2));
    broker.set_quote(option_tick("LP", "SPY", dec!(450), dec!(440), expiration, Right::Put, dec!(0.05), dec!(0.15), 0.3, -0.07));

    let store = MemoryStore::new(portfolio(dec!(100000), dec!(0)));

    let tz: chrono_tz::Tz = chrono_tz::America::New_York;
    let now = Utc::now().with_timezone(&tz);
    let chain = iron_condor_chain(expiration);
    let setup = iron_condor::build("SPY", &chain, now, true).expect("expected a condor setup");
    assert_eq!(setup.net_credit, dec!(1.50));

    let engine = Engine::new(broker, store, tz);

    let signal = iron_condor::signal_from(&setup, Utc::now()).unwrap();
    let approval = engine.approve(&signal).await.unwrap();
    assert!(approval.approved);

    let trade = engine.execute_multi_leg(&setup, &approval).await.unwrap();
    assert_eq!(trade.action, trade_oracle::domain::signal::Action::OpenSpread);

    let open = engine.open_positions().await.unwrap();
    assert_eq!(open.len(), 1);

    // current spread value (0.40-0.10)+(0.50-0.10) = 0.70 against a 1.50
    // entry credit leaves 0.80 of gain per contract before commissions,
    // still past the 50%-of-credit (0.75) profit floor net of them.
    engine.run_monitor_cycle_once().await.unwrap();

    let open_after = engine.open_positions().await.unwrap();
    assert!(open_after.is_empty(), "profitable condor should have closed");
}

/// Scenario 6: the third leg (short put) is rejected after the first two
/// fill. The executor unwinds both filled legs and writes a single FAILED
/// trade with no position ever created.
#[tokio::test]
async fn multi_leg_partial_fill_unwinds_with_no_position() {
    let broker = MockBroker::new(true, dec!(100000));
    let expiration = Utc::now().date_naive();
    broker.script_fill("SP", ScriptedFill::Reject);

    let tz: chrono_tz::Tz = chrono_tz::America::New_York;
    let now = Utc::now().with_timezone(&tz);
    let chain = iron_condor_chain(expiration);
    let setup = iron_condor::build("SPY", &chain, now, true).expect("expected a condor setup");

    let store = MemoryStore::new(portfolio(dec!(100000), dec!(0)));
    let engine = Engine::new(broker, store, tz);

    let signal = iron_condor::signal_from(&setup, Utc::now()).unwrap();
    let approval = engine.approve(&signal).await.unwrap();
    assert!(approval.approved);

    let trade = engine.execute_multi_leg(&setup, &approval).await.unwrap();
    assert_eq!(trade.position_id, None);

    let open = engine.open_positions().await.unwrap();
    assert!(open.is_empty());
}
