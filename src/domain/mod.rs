// Core domain entities: ticks, signals, positions, trades, portfolio.

pub mod portfolio;
pub mod position;
pub mod signal;
pub mod tick;
pub mod trade;
