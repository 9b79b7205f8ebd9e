// Broker adapter. The trait
// lets the executor and monitor run against either the real HTTP client
// or the in-memory mock, generically rather than through a trait object.

pub mod client;
pub mod mock;
pub mod types;

use crate::domain::tick::OptionTick;
use crate::error::EngineError;
use chrono::NaiveDate;
use types::{AccountInfo, OrderAck, OrderRequest, OrderStatus};

#[allow(async_fn_in_trait)]
pub trait Broker {
    fn get_option_chain(
        &self,
        underlying: &str,
        expiration: NaiveDate,
    ) -> impl std::future::Future<Output = Result<Vec<OptionTick>, EngineError>> + Send;

    fn get_quote(&self, symbol: &str) -> impl std::future::Future<Output = Result<OptionTick, EngineError>> + Send;

    fn get_account(&self) -> impl std::future::Future<Output = Result<AccountInfo, EngineError>> + Send;

    /// Rechecks the paper-trading marker before every order.
    fn place_order(&self, request: OrderRequest) -> impl std::future::Future<Output = Result<OrderAck, EngineError>> + Send;

    fn poll_order(&self, id: &str) -> impl std::future::Future<Output = Result<OrderStatus, EngineError>> + Send;
}
