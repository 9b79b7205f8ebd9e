// In-memory broker double used by executor/monitor tests. Orders fill
// immediately at a scripted price unless a symbol is pre-loaded to reject
// or to never terminate within the caller's timeout.

use super::types::{AccountInfo, OrderAck, OrderRequest, OrderState, OrderStatus};
use super::Broker;
use crate::domain::tick::OptionTick;
use crate::error::EngineError;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum ScriptedFill {
    Fill(Decimal),
    Reject,
}

pub struct MockBroker {
    pub is_paper: bool,
    pub balance: Decimal,
    quotes: Mutex<HashMap<String, OptionTick>>,
    fills: Mutex<HashMap<String, ScriptedFill>>,
    orders: Mutex<HashMap<String, OrderStatus>>,
    next_id: AtomicU64,
    pub placed: Mutex<Vec<OrderRequest>>,
}

impl MockBroker {
    pub fn new(is_paper: bool, balance: Decimal) -> Self {
        Self {
            is_paper,
            balance,
            quotes: Mutex::new(HashMap::new()),
            fills: Mutex::new(HashMap::new()),
            orders: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            placed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_quote(&self, tick: OptionTick) {
        self.quotes.lock().unwrap().insert(tick.symbol.clone(), tick);
    }

    pub fn script_fill(&self, symbol: &str, fill: ScriptedFill) {
        self.fills.lock().unwrap().insert(symbol.to_string(), fill);
    }
}

impl Broker for MockBroker {
    async fn get_option_chain(
        &self,
        underlying: &str,
        _expiration: NaiveDate,
    ) -> Result<Vec<OptionTick>, EngineError> {
        Ok(self
            .quotes
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.underlying == underlying)
            .cloned()
            .collect())
    }

    async fn get_quote(&self, symbol: &str) -> Result<OptionTick, EngineError> {
        self.quotes
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| EngineError::BrokerTransient(format!("no quote scripted for {symbol}")))
    }

    async fn get_account(&self) -> Result<AccountInfo, EngineError> {
        Ok(AccountInfo { balance: self.balance, is_paper: self.is_paper })
    }

    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck, EngineError> {
        if !self.is_paper {
            return Err(EngineError::PreconditionNotMet("paper-trading marker missing".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let fill = self.fills.lock().unwrap().get(&request.symbol).cloned();
        let status = match fill {
            Some(ScriptedFill::Fill(price)) => OrderStatus {
                state: OrderState::Filled,
                fill_price: Some(price),
                fill_ts: Some(Utc::now()),
            },
            Some(ScriptedFill::Reject) => {
                OrderStatus { state: OrderState::Rejected, fill_price: None, fill_ts: None }
            }
            None => OrderStatus {
                state: OrderState::Filled,
                fill_price: request.limit_price,
                fill_ts: Some(Utc::now()),
            },
        };

        self.placed.lock().unwrap().push(request);
        let ack_status = status.state;
        self.orders.lock().unwrap().insert(id.clone(), status);
        Ok(OrderAck { id, status: ack_status })
    }

    async fn poll_order(&self, id: &str) -> Result<OrderStatus, EngineError> {
        self.orders
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::BrokerTransient(format!("unknown order {id}")))
    }
}
