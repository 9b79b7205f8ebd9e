// Wire types for broker requests and responses.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    Limit,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u32,
    pub kind: OrderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    New,
    Partial,
    Filled,
    Canceled,
    Rejected,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderAck {
    pub id: String,
    pub status: OrderState,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatus {
    pub state: OrderState,
    pub fill_price: Option<Decimal>,
    pub fill_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub balance: Decimal,
    pub is_paper: bool,
}
