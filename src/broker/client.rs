// HTTP broker client. Structurally mirrors Alpaca's paper-trading REST
// API: bearer-style key/secret headers, JSON bodies, one base URL for
// trading and one for market data.

use super::types::{AccountInfo, OrderAck, OrderRequest, OrderStatus};
use super::Broker;
use crate::domain::tick::OptionTick;
use crate::error::EngineError;
use crate::symbol::{OccSymbol, Right};
use chrono::NaiveDate;
use reqwest::{header, Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};

/// Endpoints carrying this marker are paper-trading simulators; anything
/// else must never be handed to this client.
const PAPER_MARKER: &str = "paper-api";

pub struct HttpBrokerClient {
    client: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    data_url: String,
}

impl HttpBrokerClient {
    /// Refuses to construct unless `base_url` carries the paper-trading
    /// marker. Rechecked again on every `place_order`.
    pub fn new(api_key: String, api_secret: String, base_url: String, data_url: String) -> Result<Self, EngineError> {
        if !base_url.contains(PAPER_MARKER) {
            return Err(EngineError::PreconditionNotMet(
                "broker base_url does not carry the paper-trading marker".to_string(),
            ));
        }
        Ok(Self { client: Client::new(), api_key, api_secret, base_url, data_url })
    }

    fn headers(&self) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert("APCA-API-KEY-ID", self.api_key.parse().expect("api key is ASCII"));
        headers.insert("APCA-API-SECRET-KEY", self.api_secret.parse().expect("api secret is ASCII"));
        headers
    }

    fn classify_status(status: StatusCode) -> EngineError {
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            EngineError::BrokerTransient(format!("broker returned {status}"))
        } else {
            EngineError::BrokerRejected(format!("broker returned {status}"))
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, EngineError> {
        let response = self
            .client
            .get(url)
            .headers(self.headers())
            .send()
            .await
            .map_err(|e| EngineError::BrokerTransient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::classify_status(response.status()));
        }
        response.json().await.map_err(|e| EngineError::BrokerTransient(e.to_string()))
    }

    async fn post<T: DeserializeOwned>(&self, url: &str, body: &impl serde::Serialize) -> Result<T, EngineError> {
        let response = self
            .client
            .post(url)
            .headers(self.headers())
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::BrokerTransient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::classify_status(response.status()));
        }
        response.json().await.map_err(|e| EngineError::BrokerTransient(e.to_string()))
    }
}

#[derive(Deserialize)]
struct ChainResponse {
    contracts: Vec<WireTick>,
}

#[derive(Deserialize)]
struct WireTick {
    symbol: String,
    underlying_price: rust_decimal::Decimal,
    bid: rust_decimal::Decimal,
    ask: rust_decimal::Decimal,
    iv: f64,
    delta: f64,
    gamma: f64,
    theta: f64,
    vega: f64,
}

impl WireTick {
    fn into_tick(self) -> Result<OptionTick, EngineError> {
        let decoded = OccSymbol::decode(&self.symbol)?;
        OptionTick::new(
            self.symbol,
            decoded.underlying,
            self.underlying_price,
            decoded.strike,
            decoded.expiration,
            decoded.right,
            self.bid,
            self.ask,
            self.iv,
            self.delta,
            self.gamma,
            self.theta,
            self.vega,
            chrono::Utc::now(),
        )
    }
}

impl Broker for HttpBrokerClient {
    async fn get_option_chain(
        &self,
        underlying: &str,
        expiration: NaiveDate,
    ) -> Result<Vec<OptionTick>, EngineError> {
        let url = format!(
            "{}/v2/options/chain/{}?expiration={}",
            self.data_url, underlying, expiration
        );
        let chain: ChainResponse = self.get(&url).await?;
        chain.contracts.into_iter().map(WireTick::into_tick).collect()
    }

    async fn get_quote(&self, symbol: &str) -> Result<OptionTick, EngineError> {
        let url = format!("{}/v2/options/quotes/{symbol}", self.data_url);
        let tick: WireTick = self.get(&url).await?;
        tick.into_tick()
    }

    async fn get_account(&self) -> Result<AccountInfo, EngineError> {
        let url = format!("{}/v2/account", self.base_url);
        self.get(&url).await
    }

    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck, EngineError> {
        if !self.base_url.contains(PAPER_MARKER) {
            return Err(EngineError::PreconditionNotMet(
                "paper-trading marker missing on order placement".to_string(),
            ));
        }
        let url = format!("{}/v2/orders", self.base_url);
        self.post(&url, &request).await
    }

    async fn poll_order(&self, id: &str) -> Result<OrderStatus, EngineError> {
        let url = format!("{}/v2/orders/{id}", self.base_url);
        self.get(&url).await
    }
}
