//! OKX v5 REST client with HMAC-SHA256 signature authentication.

use super::{
    model::{
        OkxCancelRequest, OkxInstrument, OkxOrder, OkxOrderAck, OkxPlaceRequest, OkxResponse,
        OkxSetLeverage,
    },
    signing::OkxCredentials,
};
use crate::{
    client::ExchangeClient,
    error::ClientError,
    order::{OrderId, OrderInfo, PlaceOrder},
};
use async_trait::async_trait;
use calendar_instrument::{ExpiryClass, Instrument, InstrumentId, Instruments};
use chrono::Utc;
use fnv::FnvHashSet;
use parking_lot::Mutex;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::{Serialize, de::DeserializeOwned};
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const OKX_API_BASE: &str = "https://www.okx.com";

/// Configuration for the OKX HTTP client.
#[derive(Debug, Clone)]
pub struct OkxHttpConfig {
    pub credentials: OkxCredentials,
    /// Send `x-simulated-trading: 1` on every request.
    pub simulated: bool,
    pub base_url: String,
}

impl OkxHttpConfig {
    /// Create from environment variables.
    ///
    /// Reads `OKX_API_KEY`, `OKX_API_SECRET`, `OKX_PASSPHRASE` and the optional
    /// `OKX_SIMULATED` (default `true`).
    pub fn from_env() -> Result<Self, ClientError> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| ClientError::Auth(format!("{name} not set")))
        };

        let simulated = std::env::var("OKX_SIMULATED")
            .map(|value| !matches!(value.to_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        Ok(Self {
            credentials: OkxCredentials::new(
                var("OKX_API_KEY")?,
                var("OKX_API_SECRET")?,
                var("OKX_PASSPHRASE")?,
            ),
            simulated,
            base_url: OKX_API_BASE.to_string(),
        })
    }
}

/// OKX REST client implementing [`ExchangeClient`].
///
/// Leverage is set once per instrument, before its first placement.
#[derive(Debug, Clone)]
pub struct OkxHttpClient {
    client: Client,
    credentials: OkxCredentials,
    simulated: bool,
    base_url: String,
    leverage_set: Arc<Mutex<FnvHashSet<InstrumentId>>>,
}

impl OkxHttpClient {
    pub fn new(config: OkxHttpConfig) -> Self {
        Self {
            client: Client::new(),
            credentials: config.credentials,
            simulated: config.simulated,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            leverage_set: Arc::new(Mutex::new(FnvHashSet::default())),
        }
    }

    pub fn credentials(&self) -> &OkxCredentials {
        &self.credentials
    }

    /// Build a signed request. `path` must include any query string.
    fn authenticated_request(
        &self,
        method: Method,
        path: &str,
        body: &str,
    ) -> Result<reqwest::RequestBuilder, ClientError> {
        let (timestamp, signature) =
            self.credentials
                .sign_request(Utc::now(), method.as_str(), path, body)?;
        let url = format!("{}{}", self.base_url, path);

        let mut builder = self
            .client
            .request(method, &url)
            .header("OK-ACCESS-KEY", &self.credentials.api_key)
            .header("OK-ACCESS-SIGN", signature)
            .header("OK-ACCESS-TIMESTAMP", timestamp)
            .header("OK-ACCESS-PASSPHRASE", &self.credentials.passphrase)
            .header("Content-Type", "application/json");

        if self.simulated {
            builder = builder.header("x-simulated-trading", "1");
        }
        if !body.is_empty() {
            builder = builder.body(body.to_string());
        }

        Ok(builder)
    }

    async fn send<T>(&self, builder: reqwest::RequestBuilder) -> Result<OkxResponse<T>, ClientError>
    where
        T: DeserializeOwned,
    {
        let resp = builder
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        match serde_json::from_str::<OkxResponse<T>>(&body) {
            Ok(response) => Ok(response),
            Err(_) if !status.is_success() => {
                error!(%status, %body, "OKX request failed");
                Err(ClientError::Request(format!("Status {}: {}", status, body)))
            }
            Err(e) => Err(ClientError::Parse(format!("{e}: {body}"))),
        }
    }

    async fn get<T>(&self, path: &str) -> Result<OkxResponse<T>, ClientError>
    where
        T: DeserializeOwned,
    {
        let builder = self.authenticated_request(Method::GET, path, "")?;
        self.send(builder).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<OkxResponse<T>, ClientError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let body = serde_json::to_string(body).map_err(|e| ClientError::Parse(e.to_string()))?;
        let builder = self.authenticated_request(Method::POST, path, &body)?;
        self.send(builder).await
    }

    /// Set cross-margin leverage for `instrument` unless already done by this client.
    pub async fn ensure_leverage(
        &self,
        instrument: &InstrumentId,
        leverage: Decimal,
    ) -> Result<(), ClientError> {
        if self.leverage_set.lock().contains(instrument) {
            return Ok(());
        }

        let request = OkxSetLeverage {
            inst_id: instrument.to_string(),
            lever: leverage.normalize().to_string(),
            mgn_mode: "cross",
        };
        let response: OkxResponse<serde_json::Value> =
            self.post("/api/v5/account/set-leverage", &request).await?;
        if !response.is_ok() {
            return Err(ClientError::api(response.code, response.msg));
        }

        info!(%instrument, %leverage, "OKX leverage set");
        self.leverage_set.lock().insert(instrument.clone());
        Ok(())
    }

    /// Fetch live futures contracts on `underlying` (eg/ "BTC-USD").
    pub async fn fetch_instruments(
        &self,
        underlying: &str,
        leverage: Decimal,
    ) -> Result<Instruments, ClientError> {
        let query = serde_urlencoded::to_string([("instType", "FUTURES"), ("uly", underlying)])
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        let response: OkxResponse<OkxInstrument> = self
            .get(&format!("/api/v5/public/instruments?{query}"))
            .await?;
        if !response.is_ok() {
            return Err(ClientError::api(response.code, response.msg));
        }

        let instruments = response
            .data
            .into_iter()
            .filter(|instrument| instrument.state.is_empty() || instrument.state == "live")
            .filter_map(|instrument| {
                let Some(expiry_class) = ExpiryClass::from_alias(&instrument.alias) else {
                    debug!(instrument = %instrument.inst_id, alias = %instrument.alias, "skipping contract with unknown alias");
                    return None;
                };
                Some(Instrument::new(
                    InstrumentId::from(instrument.inst_id),
                    SmolStr::new(instrument.uly),
                    expiry_class,
                    instrument.exp_time,
                    instrument.ct_val,
                    leverage,
                ))
            })
            .fold(Instruments::builder(), |builder, instrument| {
                builder.add_instrument(instrument)
            })
            .build();

        Ok(instruments)
    }
}

/// Resolve a placement or cancel acknowledgement, preferring the order level error code.
fn acknowledge(response: OkxResponse<OkxOrderAck>) -> Result<OkxOrderAck, ClientError> {
    let ack = response.data.into_iter().next();

    match ack {
        Some(ack) if response.code == "0" && (ack.s_code.is_empty() || ack.s_code == "0") => Ok(ack),
        Some(ack) if !ack.s_code.is_empty() && ack.s_code != "0" => {
            Err(ClientError::api(ack.s_code, ack.s_msg))
        }
        _ if response.code != "0" => Err(ClientError::api(response.code, response.msg)),
        _ => Err(ClientError::Parse("empty order acknowledgement".into())),
    }
}

#[async_trait]
impl ExchangeClient for OkxHttpClient {
    async fn place(&self, request: &PlaceOrder) -> Result<OrderId, ClientError> {
        self.ensure_leverage(&request.instrument, request.leverage)
            .await?;

        let body = OkxPlaceRequest::from(request);
        let ack = acknowledge(self.post("/api/v5/trade/order", &body).await?)?;

        let order_id = ack
            .ord_id
            .parse()
            .map(OrderId)
            .map_err(|_| ClientError::Parse(format!("invalid ordId: {}", ack.ord_id)))?;

        debug!(%order_id, instrument = %request.instrument, action = %request.action, "OKX order accepted");
        Ok(order_id)
    }

    async fn order_info(
        &self,
        instrument: &InstrumentId,
        order_id: OrderId,
    ) -> Result<OrderInfo, ClientError> {
        let query = serde_urlencoded::to_string([
            ("ordId", order_id.to_string().as_str()),
            ("instId", instrument.as_str()),
        ])
        .map_err(|e| ClientError::Parse(e.to_string()))?;

        let response: OkxResponse<OkxOrder> =
            self.get(&format!("/api/v5/trade/order?{query}")).await?;
        if !response.is_ok() {
            return Err(ClientError::api(response.code, response.msg));
        }

        response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Parse(format!("order {order_id} missing from response")))?
            .into_info()
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn cancel(&self, instrument: &InstrumentId, order_id: OrderId) -> Result<(), ClientError> {
        let body = OkxCancelRequest {
            inst_id: instrument.to_string(),
            ord_id: order_id.to_string(),
        };

        match acknowledge(self.post("/api/v5/trade/cancel-order", &body).await?) {
            Ok(_) => Ok(()),
            Err(error) => {
                if !error.is_order_not_live() {
                    warn!(%order_id, %instrument, ?error, "OKX cancel rejected");
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack_response(code: &str, s_code: &str) -> OkxResponse<OkxOrderAck> {
        serde_json::from_value(serde_json::json!({
            "code": code,
            "msg": if code == "0" { "" } else { "All operations failed" },
            "data": [{ "ordId": "12345", "clOrdId": "", "sCode": s_code, "sMsg": "detail" }]
        }))
        .unwrap()
    }

    #[test]
    fn test_acknowledge_success() {
        let ack = acknowledge(ack_response("0", "0")).unwrap();
        assert_eq!(ack.ord_id, "12345");
    }

    #[test]
    fn test_acknowledge_prefers_order_code() {
        let error = acknowledge(ack_response("1", "51008")).unwrap_err();
        assert!(error.is_margin_not_enough());

        let error = acknowledge(ack_response("1", "51400")).unwrap_err();
        assert!(error.is_order_not_live());
    }

    #[test]
    fn test_acknowledge_envelope_error_without_data() {
        let response: OkxResponse<OkxOrderAck> = serde_json::from_value(serde_json::json!({
            "code": "50113",
            "msg": "Invalid Sign",
            "data": []
        }))
        .unwrap();
        assert_eq!(acknowledge(response).unwrap_err(), ClientError::api("50113", "Invalid Sign"));
    }
}
