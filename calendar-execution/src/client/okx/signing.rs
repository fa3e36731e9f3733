//! OKX v5 API key authentication.
//!
//! REST requests are signed with HMAC-SHA256 over `{timestamp}{METHOD}{path}{body}`, where
//! `timestamp` is ISO-8601 with millisecond precision and `path` includes the query string.
//! The WebSocket login signs `{unix_seconds}GET/users/self/verify` the same way.
//!
//! See docs: <https://www.okx.com/docs-v5/en/#overview-rest-authentication>

use crate::error::ClientError;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const WS_LOGIN_PATH: &str = "/users/self/verify";

/// API key, secret and passphrase for one OKX account.
#[derive(Clone)]
pub struct OkxCredentials {
    pub api_key: String,
    pub secret_key: String,
    pub passphrase: String,
}

impl std::fmt::Debug for OkxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OkxCredentials")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl OkxCredentials {
    pub fn new(
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            passphrase: passphrase.into(),
        }
    }

    /// Base64 HMAC-SHA256 signature of `prehash`.
    pub fn sign(&self, prehash: &str) -> Result<String, ClientError> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|error| ClientError::Auth(format!("invalid secret key: {error}")))?;
        mac.update(prehash.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    /// `OK-ACCESS-*` header values for a REST request.
    ///
    /// Returns `(timestamp, signature)`.
    pub fn sign_request(
        &self,
        time: DateTime<Utc>,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<(String, String), ClientError> {
        let timestamp = rest_timestamp(time);
        let signature = self.sign(&format!("{timestamp}{method}{path}{body}"))?;
        Ok((timestamp, signature))
    }

    /// WebSocket `login` request.
    pub fn login_request(&self, time: DateTime<Utc>) -> Result<serde_json::Value, ClientError> {
        let timestamp = time.timestamp().to_string();
        let signature = self.sign(&format!("{timestamp}GET{WS_LOGIN_PATH}"))?;

        Ok(json!({
            "op": "login",
            "args": [{
                "apiKey": self.api_key,
                "passphrase": self.passphrase,
                "timestamp": timestamp,
                "sign": signature,
            }]
        }))
    }
}

/// REST timestamp, eg/ `2020-12-08T09:08:57.715Z`.
pub fn rest_timestamp(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn credentials() -> OkxCredentials {
        OkxCredentials::new("key", "secret", "pass")
    }

    #[test]
    fn test_rest_timestamp() {
        let time = Utc.timestamp_millis_opt(1607418537715).unwrap();
        assert_eq!(rest_timestamp(time), "2020-12-08T09:08:57.715Z");
    }

    #[test]
    fn test_sign_request_is_deterministic() {
        let time = Utc.timestamp_millis_opt(1607418537715).unwrap();
        let (timestamp, first) = credentials()
            .sign_request(time, "GET", "/api/v5/trade/order?ordId=1&instId=A", "")
            .unwrap();
        let (_, second) = credentials()
            .sign_request(time, "GET", "/api/v5/trade/order?ordId=1&instId=A", "")
            .unwrap();
        let (_, other) = credentials()
            .sign_request(time, "POST", "/api/v5/trade/order", "{}")
            .unwrap();

        assert_eq!(timestamp, "2020-12-08T09:08:57.715Z");
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(BASE64.decode(&first).unwrap().len(), 32);
    }

    #[test]
    fn test_login_request() {
        let time = Utc.timestamp_opt(1538054050, 0).unwrap();
        let login = credentials().login_request(time).unwrap();
        let expected_sign = credentials().sign("1538054050GET/users/self/verify").unwrap();

        assert_eq!(login["op"], "login");
        assert_eq!(login["args"][0]["apiKey"], "key");
        assert_eq!(login["args"][0]["timestamp"], "1538054050");
        assert_eq!(login["args"][0]["sign"], expected_sign.as_str());
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let debug = format!("{:?}", credentials());
        assert!(!debug.contains("secret"));
        assert!(!debug.contains("pass"));
    }
}
