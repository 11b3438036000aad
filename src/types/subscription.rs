use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::{
    error::Error,
    helpers::BASE64_URL,
    model::{Subscription, SubscriptionKeys},
};

/// Uncompressed P-256 point: 0x04 || X || Y.
pub const P256DH_LENGTH: usize = 65;
pub const AUTH_SECRET_LENGTH: usize = 16;

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub user: Option<String>,
    pub subscription: Option<SubscriptionPayload>,
}

/// `PushSubscription.toJSON()` as sent by the browser, before validation.
#[derive(Debug, Deserialize)]
pub struct SubscriptionPayload {
    pub endpoint: Option<String>,
    pub keys: Option<KeysPayload>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct KeysPayload {
    pub p256dh: Option<String>,
    pub auth: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub user: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub user: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub user: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VapidKeyResponse {
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub subscribed: bool,
}

/// Returns the trimmed value of a mandatory request field.
pub fn required(field: &str, value: Option<String>) -> Result<String, Error> {
    match value.map(|v| v.trim().to_owned()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::ValidationError(format!("{} is required", field))),
    }
}

fn decoded_length(
    field: &str,
    value: &str,
    expected: usize,
) -> Result<(), Error> {
    let bytes = BASE64_URL.decode(value).map_err(|_| {
        Error::ValidationError(format!("{} is not base64url", field))
    })?;

    if bytes.len() != expected {
        return Err(Error::ValidationError(format!(
            "{} must decode to {} bytes, got {}",
            field,
            expected,
            bytes.len()
        )));
    }

    Ok(())
}

impl TryFrom<SubscriptionPayload> for Subscription {
    type Error = Error;

    fn try_from(payload: SubscriptionPayload) -> Result<Self, Self::Error> {
        let endpoint = required("subscription.endpoint", payload.endpoint)?;
        let url = Url::parse(&endpoint).map_err(|e| {
            Error::ValidationError(format!("subscription.endpoint: {}", e))
        })?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(Error::ValidationError(String::from(
                "subscription.endpoint must be an http(s) URL",
            )));
        }

        let keys = payload.keys.ok_or_else(|| {
            Error::ValidationError(String::from(
                "subscription.keys is required",
            ))
        })?;
        let p256dh = required("subscription.keys.p256dh", keys.p256dh)?;
        let auth = required("subscription.keys.auth", keys.auth)?;

        decoded_length("subscription.keys.p256dh", &p256dh, P256DH_LENGTH)?;
        decoded_length("subscription.keys.auth", &auth, AUTH_SECRET_LENGTH)?;

        Ok(Subscription {
            endpoint,
            keys: SubscriptionKeys { p256dh, auth },
            extra: payload.extra,
        })
    }
}
