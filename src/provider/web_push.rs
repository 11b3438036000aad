use async_trait::async_trait;
use base64::Engine;
use tracing::debug;

use crate::{
    configuration::Config,
    error::Error,
    helpers::BASE64_URL,
    model::{DeliveryOutcome, Subscription},
    types::PushHeader,
};

use super::{Vapid, VapidKeys, HTTP};

/// Delivers one already-serialized notification to one subscription.
///
/// Implementations never fail: every problem is folded into a
/// [`DeliveryOutcome`] so a single bad endpoint cannot abort a cycle.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        subscription: &Subscription,
        payload: &[u8],
    ) -> DeliveryOutcome;
}

/// Signed HTTPS web push (VAPID + aes128gcm).
pub struct WebPush {
    http: HTTP,
    vapid: Vapid,
    push_header: PushHeader,
    status_code_to_delete: Vec<u16>,
}

impl WebPush {
    pub fn new(config: &Config, keys: &VapidKeys) -> Result<WebPush, Error> {
        Ok(WebPush {
            http: HTTP::new(config.timeout)?,
            vapid: Vapid::new(keys, &config.vapid_subject)?,
            push_header: PushHeader {
                ttl: config.push_ttl,
                urgency: config.push_urgency,
            },
            status_code_to_delete: config.status_code_to_delete.clone(),
        })
    }

    async fn post(
        &self,
        subscription: &Subscription,
        payload: &[u8],
    ) -> Result<u16, Error> {
        let token = self.vapid.sign(&subscription.endpoint)?;

        let p256dh = BASE64_URL.decode(&subscription.keys.p256dh)?;
        let auth = BASE64_URL.decode(&subscription.keys.auth)?;
        let data = ece::encrypt(&p256dh, &auth, payload)?;

        self.http
            .post_push(
                &subscription.endpoint,
                self.vapid.authorization(&token),
                &self.push_header,
                data,
            )
            .await
    }
}

#[async_trait]
impl PushTransport for WebPush {
    async fn deliver(
        &self,
        subscription: &Subscription,
        payload: &[u8],
    ) -> DeliveryOutcome {
        match self.post(subscription, payload).await {
            Ok(status) => {
                debug!("Push service answered {}", status);
                classify_status(status, &self.status_code_to_delete)
            },
            Err(e) => DeliveryOutcome::TransientFailure {
                reason: e.to_string(),
            },
        }
    }
}

pub fn classify_status(status: u16, status_code_to_delete: &[u16]) -> DeliveryOutcome {
    if (200..300).contains(&status) {
        return DeliveryOutcome::Sent;
    }

    if status_code_to_delete.contains(&status) {
        return DeliveryOutcome::PermanentFailure { status };
    }

    DeliveryOutcome::TransientFailure {
        reason: format!("push service responded with {}", status),
    }
}
