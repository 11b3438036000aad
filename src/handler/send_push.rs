use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use tokio::{sync::Semaphore, time};
use tracing::{info, warn};

use crate::{
    configuration::{Config, Notification},
    dao::SubscriptionStore,
    error::Error,
    model::{DeliveryOutcome, DispatchResult, DispatchTally, Subscription},
    provider::PushTransport,
    types::{PushData, PushLink},
};

/// Sends one message to every subscription of a user and prunes the ones the
/// push service reports as gone.
pub struct PushDispatcher {
    store: Arc<SubscriptionStore>,
    transport: Option<Arc<dyn PushTransport>>,
    push_permits: Arc<Semaphore>,
    timeout: Duration,
    notification: Notification,
}

impl PushDispatcher {
    pub fn new(
        store: Arc<SubscriptionStore>,
        transport: Option<Arc<dyn PushTransport>>,
        config: &Config,
    ) -> PushDispatcher {
        PushDispatcher {
            store,
            transport,
            push_permits: Arc::new(Semaphore::new(config.max_tasks)),
            timeout: Duration::from_secs(config.timeout),
            notification: config.notification.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    pub fn payload(&self, user: &str, message: &str) -> PushData {
        PushData {
            title: self.notification.title.to_owned(),
            body: message.to_owned(),
            icon: self.notification.icon.to_owned(),
            badge: self.notification.badge.to_owned(),
            tag: self.notification.tag.to_owned(),
            data: PushLink {
                url: format!("/{}", user),
            },
        }
    }

    pub async fn send(
        &self,
        user: &str,
        message: &str,
    ) -> Result<DispatchResult, Error> {
        let transport = self.transport.as_ref().ok_or_else(|| {
            Error::ConfigMissing(String::from("VAPID keys are not configured"))
        })?;

        let items = self.store.get(user).await;
        if items.is_empty() {
            info!("No subscriptions for {}", user);
            return Ok(DispatchResult::default());
        }

        let payload = self.payload(user, message).to_string().into_bytes();

        let outcomes = join_all(items.iter().map(|subscription| {
            self.deliver(transport.as_ref(), subscription, &payload)
        }))
        .await;

        let mut tally = DispatchTally::default();
        for (subscription, outcome) in items.iter().zip(outcomes.iter()) {
            match outcome {
                DeliveryOutcome::Sent => info!("Push sent to {}", user),
                DeliveryOutcome::TransientFailure { reason } => {
                    warn!("Push to {} failed: {}", user, reason)
                },
                DeliveryOutcome::PermanentFailure { status } => warn!(
                    "Push to {} rejected with {}, subscription expired",
                    user, status
                ),
            }
            tally.record(&subscription.endpoint, outcome);
        }

        if !tally.expired.is_empty() {
            let removed = self.store.prune_many(user, &tally.expired).await?;
            info!("Removed {} expired subscriptions of {}", removed, user);
        }

        Ok(tally.result)
    }

    async fn deliver(
        &self,
        transport: &dyn PushTransport,
        subscription: &Subscription,
        payload: &[u8],
    ) -> DeliveryOutcome {
        let _permit = match self.push_permits.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return DeliveryOutcome::TransientFailure {
                    reason: e.to_string(),
                }
            },
        };

        match time::timeout(self.timeout, transport.deliver(subscription, payload))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => DeliveryOutcome::TransientFailure {
                reason: format!("timed out after {:?}", self.timeout),
            },
        }
    }
}
