//! Shared fixtures for unit tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use crate::{
    configuration::{parse_configuration, AppState, Config, State},
    helpers::BASE64_URL,
    model::{DeliveryOutcome, Subscription},
    provider::PushTransport,
    types::{AUTH_SECRET_LENGTH, P256DH_LENGTH},
};

/// Answers `Sent` unless an outcome or delay was scripted for the endpoint.
#[derive(Default)]
pub struct ScriptedTransport {
    outcomes: HashMap<String, DeliveryOutcome>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn with(mut self, endpoint: &str, outcome: DeliveryOutcome) -> Self {
        self.outcomes.insert(endpoint.to_owned(), outcome);
        self
    }

    pub fn slow(mut self, endpoint: &str, delay: Duration) -> Self {
        self.delays.insert(endpoint.to_owned(), delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn deliver(
        &self,
        subscription: &Subscription,
        _payload: &[u8],
    ) -> DeliveryOutcome {
        self.calls
            .lock()
            .unwrap()
            .push(subscription.endpoint.to_owned());

        if let Some(delay) = self.delays.get(&subscription.endpoint) {
            tokio::time::sleep(*delay).await;
        }

        self.outcomes
            .get(&subscription.endpoint)
            .cloned()
            .unwrap_or(DeliveryOutcome::Sent)
    }
}

pub fn test_config(dir: &tempfile::TempDir) -> Config {
    let mut config = parse_configuration(|_| None).unwrap();
    config.subscriptions_file = dir.path().join("push_subscriptions.json");
    config.timeout = 1;
    config.store_lock_timeout = 1;
    config
}

pub fn state_with(
    transport: Option<Arc<ScriptedTransport>>,
) -> (tempfile::TempDir, AppState<State>) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    if transport.is_some() {
        config.vapid_public_key = Some(String::from("BPublicKey"));
    }

    let transport = transport.map(|t| t as Arc<dyn PushTransport>);
    let state = AppState::new(State::with_transport(config, transport));
    (dir, state)
}

/// Browser-shaped subscription JSON with correctly sized keys.
pub fn subscription_json(endpoint: &str) -> Value {
    json!({
        "endpoint": endpoint,
        "expirationTime": null,
        "keys": {
            "p256dh": BASE64_URL.encode([4u8; P256DH_LENGTH]),
            "auth": BASE64_URL.encode([9u8; AUTH_SECRET_LENGTH]),
        }
    })
}
