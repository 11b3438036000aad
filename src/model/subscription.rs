use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Persisted store layout: user -> ordered subscriptions.
pub type Subscriptions = BTreeMap<String, Vec<Subscription>>;

/// One client installation. Identity is the `endpoint`; anything else the
/// browser sent along (`expirationTime` and friends) is kept untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

impl Subscription {
    pub fn new(endpoint: &str, p256dh: &str, auth: &str) -> Subscription {
        Subscription {
            endpoint: endpoint.to_owned(),
            keys: SubscriptionKeys {
                p256dh: p256dh.to_owned(),
                auth: auth.to_owned(),
            },
            extra: Map::new(),
        }
    }
}

/// Appends `subscription` unless the user already has its endpoint.
pub fn insert_unique(
    subscriptions: &mut Subscriptions,
    user: &str,
    subscription: Subscription,
) -> bool {
    let items = subscriptions.entry(user.to_owned()).or_default();

    if items.iter().any(|item| item.endpoint == subscription.endpoint) {
        return false;
    }

    items.push(subscription);
    true
}

/// Removes every subscription of `user` whose endpoint is in `endpoints`.
/// The user's entry is kept (possibly empty) so the scheduler still sees it.
pub fn remove_endpoints(
    subscriptions: &mut Subscriptions,
    user: &str,
    endpoints: &HashSet<String>,
) -> usize {
    match subscriptions.get_mut(user) {
        Some(items) => {
            let before = items.len();
            items.retain(|item| !endpoints.contains(&item.endpoint));
            before - items.len()
        },
        None => 0,
    }
}
