use tracing::info;

use crate::{
    configuration::State,
    error::Error,
    model::{DispatchResult, Subscription},
    types::{
        required, SendRequest, StatusQuery, SubscribeRequest,
        UnsubscribeRequest,
    },
};

/// Public key for `pushManager.subscribe`. Withheld unless the full key pair
/// is configured, since subscriptions made against it could never be served.
pub fn get_vapid_public_key(state: &State) -> Result<String, Error> {
    match &state.config.vapid_public_key {
        Some(key) if state.dispatcher.is_configured() => Ok(key.to_owned()),
        _ => Err(Error::ConfigMissing(String::from(
            "VAPID_PRIVATE_KEY and VAPID_PUBLIC_KEY are not both configured",
        ))),
    }
}

/// Validates and stores a browser subscription. Registering the same endpoint
/// twice is a no-op; the return value tells whether anything was added.
pub async fn subscribe(
    state: &State,
    request: SubscribeRequest,
) -> Result<bool, Error> {
    let user = required("user", request.user)?;
    let payload = request.subscription.ok_or_else(|| {
        Error::ValidationError(String::from("subscription is required"))
    })?;
    let subscription = Subscription::try_from(payload)?;

    state.store.subscribe(&user, subscription).await
}

pub async fn unsubscribe(
    state: &State,
    request: UnsubscribeRequest,
) -> Result<bool, Error> {
    let user = required("user", request.user)?;
    let endpoint = required("endpoint", request.endpoint)?;

    state.store.unsubscribe(&user, &endpoint).await
}

/// Sends a one-off push to every subscription of the user. Without a message
/// the user's reminder text is used.
pub async fn send_test(
    state: &State,
    request: SendRequest,
) -> Result<DispatchResult, Error> {
    let user = required("user", request.user)?;

    if !state.dispatcher.is_configured() {
        return Err(Error::ConfigMissing(String::from(
            "VAPID keys are not configured",
        )));
    }

    if state.store.get(&user).await.is_empty() {
        return Err(Error::NotFound(format!("no subscriptions for {}", user)));
    }

    let message = request
        .message
        .map(|m| m.trim().to_owned())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.config.message_for(&user).to_owned());

    let result = state.dispatcher.send(&user, &message).await?;
    info!(
        "Test push for {}: sent {}, failed {}",
        user, result.sent, result.failed
    );

    Ok(result)
}

pub async fn is_subscribed(
    state: &State,
    query: StatusQuery,
) -> Result<bool, Error> {
    let user = required("user", query.user)?;
    let endpoint = required("endpoint", query.endpoint)?;

    Ok(state.store.contains(&user, &endpoint).await)
}
