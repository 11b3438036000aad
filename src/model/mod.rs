//! Domain models
//!
//! Subscriptions as they are persisted, and the outcome types the
//! dispatcher folds delivery attempts into.

mod dispatch;
mod subscription;

pub use dispatch::{DeliveryOutcome, DispatchResult, DispatchTally};
pub use subscription::{
    insert_unique, remove_endpoints, Subscription, SubscriptionKeys,
    Subscriptions,
};
