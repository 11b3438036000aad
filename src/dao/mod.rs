mod lock;
mod subscription;

pub use lock::{lock_path, StoreLock};
pub use subscription::SubscriptionStore;
