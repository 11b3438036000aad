pub mod reminder;
pub mod send_push;
pub mod subscription_api;
