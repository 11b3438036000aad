pub use self::{
    http::HTTP,
    vapid::{audience, Vapid, VapidKeys, PRIVATE_KEY_LENGTH, PUBLIC_KEY_LENGTH},
    web_push::{classify_status, PushTransport, WebPush},
};

mod http;
mod vapid;
mod web_push;
