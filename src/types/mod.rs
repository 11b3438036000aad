pub use self::{
    push::{Claims, PushData, PushHeader, PushLink, Urgency},
    subscription::{
        required, KeysPayload, SendRequest, StatusQuery, StatusResponse,
        SubscribeRequest, SubscriptionPayload, SuccessResponse,
        UnsubscribeRequest, VapidKeyResponse, AUTH_SECRET_LENGTH,
        P256DH_LENGTH,
    },
};

mod push;
mod subscription;
