//! HTTP endpoints under `/api/push`.

pub mod push;
