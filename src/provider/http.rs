use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client,
};
use std::str::FromStr;
use std::time::Duration;

use crate::{error::Error, types::PushHeader};

const USER_AGENT: &str = "push-reminder";

#[derive(Debug, Clone)]
pub struct HTTP {
    pub http: Client,
}

impl HTTP {
    pub fn new(timeout: u64) -> Result<HTTP, Error> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;

        Ok(HTTP { http })
    }

    /// Posts an aes128gcm encrypted body to a push endpoint and returns the
    /// response status; classification is up to the caller.
    pub async fn post_push(
        &self,
        url: &str,
        authorization: String,
        push_header: &PushHeader,
        data: Vec<u8>,
    ) -> Result<u16, Error> {
        let mut header_map = HeaderMap::new();

        header_map.insert(
            HeaderName::from_str("user-agent")?,
            HeaderValue::from_str(USER_AGENT)?,
        );
        header_map.insert(
            HeaderName::from_str("authorization")?,
            HeaderValue::from_str(&authorization)?,
        );
        header_map.insert(
            HeaderName::from_str("content-encoding")?,
            HeaderValue::from_str("aes128gcm")?,
        );
        header_map.insert(
            HeaderName::from_str("content-type")?,
            HeaderValue::from_str("application/octet-stream")?,
        );
        header_map.insert(
            HeaderName::from_str("ttl")?,
            HeaderValue::from_str(&push_header.ttl.to_string())?,
        );
        header_map.insert(
            HeaderName::from_str("urgency")?,
            HeaderValue::from_str(&push_header.urgency.to_string())?,
        );

        let response = self
            .http
            .post(url)
            .headers(header_map)
            .body(data)
            .send()
            .await?;
        let status = response.status().as_u16();

        Ok(status)
    }
}
