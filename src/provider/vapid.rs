use std::fmt;

use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use url::Url;

use crate::{error::Error, helpers::BASE64_URL, types::Claims};

pub const PRIVATE_KEY_LENGTH: usize = 32;
pub const PUBLIC_KEY_LENGTH: usize = 65;

/// Push services reject tokens that live longer than 24h.
const TOKEN_TTL_SECONDS: i64 = 12 * 60 * 60;

// PKCS#8 envelope for a P-256 key (RFC 5208 + RFC 5915) with the public key
// attached, which is the only EC form the signer accepts.
const PKCS8_PREFIX: [u8; 36] = [
    0x30, 0x81, 0x87, 0x02, 0x01, 0x00, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86,
    0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d,
    0x03, 0x01, 0x07, 0x04, 0x6d, 0x30, 0x6b, 0x02, 0x01, 0x01, 0x04, 0x20,
];
const PKCS8_PUBLIC_KEY_TAG: [u8; 5] = [0xa1, 0x44, 0x03, 0x42, 0x00];

/// Raw application server key pair as produced by the key generator:
/// a 32-byte scalar and a 65-byte uncompressed point, both base64url.
#[derive(Clone)]
pub struct VapidKeys {
    private_key: Vec<u8>,
    public_key: Vec<u8>,
    public_key_b64: String,
}

impl fmt::Debug for VapidKeys {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VapidKeys")
            .field("public_key", &self.public_key_b64)
            .finish_non_exhaustive()
    }
}

impl VapidKeys {
    pub fn from_base64(private_key: &str, public_key: &str) -> Result<Self, Error> {
        let private = BASE64_URL.decode(private_key.trim()).map_err(|e| {
            Error::ConfigurationError(format!("VAPID_PRIVATE_KEY: {}", e))
        })?;
        let public = BASE64_URL.decode(public_key.trim()).map_err(|e| {
            Error::ConfigurationError(format!("VAPID_PUBLIC_KEY: {}", e))
        })?;

        if private.len() != PRIVATE_KEY_LENGTH {
            return Err(Error::ConfigurationError(format!(
                "VAPID_PRIVATE_KEY must be {} bytes, got {}",
                PRIVATE_KEY_LENGTH,
                private.len()
            )));
        }

        if public.len() != PUBLIC_KEY_LENGTH || public[0] != 0x04 {
            return Err(Error::ConfigurationError(format!(
                "VAPID_PUBLIC_KEY must be a {} byte uncompressed point",
                PUBLIC_KEY_LENGTH
            )));
        }

        Ok(VapidKeys {
            public_key_b64: BASE64_URL.encode(&public),
            private_key: private,
            public_key: public,
        })
    }

    pub fn public_key(&self) -> &str {
        &self.public_key_b64
    }

    pub fn to_pkcs8_der(&self) -> Vec<u8> {
        let mut der = Vec::with_capacity(
            PKCS8_PREFIX.len()
                + PRIVATE_KEY_LENGTH
                + PKCS8_PUBLIC_KEY_TAG.len()
                + PUBLIC_KEY_LENGTH,
        );
        der.extend_from_slice(&PKCS8_PREFIX);
        der.extend_from_slice(&self.private_key);
        der.extend_from_slice(&PKCS8_PUBLIC_KEY_TAG);
        der.extend_from_slice(&self.public_key);
        der
    }
}

/// Signs the short-lived identity token sent with every push.
#[derive(Clone)]
pub struct Vapid {
    key: EncodingKey,
    public_key: String,
    subject: String,
}

impl Vapid {
    /// Builds the signer and signs a throwaway token, so a scalar that does not
    /// match its public key fails at startup rather than on the first push.
    pub fn new(keys: &VapidKeys, subject: &str) -> Result<Vapid, Error> {
        let vapid = Vapid {
            key: EncodingKey::from_ec_der(&keys.to_pkcs8_der()),
            public_key: keys.public_key().to_owned(),
            subject: subject.to_owned(),
        };

        vapid.sign("https://localhost").map_err(|e| {
            Error::ConfigurationError(format!("VAPID key pair rejected: {}", e))
        })?;

        Ok(vapid)
    }

    pub fn sign(&self, endpoint: &str) -> Result<String, Error> {
        let claims = Claims {
            aud: audience(endpoint)?,
            sub: self.subject.to_owned(),
            exp: Utc::now().timestamp() + TOKEN_TTL_SECONDS,
        };

        let token = encode(&Header::new(Algorithm::ES256), &claims, &self.key)?;
        Ok(token)
    }

    /// `Authorization` header value (RFC 8292).
    pub fn authorization(&self, token: &str) -> String {
        format!("vapid t={}, k={}", token, self.public_key)
    }
}

/// Origin of the push service, the `aud` claim.
pub fn audience(endpoint: &str) -> Result<String, Error> {
    let url = Url::parse(endpoint)?;

    if !matches!(url.scheme(), "https" | "http") || url.host().is_none() {
        return Err(Error::InvalidOption {
            option: String::from("host"),
        });
    }

    Ok(url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> VapidKeys {
        let mut public = [7u8; PUBLIC_KEY_LENGTH];
        public[0] = 0x04;
        VapidKeys::from_base64(
            &BASE64_URL.encode([1u8; PRIVATE_KEY_LENGTH]),
            &BASE64_URL.encode(public),
        )
        .unwrap()
    }

    #[test]
    fn test_audience_is_endpoint_origin() {
        assert_eq!(
            audience("https://fcm.googleapis.com/fcm/send/abc").unwrap(),
            "https://fcm.googleapis.com"
        );
        assert_eq!(
            audience("https://push.example:8443/x?y=1").unwrap(),
            "https://push.example:8443"
        );
        assert!(audience("mailto:someone@example.com").is_err());
        assert!(audience("not a url").is_err());
    }

    #[test]
    fn test_key_lengths_are_checked() {
        let public = BASE64_URL.encode([4u8; PUBLIC_KEY_LENGTH]);
        let err = VapidKeys::from_base64(&BASE64_URL.encode([1u8; 31]), &public)
            .unwrap_err();
        assert!(err.to_string().contains("32 bytes"), "{}", err);

        let err = VapidKeys::from_base64(
            &BASE64_URL.encode([1u8; PRIVATE_KEY_LENGTH]),
            &BASE64_URL.encode([5u8; PUBLIC_KEY_LENGTH]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigurationError(_)));
    }

    #[test]
    fn test_pkcs8_layout() {
        let keys = keys();
        let der = keys.to_pkcs8_der();

        // SEQUENCE of 0x87 content bytes plus its 3-byte header.
        assert_eq!(der.len(), 0x87 + 3);
        assert_eq!(&der[..PKCS8_PREFIX.len()], &PKCS8_PREFIX);
        assert_eq!(&der[36..68], &[1u8; PRIVATE_KEY_LENGTH]);
        assert_eq!(der[73], 0x04);
    }

    #[test]
    fn test_debug_hides_private_key() {
        let text = format!("{:?}", keys());
        assert!(text.contains("public_key"));
        assert!(!text.contains("private_key"));
    }
}
