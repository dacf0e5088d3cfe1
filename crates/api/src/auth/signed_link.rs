//! Time-limited, tamper-evident links
//!
//! A signed link is the original URL with two parameters appended, always in
//! this order and always last:
//!
//! ```text
//! https://shop.example.com/reset-password?email=...&timestamp=1700000000&signature=<hex>
//! ```
//!
//! `timestamp` is the unix second at which the link stops being valid and
//! `signature` is HMAC-SHA256 over the exact URL string preceding
//! `&signature=`. Because the MAC covers raw bytes, reordering or re-encoding
//! any parameter invalidates the link.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_PARAM: &str = "timestamp";
pub const SIGNATURE_PARAM: &str = "signature";

const SIGNATURE_SEPARATOR: &str = "&signature=";
const SIGNATURE_HEX_LEN: usize = 64;

/// Signs and verifies expiring links with a shared secret
#[derive(Clone)]
pub struct LinkSigner {
    secret: Vec<u8>,
    validity: Duration,
}

impl LinkSigner {
    pub fn new(secret: &str, validity: Duration) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            validity,
        }
    }

    /// Sign `raw_url`, valid from now for the configured window
    pub fn sign(&self, raw_url: &str) -> Result<String, LinkError> {
        self.sign_at(raw_url, OffsetDateTime::now_utc())
    }

    /// Sign `raw_url` as if the current time were `now`
    pub fn sign_at(&self, raw_url: &str, now: OffsetDateTime) -> Result<String, LinkError> {
        let mut url = Url::parse(raw_url).map_err(|e| LinkError::InvalidUrl(e.to_string()))?;

        if url
            .query_pairs()
            .any(|(k, _)| k == TIMESTAMP_PARAM || k == SIGNATURE_PARAM)
        {
            return Err(LinkError::ReservedParameter);
        }

        url.set_fragment(None);
        let expires_at = (now + self.validity).unix_timestamp();
        url.query_pairs_mut()
            .append_pair(TIMESTAMP_PARAM, &expires_at.to_string());

        let payload = url.to_string();
        let signature = hex::encode(self.mac(payload.as_bytes())?);

        Ok(format!("{payload}{SIGNATURE_SEPARATOR}{signature}"))
    }

    /// Check a presented link's signature and expiry against the clock
    pub fn verify(&self, presented: &str) -> bool {
        self.verify_at(presented, OffsetDateTime::now_utc())
    }

    /// Check a presented link as if the current time were `now`.
    ///
    /// Never errors: anything malformed simply fails to verify.
    pub fn verify_at(&self, presented: &str, now: OffsetDateTime) -> bool {
        match self.check(presented, now) {
            Ok(()) => true,
            Err(reason) => {
                tracing::debug!(reason = %reason, "Signed link rejected");
                false
            }
        }
    }

    fn check(&self, presented: &str, now: OffsetDateTime) -> Result<(), LinkError> {
        let (payload, provided) = presented
            .rsplit_once(SIGNATURE_SEPARATOR)
            .ok_or(LinkError::MissingSignature)?;

        if provided.len() != SIGNATURE_HEX_LEN || !provided.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(LinkError::MissingSignature);
        }
        let provided = hex::decode(provided).map_err(|_| LinkError::MissingSignature)?;

        let expected = self.mac(payload.as_bytes())?;
        if !bool::from(expected.as_slice().ct_eq(&provided)) {
            return Err(LinkError::BadSignature);
        }

        let url = Url::parse(payload).map_err(|e| LinkError::InvalidUrl(e.to_string()))?;
        let mut timestamps = url
            .query_pairs()
            .filter(|(k, _)| k == TIMESTAMP_PARAM)
            .map(|(_, v)| v.into_owned());
        let expires_at: i64 = match (timestamps.next(), timestamps.next()) {
            (Some(ts), None) => ts.parse().map_err(|_| LinkError::MissingTimestamp)?,
            _ => return Err(LinkError::MissingTimestamp),
        };

        if now.unix_timestamp() > expires_at {
            return Err(LinkError::Expired);
        }

        Ok(())
    }

    fn mac(&self, payload: &[u8]) -> Result<Vec<u8>, LinkError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| LinkError::HmacInitFailed)?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("URL already carries a reserved timestamp or signature parameter")]
    ReservedParameter,
    #[error("Missing or malformed signature")]
    MissingSignature,
    #[error("Signature mismatch")]
    BadSignature,
    #[error("Missing or duplicated timestamp")]
    MissingTimestamp,
    #[error("Link has expired")]
    Expired,
    #[error("HMAC initialization failed")]
    HmacInitFailed,
}
