//! Signed, expiring URLs (email verification links).
//!
//! The signature is an HMAC-SHA256 over the path and every query parameter
//! except `signature` itself, so the host the link is served from does not
//! matter.

use axum::http::Uri;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use time::OffsetDateTime;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature")]
    Missing,
    #[error("signature does not match")]
    Mismatch,
    #[error("link has expired")]
    Expired,
}

#[derive(Clone)]
pub struct UrlSigner {
    mac: HmacSha256,
}

impl UrlSigner {
    pub fn new(key: &[u8]) -> Result<Self, hmac::digest::InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(key)?,
        })
    }

    /// Append `expires` and `signature` to `path`.
    pub fn sign(&self, path: &str, expires_at: OffsetDateTime) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("expires", &expires_at.unix_timestamp().to_string())
            .finish();
        let unsigned = format!("{path}?{query}");

        let mut mac = self.mac.clone();
        mac.update(unsigned.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("{unsigned}&signature={signature}")
    }

    pub fn verify(&self, uri: &Uri) -> Result<(), SignatureError> {
        let pairs: Vec<(String, String)> = form_urlencoded::parse(uri.query().unwrap_or("").as_bytes())
            .into_owned()
            .collect();

        let signature = pairs
            .iter()
            .find(|(k, _)| k == "signature")
            .map(|(_, v)| v.as_str())
            .ok_or(SignatureError::Missing)?;
        let signature = hex::decode(signature).map_err(|_| SignatureError::Mismatch)?;

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs.iter().filter(|(k, _)| k != "signature") {
            serializer.append_pair(k, v);
        }
        let unsigned = format!("{}?{}", uri.path(), serializer.finish());

        let mut mac = self.mac.clone();
        mac.update(unsigned.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| SignatureError::Mismatch)?;

        let expires = pairs
            .iter()
            .find(|(k, _)| k == "expires")
            .and_then(|(_, v)| v.parse::<i64>().ok());
        match expires {
            Some(ts) if ts > OffsetDateTime::now_utc().unix_timestamp() => Ok(()),
            _ => Err(SignatureError::Expired),
        }
    }
}
