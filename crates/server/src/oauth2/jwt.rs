use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Claims of an issued access token. `jti` is the token row id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub jti: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// HS256 signer and verifier for access tokens.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn sign(&self, claims: &AccessClaims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
    }

    /// Verify signature and expiry. The audience is the issuing client and is
    /// not pinned here.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = 0;
        decode::<AccessClaims>(token, &self.decoding, &validation).map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn claims(exp_offset: i64) -> AccessClaims {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        AccessClaims {
            jti: "jti-1".into(),
            sub: "user-1".into(),
            aud: "client-1".into(),
            iat: now,
            exp: now + exp_offset,
            scopes: vec![],
        }
    }

    #[test]
    fn sign_and_verify() {
        let signer = TokenSigner::new(b"0123456789abcdef0123456789abcdef");
        let token = signer.sign(&claims(60)).unwrap();
        let decoded = signer.verify(&token).unwrap();
        assert_eq!(decoded.jti, "jti-1");
        assert_eq!(decoded.aud, "client-1");
    }

    #[test]
    fn rejects_expired_and_foreign_tokens() {
        let signer = TokenSigner::new(b"0123456789abcdef0123456789abcdef");
        let expired = signer.sign(&claims(-120)).unwrap();
        assert!(signer.verify(&expired).is_err());

        let other = TokenSigner::new(b"ffffffffffffffffffffffffffffffff");
        let foreign = other.sign(&claims(60)).unwrap();
        assert!(signer.verify(&foreign).is_err());
    }
}
