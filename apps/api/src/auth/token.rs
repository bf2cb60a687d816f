//! Bearer tokens: compact HS256 JWTs signed with the server secret.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::auth::AuthError;

type HmacSha256 = Hmac<Sha256>;

const HEADER_JSON: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Account email at issue time.
    pub sub: String,
    pub uid: Uuid,
    /// Expiry, unix seconds.
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct Header {
    alg: String,
}

#[derive(Clone)]
pub struct TokenKeys {
    secret: Arc<[u8]>,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            secret: Arc::from(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<String, AuthError> {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: email.to_string(),
            uid: user_id,
            exp: Utc::now().timestamp().saturating_add(ttl),
        };
        self.encode(&claims)
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        let header = URL_SAFE_NO_PAD.encode(HEADER_JSON);
        let payload = serde_json::to_vec(claims).map_err(|_| AuthError::InvalidToken)?;
        let signing_input = format!("{header}.{}", URL_SAFE_NO_PAD.encode(payload));
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&signing_input)?.finalize().into_bytes());
        Ok(format!("{signing_input}.{signature}"))
    }

    /// Checks signature, algorithm and expiry, in that order.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::InvalidToken);
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::InvalidToken)?;
        self.mac(&format!("{header}.{payload}"))?
            .verify_slice(&signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let header: Header = decode_segment(header)?;
        if header.alg != "HS256" {
            return Err(AuthError::InvalidToken);
        }

        let claims: Claims = decode_segment(payload)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::ExpiredToken);
        }
        Ok(claims)
    }

    fn mac(&self, signing_input: &str) -> Result<HmacSha256, AuthError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| AuthError::InvalidToken)?;
        mac.update(signing_input.as_bytes());
        Ok(mac)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::InvalidToken)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::InvalidToken)
}
