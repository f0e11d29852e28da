use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("signing secret is too short (min {MIN_SECRET_LEN} bytes)")]
    SecretTooShort,

    #[error("invalid token format")]
    InvalidFormat,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token is expired")]
    Expired,

    #[error("failed to decode token payload")]
    PayloadDecode,

    #[error("failed to parse token payload")]
    PayloadParse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub account_id: String,
    pub session_id: String,
    pub issued_at_ms: u64,
    pub expires_at_ms: u64,
}

impl SessionClaims {
    pub fn new(
        account_id: String,
        session_id: String,
        issued_at_ms: u64,
        expires_at_ms: u64,
    ) -> Self {
        Self {
            account_id,
            session_id,
            issued_at_ms,
            expires_at_ms,
        }
    }

    pub fn is_expired(&self, reference_ms: u64) -> bool {
        reference_ms >= self.expires_at_ms
    }
}

#[derive(Clone)]
pub struct SigningService {
    secret: Arc<[u8]>,
    ttl: Duration,
}

impl SigningService {
    pub fn new(secret: Vec<u8>, ttl: Duration) -> Result<Self, SigningError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(SigningError::SecretTooShort);
        }

        Ok(Self {
            secret: Arc::<[u8]>::from(secret),
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue_session_token(
        &self,
        account_id: String,
        session_id: String,
        issued_at_ms: u64,
    ) -> Result<String, SigningError> {
        let expires_at_ms = issued_at_ms.saturating_add(self.ttl.as_millis() as u64);
        let claims = SessionClaims::new(account_id, session_id, issued_at_ms, expires_at_ms);
        self.issue(&claims)
    }

    pub fn issue(&self, claims: &SessionClaims) -> Result<String, SigningError> {
        let payload = serde_json::to_vec(claims).map_err(|_| SigningError::PayloadParse)?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
        let signature = self.sign(payload_b64.as_bytes())?;
        let signature_b64 = URL_SAFE_NO_PAD.encode(signature);
        Ok(format!("{payload_b64}.{signature_b64}"))
    }

    pub fn verify(&self, token: &str, reference_ms: u64) -> Result<SessionClaims, SigningError> {
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or(SigningError::InvalidFormat)?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| SigningError::InvalidFormat)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| SigningError::InvalidSignature)?;
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| SigningError::InvalidSignature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| SigningError::PayloadDecode)?;

        let claims: SessionClaims =
            serde_json::from_slice(&payload).map_err(|_| SigningError::PayloadParse)?;

        if claims.session_id.is_empty() || claims.is_expired(reference_ms) {
            return Err(SigningError::Expired);
        }

        Ok(claims)
    }

    fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, SigningError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| SigningError::InvalidSignature)?;
        mac.update(bytes);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Verify a webhook signature: base64url HMAC-SHA256 over the raw body.
pub fn verify_webhook_signature(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let decoded = match URL_SAFE_NO_PAD.decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&decoded).is_ok()
}

/// Produce a webhook signature; used by the smoke client and tests.
pub fn webhook_signature(secret: &[u8], body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> SigningService {
        SigningService::new(
            b"01234567890123456789012345678901".to_vec(),
            Duration::from_secs(30),
        )
        .expect("valid service")
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let service = test_service();
        let token = service
            .issue_session_token(
                "65f0c0ffee0000000000aa01".to_string(),
                "session-1".to_string(),
                1_000,
            )
            .expect("issue token");

        let claims = service.verify(&token, 1_500).expect("verify token");
        assert_eq!(claims.account_id, "65f0c0ffee0000000000aa01");
        assert_eq!(claims.session_id, "session-1");
    }

    #[test]
    fn rejects_tampered_token() {
        let service = test_service();
        let token = service
            .issue_session_token("a".to_string(), "s".to_string(), 10)
            .expect("issue token");
        let (payload, signature) = token.split_once('.').expect("token split");
        let mut chars: Vec<char> = payload.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        let tampered_payload: String = chars.into_iter().collect();
        let tampered = format!("{tampered_payload}.{signature}");

        assert!(matches!(
            service.verify(&tampered, 20),
            Err(SigningError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_expired_token() {
        let service = test_service();
        let token = service
            .issue_session_token("a".to_string(), "s".to_string(), 1_000)
            .expect("issue token");

        assert!(matches!(
            service.verify(&token, 35_000),
            Err(SigningError::Expired)
        ));
    }

    #[test]
    fn webhook_signature_roundtrip() {
        let secret = b"01234567890123456789012345678901";
        let body = br#"{"accountId":"abc","event":"subscription.activated"}"#;

        let signature = webhook_signature(secret, body).expect("signature");
        assert!(verify_webhook_signature(secret, body, &signature));
        assert!(!verify_webhook_signature(secret, b"other body", &signature));
        assert!(!verify_webhook_signature(secret, body, "not-base64!"));
    }
}
