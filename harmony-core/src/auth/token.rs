//! Compact HS256 bearer tokens

use super::{AuthError, Claims, ClaimsVerifier};
use crate::clock::Clock;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

const ALGORITHM: &str = "HS256";

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

/// Signs and verifies `header.payload.signature` tokens with a shared secret
pub struct Hs256Verifier {
    secret: Vec<u8>,
    clock: Arc<dyn Clock>,
}

impl Hs256Verifier {
    pub fn new(secret: impl Into<Vec<u8>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: secret.into(),
            clock,
        }
    }

    fn mac(&self, signing_input: &str) -> Result<Hmac<Sha256>, AuthError> {
        let mut mac = <Hmac<Sha256>>::new_from_slice(&self.secret)
            .map_err(|e| AuthError::Key(e.to_string()))?;
        mac.update(signing_input.as_bytes());
        Ok(mac)
    }

    /// Encode and sign `claims`
    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        let header = Header {
            alg: ALGORITHM.into(),
            typ: Some("JWT".into()),
        };
        let header = serde_json::to_vec(&header).map_err(|e| AuthError::Key(e.to_string()))?;
        let payload = serde_json::to_vec(claims).map_err(|e| AuthError::Key(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let signature = self.mac(&signing_input)?.finalize().into_bytes();
        Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
    }
}

fn rejected(reason: &str) -> AuthError {
    AuthError::Unauthenticated(reason.to_string())
}

impl ClaimsVerifier for Hs256Verifier {
    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let (signing_input, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| rejected("token is not three dot-separated segments"))?;
        let (header, payload) = signing_input
            .split_once('.')
            .filter(|(_, payload)| !payload.contains('.'))
            .ok_or_else(|| rejected("token is not three dot-separated segments"))?;

        let header: Header = URL_SAFE_NO_PAD
            .decode(header)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(|| rejected("malformed token header"))?;
        if header.alg != ALGORITHM {
            return Err(rejected("unsupported signing algorithm"));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| rejected("malformed token signature"))?;
        self.mac(signing_input)?
            .verify_slice(&signature)
            .map_err(|_| rejected("bad token signature"))?;

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(|| rejected("malformed token payload"))?;

        if claims.exp <= self.clock.now().as_secs() {
            return Err(rejected("token expired"));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Classify, ErrorKind};
    use crate::role::{Role, RoleMap};
    use crate::test_utils::ManualClock;
    use crate::types::Timestamp;

    const SECRET: &str = "test-secret-at-least-sixteen";

    fn claims(exp: u64) -> Claims {
        Claims {
            subject: "alice:0001".into(),
            roles: [("Test:0001".parse().unwrap(), Role::Owner)].into_iter().collect::<RoleMap>(),
            iat: 1_000,
            exp,
        }
    }

    fn verifier() -> (Hs256Verifier, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000_000)));
        (Hs256Verifier::new(SECRET, clock.clone()), clock)
    }

    #[test]
    fn test_sign_then_verify() {
        let (verifier, _) = verifier();
        let token = verifier.sign(&claims(2_000)).unwrap();
        assert_eq!(token.matches('.').count(), 2);
        assert_eq!(verifier.verify(&token).unwrap(), claims(2_000));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let (verifier, _) = verifier();
        let token = verifier.sign(&claims(2_000)).unwrap();
        let mut forged = claims(2_000);
        forged.subject = "mallory:0666".into();
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let parts: Vec<&str> = token.split('.').collect();
        let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        assert_eq!(verifier.verify(&tampered).unwrap_err().kind(), ErrorKind::Unauthenticated);
    }

    #[test]
    fn test_other_secret_rejected() {
        let (verifier, clock) = verifier();
        let token = verifier.sign(&claims(2_000)).unwrap();
        let other = Hs256Verifier::new("another-secret-of-length", clock);
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let (verifier, clock) = verifier();
        let token = verifier.sign(&claims(1_500)).unwrap();
        assert!(verifier.verify(&token).is_ok());
        clock.set(Timestamp::from_millis(1_500_000));
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let (verifier, _) = verifier();
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.??.**"] {
            assert!(verifier.verify(token).is_err(), "accepted {token:?}");
        }
    }

    #[test]
    fn test_alg_none_rejected() {
        let (verifier, _) = verifier();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims(2_000)).unwrap());
        let token = format!("{}.{}.", header, payload);
        assert!(verifier.verify(&token).is_err());
    }
}
