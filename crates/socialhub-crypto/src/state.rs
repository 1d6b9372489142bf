use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as B64URL};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// How long a connection attempt may take between redirect and callback.
pub const STATE_TTL_MILLIS: i64 = 10 * 60 * 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("malformed state parameter")]
    Malformed,
    #[error("state signature mismatch")]
    BadSignature,
    #[error("state parameter expired")]
    Expired,
}

/// Issues and checks OAuth `state` values of the form
/// `{user_id}_{epoch_millis}.{signature}`.
///
/// The signature is HMAC-SHA256 over `{user_id}_{epoch_millis}`, so the user
/// id recovered in an unauthenticated callback is the one the server handed
/// out and not one picked by the caller.
#[derive(Clone)]
pub struct StateSigner {
    mac: HmacSha256,
}

impl StateSigner {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid state signing key: {}", e))?;
        Ok(Self { mac })
    }

    pub fn issue(&self, user_id: &str, now_millis: i64) -> String {
        let payload = format!("{}_{}", user_id, now_millis);
        let signature = B64URL.encode(self.mac(&payload).finalize().into_bytes());
        format!("{}.{}", payload, signature)
    }

    /// Verify `state` and return the user id it was issued for.
    pub fn verify(&self, state: &str, now_millis: i64) -> Result<String, StateError> {
        let (payload, signature) = state.rsplit_once('.').ok_or(StateError::Malformed)?;
        let signature = B64URL.decode(signature).map_err(|_| StateError::Malformed)?;

        self.mac(payload)
            .verify_slice(&signature)
            .map_err(|_| StateError::BadSignature)?;

        let (user_id, issued_at) = payload.split_once('_').ok_or(StateError::Malformed)?;
        let issued_at: i64 = issued_at.parse().map_err(|_| StateError::Malformed)?;
        if user_id.is_empty() {
            return Err(StateError::Malformed);
        }
        if now_millis - issued_at > STATE_TTL_MILLIS || issued_at > now_millis + STATE_TTL_MILLIS {
            return Err(StateError::Expired);
        }

        Ok(user_id.to_string())
    }

    fn mac(&self, payload: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn issued_state_recovers_user() {
        let signer = StateSigner::new("secret").unwrap();
        let state = signer.issue("4f9c2a1e-user", NOW);
        assert!(state.starts_with("4f9c2a1e-user_1700000000000."));
        assert_eq!(signer.verify(&state, NOW + 1000).unwrap(), "4f9c2a1e-user");
    }

    #[test]
    fn forged_user_id_is_rejected() {
        let signer = StateSigner::new("secret").unwrap();
        let state = signer.issue("alice", NOW);
        let forged = state.replacen("alice", "mallory", 1);
        assert_eq!(signer.verify(&forged, NOW), Err(StateError::BadSignature));

        let unsigned = format!("mallory_{}", NOW);
        assert_eq!(signer.verify(&unsigned, NOW), Err(StateError::Malformed));
    }

    #[test]
    fn other_key_is_rejected() {
        let state = StateSigner::new("secret").unwrap().issue("alice", NOW);
        assert_eq!(
            StateSigner::new("other").unwrap().verify(&state, NOW),
            Err(StateError::BadSignature)
        );
    }

    #[test]
    fn stale_state_is_rejected() {
        let signer = StateSigner::new("secret").unwrap();
        let state = signer.issue("alice", NOW);
        assert_eq!(
            signer.verify(&state, NOW + STATE_TTL_MILLIS + 1),
            Err(StateError::Expired)
        );
    }
}
