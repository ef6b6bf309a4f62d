//! Opaque continuation token encoding
//!
//! Layout before hex encoding: `nonce (8) | masked session id (16) | tag (16)`.
//! The id is XOR-masked with an HMAC-derived pad so tokens do not reveal
//! store identifiers, and the truncated HMAC tag rejects any mutated token.

use crate::error::{PagerError, Result};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 8;
const ID_LEN: usize = 16;
const TAG_LEN: usize = 16;
const TOKEN_LEN: usize = NONCE_LEN + ID_LEN + TAG_LEN;

/// Encodes session ids into tokens and back
pub struct TokenCodec {
    key: [u8; KEY_LEN],
}

impl TokenCodec {
    /// Create a codec with an explicit key
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Create a codec with a fresh process-local key
    pub fn random() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// Encode a session id into an opaque token
    pub fn encode(&self, session_id: &Uuid) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let pad = self.pad(&nonce)?;
        let mut masked = *session_id.as_bytes();
        for (byte, p) in masked.iter_mut().zip(pad.iter()) {
            *byte ^= p;
        }

        let mut mac = self.mac()?;
        mac.update(b"tag");
        mac.update(&nonce);
        mac.update(&masked);
        let tag = mac.finalize().into_bytes();

        let mut raw = Vec::with_capacity(TOKEN_LEN);
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&masked);
        raw.extend_from_slice(&tag[..TAG_LEN]);

        Ok(hex::encode(raw))
    }

    /// Decode a token back into a session id.
    ///
    /// Returns `None` for anything that was not produced by this codec.
    pub fn decode(&self, token: &str) -> Option<Uuid> {
        let raw = hex::decode(token.trim()).ok()?;
        if raw.len() != TOKEN_LEN {
            return None;
        }

        let (nonce, rest) = raw.split_at(NONCE_LEN);
        let (masked, tag) = rest.split_at(ID_LEN);

        let mut mac = self.mac().ok()?;
        mac.update(b"tag");
        mac.update(nonce);
        mac.update(masked);
        mac.verify_truncated_left(tag).ok()?;

        let pad = self.pad(nonce).ok()?;
        let mut id = [0u8; ID_LEN];
        for (i, byte) in id.iter_mut().enumerate() {
            *byte = masked[i] ^ pad[i];
        }

        Some(Uuid::from_bytes(id))
    }

    fn pad(&self, nonce: &[u8]) -> Result<[u8; ID_LEN]> {
        let mut mac = self.mac()?;
        mac.update(b"mask");
        mac.update(nonce);
        let digest = mac.finalize().into_bytes();

        let mut pad = [0u8; ID_LEN];
        pad.copy_from_slice(&digest[..ID_LEN]);
        Ok(pad)
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| PagerError::Internal(format!("Invalid token key: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let codec = TokenCodec::random();
        let id = Uuid::new_v4();

        let token = codec.encode(&id).unwrap();
        assert_eq!(token.len(), TOKEN_LEN * 2);
        assert_eq!(codec.decode(&token), Some(id));
    }

    #[test]
    fn test_token_hides_session_id() {
        let codec = TokenCodec::random();
        let id = Uuid::new_v4();
        let token = codec.encode(&id).unwrap();

        assert!(!token.contains(&id.simple().to_string()));
        // Fresh nonce per encoding
        assert_ne!(token, codec.encode(&id).unwrap());
    }

    #[test]
    fn test_mutated_token_rejected() {
        let codec = TokenCodec::random();
        let token = codec.encode(&Uuid::new_v4()).unwrap();

        for position in [0, 17, 30, token.len() - 1] {
            let mut bytes = token.clone().into_bytes();
            bytes[position] = if bytes[position] == b'0' { b'1' } else { b'0' };
            let mutated = String::from_utf8(bytes).unwrap();
            assert_eq!(codec.decode(&mutated), None, "position {}", position);
        }
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let codec = TokenCodec::random();
        assert_eq!(codec.decode(""), None);
        assert_eq!(codec.decode("not-a-token"), None);
        assert_eq!(codec.decode("abcd"), None);
        assert_eq!(codec.decode(&"0".repeat(TOKEN_LEN * 2)), None);
    }

    #[test]
    fn test_token_from_other_key_rejected() {
        let issuer = TokenCodec::new([7u8; KEY_LEN]);
        let verifier = TokenCodec::new([9u8; KEY_LEN]);
        let token = issuer.encode(&Uuid::new_v4()).unwrap();
        assert_eq!(verifier.decode(&token), None);
    }
}
