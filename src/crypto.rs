// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Asymmetric envelopes for requests carrying signed pins.
//!
//! An envelope is a JSON object sealed to the node's secp256k1 key:
//!
//! ```text
//! {
//!   "ephemPublicKey": "0x02...",   // compressed SEC1, 33 bytes
//!   "iv":             "0x...",     // 12-byte AES-GCM nonce
//!   "ciphertext":     "0x..."      // AES-256-GCM output incl. tag
//! }
//! ```
//!
//! The AES key is `sha256(ecdh(ephemeral, node).x)`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use k256::{
    ecdh::{diffie_hellman, EphemeralSecret, SharedSecret},
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey, SecretKey,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// Errors raised while opening or sealing an envelope.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Decryption failed")]
    DecryptFailed,

    #[error("Encryption failed")]
    EncryptFailed,
}

/// Encryption collaborator used by the request pipeline.
pub trait EnvelopeCipher: Send + Sync {
    /// Open an envelope addressed to this node.
    fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Seal `plaintext` to `recipient`.
    fn encrypt(&self, plaintext: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, CryptoError>;

    /// Compressed, `0x`-prefixed public key clients seal requests to.
    fn public_key_hex(&self) -> String;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    ephem_public_key: String,
    iv: String,
    ciphertext: String,
}

/// ECIES-style cipher over the node's secp256k1 key.
pub struct EciesCipher {
    secret: SecretKey,
}

impl EciesCipher {
    pub fn new(secret: SecretKey) -> Self {
        Self { secret }
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }
}

impl EnvelopeCipher for EciesCipher {
    fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let envelope: Envelope = serde_json::from_slice(envelope)
            .map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))?;

        let ephem_bytes = decode_field("ephemPublicKey", &envelope.ephem_public_key)?;
        let ephem =
            PublicKey::from_sec1_bytes(&ephem_bytes).map_err(|_| CryptoError::InvalidPublicKey)?;

        let iv = decode_field("iv", &envelope.iv)?;
        if iv.len() != NONCE_LEN {
            return Err(CryptoError::MalformedEnvelope(format!(
                "iv must be {NONCE_LEN} bytes, got {}",
                iv.len()
            )));
        }
        let ciphertext = decode_field("ciphertext", &envelope.ciphertext)?;

        let shared = diffie_hellman(self.secret.to_nonzero_scalar(), ephem.as_affine());
        cipher_for(&shared)
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptFailed)
    }

    fn encrypt(&self, plaintext: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
        seal(plaintext, recipient)
    }

    fn public_key_hex(&self) -> String {
        alloy::hex::encode_prefixed(self.public_key().to_encoded_point(true).as_bytes())
    }
}

/// Seal `plaintext` to `recipient` with a fresh ephemeral key.
pub fn seal(plaintext: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let shared = ephemeral.diffie_hellman(recipient);

    let mut iv = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher_for(&shared)
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::EncryptFailed)?;

    let envelope = Envelope {
        ephem_public_key: alloy::hex::encode_prefixed(
            ephemeral.public_key().to_encoded_point(true).as_bytes(),
        ),
        iv: alloy::hex::encode_prefixed(iv),
        ciphertext: alloy::hex::encode_prefixed(ciphertext),
    };
    serde_json::to_vec(&envelope).map_err(|_| CryptoError::EncryptFailed)
}

fn cipher_for(shared: &SharedSecret) -> Aes256Gcm {
    let key = Sha256::digest(shared.raw_secret_bytes());
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key))
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, CryptoError> {
    alloy::hex::decode(value)
        .map_err(|e| CryptoError::MalformedEnvelope(format!("{name} is not hex: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_cipher() -> EciesCipher {
        EciesCipher::new(SecretKey::random(&mut OsRng))
    }

    #[test]
    fn sealed_envelope_opens_with_node_key() {
        let cipher = node_cipher();
        let envelope = seal(br#""0xdeadbeef""#, &cipher.public_key()).unwrap();
        let plaintext = cipher.decrypt(&envelope).unwrap();
        assert_eq!(plaintext, br#""0xdeadbeef""#);
    }

    #[test]
    fn envelope_for_other_key_fails() {
        let cipher = node_cipher();
        let other = node_cipher();
        let envelope = seal(b"hello", &other.public_key()).unwrap();
        assert!(matches!(
            cipher.decrypt(&envelope),
            Err(CryptoError::DecryptFailed)
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let cipher = node_cipher();
        assert!(matches!(
            cipher.decrypt(b"not json at all"),
            Err(CryptoError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            cipher.decrypt(br#"{"ephemPublicKey":"0x02","iv":"0x00","ciphertext":"0x00"}"#),
            Err(CryptoError::InvalidPublicKey)
        ));
    }

    #[test]
    fn public_key_hex_is_compressed() {
        let hex = node_cipher().public_key_hex();
        assert_eq!(hex.len(), 2 + 66);
        assert!(hex.starts_with("0x02") || hex.starts_with("0x03"));
    }
}
