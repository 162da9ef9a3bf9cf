// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Node key loading.
//!
//! The node holds a single secp256k1 key. It signs the node's own
//! presence-verification transactions and opens the envelopes clients seal
//! to it. The key is supplied either as hex or as a PEM file (SEC1 or PKCS#8).

use alloy::signers::local::PrivateKeySigner;
use k256::SecretKey;

use super::client::ChainError;

/// The node's key in both of its uses.
pub struct NodeKey {
    pub signer: PrivateKeySigner,
    pub secret: SecretKey,
}

impl NodeKey {
    /// Load from a hex private key, with or without `0x`.
    pub fn from_hex(private_key_hex: &str) -> Result<Self, ChainError> {
        let key_bytes = alloy::hex::decode(private_key_hex.trim())
            .map_err(|e| ChainError::InvalidPrivateKey(e.to_string()))?;

        let secret = SecretKey::from_slice(&key_bytes)
            .map_err(|e| ChainError::InvalidPrivateKey(e.to_string()))?;
        let signer = PrivateKeySigner::from_slice(&key_bytes)
            .map_err(|e| ChainError::InvalidPrivateKey(e.to_string()))?;

        Ok(Self { signer, secret })
    }

    /// Load from PEM-encoded key bytes.
    pub fn from_pem(pem_bytes: &[u8]) -> Result<Self, ChainError> {
        Self::from_hex(&pem_to_hex(pem_bytes)?)
    }
}

/// Parse a private key from PEM format to hex string.
///
/// # Returns
/// * `Ok(String)` - Hex-encoded private key (64 characters, no 0x prefix)
/// * `Err(ChainError)` - If PEM parsing fails
pub fn pem_to_hex(pem_bytes: &[u8]) -> Result<String, ChainError> {
    let pem_str = std::str::from_utf8(pem_bytes)
        .map_err(|e| ChainError::InvalidPrivateKey(format!("Invalid UTF-8: {}", e)))?;

    let pem = pem::parse(pem_str)
        .map_err(|e| ChainError::InvalidPrivateKey(format!("Invalid PEM: {}", e)))?;

    let secret_key = SecretKey::from_sec1_der(pem.contents())
        .or_else(|_| parse_pkcs8_to_secret_key(pem.contents()))
        .map_err(|e| ChainError::InvalidPrivateKey(format!("Invalid key format: {}", e)))?;

    Ok(alloy::hex::encode(secret_key.to_bytes()))
}

fn parse_pkcs8_to_secret_key(der: &[u8]) -> Result<SecretKey, String> {
    use k256::pkcs8::DecodePrivateKey;
    SecretKey::from_pkcs8_der(der).map_err(|e| e.to_string())
}
