// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Request Validation
//!
//! Stateless decrypt/parse/validate functions applied to every inbound write.
//! Each returns `Result<T, ResponseCode>`: a value is either fully validated or
//! rejected with the code the peer will see. Nothing here panics on input.
//!
//! ## Signed pins
//!
//! A signed pin arrives in one of two shapes:
//!
//! - components: `{"v": 27, "r": <bytes>, "s": <bytes>}` where bytes are a
//!   `0x` hex string, a plain byte array or a `{"type":"Buffer","data":[..]}`
//!   object
//! - packed: `"0x" + r || s || v` (65 bytes)
//!
//! The signer is recovered as an EIP-191 personal-message signature over the
//! pin, first against the current pin and then against the previous one.

use std::str::FromStr;

use alloy::{
    consensus::{transaction::SignerRecoverable, Transaction, TxEnvelope},
    eips::eip2718::Decodable2718,
    primitives::{Address, Bytes, Signature, B256, U256},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::codes::{ResponseCode, ADDRESS_LEN, TX_HASH_LEN};
use crate::crypto::EnvelopeCipher;
use crate::session::PinSnapshot;

/// Base cost of any transaction.
pub const TX_BASE_GAS: u64 = 21_000;
/// Extra cost of a contract-creation transaction.
pub const TX_CREATE_GAS: u64 = 32_000;
const TX_DATA_ZERO_GAS: u64 = 4;
const TX_DATA_NON_ZERO_GAS: u64 = 16;

const PACKED_SIGNATURE_LEN: usize = 65;

// =============================================================================
// Signed pin
// =============================================================================

/// A signature over a session pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedToken {
    /// Recoverable components with binary `r` and `s`.
    Components { v: u64, r: B256, s: B256 },
    /// Packed 65-byte `r || s || v` signature.
    Packed(Bytes),
}

impl SignedToken {
    /// Decode into an alloy signature, if the components are well formed.
    pub fn signature(&self) -> Option<Signature> {
        match self {
            SignedToken::Components { v, r, s } => {
                let parity = y_parity(*v)?;
                Some(Signature::new(
                    U256::from_be_bytes(r.0),
                    U256::from_be_bytes(s.0),
                    parity,
                ))
            }
            SignedToken::Packed(bytes) => Signature::from_raw(bytes).ok(),
        }
    }

    /// Packed `0x` hex form of the signature.
    pub fn to_hex(&self) -> Option<String> {
        self.signature()
            .map(|sig| alloy::hex::encode_prefixed(sig.as_bytes()))
    }
}

fn y_parity(v: u64) -> Option<bool> {
    match v {
        0 | 27 => Some(false),
        1 | 28 => Some(true),
        // EIP-155 encoded v
        v if v >= 35 => Some((v - 35) % 2 == 1),
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ByteField {
    Hex(String),
    Raw(Vec<u8>),
    Buffer { data: Vec<u8> },
}

impl ByteField {
    fn into_word(self) -> Option<B256> {
        let bytes = match self {
            ByteField::Hex(s) => {
                if !s.starts_with("0x") {
                    return None;
                }
                alloy::hex::decode(&s).ok()?
            }
            ByteField::Raw(bytes) | ByteField::Buffer { data: bytes } => bytes,
        };
        if bytes.is_empty() || bytes.len() > 32 {
            return None;
        }
        Some(B256::left_padding_from(&bytes))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecoveryField {
    Number(u64),
    Hex(String),
}

impl RecoveryField {
    fn value(&self) -> Option<u64> {
        match self {
            RecoveryField::Number(v) => Some(*v),
            RecoveryField::Hex(s) => {
                let digits = s.strip_prefix("0x")?;
                u64::from_str_radix(digits, 16).ok()
            }
        }
    }
}

#[derive(Deserialize)]
struct RawComponents {
    v: RecoveryField,
    r: ByteField,
    s: ByteField,
}

// =============================================================================
// Decrypt + JSON
// =============================================================================

/// Open an encrypted request envelope.
pub fn decrypt(cipher: &dyn EnvelopeCipher, envelope: &[u8]) -> Result<Vec<u8>, ResponseCode> {
    cipher.decrypt(envelope).map_err(|e| {
        debug!(error = %e, "Envelope rejected");
        ResponseCode::DecryptionFailed
    })
}

/// Parse a request body as JSON.
pub fn parse_json(data: &[u8]) -> Result<Value, ResponseCode> {
    serde_json::from_slice(data).map_err(|_| ResponseCode::InvalidJson)
}

/// A signed pin, optionally with the address the client claims to sign as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub token: SignedToken,
    pub claimed: Option<Address>,
}

/// Parse a pin-only request: a bare signed pin or `{"pin": .., "address": ..}`.
pub fn parse_signed_request(data: &[u8]) -> Result<SignedRequest, ResponseCode> {
    let value = parse_json(data)?;
    let Some(pin) = value.get("pin") else {
        return Ok(SignedRequest {
            token: signed_token_from_value(&value)?,
            claimed: None,
        });
    };
    let token = signed_token_from_value(pin)?;
    let claimed = claimed_address(&value)?;
    Ok(SignedRequest { token, claimed })
}

/// The optional `address` field of a request object.
pub fn claimed_address(value: &Value) -> Result<Option<Address>, ResponseCode> {
    match value.get("address") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if is_valid_address(s) => Address::from_str(s)
            .map(Some)
            .map_err(|_| ResponseCode::NoTxAddress),
        Some(_) => Err(ResponseCode::NoTxAddress),
    }
}

/// Interpret an already parsed JSON value as a signed pin.
pub fn signed_token_from_value(value: &Value) -> Result<SignedToken, ResponseCode> {
    match value {
        Value::String(s) => {
            if !s.starts_with("0x") {
                return Err(ResponseCode::NoSignedMessage);
            }
            let bytes = alloy::hex::decode(s).map_err(|_| ResponseCode::NoSignedMessage)?;
            if bytes.len() != PACKED_SIGNATURE_LEN {
                return Err(ResponseCode::NoSignedMessage);
            }
            Ok(SignedToken::Packed(bytes.into()))
        }
        Value::Object(_) => {
            let raw: RawComponents = serde_json::from_value(value.clone())
                .map_err(|_| ResponseCode::NoSignedMessage)?;
            let v = raw.v.value().ok_or(ResponseCode::NoSignedMessage)?;
            let r = raw.r.into_word().ok_or(ResponseCode::NoSignedMessage)?;
            let s = raw.s.into_word().ok_or(ResponseCode::NoSignedMessage)?;
            Ok(SignedToken::Components { v, r, s })
        }
        _ => Err(ResponseCode::NoSignedMessage),
    }
}

// =============================================================================
// Signer recovery
// =============================================================================

/// Recover the address that signed `message` as a personal message.
pub fn recover(message: &str, token: &SignedToken) -> Option<Address> {
    token
        .signature()?
        .recover_address_from_msg(message.as_bytes())
        .ok()
}

/// Addresses recovered against the current and previous pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signers {
    pub current: Option<Address>,
    pub previous: Option<Address>,
}

impl Signers {
    /// Pick the first signer `accept` agrees with, current pin first.
    ///
    /// When no signer is accepted the error of the first attempt is returned.
    pub fn resolve<T>(
        &self,
        mut accept: impl FnMut(Address) -> Result<T, ResponseCode>,
    ) -> Result<(Address, T), ResponseCode> {
        let mut first_error = None;
        for candidate in [self.current, self.previous].into_iter().flatten() {
            match accept(candidate) {
                Ok(value) => return Ok((candidate, value)),
                Err(code) => {
                    first_error.get_or_insert(code);
                }
            }
        }
        Err(first_error.unwrap_or(ResponseCode::NoSignedMessage))
    }

    /// Current signer, falling back to the previous one.
    pub fn primary(&self) -> Option<Address> {
        self.current.or(self.previous)
    }

    /// Decide which recovered address actually signed.
    ///
    /// Recovery against the wrong pin still yields an address, just an
    /// unrelated one, so the two candidates are told apart by evidence:
    ///
    /// - a `claimed` address must equal one of the candidates, else
    ///   `NoSignedMessage`
    /// - without a claim, the previous-pin signer is chosen only when it is
    ///   `known` and the current-pin signer is not
    /// - otherwise the current-pin signer wins
    pub fn identify(
        &self,
        claimed: Option<Address>,
        known: impl Fn(Address) -> bool,
    ) -> Result<Address, ResponseCode> {
        if let Some(claimed) = claimed {
            return [self.current, self.previous]
                .into_iter()
                .flatten()
                .find(|candidate| *candidate == claimed)
                .ok_or(ResponseCode::NoSignedMessage);
        }
        match (self.current, self.previous) {
            (Some(current), Some(previous)) if !known(current) && known(previous) => Ok(previous),
            _ => self.primary().ok_or(ResponseCode::NoSignedMessage),
        }
    }
}

/// Recover the signer of `token` against both pins of the session.
///
/// Fails closed with `InvalidPin` when no session is open.
pub fn recover_signers(pins: &PinSnapshot, token: &SignedToken) -> Result<Signers, ResponseCode> {
    let current = pins.current.as_deref().ok_or(ResponseCode::InvalidPin)?;
    let signers = Signers {
        current: recover(current, token),
        previous: pins.previous.as_deref().and_then(|pin| recover(pin, token)),
    };
    if signers.primary().is_none() {
        return Err(ResponseCode::NoSignedMessage);
    }
    Ok(signers)
}

// =============================================================================
// Signed transactions
// =============================================================================

/// A client-signed raw transaction that passed validation.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    /// The raw `0x` hex string exactly as received.
    pub raw: String,
    pub sender: Address,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub value: U256,
}

impl SignedTransaction {
    /// Upper bound of what the sender pays: `gas_limit * max_fee + value`.
    ///
    /// `None` if the sum does not fit in 256 bits.
    pub fn max_cost(&self) -> Option<U256> {
        U256::from(self.gas_limit)
            .checked_mul(U256::from(self.max_fee_per_gas))?
            .checked_add(self.value)
    }

    /// Raw transaction bytes.
    pub fn raw_bytes(&self) -> Result<Bytes, ResponseCode> {
        alloy::hex::decode(&self.raw)
            .map(Bytes::from)
            .map_err(|_| ResponseCode::InvalidJson)
    }
}

/// Gas a transaction must provide before executing any code.
pub fn intrinsic_gas(input: &[u8], is_create: bool) -> u64 {
    let data: u64 = input
        .iter()
        .map(|b| {
            if *b == 0 {
                TX_DATA_ZERO_GAS
            } else {
                TX_DATA_NON_ZERO_GAS
            }
        })
        .sum();
    let create = if is_create { TX_CREATE_GAS } else { 0 };
    TX_BASE_GAS + data + create
}

fn decode_envelope(value: &Value) -> Result<(String, TxEnvelope), ResponseCode> {
    let raw = value
        .get("tx")
        .and_then(Value::as_str)
        .ok_or(ResponseCode::InvalidJson)?;
    if !raw.starts_with("0x") {
        return Err(ResponseCode::InvalidJson);
    }
    let bytes = alloy::hex::decode(raw).map_err(|_| ResponseCode::InvalidJson)?;
    let envelope =
        TxEnvelope::decode_2718(&mut bytes.as_slice()).map_err(|_| ResponseCode::InvalidJson)?;
    Ok((raw.to_string(), envelope))
}

/// Validate the `tx` field of a request against the pin signer `client`.
pub fn parse_signed_transaction(
    value: &Value,
    client: Address,
) -> Result<SignedTransaction, ResponseCode> {
    let (raw, envelope) = decode_envelope(value)?;

    let sender = envelope
        .recover_signer()
        .map_err(|_| ResponseCode::InvalidTxSignature)?;
    if sender != client {
        return Err(ResponseCode::InvalidTxSender);
    }

    let gas_limit = envelope.gas_limit();
    let floor = intrinsic_gas(envelope.input(), envelope.to().is_none());
    if gas_limit == 0 || gas_limit < floor {
        return Err(ResponseCode::InsufficientGas);
    }

    Ok(SignedTransaction {
        raw,
        sender,
        gas_limit,
        max_fee_per_gas: envelope.max_fee_per_gas(),
        value: envelope.value(),
    })
}

// =============================================================================
// Plain payloads
// =============================================================================

/// A read-only call request: `["0xto", "0xdata"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDescriptor {
    pub to: Address,
    pub data: Bytes,
}

/// Parse a `[to, data]` call descriptor.
pub fn parse_call_descriptor(data: &[u8]) -> Result<CallDescriptor, ResponseCode> {
    let parts: Vec<String> =
        serde_json::from_slice(data).map_err(|_| ResponseCode::InvalidCallData)?;
    let [to, input] = parts.as_slice() else {
        return Err(ResponseCode::InvalidCallData);
    };
    if !to.starts_with("0x") || !input.starts_with("0x") {
        return Err(ResponseCode::InvalidCallData);
    }
    let to = Address::from_str(to).map_err(|_| ResponseCode::InvalidCallData)?;
    let data = alloy::hex::decode(input).map_err(|_| ResponseCode::InvalidCallData)?;
    Ok(CallDescriptor {
        to,
        data: data.into(),
    })
}

/// Body as a string: a JSON string literal or the raw UTF-8 text.
fn payload_str(data: &[u8]) -> Option<String> {
    if let Ok(s) = serde_json::from_slice::<String>(data) {
        return Some(s);
    }
    std::str::from_utf8(data).ok().map(|s| s.trim().to_string())
}

/// Whether `s` is a `0x` address; mixed case must carry a valid checksum.
pub fn is_valid_address(s: &str) -> bool {
    let Some(digits) = s.strip_prefix("0x") else {
        return false;
    };
    if s.len() != ADDRESS_LEN || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        Address::parse_checksummed(s, None).is_ok()
    } else {
        true
    }
}

/// Parse an account address.
pub fn parse_address(data: &[u8]) -> Result<Address, ResponseCode> {
    let s = payload_str(data).ok_or(ResponseCode::NoTxAddress)?;
    if !is_valid_address(&s) {
        return Err(ResponseCode::NoTxAddress);
    }
    Address::from_str(&s).map_err(|_| ResponseCode::NoTxAddress)
}

/// Parse a `0x`-prefixed 32-byte transaction hash.
pub fn parse_transaction_hash(data: &[u8]) -> Result<B256, ResponseCode> {
    let s = payload_str(data).ok_or(ResponseCode::InvalidTxHash)?;
    let Some(digits) = s.strip_prefix("0x") else {
        return Err(ResponseCode::InvalidTxHash);
    };
    if s.len() != TX_HASH_LEN || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ResponseCode::InvalidTxHash);
    }
    B256::from_str(&s).map_err(|_| ResponseCode::InvalidTxHash)
}
