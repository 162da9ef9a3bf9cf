// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational BLE Gateway - Proximity Gateway for EVM Accounts
//!
//! A mobile client connected over a short-range transport obtains a rotating
//! session pin, proves control of an account by signing it, and may then read
//! chain data, submit signed transactions, or ask this node to verify its
//! presence on-chain before a dependent transaction is relayed.
//!
//! ## Modules
//!
//! - `codes` - Response codes and framing constants
//! - `session` - Session pin lifecycle and rotation
//! - `validator` - Decrypt/parse/validate inbound payloads
//! - `crypto` - Envelope encryption over the node key
//! - `queue` - Packet queue for chunked transfers
//! - `workflow` - Presence verification and transaction relay
//! - `transport` - Endpoint catalogue and peer primitives
//! - `handlers` - One handler per endpoint
//! - `blockchain` - EVM client (alloy)
//! - `storage` - Verification records (redb)
//! - `watcher` - Registry event watcher
//! - `bridge` - WebSocket transport bridge and health probes (Axum)

pub mod blockchain;
pub mod bridge;
pub mod codes;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod queue;
pub mod session;
pub mod state;
pub mod storage;
pub mod transport;
pub mod validator;
pub mod watcher;
pub mod workflow;
