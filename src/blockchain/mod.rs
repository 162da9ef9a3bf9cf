// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain integration module.
//!
//! This module provides functionality for:
//! - Broadcasting client-signed transactions
//! - Sending the node's own presence-verification calls
//! - Reading balances, receipts, block numbers and call results

pub mod client;
pub mod contract;
pub mod signing;
pub mod types;

pub use client::{ChainClient, ChainError, EvmClient};
pub use signing::NodeKey;
pub use types::*;
