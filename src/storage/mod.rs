// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Record Storage
//!
//! Per-client verification records and watcher bookkeeping, persisted in a
//! single redb file under the data directory.
//!
//! ```text
//! /data/
//!   records.redb    # verification_records + gateway_state tables
//! ```

pub mod record_db;
pub mod records;

pub use record_db::{RecordDatabase, StoreError, StoreResult, LAST_BLOCK_KEY};
pub use records::{ClientTxStatus, PresenceStatus, VerificationRecord};

/// File name of the record database inside the data directory.
pub const RECORDS_FILE: &str = "records.redb";
