// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Read endpoints. Values are returned as UTF-8 text.

use tracing::{debug, warn};

use super::{Gateway, NULL_PAYLOAD};

impl Gateway {
    /// A fresh session pin. Rotates the previous one out of the session.
    pub(super) fn get_pin(&self) -> Vec<u8> {
        let pin = self.session.issue();
        debug!("Session pin issued");
        pin.into_bytes()
    }

    pub(super) fn get_device_account(&self) -> Vec<u8> {
        self.chain.account().to_checksum(None).into_bytes()
    }

    pub(super) async fn get_block_number(&self) -> Vec<u8> {
        match self.chain.get_block_number().await {
            Ok(block) => block.to_string().into_bytes(),
            Err(e) => {
                warn!(error = %e, "Block number unavailable");
                NULL_PAYLOAD.to_vec()
            }
        }
    }

    pub(super) fn get_public_key(&self) -> Vec<u8> {
        self.cipher.public_key_hex().into_bytes()
    }
}
