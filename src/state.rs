// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::handlers::Gateway;

/// Shared state of the bridge router.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    /// Data directory checked by the health endpoints.
    pub data_dir: Option<PathBuf>,
    peer_slot: Arc<Semaphore>,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, data_dir: Option<PathBuf>) -> Self {
        Self {
            gateway,
            data_dir,
            peer_slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Claim the single peer slot; `None` while another peer is connected.
    pub fn try_claim_peer(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.peer_slot).try_acquire_owned().ok()
    }
}
