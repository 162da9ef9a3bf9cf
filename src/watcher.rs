// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Presence Watcher
//!
//! Background task that follows `PresenceRequested(node, client, authority,
//! contract)` events emitted by the registry contract for this node, and
//! writes each client's contract and authority into its verification record.
//!
//! ## Checkpointing
//!
//! The watcher persists the last processed block under
//! [`LAST_BLOCK_KEY`](crate::storage::LAST_BLOCK_KEY). On restart it resumes
//! from the checkpoint; without one it looks back a fixed number of blocks.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use tokio_util::sync::CancellationToken;

use crate::blockchain::{ChainClient, ChainError};
use crate::storage::{RecordDatabase, StoreError, LAST_BLOCK_KEY};

/// Default block chunk size per log query.
const DEFAULT_CHUNK_SIZE: u64 = 2000;

/// Default poll interval when caught up to chain head.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How far back to look when starting fresh (no checkpoint).
const INITIAL_LOOKBACK_BLOCKS: u64 = 10_000;

/// Registry event watcher that runs as a background tokio task.
pub struct PresenceWatcher {
    chain: Arc<dyn ChainClient>,
    store: Arc<RecordDatabase>,
    registry: Address,
    poll_interval: Duration,
    chunk_size: u64,
}

impl PresenceWatcher {
    pub fn new(chain: Arc<dyn ChainClient>, store: Arc<RecordDatabase>, registry: Address) -> Self {
        Self {
            chain,
            store,
            registry,
            poll_interval: DEFAULT_POLL_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Run the watcher loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(watcher.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            registry = %self.registry,
            node = %self.chain.account(),
            "Presence watcher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                tracing::info!("Presence watcher shutting down");
                return;
            }

            if let Err(e) = self.watch_step().await {
                tracing::warn!(error = %e, "Watcher step failed, will retry");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    tracing::info!("Presence watcher shutting down");
                    return;
                }
            }
        }
    }

    /// Process events from the checkpoint up to the chain head.
    ///
    /// Returns the number of registrations applied.
    pub async fn watch_step(&self) -> Result<usize, WatcherError> {
        let checkpoint = self.store.get_last_block(LAST_BLOCK_KEY)?;
        let head = self.chain.get_block_number().await?;

        let start = if checkpoint == 0 {
            head.saturating_sub(INITIAL_LOOKBACK_BLOCKS)
        } else {
            checkpoint + 1
        };

        let node = self.chain.account();
        let mut applied = 0;
        let mut from = start;
        while from <= head {
            let to = (from + self.chunk_size - 1).min(head);

            let requests = self
                .chain
                .presence_requests(self.registry, node, from, to)
                .await?;
            for request in &requests {
                self.store.upsert(&request.client, |record| {
                    record.contract_address = Some(request.contract);
                    record.authority = Some(request.authority);
                })?;
                tracing::info!(
                    client = %request.client,
                    contract = %request.contract,
                    block = ?request.block_number,
                    "Registered presence contract"
                );
            }
            applied += requests.len();

            self.store.set_last_block(LAST_BLOCK_KEY, to)?;
            from = to + 1;
        }

        Ok(applied)
    }
}

/// Errors that can occur during watching.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("RPC error: {0}")]
    Chain(#[from] ChainError),

    #[error("Database error: {0}")]
    Store(#[from] StoreError),
}
