// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Verification Workflow
//!
//! Links a presence-verification transaction sent by this node to a dependent
//! client transaction:
//!
//! ```text
//! submit verifyPresence ──▶ record: pending ──▶ poll receipt every interval
//!                                                 │
//!                   ┌─────────────────────────────┼──────────────────────┐
//!                   ▼                             ▼                      ▼
//!          mined, succeeded               mined, reverted        no receipt after
//!   record: success, relay client tx     record: failed          max cycles: failed
//! ```
//!
//! ## Concurrency
//!
//! A verification starts by claiming the client's record as `pending` inside
//! one store write transaction; a record already `pending` refuses the claim
//! with `TxPending`. `can_send_tx` is the read-only form of the same check.
//! Within this process at most one poll loop runs per client. Every record
//! mutation goes through the store's atomic upsert.
//!
//! ## Restart
//!
//! Poll loops live in memory only. `resume_pending` restarts polling, from
//! cycle zero, for every record still `pending` at startup.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256};
use tracing::{debug, info, warn};

use crate::blockchain::{contract::verify_presence_calldata, ChainClient, ChainError};
use crate::codes::ResponseCode;
use crate::session::PinSnapshot;
use crate::storage::{PresenceStatus, RecordDatabase, StoreError, VerificationRecord};
use crate::validator::{recover_signers, SignedToken};

/// Default interval between receipt checks.
pub const DEFAULT_MINING_CHECK_INTERVAL: Duration = Duration::from_secs(20);

/// Default number of receipt checks before giving up.
pub const DEFAULT_MAX_CONFIRMATION_CYCLES: u32 = 128;

/// Errors raised by the verification workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("request rejected: {0}")]
    Rejected(ResponseCode),

    #[error("no contract address for client {0}")]
    NoContract(Address),

    #[error("verification {0} is not the pending one")]
    StaleVerification(B256),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl WorkflowError {
    /// Code to answer with, or `None` for environment failures that are
    /// reported as a null payload.
    pub fn response_code(&self) -> Option<ResponseCode> {
        match self {
            WorkflowError::Rejected(code) => Some(*code),
            WorkflowError::NoContract(_) => Some(ResponseCode::NoTxAddress),
            WorkflowError::StaleVerification(_)
            | WorkflowError::Chain(_)
            | WorkflowError::Store(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub check_interval: Duration,
    pub max_cycles: u32,
    /// Verifier used for clients with no registered contract.
    pub default_contract: Option<Address>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_MINING_CHECK_INTERVAL,
            max_cycles: DEFAULT_MAX_CONFIRMATION_CYCLES,
            default_contract: None,
        }
    }
}

/// A client cleared to start a verification, and the contract to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorized {
    pub client: Address,
    pub contract: Address,
}

struct Inner {
    chain: Arc<dyn ChainClient>,
    store: Arc<RecordDatabase>,
    config: WorkflowConfig,
    polling: Mutex<HashSet<Address>>,
    loops_started: AtomicUsize,
}

/// Verification state machine over the chain client and record store.
///
/// Cloning shares the same poll-loop bookkeeping.
#[derive(Clone)]
pub struct VerificationWorkflow {
    inner: Arc<Inner>,
}

impl VerificationWorkflow {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<RecordDatabase>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                chain,
                store,
                config,
                polling: Mutex::new(HashSet::new()),
                loops_started: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.inner.config
    }

    /// Number of poll loops spawned since construction.
    pub fn loops_started(&self) -> usize {
        self.inner.loops_started.load(Ordering::SeqCst)
    }

    /// Resolve if the client has no verification in flight.
    ///
    /// A read-only pre-check for early rejection. The authoritative gate is
    /// the claim taken by [`submit_presence`](Self::submit_presence).
    pub fn can_send_tx(&self, client: Address) -> Result<(), WorkflowError> {
        match self.inner.store.get(&client)? {
            Some(record) if record.verify_presence_status.is_pending() => {
                Err(WorkflowError::Rejected(ResponseCode::TxPending))
            }
            _ => Ok(()),
        }
    }

    /// Whether the store holds anything for `client`: a registration or a
    /// past verification.
    pub fn is_known(&self, client: Address) -> bool {
        match self.inner.store.get(&client) {
            Ok(record) => record.is_some(),
            Err(e) => {
                warn!(client = %client, error = %e, "Record lookup failed");
                false
            }
        }
    }

    /// Contract to verify `client` against: the registered one, else the default.
    pub fn contract_for(&self, client: Address) -> Result<Option<Address>, StoreError> {
        let registered = self
            .inner
            .store
            .get(&client)?
            .and_then(|record| record.contract_address);
        Ok(registered.or(self.inner.config.default_contract))
    }

    /// Check that `client` may start a verification and find its contract.
    pub fn authorize(&self, client: Address) -> Result<Authorized, ResponseCode> {
        let checked = self.can_send_tx(client).and_then(|()| {
            self.contract_for(client)?
                .ok_or(WorkflowError::NoContract(client))
        });
        match checked {
            Ok(contract) => Ok(Authorized { client, contract }),
            Err(WorkflowError::Store(e)) => {
                warn!(client = %client, error = %e, "Record lookup failed");
                Err(ResponseCode::NoTxDb)
            }
            Err(e) => Err(e.response_code().unwrap_or(ResponseCode::NoTxDb)),
        }
    }

    /// Recover the signer of `token` against the session pins and authorize it.
    ///
    /// `claimed` is the address the client says it signs as, if it sent one.
    pub fn authorize_signed(
        &self,
        pins: &PinSnapshot,
        token: &SignedToken,
        claimed: Option<Address>,
    ) -> Result<Authorized, ResponseCode> {
        let client = recover_signers(pins, token)?.identify(claimed, |c| self.is_known(c))?;
        self.authorize(client)
    }

    /// Send the presence-verification call for an authorized client and start
    /// watching it.
    ///
    /// The record is claimed as `pending` in one store transaction before the
    /// call goes out, so concurrent requests for the same client cannot both
    /// submit. If the submission fails the claim is rolled back.
    pub async fn submit_presence(&self, authorized: &Authorized) -> Result<B256, WorkflowError> {
        let Authorized { client, contract } = *authorized;
        let prior = self.claim(client)?;

        let time = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        let submitted = self
            .inner
            .chain
            .submit_contract_call(contract, verify_presence_calldata(client, time))
            .await;
        let hash = match submitted {
            Ok(hash) => hash,
            Err(e) => {
                self.release(client, prior);
                return Err(e.into());
            }
        };

        self.inner
            .store
            .upsert(&client, |record| record.begin_verification(hash, None))?;

        info!(
            client = %client,
            contract = %contract,
            tx_hash = %hash,
            "Presence verification submitted"
        );

        self.spawn_poll(client, hash);
        Ok(hash)
    }

    /// Take the `pending` state for `client`. Returns the record as it was.
    fn claim(&self, client: Address) -> Result<VerificationRecord, WorkflowError> {
        let mut prior = None;
        let claimed = self.inner.store.try_upsert(&client, |record| {
            if record.verify_presence_status.is_pending() {
                return Err(WorkflowError::Rejected(ResponseCode::TxPending));
            }
            prior = Some(record.clone());
            record.verify_presence_status = PresenceStatus::Pending;
            record.verify_presence_tx_hash = None;
            Ok(())
        })?;
        claimed?;
        Ok(prior.unwrap_or_default())
    }

    /// Undo a claim whose submission never happened.
    fn release(&self, client: Address, prior: VerificationRecord) {
        let restored = self.inner.store.try_upsert(&client, |record| {
            if !record.verify_presence_status.is_pending()
                || record.verify_presence_tx_hash.is_some()
            {
                return Err(());
            }
            record.verify_presence_status = prior.verify_presence_status;
            record.verify_presence_tx_hash = prior.verify_presence_tx_hash;
            Ok(())
        });
        if let Err(e) = restored {
            warn!(client = %client, error = %e, "Failed to release verification claim");
        }
    }

    /// Attach `raw_tx` to the pending verification `verify_tx_hash` and make
    /// sure it is polled. Returns whether a new poll loop was started.
    ///
    /// Refused with [`WorkflowError::StaleVerification`] unless the client's
    /// record is `pending` on exactly `verify_tx_hash`.
    pub fn send_tx_when_presence_verified(
        &self,
        verify_tx_hash: B256,
        raw_tx: String,
        client: Address,
    ) -> Result<bool, WorkflowError> {
        self.inner.store.try_upsert(&client, |record| {
            let current = record.verify_presence_status.is_pending()
                && record.verify_presence_tx_hash == Some(verify_tx_hash);
            if !current {
                return Err(WorkflowError::StaleVerification(verify_tx_hash));
            }
            record.relay_tx = Some(raw_tx);
            Ok(())
        })??;
        Ok(self.spawn_poll(client, verify_tx_hash))
    }

    /// Restart polling for every record left `pending`. Returns the loops started.
    pub fn resume_pending(&self) -> Result<usize, StoreError> {
        let mut resumed = 0;
        for (client, record) in self.inner.store.list_by_status(PresenceStatus::Pending)? {
            match record.verify_presence_tx_hash {
                Some(hash) => {
                    if self.spawn_poll(client, hash) {
                        resumed += 1;
                    }
                }
                None => {
                    warn!(client = %client, "Pending record without tx hash, marking failed");
                    self.inner.store.upsert(&client, |record| {
                        record.finish_verification(PresenceStatus::Failed)
                    })?;
                }
            }
        }
        if resumed > 0 {
            info!(count = resumed, "Resumed pending verifications");
        }
        Ok(resumed)
    }

    fn spawn_poll(&self, client: Address, verify_tx_hash: B256) -> bool {
        {
            let mut polling = lock(&self.inner.polling);
            if !polling.insert(client) {
                debug!(client = %client, "Poll loop already running");
                return false;
            }
        }
        self.inner.loops_started.fetch_add(1, Ordering::SeqCst);

        let workflow = self.clone();
        tokio::spawn(async move {
            workflow.poll_until_mined(client, verify_tx_hash).await;
        });
        true
    }

    /// Poll for the verification receipt and settle the record.
    ///
    /// Returns the terminal status written.
    pub async fn poll_until_mined(&self, client: Address, verify_tx_hash: B256) -> PresenceStatus {
        let WorkflowConfig {
            check_interval,
            max_cycles,
            ..
        } = self.inner.config;

        let mut outcome = None;
        for cycle in 1..=max_cycles {
            tokio::time::sleep(check_interval).await;

            match self.inner.chain.get_transaction_receipt(verify_tx_hash).await {
                Ok(Some(receipt)) => {
                    outcome = Some(receipt.success);
                    break;
                }
                Ok(None) => {
                    debug!(client = %client, cycle, "Verification not mined yet");
                }
                Err(e) => {
                    warn!(client = %client, cycle, error = %e, "Receipt lookup failed");
                }
            }
        }

        // Leave the loop set while the record is still pending, so the next
        // verification for this client always gets its own loop.
        lock(&self.inner.polling).remove(&client);

        match outcome {
            Some(true) => self.settle_success(client, verify_tx_hash).await,
            Some(false) => {
                warn!(client = %client, tx_hash = %verify_tx_hash, "Verification reverted");
                self.finish(client, verify_tx_hash, PresenceStatus::Failed)
            }
            None => {
                warn!(
                    client = %client,
                    tx_hash = %verify_tx_hash,
                    cycles = max_cycles,
                    "Verification not mined, giving up"
                );
                self.finish(client, verify_tx_hash, PresenceStatus::Failed)
            }
        }
    }

    async fn settle_success(&self, client: Address, verify_tx_hash: B256) -> PresenceStatus {
        let mut relay = None;
        let settled = self.inner.store.try_upsert(&client, |record| {
            if record.verify_presence_tx_hash != Some(verify_tx_hash) {
                return Err(());
            }
            relay = record.relay_tx.take();
            record.finish_verification(PresenceStatus::Success);
            Ok(())
        });
        match settled {
            Ok(Ok(_)) => info!(client = %client, "Presence verified"),
            Ok(Err(())) => {
                debug!(client = %client, tx_hash = %verify_tx_hash, "Record moved on, not settling");
                return PresenceStatus::Success;
            }
            Err(e) => {
                warn!(client = %client, error = %e, "Failed to record verification success");
                return PresenceStatus::Success;
            }
        }

        let Some(raw) = relay else {
            return PresenceStatus::Success;
        };
        let raw = match alloy::hex::decode(&raw) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!(client = %client, error = %e, "Stored relay transaction is not hex");
                return PresenceStatus::Success;
            }
        };

        match self.inner.chain.submit_transaction(&raw).await {
            Ok(client_hash) => {
                info!(client = %client, tx_hash = %client_hash, "Client transaction relayed");
                let recorded = self.inner.store.try_upsert(&client, |record| {
                    if record.verify_presence_tx_hash != Some(verify_tx_hash) {
                        return Err(());
                    }
                    record.client_tx_hash = Some(client_hash);
                    Ok(())
                });
                if let Err(e) = recorded {
                    warn!(client = %client, error = %e, "Failed to record client tx hash");
                }
            }
            Err(e) => {
                warn!(client = %client, error = %e, "Client transaction relay failed");
            }
        }
        PresenceStatus::Success
    }

    /// Write a terminal status if the record still tracks `verify_tx_hash`.
    fn finish(
        &self,
        client: Address,
        verify_tx_hash: B256,
        status: PresenceStatus,
    ) -> PresenceStatus {
        let finished = self.inner.store.try_upsert(&client, |record| {
            if record.verify_presence_tx_hash != Some(verify_tx_hash) {
                return Err(());
            }
            record.finish_verification(status);
            Ok(())
        });
        if let Err(e) = finished {
            warn!(client = %client, error = %e, "Failed to record verification outcome");
        }
        status
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
