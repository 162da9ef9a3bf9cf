// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM client used by the gateway.
//!
//! [`ChainClient`] is the seam the request handlers and the verification
//! workflow depend on; [`EvmClient`] implements it over an alloy HTTP provider
//! that signs with the node account.

use alloy::{
    consensus::Transaction as _,
    network::{Ethereum, EthereumWallet},
    primitives::{Address, Bytes, B256, U256},
    providers::{
        fillers::{
            BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller,
            WalletFiller,
        },
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    rpc::types::{Filter, TransactionRequest},
    signers::local::PrivateKeySigner,
    sol_types::SolEvent,
};
use async_trait::async_trait;

use super::contract::IPresenceRegistry::PresenceRequested;
use super::types::{NetworkConfig, PresenceRequest, TxReceipt, TxSummary};

/// HTTP provider that fills gas, nonce and chain id and signs with the node wallet.
type SigningProvider = FillProvider<
    JoinFill<
        JoinFill<
            Identity,
            JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
        >,
        WalletFiller<EthereumWallet>,
    >,
    RootProvider<Ethereum>,
>;

/// Blockchain operations the gateway needs.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Account this node signs its own transactions with.
    fn account(&self) -> Address;

    /// Broadcast a client-signed raw transaction.
    async fn submit_transaction(&self, raw: &Bytes) -> Result<B256, ChainError>;

    /// Send `calldata` to `contract` from the node account.
    async fn submit_contract_call(
        &self,
        contract: Address,
        calldata: Bytes,
    ) -> Result<B256, ChainError>;

    /// Receipt of a mined transaction, `None` while unmined.
    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError>;

    /// Known transaction by hash, `None` if the node has never seen it.
    async fn get_transaction(&self, hash: B256) -> Result<Option<TxSummary>, ChainError>;

    /// Native balance in wei.
    async fn get_balance(&self, address: Address) -> Result<U256, ChainError>;

    async fn get_block_number(&self) -> Result<u64, ChainError>;

    /// Execute a read-only call.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    /// `PresenceRequested` events naming `node`, emitted by `registry` in
    /// the inclusive block range.
    async fn presence_requests(
        &self,
        registry: Address,
        node: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<PresenceRequest>, ChainError>;
}

/// alloy-backed [`ChainClient`].
pub struct EvmClient {
    network: NetworkConfig,
    provider: SigningProvider,
    account: Address,
}

impl EvmClient {
    /// Create a client for `network` signing with `signer`.
    pub fn new(network: NetworkConfig, signer: PrivateKeySigner) -> Result<Self, ChainError> {
        let url: url::Url = network
            .rpc_url
            .parse()
            .map_err(|e: url::ParseError| ChainError::InvalidRpcUrl(e.to_string()))?;

        let account = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url);

        Ok(Self {
            network,
            provider,
            account,
        })
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }
}

#[async_trait]
impl ChainClient for EvmClient {
    fn account(&self) -> Address {
        self.account
    }

    async fn submit_transaction(&self, raw: &Bytes) -> Result<B256, ChainError> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| ChainError::TransactionFailed(format!("Failed to send: {e}")))?;
        Ok(*pending.tx_hash())
    }

    async fn submit_contract_call(
        &self,
        contract: Address,
        calldata: Bytes,
    ) -> Result<B256, ChainError> {
        let tx = TransactionRequest::default()
            .from(self.account)
            .to(contract)
            .input(calldata.into());

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| ChainError::TransactionFailed(format!("Failed to send: {e}")))?;
        Ok(*pending.tx_hash())
    }

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| ChainError::RpcError(format!("Failed to get receipt: {e}")))?;

        Ok(receipt.map(|r| TxReceipt {
            tx_hash: hash,
            block_number: r.block_number,
            gas_used: r.gas_used as u64,
            success: r.status(),
        }))
    }

    async fn get_transaction(&self, hash: B256) -> Result<Option<TxSummary>, ChainError> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(|e| ChainError::RpcError(format!("Failed to get transaction: {e}")))?;

        Ok(tx.map(|tx| TxSummary {
            block_number: tx.block_number,
            nonce: tx.nonce(),
            gas: tx.gas_limit(),
        }))
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ChainError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))
    }

    async fn get_block_number(&self) -> Result<u64, ChainError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let tx = TransactionRequest::default().to(to).input(data.into());
        self.provider
            .call(tx)
            .await
            .map_err(|e| ChainError::ContractError(e.to_string()))
    }

    async fn presence_requests(
        &self,
        registry: Address,
        node: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<PresenceRequest>, ChainError> {
        let filter = Filter::new()
            .address(registry)
            .event_signature(PresenceRequested::SIGNATURE_HASH)
            .topic1(node.into_word())
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| ChainError::RpcError(format!("Failed to get logs: {e}")))?;

        let mut requests = Vec::with_capacity(logs.len());
        for log in logs {
            match log.log_decode::<PresenceRequested>() {
                Ok(decoded) => {
                    let event = &decoded.inner.data;
                    requests.push(PresenceRequest {
                        client: event.client,
                        authority: event.authority,
                        contract: event.contractAddress,
                        block_number: decoded.block_number,
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable PresenceRequested log");
                }
            }
        }
        Ok(requests)
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Contract error: {0}")]
    ContractError(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}
