use std::{collections::HashMap, sync::Arc};

use alloy_primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;

use crate::types::ChainId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub chain_id: ChainId,
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_price: u128,
    // `None` lets the wallet estimate
    pub gas_limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub hash: TxHash,
    pub block_number: u64,
    pub gas_used: u64,
    pub success: bool,
    pub revert_reason: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection reset: {0}")]
    ConnectionReset(String),

    #[error("rpc timeout: {0}")]
    Timeout(String),

    #[error("call reverted")]
    Reverted(Option<String>),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Network(#[from] TransportError),
}

#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, request: &CallRequest) -> Result<Bytes, TransportError>;

    async fn gas_price(&self) -> Result<u128, TransportError>;

    /// `None` while the transaction is not included yet.
    async fn get_receipt(&self, hash: TxHash)
    -> Result<Option<TransactionReceipt>, TransportError>;
}

#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    fn chain_id(&self) -> ChainId;

    /// Signs and broadcasts; returns the pending transaction hash.
    async fn sign_and_submit(&self, request: TransactionRequest) -> Result<TxHash, SignerError>;
}

#[derive(Clone, Default)]
pub struct TransportSet {
    transports: HashMap<ChainId, Arc<dyn RpcTransport>>,
}

impl TransportSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, chain_id: ChainId, transport: Arc<dyn RpcTransport>) -> Self {
        self.insert(chain_id, transport);
        self
    }

    pub fn insert(&mut self, chain_id: ChainId, transport: Arc<dyn RpcTransport>) {
        self.transports.insert(chain_id, transport);
    }

    pub fn get(&self, chain_id: ChainId) -> Option<Arc<dyn RpcTransport>> {
        self.transports.get(&chain_id).cloned()
    }

    pub fn contains(&self, chain_id: ChainId) -> bool {
        self.transports.contains_key(&chain_id)
    }
}

impl std::fmt::Debug for TransportSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut chains: Vec<&ChainId> = self.transports.keys().collect();
        chains.sort_unstable();
        f.debug_struct("TransportSet").field("chains", &chains).finish()
    }
}
