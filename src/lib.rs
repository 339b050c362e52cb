pub mod adapter;
pub mod basic_elements;
pub mod client;
pub mod constants;
pub mod error;
pub mod facade;
pub mod helpers;
pub mod registry;
pub mod types;

#[cfg(test)]
mod testing;

pub use adapter::{PioneerAction, ReadCall, ReadValue, WriteCall};
pub use client::{
    query_engine::{QueryEngine, QueryKey, QueryResult, QueryStatus, ReadMethod, Subscription},
    transport::{
        CallRequest, RpcTransport, Signer, SignerError, TransactionReceipt, TransactionRequest,
        TransportError, TransportSet,
    },
    tx_manager::{TransactionHandle, TransactionManager, TransactionTracker, TxStatus},
};
pub use error::PioneerError;
pub use facade::{PioneerService, StatusSubscription};
pub use helpers::backoff::RetryPolicy;
pub use registry::{ChainConfig, ChainRegistry, GasPolicy};
pub use types::{
    ChainId, ExtensionValue, PioneerRecord, PioneerStatus, PioneerType, Variant,
    event::TransactionEvent,
};
