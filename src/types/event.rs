use alloy_primitives::{Address, TxHash};

use crate::{client::tx_manager::TxStatus, error::PioneerError};

use super::ChainId;

/// One status transition of a tracked transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionEvent {
    pub handle_id: u64,
    pub chain_id: ChainId,
    pub hash: Option<TxHash>,
    pub method: String,
    pub player: Address,
    pub from: Option<TxStatus>,
    pub status: TxStatus,
    pub error: Option<PioneerError>,
}

impl TransactionEvent {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
