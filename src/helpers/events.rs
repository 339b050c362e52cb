use crate::{
    client::{
        transport::TransactionReceipt,
        tx_manager::{TransactionHandle, TxStatus},
    },
    error::PioneerError,
    types::event::TransactionEvent,
};

// Snapshot of a handle right after it moved out of `from`
pub fn transition_event(handle: &TransactionHandle, from: Option<TxStatus>) -> TransactionEvent {
    TransactionEvent {
        handle_id: handle.id,
        chain_id: handle.chain_id,
        hash: handle.hash,
        method: handle.method.to_string(),
        player: handle.player,
        from,
        status: handle.status,
        error: handle.error.clone(),
    }
}

// Terminal status and error carried by an inclusion receipt
pub fn receipt_outcome(receipt: &TransactionReceipt) -> (TxStatus, Option<PioneerError>) {
    if receipt.success {
        (TxStatus::Confirmed, None)
    } else {
        (
            TxStatus::Failed,
            Some(PioneerError::Reverted {
                reason: receipt.revert_reason.clone(),
            }),
        )
    }
}
