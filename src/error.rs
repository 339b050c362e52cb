use crate::{
    client::transport::{SignerError, TransportError},
    types::{ChainId, Variant},
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PioneerError {
    // No contract configured (or no transport) for the chain
    #[error("no Pioneer contract configured for chain {0}")]
    NotFound(ChainId),

    #[error("{operation} is not supported by the {variant} contract")]
    UnsupportedOperation {
        variant: Variant,
        operation: &'static str,
    },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    // Connection reset or RPC timeout, the only retryable kind
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("execution reverted{}", revert_suffix(.reason))]
    Reverted { reason: Option<String> },

    #[error("signer rejected the request: {0}")]
    SignerRejected(String),

    #[error("signer is connected to chain {actual}, transaction targets chain {expected}")]
    WrongNetwork { expected: ChainId, actual: ChainId },

    // Not a failure: the transaction may still be included later
    #[error("no confirmation within {after_ms} ms")]
    TimedOut { after_ms: u64 },

    #[error("rpc error: {0}")]
    Rpc(String),
}

fn revert_suffix(reason: &Option<String>) -> String {
    reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default()
}

impl PioneerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PioneerError::TransientNetwork(_))
    }

    pub(crate) fn decoding(err: anyhow::Error) -> Self {
        PioneerError::Decoding(format!("{err:#}"))
    }
}

impl From<TransportError> for PioneerError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionReset(_) | TransportError::Timeout(_) => {
                PioneerError::TransientNetwork(err.to_string())
            }
            TransportError::Reverted(reason) => PioneerError::Reverted { reason },
            TransportError::Rpc { .. } => PioneerError::Rpc(err.to_string()),
        }
    }
}

impl From<SignerError> for PioneerError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::Rejected(reason) => PioneerError::SignerRejected(reason),
            SignerError::Network(inner) => inner.into(),
        }
    }
}
