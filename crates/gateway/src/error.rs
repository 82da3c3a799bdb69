use std::time::Duration;

use thiserror::Error;
use utxo_core::{CoreError, OutPoint};

/// Failures talking to the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("tx hash not found: {0}")]
    TxHashNotFound(String),

    #[error("utxo spent or invalid index: {outpoint}")]
    UtxoSpent { outpoint: OutPoint },

    #[error("gateway unavailable during {op}: {detail}")]
    Unavailable { op: &'static str, detail: String },

    #[error("node error {code} during {op}: {message}")]
    Node {
        op: &'static str,
        code: i64,
        message: String,
    },

    #[error("transaction rejected by node ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("{op} cancelled after {timeout:?}")]
    Cancelled { op: &'static str, timeout: Duration },

    #[error("invalid gateway response for {op}: {detail}")]
    InvalidResponse { op: &'static str, detail: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Failures fetching a fee quote. Recovered by the oracle, never surfaced.
#[derive(Debug, Error)]
pub enum FeeError {
    #[error("fee source request failed: {0}")]
    Request(String),

    #[error("fee source returned HTTP {0}")]
    Status(u16),

    #[error("invalid fee source response: {0}")]
    InvalidResponse(String),

    #[error("fee for {size} bytes at {per_byte} per byte overflows")]
    Overflow { per_byte: i64, size: usize },
}
