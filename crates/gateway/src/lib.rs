//! Access to the caching RPC gateway and the fee oracle.
//!
//! [`Gateway`] is the narrow interface the chain client consumes: fetch a
//! UTXO, list UTXOs for an address, read confirmations and broadcast a raw
//! transaction. [`HttpGateway`] speaks bitcoind-style JSON-RPC to the
//! gateway over HTTP. [`FeeOracle`] caches fee-per-byte quotes per speed tier.

pub mod client;
pub mod config;
pub mod error;
pub mod fees;
mod rpc;

pub use client::{Gateway, HttpGateway, MAX_CONFIRMATIONS};
pub use config::GatewayConfig;
pub use error::{FeeError, GatewayError};
pub use fees::{FeeOracle, FeeQuote, FeeSource, HttpFeeSource, TxSpeed};
