use gateway::{FeeError, GatewayError};
use thiserror::Error;
use utxo_core::{CoreError, Network};

/// Chain client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("fee oracle setup failed: {0}")]
    FeeSetup(#[from] FeeError),

    #[error("cannot submit unsigned transaction")]
    NotSigned,

    #[error("transaction failed verification: {0}")]
    VerificationFailed(#[source] CoreError),

    #[error("transaction for {actual} submitted to {expected} client")]
    NetworkMismatch { expected: Network, actual: Network },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn verification_failure_wraps_reason() {
        let err = ClientError::VerificationFailed(CoreError::ScriptVerificationFailed {
            input: 2,
            reason: "script evaluated to false".into(),
        });
        assert_eq!(
            err.to_string(),
            "transaction failed verification: script verification failed for input 2: script evaluated to false"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn gateway_errors_pass_through() {
        let err: ClientError = GatewayError::TxHashNotFound("ab".into()).into();
        assert_eq!(err.to_string(), "tx hash not found: ab");
    }

    #[test]
    fn display_network_mismatch() {
        let err = ClientError::NetworkMismatch {
            expected: Network::from_names("btc", "mainnet").unwrap(),
            actual: Network::from_names("btc", "testnet").unwrap(),
        };
        assert_eq!(err.to_string(), "transaction for btc/testnet submitted to btc/mainnet client");
    }
}
