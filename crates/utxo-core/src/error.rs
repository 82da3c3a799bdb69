use thiserror::Error;

use crate::amount::Amount;
use crate::network::Network;

/// Errors raised by the UTXO types, builder and verifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown chain: {0}")]
    UnknownChain(String),

    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    #[error("invalid tx hash: {0}")]
    InvalidTxHash(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("address {address} is not valid for {expected}")]
    WrongNetwork { address: String, expected: Network },

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("gas = {gas} is too low, must be at least {dust}")]
    GasTooLow { gas: Amount, dust: Amount },

    #[error("amount = {available} from utxos is less than dust = {dust}")]
    InsufficientInputValue { available: Amount, dust: Amount },

    #[error("insufficient balance: expected {required}, got {available}")]
    InsufficientBalance { required: Amount, available: Amount },

    #[error("script verification failed for input {input}: {reason}")]
    ScriptVerificationFailed { input: usize, reason: String },

    #[error("{operation} is not supported on {network}")]
    UnsupportedOperation {
        operation: &'static str,
        network: Network,
    },

    #[error("transaction inputs do not match utxos: {0}")]
    InputMismatch(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Chain, Variant};

    #[test]
    fn display_gas_too_low() {
        let err = CoreError::GasTooLow {
            gas: Amount::from_sat(599),
            dust: Amount::from_sat(600),
        };
        assert_eq!(err.to_string(), "gas = 599 is too low, must be at least 600");
    }

    #[test]
    fn display_insufficient_balance_reports_both_amounts() {
        let err = CoreError::InsufficientBalance {
            required: Amount::from_sat(10_600),
            available: Amount::from_sat(9_000),
        };
        let msg = err.to_string();
        assert!(msg.contains("10600"));
        assert!(msg.contains("9000"));
    }

    #[test]
    fn display_script_failure_names_input() {
        let err = CoreError::ScriptVerificationFailed {
            input: 3,
            reason: "signature check failed".into(),
        };
        assert_eq!(
            err.to_string(),
            "script verification failed for input 3: signature check failed"
        );
    }

    #[test]
    fn display_unsupported_operation() {
        let network = Network::new(Chain::ZCash, Variant::Mainnet).unwrap();
        let err = CoreError::UnsupportedOperation {
            operation: "segwit address derivation",
            network,
        };
        assert_eq!(
            err.to_string(),
            "segwit address derivation is not supported on zec/mainnet"
        );
    }

    #[test]
    fn error_trait_is_implemented() {
        let err: Box<dyn std::error::Error> = Box::new(CoreError::InvalidTxHash("abc".into()));
        assert!(err.to_string().contains("abc"));
    }
}
