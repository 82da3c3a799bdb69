use std::fmt;
use std::str::FromStr;

use bitcoin::{ScriptBuf, Txid};

use crate::address::Address;
use crate::amount::Amount;
use crate::error::CoreError;

/// A transaction hash, validated as exactly 64 hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(Txid);

impl TxHash {
    pub fn txid(&self) -> Txid {
        self.0
    }
}

impl FromStr for TxHash {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidTxHash(format!(
                "expected 64 hex characters, got {s:?}"
            )));
        }
        let txid = Txid::from_str(&s.to_ascii_lowercase())
            .map_err(|e| CoreError::InvalidTxHash(format!("{s}: {e}")))?;
        Ok(TxHash(txid))
    }
}

impl From<Txid> for TxHash {
    fn from(txid: Txid) -> Self {
        TxHash(txid)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to one output of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub tx_hash: TxHash,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(tx_hash: TxHash, vout: u32) -> Self {
        OutPoint { tx_hash, vout }
    }

    /// Parse the hash text and pair it with an output index.
    pub fn parse(tx_hash: &str, vout: u32) -> Result<Self, CoreError> {
        Ok(OutPoint::new(tx_hash.parse()?, vout))
    }

    pub fn to_bitcoin(self) -> bitcoin::OutPoint {
        bitcoin::OutPoint::new(self.tx_hash.txid(), self.vout)
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.vout)
    }
}

/// A single unspent transaction output, as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    outpoint: OutPoint,
    amount: Amount,
    script_pubkey: ScriptBuf,
    confirmations: u64,
    /// Redeem script (P2SH) or witness script (P2WSH) needed to spend this output.
    redeem_script: Option<ScriptBuf>,
}

impl Utxo {
    pub fn new(
        outpoint: OutPoint,
        amount: Amount,
        script_pubkey: ScriptBuf,
        confirmations: u64,
        redeem_script: Option<ScriptBuf>,
    ) -> Result<Self, CoreError> {
        Ok(Utxo {
            outpoint,
            amount: amount.check_output_range()?,
            script_pubkey,
            confirmations,
            redeem_script,
        })
    }

    pub fn outpoint(&self) -> OutPoint {
        self.outpoint
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn script_pubkey(&self) -> &ScriptBuf {
        &self.script_pubkey
    }

    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    pub fn redeem_script(&self) -> Option<&ScriptBuf> {
        self.redeem_script.as_ref()
    }
}

/// Aggregates over a set of UTXOs.
pub trait UtxoSet {
    /// Total value of the set.
    fn sum(&self) -> Amount;
}

impl UtxoSet for [Utxo] {
    fn sum(&self) -> Amount {
        // Each amount is bounded by MAX_MONEY, so saturation is unreachable
        // for any realistic set size.
        self.iter().fold(Amount::ZERO, |acc, utxo| {
            acc.checked_add(utxo.amount)
                .unwrap_or(Amount::from_sat(i64::MAX))
        })
    }
}

/// One payment in a spending intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipient {
    pub address: Address,
    pub amount: Amount,
}

impl Recipient {
    pub fn new(address: Address, amount: Amount) -> Result<Self, CoreError> {
        Ok(Recipient { address, amount: amount.check_output_range()? })
    }
}
