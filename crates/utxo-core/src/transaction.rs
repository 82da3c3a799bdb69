use bitcoin::absolute::LockTime;
use bitcoin::script::PushBytesBuf;
use bitcoin::transaction::Version;
use bitcoin::{ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};

use crate::address::Address;
use crate::amount::Amount;
use crate::error::CoreError;
use crate::network::{Chain, Network};
use crate::utxo::{Recipient, TxHash, Utxo, UtxoSet};
use crate::{sighash, zcash};

/// Estimated bytes per spent UTXO (outpoint, P2PKH script_sig, sequence).
const UTXO_BYTES: usize = 146;

/// Estimated bytes per output.
const RECIPIENT_BYTES: usize = 33;

/// Fixed transaction overhead: version, lock time and counts.
const TX_OVERHEAD_BYTES: usize = 10;

/// Approximate serialized size of a transaction spending `num_utxos` inputs
/// to `num_recipients` outputs.
///
/// A linear estimate for sizing fee requests before construction, not an
/// exact serializer: real sizes vary with script and signature lengths.
/// Saturates at `usize::MAX`.
pub fn estimate_size(num_utxos: usize, num_recipients: usize) -> usize {
    UTXO_BYTES
        .saturating_mul(num_utxos)
        .saturating_add(RECIPIENT_BYTES.saturating_mul(num_recipients))
        .saturating_add(TX_OVERHEAD_BYTES)
}

/// A transaction with no signature data, ready for an external signer.
#[derive(Debug, Clone)]
pub struct UnsignedTx {
    network: Network,
    /// The UTXOs being spent, in input order.
    utxos: Vec<Utxo>,
    tx: Transaction,
}

impl UnsignedTx {
    pub fn network(&self) -> Network {
        self.network
    }

    pub fn utxos(&self) -> &[Utxo] {
        &self.utxos
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    /// Per-input digests the signer has to sign, in input order.
    pub fn signature_hashes(&self) -> Result<Vec<[u8; 32]>, CoreError> {
        sighash::signature_hashes(self.network, &self.tx, &self.utxos)
    }

    /// Attach one unlock per input, producing the signed transaction.
    pub fn finalize(self, unlocks: Vec<Unlock>) -> Result<SignedTx, CoreError> {
        if unlocks.len() != self.tx.input.len() {
            return Err(CoreError::InputMismatch(format!(
                "expected {} unlocks, got {}",
                self.tx.input.len(),
                unlocks.len()
            )));
        }

        let mut tx = self.tx;
        for (input, unlock) in tx.input.iter_mut().zip(unlocks) {
            input.script_sig = unlock.script_sig;
            input.witness = unlock.witness;
        }
        SignedTx::new(self.network, self.utxos, tx)
    }
}

/// Signature material for one input.
#[derive(Debug, Clone, Default)]
pub struct Unlock {
    pub script_sig: ScriptBuf,
    pub witness: Witness,
}

impl Unlock {
    /// `<sig> <pubkey>` script_sig for a P2PKH output.
    pub fn p2pkh(signature: &[u8], pubkey: &[u8]) -> Result<Self, CoreError> {
        let script_sig = ScriptBuf::builder()
            .push_slice(push_bytes(signature)?)
            .push_slice(push_bytes(pubkey)?)
            .into_script();
        Ok(Unlock { script_sig, witness: Witness::new() })
    }

    /// `[sig, pubkey]` witness for a P2WPKH output.
    pub fn p2wpkh(signature: &[u8], pubkey: &[u8]) -> Self {
        Unlock {
            script_sig: ScriptBuf::new(),
            witness: Witness::from_slice(&[signature, pubkey]),
        }
    }

    /// P2WPKH witness plus the single-push script_sig of a P2SH-wrapped output.
    pub fn p2sh_p2wpkh(signature: &[u8], pubkey: &[u8], redeem_script: &ScriptBuf) -> Result<Self, CoreError> {
        let script_sig = ScriptBuf::builder()
            .push_slice(push_bytes(redeem_script.as_bytes())?)
            .into_script();
        Ok(Unlock {
            script_sig,
            witness: Witness::from_slice(&[signature, pubkey]),
        })
    }
}

fn push_bytes(data: &[u8]) -> Result<PushBytesBuf, CoreError> {
    PushBytesBuf::try_from(data.to_vec()).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// A transaction with signature material attached.
#[derive(Debug, Clone)]
pub struct SignedTx {
    network: Network,
    utxos: Vec<Utxo>,
    tx: Transaction,
}

impl SignedTx {
    /// Pair a transaction with the UTXOs its inputs spend.
    ///
    /// Fails if the inputs do not reference exactly those UTXOs, in order.
    pub fn new(network: Network, utxos: Vec<Utxo>, tx: Transaction) -> Result<Self, CoreError> {
        if utxos.len() != tx.input.len() {
            return Err(CoreError::InputMismatch(format!(
                "{} inputs but {} utxos",
                tx.input.len(),
                utxos.len()
            )));
        }
        for (i, (input, utxo)) in tx.input.iter().zip(&utxos).enumerate() {
            if input.previous_output != utxo.outpoint().to_bitcoin() {
                return Err(CoreError::InputMismatch(format!(
                    "input {i} spends {} but utxo is {}",
                    input.previous_output,
                    utxo.outpoint()
                )));
            }
        }
        Ok(SignedTx { network, utxos, tx })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn utxos(&self) -> &[Utxo] {
        &self.utxos
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    /// True once every input carries a script_sig or witness.
    pub fn is_signed(&self) -> bool {
        !self.tx.input.is_empty()
            && self
                .tx
                .input
                .iter()
                .all(|input| !input.script_sig.is_empty() || !input.witness.is_empty())
    }

    /// Raw bytes in the chain's wire format.
    pub fn serialize(&self) -> Result<Vec<u8>, CoreError> {
        match self.network.chain() {
            Chain::Bitcoin | Chain::BitcoinCash => Ok(bitcoin::consensus::serialize(&self.tx)),
            Chain::ZCash => zcash::serialize_v5(self.network, &self.tx),
        }
    }

    pub fn serialize_hex(&self) -> Result<String, CoreError> {
        Ok(hex::encode(self.serialize()?))
    }

    /// Transaction hash, where it can be computed locally.
    ///
    /// ZCash v5 ids are ZIP-244 digests and are taken from the gateway instead.
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self.network.chain() {
            Chain::Bitcoin | Chain::BitcoinCash => Some(self.tx.compute_txid().into()),
            Chain::ZCash => None,
        }
    }
}

/// Build an unsigned transaction spending all of `utxos`.
///
/// Outputs are the recipients in order, followed by a refund to
/// `refund_to` when the leftover exceeds the dust threshold. A leftover at
/// or below dust is left to the fee. No coin selection happens here.
pub fn build(
    network: Network,
    utxos: &[Utxo],
    recipients: &[Recipient],
    refund_to: &Address,
    fee: Amount,
) -> Result<UnsignedTx, CoreError> {
    let dust = network.dust();
    if fee < dust {
        return Err(CoreError::GasTooLow { gas: fee, dust });
    }

    let available = utxos.sum();
    if available < dust {
        return Err(CoreError::InsufficientInputValue { available, dust });
    }

    let recipient_total = recipients
        .iter()
        .try_fold(Amount::ZERO, |acc, r| acc.checked_add(r.amount))
        .ok_or_else(|| CoreError::InvalidAmount("recipient total overflows".into()))?;
    let required = recipient_total
        .checked_add(fee)
        .ok_or_else(|| CoreError::InvalidAmount("recipient total plus fee overflows".into()))?;
    let refund = available
        .checked_sub(required)
        .ok_or_else(|| CoreError::InvalidAmount("refund underflows".into()))?;
    if refund.is_negative() {
        return Err(CoreError::InsufficientBalance { required, available });
    }

    let mut payments: Vec<(&Address, Amount)> =
        recipients.iter().map(|r| (&r.address, r.amount)).collect();
    if refund > dust {
        payments.push((refund_to, refund));
    }

    let mut output = Vec::with_capacity(payments.len());
    for (address, amount) in payments {
        if !address.is_valid_for(network) {
            return Err(CoreError::WrongNetwork {
                address: address.to_string(),
                expected: network,
            });
        }
        output.push(TxOut {
            value: amount.to_bitcoin()?,
            script_pubkey: address.script_pubkey(),
        });
    }

    let input = utxos
        .iter()
        .map(|utxo| TxIn {
            previous_output: utxo.outpoint().to_bitcoin(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::default(),
        })
        .collect();

    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output,
    };

    Ok(UnsignedTx {
        network,
        utxos: utxos.to_vec(),
        tx,
    })
}
