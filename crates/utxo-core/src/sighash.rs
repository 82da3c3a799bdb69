use bitcoin::consensus::serialize;
use bitcoin::hashes::Hash;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{PubkeyHash, Script, ScriptBuf, Transaction};

use crate::error::CoreError;
use crate::hash::sha256d;
use crate::network::{Chain, Network};
use crate::utxo::Utxo;
use crate::zcash;

/// `SIGHASH_ALL | SIGHASH_FORKID`, the only hash type used on Bitcoin Cash.
pub const SIGHASH_ALL_FORKID: u32 = 0x41;

/// Digests to sign for every input of `tx`, in input order.
pub fn signature_hashes(
    network: Network,
    tx: &Transaction,
    utxos: &[Utxo],
) -> Result<Vec<[u8; 32]>, CoreError> {
    if utxos.len() != tx.input.len() {
        return Err(CoreError::InputMismatch(format!(
            "{} inputs but {} utxos",
            tx.input.len(),
            utxos.len()
        )));
    }
    (0..tx.input.len())
        .map(|i| signature_hash(network, tx, utxos, i))
        .collect()
}

/// Digest to sign for input `index` with SIGHASH_ALL semantics.
pub fn signature_hash(
    network: Network,
    tx: &Transaction,
    utxos: &[Utxo],
    index: usize,
) -> Result<[u8; 32], CoreError> {
    let utxo = utxos
        .get(index)
        .ok_or_else(|| CoreError::InputMismatch(format!("no utxo for input {index}")))?;
    match network.chain() {
        Chain::Bitcoin => bitcoin_sighash(tx, utxo, index),
        Chain::BitcoinCash => forkid_sighash(tx, utxo, index),
        Chain::ZCash => zcash::signature_digest(network, tx, utxos, index),
    }
}

/// How an output's spending script is committed to by the signature.
enum ScriptCode {
    Legacy(ScriptBuf),
    SegwitV0(ScriptBuf),
}

fn script_code(utxo: &Utxo) -> Result<ScriptCode, CoreError> {
    let spk = utxo.script_pubkey();
    if spk.is_p2wpkh() {
        return Ok(ScriptCode::SegwitV0(p2wpkh_script_code(spk)));
    }
    if spk.is_p2wsh() {
        let witness_script = utxo.redeem_script().ok_or_else(|| {
            CoreError::InputMismatch(format!("p2wsh utxo {} has no witness script", utxo.outpoint()))
        })?;
        return Ok(ScriptCode::SegwitV0(witness_script.clone()));
    }
    if spk.is_p2sh() {
        let redeem = utxo.redeem_script().ok_or_else(|| {
            CoreError::InputMismatch(format!("p2sh utxo {} has no redeem script", utxo.outpoint()))
        })?;
        if redeem.is_p2wpkh() {
            return Ok(ScriptCode::SegwitV0(p2wpkh_script_code(redeem)));
        }
        return Ok(ScriptCode::Legacy(redeem.clone()));
    }
    Ok(ScriptCode::Legacy(spk.clone()))
}

/// The P2PKH script a P2WPKH program commits to under BIP-143.
pub(crate) fn p2wpkh_script_code(program_script: &Script) -> ScriptBuf {
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&program_script.as_bytes()[2..22]);
    ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash))
}

fn bitcoin_sighash(tx: &Transaction, utxo: &Utxo, index: usize) -> Result<[u8; 32], CoreError> {
    let cache_err = |e: bitcoin::transaction::InputsIndexError| CoreError::InputMismatch(e.to_string());
    match script_code(utxo)? {
        ScriptCode::Legacy(script) => {
            let hash = SighashCache::new(tx)
                .legacy_signature_hash(index, &script, EcdsaSighashType::All.to_u32())
                .map_err(cache_err)?;
            Ok(hash.to_byte_array())
        }
        ScriptCode::SegwitV0(script) => {
            let hash = SighashCache::new(tx)
                .p2wsh_signature_hash(index, &script, utxo.amount().to_bitcoin()?, EcdsaSighashType::All)
                .map_err(cache_err)?;
            Ok(hash.to_byte_array())
        }
    }
}

/// BIP-143 style digest with the fork id bit set.
fn forkid_sighash(tx: &Transaction, utxo: &Utxo, index: usize) -> Result<[u8; 32], CoreError> {
    let input = tx
        .input
        .get(index)
        .ok_or_else(|| CoreError::InputMismatch(format!("input index {index} out of bounds")))?;
    let script = utxo.redeem_script().unwrap_or(utxo.script_pubkey());

    let mut prevouts = Vec::new();
    let mut sequences = Vec::new();
    for txin in &tx.input {
        prevouts.extend_from_slice(&serialize(&txin.previous_output));
        sequences.extend_from_slice(&txin.sequence.to_consensus_u32().to_le_bytes());
    }
    let mut outputs = Vec::new();
    for txout in &tx.output {
        outputs.extend_from_slice(&serialize(txout));
    }

    let mut preimage = Vec::with_capacity(256);
    preimage.extend_from_slice(&tx.version.0.to_le_bytes());
    preimage.extend_from_slice(&sha256d(&prevouts));
    preimage.extend_from_slice(&sha256d(&sequences));
    preimage.extend_from_slice(&serialize(&input.previous_output));
    preimage.extend_from_slice(&serialize(script));
    preimage.extend_from_slice(&utxo.amount().to_bitcoin()?.to_sat().to_le_bytes());
    preimage.extend_from_slice(&input.sequence.to_consensus_u32().to_le_bytes());
    preimage.extend_from_slice(&sha256d(&outputs));
    preimage.extend_from_slice(&tx.lock_time.to_consensus_u32().to_le_bytes());
    preimage.extend_from_slice(&SIGHASH_ALL_FORKID.to_le_bytes());
    Ok(sha256d(&preimage))
}
