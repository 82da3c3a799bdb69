//! ZCash v5 (ZIP-225) transparent-only wire format and ZIP-244 signature digests.
//!
//! Transactions are built as `bitcoin::Transaction` values. Transparent
//! inputs and outputs share Bitcoin's consensus encoding, so they are
//! written with it and framed by the v5 header and empty Sapling and
//! Orchard bundles. Both the header and the digest commit to the
//! network's consensus branch id.

use bitcoin::consensus::encode::{serialize, VarInt};
use bitcoin::Transaction;

use crate::error::CoreError;
use crate::network::Network;
use crate::utxo::Utxo;

/// fOverwintered | v5.
const TX_VERSION: u32 = 0x8000_0005;
const VERSION_GROUP_ID: u32 = 0x26A7_270A;
/// Transactions built here never expire.
const EXPIRY_HEIGHT: u32 = 0;

const SIGHASH_ALL: u8 = 0x01;

/// Branch id of `network`, or `UnsupportedOperation` off ZCash.
pub fn branch_id(network: Network) -> Result<u32, CoreError> {
    network
        .params()
        .consensus_branch_id
        .ok_or(CoreError::UnsupportedOperation {
            operation: "zcash v5 encoding",
            network,
        })
}

/// Serialize a signed transparent transaction in v5 layout for `network`.
///
/// Segwit witnesses have no place in this format and are rejected.
pub fn serialize_v5(network: Network, tx: &Transaction) -> Result<Vec<u8>, CoreError> {
    let branch_id = branch_id(network)?;
    if tx.input.iter().any(|input| !input.witness.is_empty()) {
        return Err(CoreError::Serialization(
            "zcash transactions cannot carry witness data".into(),
        ));
    }

    let mut buf = header(branch_id, tx);
    buf.extend(serialize(&tx.input));
    buf.extend(serialize(&tx.output));
    // Sapling spends, Sapling outputs, Orchard actions.
    for _ in 0..3 {
        buf.extend(serialize(&VarInt(0)));
    }
    Ok(buf)
}

/// ZIP-244 SIGHASH_ALL digest for transparent input `input_index`.
pub fn signature_digest(
    network: Network,
    tx: &Transaction,
    utxos: &[Utxo],
    input_index: usize,
) -> Result<[u8; 32], CoreError> {
    let branch_id = branch_id(network)?;
    let transparent = transparent_sig_digest(tx, utxos, input_index)?;

    let mut personal = *b"ZcashTxHash_\0\0\0\0";
    personal[12..].copy_from_slice(&branch_id.to_le_bytes());
    Ok(blake2b(
        &personal,
        &[
            &blake2b(b"ZTxIdHeadersHash", &[&header(branch_id, tx)]),
            &transparent,
            &blake2b(b"ZTxIdSaplingHash", &[]),
            &blake2b(b"ZTxIdOrchardHash", &[]),
        ],
    ))
}

fn transparent_sig_digest(
    tx: &Transaction,
    utxos: &[Utxo],
    input_index: usize,
) -> Result<[u8; 32], CoreError> {
    let (Some(input), Some(utxo)) = (tx.input.get(input_index), utxos.get(input_index)) else {
        return Err(CoreError::InputMismatch(format!(
            "input index {input_index} out of bounds"
        )));
    };

    let prevouts: Vec<Vec<u8>> = tx.input.iter().map(|txin| serialize(&txin.previous_output)).collect();
    let sequences: Vec<[u8; 4]> = tx
        .input
        .iter()
        .map(|txin| txin.sequence.to_consensus_u32().to_le_bytes())
        .collect();
    let amounts: Vec<[u8; 8]> = utxos.iter().map(|u| u.amount().to_sat().to_le_bytes()).collect();
    let script_pubkeys: Vec<Vec<u8>> = utxos.iter().map(|u| serialize(u.script_pubkey())).collect();
    let outputs: Vec<Vec<u8>> = tx.output.iter().map(serialize).collect();

    let script_code = utxo.redeem_script().unwrap_or(utxo.script_pubkey());
    let txin_digest = blake2b(
        b"Zcash___TxInHash",
        &[
            &serialize(&input.previous_output),
            &utxo.amount().to_sat().to_le_bytes(),
            &serialize(script_code),
            &input.sequence.to_consensus_u32().to_le_bytes(),
        ],
    );

    Ok(blake2b(
        b"ZTxIdTranspaHash",
        &[
            &[SIGHASH_ALL],
            &blake2b(b"ZTxIdPrevoutHash", &as_parts(&prevouts)),
            &blake2b(b"ZTxIdAmountsHash", &as_parts(&amounts)),
            &blake2b(b"ZTxIdScriptsHash", &as_parts(&script_pubkeys)),
            &blake2b(b"ZTxIdSequencHash", &as_parts(&sequences)),
            &blake2b(b"ZTxIdOutputsHash", &as_parts(&outputs)),
            &txin_digest,
        ],
    ))
}

fn header(branch_id: u32, tx: &Transaction) -> Vec<u8> {
    [
        TX_VERSION,
        VERSION_GROUP_ID,
        branch_id,
        tx.lock_time.to_consensus_u32(),
        EXPIRY_HEIGHT,
    ]
    .iter()
    .flat_map(|field| field.to_le_bytes())
    .collect()
}

fn as_parts<T: AsRef<[u8]>>(items: &[T]) -> Vec<&[u8]> {
    items.iter().map(|item| item.as_ref()).collect()
}

/// BLAKE2b-256 over the concatenation of `parts`.
fn blake2b(personal: &[u8; 16], parts: &[&[u8]]) -> [u8; 32] {
    let mut state = blake2b_simd::Params::new()
        .hash_length(32)
        .personal(personal)
        .to_state();
    for part in parts {
        state.update(part);
    }
    let mut digest = [0u8; 32];
    digest.copy_from_slice(state.finalize().as_bytes());
    digest
}
