//! Script verification for signed transactions.
//!
//! Bitcoin inputs are executed against their previous outputs with the
//! standard flags (P2SH, WITNESS, STRICTENC, MINIMALDATA, NULLDUMMY,
//! NULLFAIL, CLEANSTACK, compressed witness keys). The engine understands the opcodes
//! used by the standard output templates: P2PK, P2PKH, bare multisig, P2SH,
//! P2WPKH, P2WSH and P2SH-wrapped witness programs. Anything else fails.
//!
//! Chains whose rules are [`ScriptRules::Unchecked`] are accepted without
//! executing anything.

use bitcoin::ecdsa::Signature;
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::*;
use bitcoin::opcodes::Opcode;
use bitcoin::script::Instruction;
use bitcoin::secp256k1::{Message, Secp256k1, VerifyOnly};
use bitcoin::sighash::SighashCache;
use bitcoin::{PubkeyHash, PublicKey, Script, ScriptBuf, Transaction, Witness};
use thiserror::Error;
use tracing::debug;

use crate::error::CoreError;
use crate::hash::{hash160, sha256, sha256d};
use crate::network::ScriptRules;
use crate::transaction::SignedTx;
use crate::utxo::Utxo;

const MAX_ELEMENT_SIZE: usize = 520;
const MAX_MULTISIG_KEYS: i64 = 20;

#[derive(Debug, Error)]
enum ScriptError {
    #[error("script_sig is not push-only")]
    SigPushOnly,
    #[error("script evaluated to false")]
    EvalFalse,
    #[error("malformed script: {0}")]
    Malformed(String),
    #[error("unsupported opcode {0}")]
    UnsupportedOpcode(Opcode),
    #[error("OP_RETURN encountered")]
    OpReturn,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("VERIFY failed")]
    Verify,
    #[error("data push is not minimally encoded")]
    MinimalData,
    #[error("push exceeds 520 bytes")]
    PushSize,
    #[error("script number out of range")]
    NumberOverflow,
    #[error("invalid multisig key or signature count")]
    MultisigCount,
    #[error("multisig dummy element is not empty")]
    NullDummy,
    #[error("failed signature check with non-empty signature")]
    NullFail,
    #[error("invalid signature encoding: {0}")]
    SigEncoding(String),
    #[error("invalid public key encoding: {0}")]
    PubkeyEncoding(String),
    #[error("uncompressed public key in witness script")]
    WitnessPubkeyType,
    #[error("stack not clean after execution")]
    CleanStack,
    #[error("witness program mismatch")]
    WitnessProgramMismatch,
    #[error("witness program has invalid length {0}")]
    WitnessProgramLength(usize),
    #[error("witness version {0} is not supported")]
    UnsupportedWitnessVersion(u8),
    #[error("witness program spent with non-empty script_sig")]
    WitnessMalleated,
    #[error("p2sh witness program spent with extra script_sig data")]
    WitnessMalleatedP2sh,
    #[error("witness provided for non-witness script")]
    WitnessUnexpected,
    #[error("{0}")]
    Amount(String),
}

/// Verify every input script of `signed` against the UTXO it spends.
pub fn verify(signed: &SignedTx) -> Result<(), CoreError> {
    let network = signed.network();
    if network.params().script_rules == ScriptRules::Unchecked {
        debug!(%network, "no script rules for chain, skipping verification");
        return Ok(());
    }

    let secp = Secp256k1::verification_only();
    let tx = signed.transaction();
    for (index, utxo) in signed.utxos().iter().enumerate() {
        verify_input(&secp, tx, utxo, index).map_err(|e| CoreError::ScriptVerificationFailed {
            input: index,
            reason: e.to_string(),
        })?;
    }
    debug!(%network, inputs = tx.input.len(), "transaction scripts verified");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SigVersion {
    Base,
    WitnessV0,
}

struct Checker<'a> {
    secp: &'a Secp256k1<VerifyOnly>,
    tx: &'a Transaction,
    index: usize,
    amount: bitcoin::Amount,
}

impl Checker<'_> {
    /// `Ok(false)` for a well-formed signature that does not verify.
    fn check_sig(
        &self,
        sig_bytes: &[u8],
        pubkey_bytes: &[u8],
        script_code: &Script,
        version: SigVersion,
    ) -> Result<bool, ScriptError> {
        if sig_bytes.is_empty() {
            return Ok(false);
        }
        let sig = Signature::from_slice(sig_bytes).map_err(|e| ScriptError::SigEncoding(e.to_string()))?;
        let pubkey =
            PublicKey::from_slice(pubkey_bytes).map_err(|e| ScriptError::PubkeyEncoding(e.to_string()))?;
        if version == SigVersion::WitnessV0 && !pubkey.compressed {
            return Err(ScriptError::WitnessPubkeyType);
        }

        let digest = match version {
            SigVersion::Base => SighashCache::new(self.tx)
                .legacy_signature_hash(self.index, script_code, sig.sighash_type.to_u32())
                .map_err(|e| ScriptError::Malformed(e.to_string()))?
                .to_byte_array(),
            SigVersion::WitnessV0 => SighashCache::new(self.tx)
                .p2wsh_signature_hash(self.index, script_code, self.amount, sig.sighash_type)
                .map_err(|e| ScriptError::Malformed(e.to_string()))?
                .to_byte_array(),
        };
        let msg = Message::from_digest(digest);
        Ok(self.secp.verify_ecdsa(&msg, &sig.signature, &pubkey.inner).is_ok())
    }
}

fn verify_input(
    secp: &Secp256k1<VerifyOnly>,
    tx: &Transaction,
    utxo: &Utxo,
    index: usize,
) -> Result<(), ScriptError> {
    let input = tx.input.get(index).ok_or(ScriptError::StackUnderflow)?;
    let script_sig = &input.script_sig;
    let script_pubkey = utxo.script_pubkey();
    let checker = Checker {
        secp,
        tx,
        index,
        amount: utxo.amount().to_bitcoin().map_err(|e| ScriptError::Amount(e.to_string()))?,
    };

    if !script_sig.is_push_only() {
        return Err(ScriptError::SigPushOnly);
    }

    let mut stack = Vec::new();
    eval(script_sig, &mut stack, &checker, SigVersion::Base)?;
    let p2sh_stack = stack.clone();
    eval(script_pubkey, &mut stack, &checker, SigVersion::Base)?;
    require_true(&stack)?;

    let mut had_witness = false;
    if let Some((version, program)) = witness_program(script_pubkey) {
        had_witness = true;
        if !script_sig.is_empty() {
            return Err(ScriptError::WitnessMalleated);
        }
        verify_witness_program(&input.witness, version, program, &checker)?;
        stack.truncate(1);
    }

    if script_pubkey.is_p2sh() {
        stack = p2sh_stack;
        let redeem = ScriptBuf::from(stack.pop().ok_or(ScriptError::StackUnderflow)?);
        eval(&redeem, &mut stack, &checker, SigVersion::Base)?;
        require_true(&stack)?;

        if let Some((version, program)) = witness_program(&redeem) {
            had_witness = true;
            if !is_single_push_of(script_sig, redeem.as_bytes()) {
                return Err(ScriptError::WitnessMalleatedP2sh);
            }
            verify_witness_program(&input.witness, version, program, &checker)?;
            stack.truncate(1);
        }
    }

    if stack.len() != 1 {
        return Err(ScriptError::CleanStack);
    }
    if !had_witness && !input.witness.is_empty() {
        return Err(ScriptError::WitnessUnexpected);
    }
    Ok(())
}

fn verify_witness_program(
    witness: &Witness,
    version: u8,
    program: &[u8],
    checker: &Checker<'_>,
) -> Result<(), ScriptError> {
    if version != 0 {
        return Err(ScriptError::UnsupportedWitnessVersion(version));
    }

    let (script, mut stack) = match program.len() {
        20 => {
            if witness.len() != 2 {
                return Err(ScriptError::WitnessProgramMismatch);
            }
            let mut hash = [0u8; 20];
            hash.copy_from_slice(program);
            (ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash)), witness.to_vec())
        }
        32 => {
            let mut items = witness.to_vec();
            let script_bytes = items.pop().ok_or(ScriptError::WitnessProgramMismatch)?;
            if sha256(&script_bytes)[..] != *program {
                return Err(ScriptError::WitnessProgramMismatch);
            }
            (ScriptBuf::from(script_bytes), items)
        }
        len => return Err(ScriptError::WitnessProgramLength(len)),
    };

    if stack.iter().any(|item| item.len() > MAX_ELEMENT_SIZE) {
        return Err(ScriptError::PushSize);
    }
    eval(&script, &mut stack, checker, SigVersion::WitnessV0)?;
    if stack.len() != 1 {
        return Err(ScriptError::CleanStack);
    }
    require_true(&stack)
}

/// `(version, program)` if `script` is a witness program.
fn witness_program(script: &Script) -> Option<(u8, &[u8])> {
    let bytes = script.as_bytes();
    if !(4..=42).contains(&bytes.len()) || usize::from(bytes[1]) + 2 != bytes.len() {
        return None;
    }
    let version = match bytes[0] {
        0x00 => 0,
        op @ 0x51..=0x60 => op - 0x50,
        _ => return None,
    };
    Some((version, &bytes[2..]))
}

fn is_single_push_of(script: &Script, data: &[u8]) -> bool {
    let mut instructions = script.instructions_minimal();
    matches!(
        (instructions.next(), instructions.next()),
        (Some(Ok(Instruction::PushBytes(push))), None) if push.as_bytes() == data
    )
}

fn require_true(stack: &[Vec<u8>]) -> Result<(), ScriptError> {
    match stack.last() {
        Some(top) if cast_to_bool(top) => Ok(()),
        _ => Err(ScriptError::EvalFalse),
    }
}

fn eval(
    script: &Script,
    stack: &mut Vec<Vec<u8>>,
    checker: &Checker<'_>,
    version: SigVersion,
) -> Result<(), ScriptError> {
    for instruction in script.instructions_minimal() {
        match instruction.map_err(script_error)? {
            Instruction::PushBytes(push) => {
                if push.len() > MAX_ELEMENT_SIZE {
                    return Err(ScriptError::PushSize);
                }
                stack.push(push.as_bytes().to_vec());
            }
            Instruction::Op(op) => execute(op, script, stack, checker, version)?,
        }
    }
    Ok(())
}

fn script_error(err: bitcoin::script::Error) -> ScriptError {
    match err {
        bitcoin::script::Error::NonMinimalPush => ScriptError::MinimalData,
        other => ScriptError::Malformed(other.to_string()),
    }
}

fn execute(
    op: Opcode,
    script: &Script,
    stack: &mut Vec<Vec<u8>>,
    checker: &Checker<'_>,
    version: SigVersion,
) -> Result<(), ScriptError> {
    match op {
        OP_NOP => {}
        OP_RETURN => return Err(ScriptError::OpReturn),
        OP_VERIFY => {
            if !cast_to_bool(&pop(stack)?) {
                return Err(ScriptError::Verify);
            }
        }
        OP_DUP => {
            let top = stack.last().ok_or(ScriptError::StackUnderflow)?.clone();
            stack.push(top);
        }
        OP_DROP => {
            pop(stack)?;
        }
        OP_SWAP => {
            let len = stack.len();
            if len < 2 {
                return Err(ScriptError::StackUnderflow);
            }
            stack.swap(len - 1, len - 2);
        }
        OP_EQUAL | OP_EQUALVERIFY => {
            let a = pop(stack)?;
            let b = pop(stack)?;
            push_or_verify(stack, a == b, op == OP_EQUALVERIFY)?;
        }
        OP_HASH160 => {
            let top = pop(stack)?;
            stack.push(hash160(&top).to_vec());
        }
        OP_SHA256 => {
            let top = pop(stack)?;
            stack.push(sha256(&top).to_vec());
        }
        OP_HASH256 => {
            let top = pop(stack)?;
            stack.push(sha256d(&top).to_vec());
        }
        OP_CHECKSIG | OP_CHECKSIGVERIFY => {
            let pubkey = pop(stack)?;
            let sig = pop(stack)?;
            let ok = checker.check_sig(&sig, &pubkey, script, version)?;
            if !ok && !sig.is_empty() {
                return Err(ScriptError::NullFail);
            }
            push_or_verify(stack, ok, op == OP_CHECKSIGVERIFY)?;
        }
        OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
            let ok = check_multisig(stack, script, checker, version)?;
            push_or_verify(stack, ok, op == OP_CHECKMULTISIGVERIFY)?;
        }
        OP_PUSHNUM_NEG1 => stack.push(vec![0x81]),
        op if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&op.to_u8()) => {
            stack.push(vec![op.to_u8() - OP_PUSHNUM_1.to_u8() + 1]);
        }
        other => return Err(ScriptError::UnsupportedOpcode(other)),
    }
    Ok(())
}

fn check_multisig(
    stack: &mut Vec<Vec<u8>>,
    script: &Script,
    checker: &Checker<'_>,
    version: SigVersion,
) -> Result<bool, ScriptError> {
    let key_count = decode_num(&pop(stack)?)?;
    if !(0..=MAX_MULTISIG_KEYS).contains(&key_count) {
        return Err(ScriptError::MultisigCount);
    }
    let mut keys = pop_n(stack, key_count as usize)?;
    keys.reverse();

    let sig_count = decode_num(&pop(stack)?)?;
    if !(0..=key_count).contains(&sig_count) {
        return Err(ScriptError::MultisigCount);
    }
    let mut sigs = pop_n(stack, sig_count as usize)?;
    sigs.reverse();

    if !pop(stack)?.is_empty() {
        return Err(ScriptError::NullDummy);
    }

    // Signatures must appear in the same order as their keys.
    let mut success = true;
    let (mut isig, mut ikey) = (0, 0);
    while isig < sigs.len() {
        if keys.len() - ikey < sigs.len() - isig {
            success = false;
            break;
        }
        if checker.check_sig(&sigs[isig], &keys[ikey], script, version)? {
            isig += 1;
        }
        ikey += 1;
    }

    if !success && sigs.iter().any(|sig| !sig.is_empty()) {
        return Err(ScriptError::NullFail);
    }
    Ok(success)
}

fn push_or_verify(stack: &mut Vec<Vec<u8>>, value: bool, verify: bool) -> Result<(), ScriptError> {
    if verify {
        if !value {
            return Err(ScriptError::Verify);
        }
    } else {
        stack.push(if value { vec![1] } else { Vec::new() });
    }
    Ok(())
}

fn pop(stack: &mut Vec<Vec<u8>>) -> Result<Vec<u8>, ScriptError> {
    stack.pop().ok_or(ScriptError::StackUnderflow)
}

fn pop_n(stack: &mut Vec<Vec<u8>>, n: usize) -> Result<Vec<Vec<u8>>, ScriptError> {
    (0..n).map(|_| pop(stack)).collect()
}

fn cast_to_bool(bytes: &[u8]) -> bool {
    match bytes.split_last() {
        None => false,
        Some((last, rest)) => rest.iter().any(|b| *b != 0) || (*last != 0 && *last != 0x80),
    }
}

/// Minimal little-endian sign-magnitude script number, at most 4 bytes.
fn decode_num(bytes: &[u8]) -> Result<i64, ScriptError> {
    if bytes.len() > 4 {
        return Err(ScriptError::NumberOverflow);
    }
    let Some(&last) = bytes.last() else {
        return Ok(0);
    };
    // A zero top byte is only allowed to hold the sign bit of the byte below.
    if last & 0x7f == 0 && bytes.len().checked_sub(2).map_or(true, |i| bytes[i] & 0x80 == 0) {
        return Err(ScriptError::MinimalData);
    }
    let mut value = bytes
        .iter()
        .enumerate()
        .fold(0i64, |acc, (i, b)| acc | (i64::from(*b) << (8 * i)));
    if last & 0x80 != 0 {
        value &= !(0x80i64 << (8 * (bytes.len() - 1)));
        value = -value;
    }
    Ok(value)
}
