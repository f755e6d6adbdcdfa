//! Signature verification hook and the encoding rules applied around it.

use bitcoin::secp256k1::{self, ecdsa, Message, PublicKey};

use crate::flags::{
    ENABLE_SIGHASH_FORKID, VERIFY_COMPRESSED_PUBKEYTYPE, VERIFY_DERSIG, VERIFY_LOW_S,
    VERIFY_STRICTENC,
};
use crate::number::ScriptNum;
use crate::{ExecError, ScriptFlags};

lazy_static::lazy_static! {
    static ref SECP: secp256k1::Secp256k1<secp256k1::All> = secp256k1::Secp256k1::new();
}

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_FORKID: u32 = 0x40;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

const LOCKTIME_THRESHOLD: i64 = 500_000_000;
const SEQUENCE_FINAL: u32 = 0xffff_ffff;
const SEQUENCE_LOCKTIME_DISABLE_FLAG: i64 = 1 << 31;
const SEQUENCE_LOCKTIME_TYPE_FLAG: i64 = 1 << 22;
const SEQUENCE_LOCKTIME_MASK: i64 = 0x0000_ffff;

/// What the verification hook concluded about a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureOutcome {
    Valid,
    /// Well formed but does not sign the document with this key.
    Invalid,
    /// The signature or key could not be parsed.
    Malformed,
}

/// The transaction-dependent checks of script evaluation.
///
/// Implementations are bound to one signing document, the transaction input
/// being spent.
pub trait SignatureChecker {
    /// Checks `sig`, with its trailing sighash byte, by `pubkey` over the
    /// document with `script_code` as the signed script.
    fn check_sig(
        &self,
        sig: &[u8],
        pubkey: &[u8],
        script_code: &[u8],
        flags: ScriptFlags,
    ) -> SignatureOutcome;

    fn check_lock_time(&self, _lock_time: &ScriptNum) -> bool {
        false
    }

    fn check_sequence(&self, _sequence: &ScriptNum) -> bool {
        false
    }
}

impl<C: SignatureChecker + ?Sized> SignatureChecker for &C {
    fn check_sig(&self, sig: &[u8], pubkey: &[u8], script_code: &[u8], flags: ScriptFlags) -> SignatureOutcome {
        (**self).check_sig(sig, pubkey, script_code, flags)
    }

    fn check_lock_time(&self, lock_time: &ScriptNum) -> bool {
        (**self).check_lock_time(lock_time)
    }

    fn check_sequence(&self, sequence: &ScriptNum) -> bool {
        (**self).check_sequence(sequence)
    }
}

/// Accepts every signature and every lock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignatureCheck;

impl SignatureChecker for NoSignatureCheck {
    fn check_sig(&self, _: &[u8], _: &[u8], _: &[u8], _: ScriptFlags) -> SignatureOutcome {
        SignatureOutcome::Valid
    }

    fn check_lock_time(&self, _: &ScriptNum) -> bool {
        true
    }

    fn check_sequence(&self, _: &ScriptNum) -> bool {
        true
    }
}

/// Lock fields of the spending transaction and input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxLockFields {
    pub version: i32,
    pub lock_time: u32,
    pub sequence: u32,
}

/// Verifies ECDSA signatures over digests computed by the caller.
///
/// `digest` receives the script code and the sighash type of a signature and
/// returns the 32-byte message that signature should sign, or `None` when no
/// digest can be computed for that sighash type.
pub struct EcdsaChecker<F> {
    digest: F,
    tx: Option<TxLockFields>,
}

impl<F> EcdsaChecker<F>
where
    F: Fn(&[u8], u32) -> Option<[u8; 32]>,
{
    pub fn new(digest: F) -> Self {
        Self { digest, tx: None }
    }

    /// Enables CHECKLOCKTIMEVERIFY and CHECKSEQUENCEVERIFY against `tx`.
    pub fn with_lock_fields(mut self, tx: TxLockFields) -> Self {
        self.tx = Some(tx);
        self
    }
}

impl<F> SignatureChecker for EcdsaChecker<F>
where
    F: Fn(&[u8], u32) -> Option<[u8; 32]>,
{
    fn check_sig(&self, sig: &[u8], pubkey: &[u8], script_code: &[u8], _flags: ScriptFlags) -> SignatureOutcome {
        let (hashtype, der) = match sig.split_last() {
            Some((hashtype, der)) => (*hashtype, der),
            None => return SignatureOutcome::Invalid,
        };
        let pk = match PublicKey::from_slice(pubkey) {
            Ok(pk) => pk,
            Err(_) => return SignatureOutcome::Malformed,
        };
        let mut sig = match ecdsa::Signature::from_der_lax(der) {
            Ok(s) => s,
            Err(_) => return SignatureOutcome::Malformed,
        };
        // libsecp256k1 only verifies lower-S signatures
        sig.normalize_s();

        let digest = match (self.digest)(script_code, hashtype as u32) {
            Some(d) => d,
            None => return SignatureOutcome::Malformed,
        };
        if SECP
            .verify_ecdsa(&Message::from_digest(digest), &sig, &pk)
            .is_ok()
        {
            SignatureOutcome::Valid
        } else {
            SignatureOutcome::Invalid
        }
    }

    fn check_lock_time(&self, lock_time: &ScriptNum) -> bool {
        let tx = match self.tx {
            Some(tx) => tx,
            None => return false,
        };
        let n = lock_time.to_i64_saturating();
        let tx_lock_time = tx.lock_time as i64;

        // both heights or both timestamps
        if !((tx_lock_time < LOCKTIME_THRESHOLD && n < LOCKTIME_THRESHOLD)
            || (tx_lock_time >= LOCKTIME_THRESHOLD && n >= LOCKTIME_THRESHOLD))
        {
            return false;
        }
        if n > tx_lock_time {
            return false;
        }
        // a final input ignores the lock time
        tx.sequence != SEQUENCE_FINAL
    }

    fn check_sequence(&self, sequence: &ScriptNum) -> bool {
        let tx = match self.tx {
            Some(tx) => tx,
            None => return false,
        };
        let tx_sequence = tx.sequence as i64;
        if tx.version < 2 {
            return false;
        }
        if tx_sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return false;
        }

        let mask = SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK;
        let tx_masked = tx_sequence & mask;
        let n_masked = sequence.to_i64_saturating() & mask;
        if !((tx_masked < SEQUENCE_LOCKTIME_TYPE_FLAG && n_masked < SEQUENCE_LOCKTIME_TYPE_FLAG)
            || (tx_masked >= SEQUENCE_LOCKTIME_TYPE_FLAG && n_masked >= SEQUENCE_LOCKTIME_TYPE_FLAG))
        {
            return false;
        }
        n_masked <= tx_masked
    }
}

/// Strict DER encoding of a signature followed by one sighash byte (BIP66).
pub fn is_valid_signature_encoding(sig: &[u8]) -> bool {
    // Format: 0x30 [total-length] 0x02 [R-length] [R] 0x02 [S-length] [S] [sighash]
    if sig.len() < 9 || sig.len() > 73 {
        return false;
    }
    if sig[0] != 0x30 {
        return false;
    }
    // the length covers everything but the sighash byte
    if sig[1] as usize != sig.len() - 3 {
        return false;
    }

    let len_r = sig[3] as usize;
    if 5 + len_r >= sig.len() {
        return false;
    }
    let len_s = sig[5 + len_r] as usize;
    if len_r + len_s + 7 != sig.len() {
        return false;
    }

    if sig[2] != 0x02 || len_r == 0 {
        return false;
    }
    // negative or padded R
    if sig[4] & 0x80 != 0 {
        return false;
    }
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }

    if sig[len_r + 4] != 0x02 || len_s == 0 {
        return false;
    }
    // negative or padded S
    if sig[len_r + 6] & 0x80 != 0 {
        return false;
    }
    if len_s > 1 && sig[len_r + 6] == 0x00 && sig[len_r + 7] & 0x80 == 0 {
        return false;
    }
    true
}

/// Requires S to be at most half the curve order.
fn check_low_s(sig: &[u8]) -> Result<(), ExecError> {
    if !is_valid_signature_encoding(sig) {
        return Err(ExecError::SigDer);
    }
    let der = &sig[..sig.len() - 1];
    let parsed = ecdsa::Signature::from_der_lax(der).map_err(|_| ExecError::SigHighS)?;
    let mut normalized = parsed;
    normalized.normalize_s();
    if normalized != parsed {
        return Err(ExecError::SigHighS);
    }
    Ok(())
}

fn base_sighash_type(hashtype: u8) -> u32 {
    hashtype as u32 & !(SIGHASH_ANYONECANPAY | SIGHASH_FORKID)
}

/// The sighash byte, `None` for an empty signature.
pub fn sighash_type(sig: &[u8]) -> Option<u32> {
    sig.last().map(|b| *b as u32)
}

/// Applies the signature encoding rules selected by `flags`.
///
/// Empty signatures always pass, they are a way to fail a check on purpose.
pub fn check_signature_encoding(sig: &[u8], flags: ScriptFlags) -> Result<(), ExecError> {
    let hashtype = match sig.last() {
        Some(b) => *b,
        None => return Ok(()),
    };
    if flags.has_any(VERIFY_DERSIG | VERIFY_LOW_S | VERIFY_STRICTENC)
        && !is_valid_signature_encoding(sig)
    {
        return Err(ExecError::SigDer);
    }
    if flags.has(VERIFY_LOW_S) {
        check_low_s(sig)?;
    }
    if flags.has(VERIFY_STRICTENC) {
        let base = base_sighash_type(hashtype);
        if !(SIGHASH_ALL..=SIGHASH_SINGLE).contains(&base) {
            return Err(ExecError::SigHashtype);
        }
        let uses_fork_id = hashtype as u32 & SIGHASH_FORKID != 0;
        let fork_id_enabled = flags.has(ENABLE_SIGHASH_FORKID);
        if !fork_id_enabled && uses_fork_id {
            return Err(ExecError::IllegalForkId);
        }
        if fork_id_enabled && !uses_fork_id {
            return Err(ExecError::MustUseForkId);
        }
    }
    Ok(())
}

fn is_compressed_or_uncompressed(pk: &[u8]) -> bool {
    match pk.first() {
        Some(0x04) => pk.len() == 65,
        Some(0x02) | Some(0x03) => pk.len() == 33,
        _ => false,
    }
}

fn is_compressed(pk: &[u8]) -> bool {
    pk.len() == 33 && matches!(pk[0], 0x02 | 0x03)
}

/// Applies the public key encoding rules selected by `flags`.
pub fn check_pubkey_encoding(pk: &[u8], flags: ScriptFlags) -> Result<(), ExecError> {
    if flags.has(VERIFY_STRICTENC) && !is_compressed_or_uncompressed(pk) {
        return Err(ExecError::PubkeyType);
    }
    if flags.has(VERIFY_COMPRESSED_PUBKEYTYPE) && !is_compressed(pk) {
        return Err(ExecError::NonCompressedPubkey);
    }
    Ok(())
}

/// Whether a signature commits to the fork id and so does not sign its own
/// removal from the script code.
pub fn uses_fork_id(sig: &[u8], flags: ScriptFlags) -> bool {
    flags.has(ENABLE_SIGHASH_FORKID)
        && sighash_type(sig).map_or(false, |t| t & SIGHASH_FORKID != 0)
}
