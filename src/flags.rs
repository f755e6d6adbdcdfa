//! Script verification flags.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

pub const VERIFY_NONE: u32 = 0;
/// Evaluate P2SH subscripts (BIP16), only for UTXOs created before Genesis.
pub const VERIFY_P2SH: u32 = 1 << 0;
/// Strict DER signatures with a defined sighash type, and strictly encoded
/// public keys.
pub const VERIFY_STRICTENC: u32 = 1 << 1;
/// Strict DER signatures (BIP66).
pub const VERIFY_DERSIG: u32 = 1 << 2;
/// Strict DER signatures with S at most half the curve order.
pub const VERIFY_LOW_S: u32 = 1 << 3;
/// The dummy element consumed by CHECKMULTISIG must be empty.
pub const VERIFY_NULLDUMMY: u32 = 1 << 4;
/// The unlocking script may only contain push operations.
pub const VERIFY_SIGPUSHONLY: u32 = 1 << 5;
/// Pushes and script numbers must be minimally encoded.
pub const VERIFY_MINIMALDATA: u32 = 1 << 6;
/// Executing NOP1 or NOP4..NOP10 fails the script.
pub const VERIFY_DISCOURAGE_UPGRADABLE_NOPS: u32 = 1 << 7;
/// Exactly one element must remain after evaluation.
pub const VERIFY_CLEANSTACK: u32 = 1 << 8;
pub const VERIFY_CHECKLOCKTIMEVERIFY: u32 = 1 << 9;
pub const VERIFY_CHECKSEQUENCEVERIFY: u32 = 1 << 10;
/// The argument of OP_IF/NOTIF must be empty or exactly `0x01`.
pub const VERIFY_MINIMALIF: u32 = 1 << 13;
/// Failed CHECK(MULTI)SIG operations require empty signatures.
pub const VERIFY_NULLFAIL: u32 = 1 << 14;
/// Public keys must be compressed.
pub const VERIFY_COMPRESSED_PUBKEYTYPE: u32 = 1 << 15;
/// Accept signatures using SIGHASH_FORKID.
pub const ENABLE_SIGHASH_FORKID: u32 = 1 << 16;
/// The spending transaction is in a block with Genesis rules.
pub const GENESIS: u32 = 1 << 18;
/// The UTXO being spent was created after Genesis activation.
pub const UTXO_AFTER_GENESIS: u32 = 1 << 19;

const SUPPORTED_FLAGS: u32 = VERIFY_P2SH
    | VERIFY_STRICTENC
    | VERIFY_DERSIG
    | VERIFY_LOW_S
    | VERIFY_NULLDUMMY
    | VERIFY_SIGPUSHONLY
    | VERIFY_MINIMALDATA
    | VERIFY_DISCOURAGE_UPGRADABLE_NOPS
    | VERIFY_CLEANSTACK
    | VERIFY_CHECKLOCKTIMEVERIFY
    | VERIFY_CHECKSEQUENCEVERIFY
    | VERIFY_MINIMALIF
    | VERIFY_NULLFAIL
    | VERIFY_COMPRESSED_PUBKEYTYPE
    | ENABLE_SIGHASH_FORKID
    | GENESIS
    | UTXO_AFTER_GENESIS;

/// Flags every block must comply with.
pub const MANDATORY_SCRIPT_VERIFY_FLAGS: u32 =
    VERIFY_P2SH | VERIFY_STRICTENC | ENABLE_SIGHASH_FORKID | VERIFY_LOW_S | VERIFY_NULLFAIL;

/// Flags standard transactions comply with.
pub const STANDARD_SCRIPT_VERIFY_FLAGS: u32 = MANDATORY_SCRIPT_VERIFY_FLAGS
    | VERIFY_DERSIG
    | VERIFY_MINIMALDATA
    | VERIFY_NULLDUMMY
    | VERIFY_DISCOURAGE_UPGRADABLE_NOPS
    | VERIFY_CLEANSTACK
    | VERIFY_CHECKLOCKTIMEVERIFY
    | VERIFY_CHECKSEQUENCEVERIFY;

/// A validated set of verification flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ScriptFlags(u32);

impl ScriptFlags {
    pub const NONE: ScriptFlags = ScriptFlags(VERIFY_NONE);

    /// Rejects unknown bits and the contradictory combination of a
    /// post-Genesis UTXO spent without Genesis rules.
    pub fn from_bits(bits: u32) -> Result<Self, Error> {
        if bits & !SUPPORTED_FLAGS != 0 {
            return Err(Error::Flags("unsupported flag bits"));
        }
        if bits & UTXO_AFTER_GENESIS != 0 && bits & GENESIS == 0 {
            return Err(Error::Flags("UTXO_AFTER_GENESIS requires GENESIS"));
        }
        Ok(Self(bits))
    }

    /// The flags a standard transaction is checked with.
    pub fn standard(genesis_enabled: bool, utxo_after_genesis: bool) -> Self {
        let mut bits = STANDARD_SCRIPT_VERIFY_FLAGS;
        if utxo_after_genesis {
            bits |= UTXO_AFTER_GENESIS;
        }
        if genesis_enabled {
            bits |= GENESIS | VERIFY_SIGPUSHONLY;
        }
        // a post-Genesis UTXO can only be spent under Genesis rules
        if utxo_after_genesis {
            bits |= GENESIS;
        }
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `flag` is set.
    pub fn has(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// Whether any bit of `flags` is set.
    pub fn has_any(self, flags: u32) -> bool {
        self.0 & flags != 0
    }

    pub fn utxo_after_genesis(self) -> bool {
        self.has(UTXO_AFTER_GENESIS)
    }

    pub fn require_minimal(self) -> bool {
        self.has(VERIFY_MINIMALDATA)
    }

    /// Returns a copy with `flag` cleared.
    pub fn without(self, flag: u32) -> Self {
        Self(self.0 & !flag)
    }
}

impl TryFrom<u32> for ScriptFlags {
    type Error = Error;

    fn try_from(bits: u32) -> Result<Self, Error> {
        Self::from_bits(bits)
    }
}

impl From<ScriptFlags> for u32 {
    fn from(flags: ScriptFlags) -> u32 {
        flags.0
    }
}

impl fmt::Display for ScriptFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const NAMES: &[(u32, &str)] = &[
            (VERIFY_P2SH, "P2SH"),
            (VERIFY_STRICTENC, "STRICTENC"),
            (VERIFY_DERSIG, "DERSIG"),
            (VERIFY_LOW_S, "LOW_S"),
            (VERIFY_NULLDUMMY, "NULLDUMMY"),
            (VERIFY_SIGPUSHONLY, "SIGPUSHONLY"),
            (VERIFY_MINIMALDATA, "MINIMALDATA"),
            (VERIFY_DISCOURAGE_UPGRADABLE_NOPS, "DISCOURAGE_UPGRADABLE_NOPS"),
            (VERIFY_CLEANSTACK, "CLEANSTACK"),
            (VERIFY_CHECKLOCKTIMEVERIFY, "CHECKLOCKTIMEVERIFY"),
            (VERIFY_CHECKSEQUENCEVERIFY, "CHECKSEQUENCEVERIFY"),
            (VERIFY_MINIMALIF, "MINIMALIF"),
            (VERIFY_NULLFAIL, "NULLFAIL"),
            (VERIFY_COMPRESSED_PUBKEYTYPE, "COMPRESSED_PUBKEYTYPE"),
            (ENABLE_SIGHASH_FORKID, "SIGHASH_FORKID"),
            (GENESIS, "GENESIS"),
            (UTXO_AFTER_GENESIS, "UTXO_AFTER_GENESIS"),
        ];
        if self.0 == 0 {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (bit, name) in NAMES {
            if self.0 & bit != 0 {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
