use thiserror::Error;

use crate::asm::FromAsmError;

/// Error of a script execution.
///
/// Equivalent to the node's `ScriptError_t`, minus `OK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ExecError {
    #[error("unknown error")]
    UnknownError,
    #[error("script evaluated without error but finished with a false/empty top stack element")]
    EvalFalse,
    #[error("OP_RETURN was encountered")]
    OpReturn,

    // Max sizes
    #[error("script is too big")]
    ScriptSize,
    #[error("push value size limit exceeded")]
    PushSize,
    #[error("operation limit exceeded")]
    OpCount,
    #[error("stack size limit exceeded")]
    StackSize,
    #[error("signature count negative or greater than pubkey count")]
    SigCount,
    #[error("pubkey count negative or limit exceeded")]
    PubkeyCount,

    // Failed verify operations
    #[error("script failed an OP_VERIFY operation")]
    Verify,
    #[error("script failed an OP_EQUALVERIFY operation")]
    EqualVerify,
    #[error("script failed an OP_CHECKMULTISIGVERIFY operation")]
    CheckMultiSigVerify,
    #[error("script failed an OP_CHECKSIGVERIFY operation")]
    CheckSigVerify,
    #[error("script failed an OP_NUMEQUALVERIFY operation")]
    NumEqualVerify,

    // Logical/format/canonical errors
    #[error("opcode missing or not understood")]
    BadOpcode,
    #[error("attempted to use a disabled opcode")]
    DisabledOpcode,
    #[error("operation not valid with the current stack size")]
    InvalidStackOperation,
    #[error("operation not valid with the current altstack size")]
    InvalidAltstackOperation,
    #[error("invalid OP_IF construction")]
    UnbalancedConditional,

    // CHECKLOCKTIMEVERIFY and CHECKSEQUENCEVERIFY
    #[error("negative locktime")]
    NegativeLocktime,
    #[error("locktime requirement not satisfied")]
    UnsatisfiedLocktime,

    // Malleability
    #[error("signature hash type missing or not understood")]
    SigHashtype,
    #[error("non-canonical DER signature")]
    SigDer,
    #[error("data push larger than necessary")]
    MinimalData,
    #[error("only push operators allowed in signatures")]
    SigPushOnly,
    #[error("non-canonical signature: S value is unnecessarily high")]
    SigHighS,
    #[error("dummy CHECKMULTISIG argument must be zero")]
    SigNullDummy,
    #[error("public key is neither compressed or uncompressed")]
    PubkeyType,
    #[error("extra items left on stack after execution")]
    CleanStack,
    #[error("OP_IF/NOTIF argument must be minimal")]
    MinimalIf,
    #[error("signature must be zero for failed CHECK(MULTI)SIG operation")]
    SigNullFail,

    // Softfork safeness
    #[error("NOPx reserved for soft-fork upgrades")]
    DiscourageUpgradableNops,
    #[error("using non-compressed public key")]
    NonCompressedPubkey,

    // Fork id
    #[error("illegal use of SIGHASH_FORKID")]
    IllegalForkId,
    #[error("signature must use SIGHASH_FORKID")]
    MustUseForkId,

    // Splice and numeric opcodes
    #[error("invalid operand size")]
    InvalidOperandSize,
    #[error("given operand is not a number within the valid range")]
    InvalidNumberRange,
    #[error("the requested encoding is impossible to satisfy")]
    ImpossibleEncoding,
    #[error("invalid OP_SPLIT range")]
    InvalidSplitRange,
    #[error("division by zero")]
    DivByZero,
    #[error("modulo by zero")]
    ModByZero,
    #[error("script number overflow")]
    ScriptNumOverflow,
    #[error("non-minimally encoded script number")]
    ScriptNumMinEncode,
}

/// A ceiling setter was given a value it cannot accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{setting} must not be negative (got {value})")]
    Negative { setting: &'static str, value: i64 },
    #[error("{setting} must not exceed {max} (got {value})")]
    AboveConsensus {
        setting: &'static str,
        value: i64,
        max: u64,
    },
    #[error("{setting} must be at least {min} (got {value})")]
    BelowMinimum {
        setting: &'static str,
        value: i64,
        min: u64,
    },
    #[error("policy stack memory usage {policy} exceeds consensus limit {consensus}")]
    PolicyAboveConsensus { policy: u64, consensus: u64 },
}

/// Errors setting up an evaluation, as opposed to a script failing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("script execution failed: {0}")]
    Exec(#[from] ExecError),
    #[error("invalid script flags: {0}")]
    Flags(&'static str),
    #[error("invalid script config: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid script ASM: {0}")]
    Asm(#[from] FromAsmError),
}
