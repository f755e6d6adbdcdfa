//! The closed opcode table of the post-Genesis protocol.
//!
//! Every byte value maps to exactly one [`Opcode`]: named opcodes get their own
//! variant, direct pushes of 1 to 75 bytes share [`Opcode::OP_PUSHBYTES_N`] and
//! the unassigned range shares [`Opcode::OP_UNDEFINED`]. Conversion in both
//! directions is total, so classification never has to fall back on numeric
//! range comparisons outside this module.

use core::cmp::Ordering;
use std::fmt;

macro_rules! opcode_table {
    ($($op:ident = $val:literal,)*) => {
        /// A single script opcode.
        #[allow(non_camel_case_types)]
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($op,)*
            /// Direct push of 1 to 75 bytes, the value is the payload length.
            OP_PUSHBYTES_N(u8),
            /// Unassigned opcode in the range `0xba..=0xfe`.
            OP_UNDEFINED(u8),
        }

        impl Opcode {
            /// The byte encoding of this opcode.
            pub fn to_u8(self) -> u8 {
                match self {
                    $(Opcode::$op => $val,)*
                    Opcode::OP_PUSHBYTES_N(n) => n,
                    Opcode::OP_UNDEFINED(b) => b,
                }
            }

            /// The canonical name, `None` for direct pushes and undefined opcodes.
            pub fn name(self) -> Option<&'static str> {
                match self {
                    $(Opcode::$op => Some(stringify!($op)),)*
                    _ => None,
                }
            }

            /// Looks up a named opcode by its canonical `OP_` name.
            pub(crate) fn from_name(name: &str) -> Option<Opcode> {
                match name {
                    $(stringify!($op) => Some(Opcode::$op),)*
                    _ => None,
                }
            }
        }

        impl From<u8> for Opcode {
            fn from(b: u8) -> Opcode {
                match b {
                    $($val => Opcode::$op,)*
                    0x01..=0x4b => Opcode::OP_PUSHBYTES_N(b),
                    _ => Opcode::OP_UNDEFINED(b),
                }
            }
        }
    };
}

opcode_table! {
    // push value
    OP_0 = 0x00,
    OP_PUSHDATA1 = 0x4c,
    OP_PUSHDATA2 = 0x4d,
    OP_PUSHDATA4 = 0x4e,
    OP_1NEGATE = 0x4f,
    OP_RESERVED = 0x50,
    OP_1 = 0x51,
    OP_2 = 0x52,
    OP_3 = 0x53,
    OP_4 = 0x54,
    OP_5 = 0x55,
    OP_6 = 0x56,
    OP_7 = 0x57,
    OP_8 = 0x58,
    OP_9 = 0x59,
    OP_10 = 0x5a,
    OP_11 = 0x5b,
    OP_12 = 0x5c,
    OP_13 = 0x5d,
    OP_14 = 0x5e,
    OP_15 = 0x5f,
    OP_16 = 0x60,

    // control
    OP_NOP = 0x61,
    OP_VER = 0x62,
    OP_IF = 0x63,
    OP_NOTIF = 0x64,
    OP_VERIF = 0x65,
    OP_VERNOTIF = 0x66,
    OP_ELSE = 0x67,
    OP_ENDIF = 0x68,
    OP_VERIFY = 0x69,
    OP_RETURN = 0x6a,

    // stack ops
    OP_TOALTSTACK = 0x6b,
    OP_FROMALTSTACK = 0x6c,
    OP_2DROP = 0x6d,
    OP_2DUP = 0x6e,
    OP_3DUP = 0x6f,
    OP_2OVER = 0x70,
    OP_2ROT = 0x71,
    OP_2SWAP = 0x72,
    OP_IFDUP = 0x73,
    OP_DEPTH = 0x74,
    OP_DROP = 0x75,
    OP_DUP = 0x76,
    OP_NIP = 0x77,
    OP_OVER = 0x78,
    OP_PICK = 0x79,
    OP_ROLL = 0x7a,
    OP_ROT = 0x7b,
    OP_SWAP = 0x7c,
    OP_TUCK = 0x7d,

    // splice ops
    OP_CAT = 0x7e,
    OP_SPLIT = 0x7f,
    OP_NUM2BIN = 0x80,
    OP_BIN2NUM = 0x81,
    OP_SIZE = 0x82,

    // bit logic
    OP_INVERT = 0x83,
    OP_AND = 0x84,
    OP_OR = 0x85,
    OP_XOR = 0x86,
    OP_EQUAL = 0x87,
    OP_EQUALVERIFY = 0x88,
    OP_RESERVED1 = 0x89,
    OP_RESERVED2 = 0x8a,

    // numeric
    OP_1ADD = 0x8b,
    OP_1SUB = 0x8c,
    OP_2MUL = 0x8d,
    OP_2DIV = 0x8e,
    OP_NEGATE = 0x8f,
    OP_ABS = 0x90,
    OP_NOT = 0x91,
    OP_0NOTEQUAL = 0x92,
    OP_ADD = 0x93,
    OP_SUB = 0x94,
    OP_MUL = 0x95,
    OP_DIV = 0x96,
    OP_MOD = 0x97,
    OP_LSHIFT = 0x98,
    OP_RSHIFT = 0x99,
    OP_BOOLAND = 0x9a,
    OP_BOOLOR = 0x9b,
    OP_NUMEQUAL = 0x9c,
    OP_NUMEQUALVERIFY = 0x9d,
    OP_NUMNOTEQUAL = 0x9e,
    OP_LESSTHAN = 0x9f,
    OP_GREATERTHAN = 0xa0,
    OP_LESSTHANOREQUAL = 0xa1,
    OP_GREATERTHANOREQUAL = 0xa2,
    OP_MIN = 0xa3,
    OP_MAX = 0xa4,
    OP_WITHIN = 0xa5,

    // crypto
    OP_RIPEMD160 = 0xa6,
    OP_SHA1 = 0xa7,
    OP_SHA256 = 0xa8,
    OP_HASH160 = 0xa9,
    OP_HASH256 = 0xaa,
    OP_CODESEPARATOR = 0xab,
    OP_CHECKSIG = 0xac,
    OP_CHECKSIGVERIFY = 0xad,
    OP_CHECKMULTISIG = 0xae,
    OP_CHECKMULTISIGVERIFY = 0xaf,

    // expansion
    OP_NOP1 = 0xb0,
    OP_CHECKLOCKTIMEVERIFY = 0xb1,
    OP_CHECKSEQUENCEVERIFY = 0xb2,
    OP_NOP4 = 0xb3,
    OP_NOP5 = 0xb4,
    OP_NOP6 = 0xb5,
    OP_NOP7 = 0xb6,
    OP_NOP8 = 0xb7,
    OP_NOP9 = 0xb8,
    OP_NOP10 = 0xb9,

    OP_INVALIDOPCODE = 0xff,
}

/// Alias of [`Opcode::OP_0`].
pub const OP_FALSE: Opcode = Opcode::OP_0;
/// Alias of [`Opcode::OP_1`].
pub const OP_TRUE: Opcode = Opcode::OP_1;
/// Alias of [`Opcode::OP_CHECKLOCKTIMEVERIFY`].
pub const OP_NOP2: Opcode = Opcode::OP_CHECKLOCKTIMEVERIFY;
/// Alias of [`Opcode::OP_CHECKSEQUENCEVERIFY`].
pub const OP_NOP3: Opcode = Opcode::OP_CHECKSEQUENCEVERIFY;

/// Largest payload of a direct push.
pub const MAX_DIRECT_PUSH: usize = 75;

impl Opcode {
    /// Whether this opcode places literal data on the stack from its payload
    /// (`OP_0` through `OP_PUSHDATA4`).
    pub fn is_push(self) -> bool {
        self.to_u8() <= Opcode::OP_PUSHDATA4.to_u8()
    }

    /// Width in bytes of the explicit length prefix, 0 for direct pushes and
    /// non-push opcodes.
    pub fn prefix_width(self) -> usize {
        match self {
            Opcode::OP_PUSHDATA1 => 1,
            Opcode::OP_PUSHDATA2 => 2,
            Opcode::OP_PUSHDATA4 => 4,
            _ => 0,
        }
    }

    /// The number pushed by `OP_1NEGATE` and `OP_1` through `OP_16`.
    pub fn small_int(self) -> Option<i8> {
        match self {
            Opcode::OP_1NEGATE => Some(-1),
            op if op >= Opcode::OP_1 && op <= Opcode::OP_16 => {
                Some((op.to_u8() - Opcode::OP_1.to_u8()) as i8 + 1)
            }
            _ => None,
        }
    }

    /// The dedicated opcode for a number in `-1..=16`.
    pub fn from_small_int(n: i64) -> Option<Opcode> {
        match n {
            -1 => Some(Opcode::OP_1NEGATE),
            0 => Some(Opcode::OP_0),
            1..=16 => Some(Opcode::from(Opcode::OP_1.to_u8() + n as u8 - 1)),
            _ => None,
        }
    }

    /// Whether executing this opcode counts toward the op limit.
    ///
    /// Push values and `OP_RESERVED` are exempt.
    pub fn is_counted(self) -> bool {
        self > Opcode::OP_16
    }

    /// Opcodes that are processed even inside unexecuted branches.
    pub fn is_conditional(self) -> bool {
        self >= Opcode::OP_IF && self <= Opcode::OP_ENDIF
    }

    pub fn is_disabled(self) -> bool {
        matches!(self, Opcode::OP_2MUL | Opcode::OP_2DIV)
    }

    /// Reserved, undefined and the invalid-opcode sentinel.
    pub fn is_invalid(self) -> bool {
        matches!(
            self,
            Opcode::OP_RESERVED
                | Opcode::OP_RESERVED1
                | Opcode::OP_RESERVED2
                | Opcode::OP_UNDEFINED(_)
                | Opcode::OP_INVALIDOPCODE
        )
    }

    /// Upgradable no-ops rejected by `DISCOURAGE_UPGRADABLE_NOPS`.
    pub fn is_upgradable_nop(self) -> bool {
        matches!(
            self,
            Opcode::OP_NOP1
                | Opcode::OP_NOP4
                | Opcode::OP_NOP5
                | Opcode::OP_NOP6
                | Opcode::OP_NOP7
                | Opcode::OP_NOP8
                | Opcode::OP_NOP9
                | Opcode::OP_NOP10
        )
    }
}

impl PartialOrd for Opcode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Opcode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_u8().cmp(&other.to_u8())
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op.to_u8()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Opcode::OP_PUSHBYTES_N(n) => write!(f, "OP_PUSHBYTES_{}", n),
            Opcode::OP_UNDEFINED(b) => write!(f, "OP_UNKNOWN_{:#04x}", b),
            op => f.write_str(op.name().unwrap_or("OP_UNKNOWN")),
        }
    }
}
