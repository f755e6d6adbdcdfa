//! Script numbers.
//!
//! Before Genesis numbers are limited to 4 bytes, after it they can be as
//! long as the configured maximum, so they are backed by a big integer.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

use num_bigint::{BigInt, Sign};
use num_traits::{Signed, ToPrimitive, Zero};

use crate::ExecError;

/// Length of numbers consumed by CHECKLOCKTIMEVERIFY and CHECKSEQUENCEVERIFY.
pub const LOCKTIME_NUM_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScriptNum(BigInt);

impl ScriptNum {
    /// Decodes a number, failing when it is longer than `max_size` bytes or,
    /// with `require_minimal`, not minimally encoded.
    pub fn from_bytes(
        v: &[u8],
        require_minimal: bool,
        max_size: usize,
    ) -> Result<ScriptNum, ExecError> {
        if v.len() > max_size {
            return Err(ExecError::ScriptNumOverflow);
        }
        if require_minimal && !is_minimally_encoded(v, max_size) {
            return Err(ExecError::ScriptNumMinEncode);
        }
        Ok(ScriptNum(parse(v)))
    }

    /// Minimal sign-magnitude little-endian encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.0.is_zero() {
            return Vec::new();
        }
        let (sign, mut bytes) = self.0.to_bytes_le();
        let negative = sign == Sign::Minus;
        match bytes.last_mut() {
            Some(last) if *last & 0x80 != 0 => bytes.push(if negative { 0x80 } else { 0x00 }),
            Some(last) if negative => *last |= 0x80,
            _ => {}
        }
        bytes
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn abs(&self) -> ScriptNum {
        ScriptNum(self.0.abs())
    }

    /// The value clamped into the `i64` range.
    pub fn to_i64_saturating(&self) -> i64 {
        self.0.to_i64().unwrap_or(if self.0.is_negative() {
            i64::MIN
        } else {
            i64::MAX
        })
    }

    /// The value as a `usize`, `None` when negative, saturating when too large.
    pub fn to_usize_saturating(&self) -> Option<usize> {
        if self.0.is_negative() {
            None
        } else {
            Some(self.0.to_usize().unwrap_or(usize::MAX))
        }
    }
}

impl From<i64> for ScriptNum {
    fn from(n: i64) -> ScriptNum {
        ScriptNum(BigInt::from(n))
    }
}

impl From<bool> for ScriptNum {
    fn from(b: bool) -> ScriptNum {
        ScriptNum::from(b as i64)
    }
}

macro_rules! forward_binop {
    ($trait:ident, $method:ident) => {
        impl<'a> $trait<&'a ScriptNum> for &'a ScriptNum {
            type Output = ScriptNum;

            fn $method(self, rhs: &'a ScriptNum) -> ScriptNum {
                ScriptNum((&self.0).$method(&rhs.0))
            }
        }
    };
}

forward_binop!(Add, add);
forward_binop!(Sub, sub);
forward_binop!(Mul, mul);
// Both truncate toward zero, the remainder takes the sign of the dividend.
forward_binop!(Div, div);
forward_binop!(Rem, rem);

impl Neg for &ScriptNum {
    type Output = ScriptNum;

    fn neg(self) -> ScriptNum {
        ScriptNum(-&self.0)
    }
}

impl fmt::Display for ScriptNum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Caller guarantees the length check already happened.
fn parse(v: &[u8]) -> BigInt {
    let last = match v.last() {
        Some(last) => *last,
        None => return BigInt::zero(),
    };
    let mut magnitude = v.to_vec();
    let len = magnitude.len();
    magnitude[len - 1] = last & 0x7f;
    let n = BigInt::from_bytes_le(Sign::Plus, &magnitude);
    if last & 0x80 != 0 {
        -n
    } else {
        n
    }
}

/// Whether `v` is a minimally encoded number of at most `max_size` bytes.
pub fn is_minimally_encoded(v: &[u8], max_size: usize) -> bool {
    if v.len() > max_size {
        return false;
    }
    if let Some(last) = v.last() {
        // If the most-significant-byte - excluding the sign bit - is zero
        // then we're not minimal. Note how this test also rejects the
        // negative-zero encoding, 0x80.
        if (*last & 0x7f) == 0 {
            // One exception: if there's more than one byte and the most
            // significant bit of the second-most-significant-byte is set
            // it would conflict with the sign bit. An example of this case
            // is +-255, which encode to 0xff00 and 0xff80 respectively.
            // (big-endian).
            if v.len() <= 1 || (v[v.len() - 2] & 0x80) == 0 {
                return false;
            }
        }
    }
    true
}

/// Strips redundant trailing bytes while keeping the sign, returning whether
/// anything changed.
pub fn minimally_encode(data: &mut Vec<u8>) -> bool {
    let last = match data.last() {
        Some(last) => *last,
        None => return false,
    };
    if last & 0x7f != 0 {
        return false;
    }
    if data.len() == 1 {
        // zero or negative zero
        data.clear();
        return true;
    }
    if data[data.len() - 2] & 0x80 != 0 {
        return false;
    }

    let mut i = data.len() - 1;
    while i > 0 {
        if data[i - 1] != 0 {
            if data[i - 1] & 0x80 != 0 {
                // the sign needs a byte of its own
                data[i] = last;
                i += 1;
            } else {
                data[i - 1] |= last;
            }
            data.truncate(i);
            return true;
        }
        i -= 1;
    }
    data.clear();
    true
}

/// Truthiness of a stack element: any non-zero byte, except that negative
/// zero is false.
pub fn cast_to_bool(v: &[u8]) -> bool {
    for (i, b) in v.iter().enumerate() {
        if *b != 0 {
            return !(i == v.len() - 1 && *b == 0x80);
        }
    }
    false
}
