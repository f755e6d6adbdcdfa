//! A single decoded script instruction and its byte codec.

use std::fmt;

use bitcoin::hex::DisplayHex;

use crate::opcode::{Opcode, MAX_DIRECT_PUSH};
use crate::{ExecError, ScriptFlags};

/// An opcode together with the payload it carries.
///
/// Push opcodes carry the pushed bytes. A post-Genesis `OP_RETURN` decoded at
/// the top level carries the trailing bytes of the script. Every other opcode
/// carries nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: Opcode,
    pub data: Vec<u8>,
}

impl Instruction {
    /// A bare opcode without payload.
    pub fn op(opcode: Opcode) -> Instruction {
        Instruction {
            opcode,
            data: Vec::new(),
        }
    }

    /// The minimal instruction pushing `data`.
    ///
    /// Empty data and single bytes that a dedicated opcode can express are
    /// turned into that opcode, everything else into the smallest push.
    pub fn push(data: &[u8]) -> Instruction {
        match data {
            [] => Instruction::op(Opcode::OP_0),
            [0x81] => Instruction::op(Opcode::OP_1NEGATE),
            [n @ 1..=16] => Instruction::op(Opcode::from(Opcode::OP_1.to_u8() + n - 1)),
            _ => {
                let opcode = if data.len() <= MAX_DIRECT_PUSH {
                    Opcode::OP_PUSHBYTES_N(data.len() as u8)
                } else if data.len() <= 0xff {
                    Opcode::OP_PUSHDATA1
                } else if data.len() <= 0xffff {
                    Opcode::OP_PUSHDATA2
                } else {
                    Opcode::OP_PUSHDATA4
                };
                Instruction {
                    opcode,
                    data: data.to_vec(),
                }
            }
        }
    }

    /// The length-prefixed push of `data`, without collapsing single bytes
    /// into small-integer opcodes.
    ///
    /// This is how a signature is written when it is removed from the
    /// script code it signs.
    pub fn push_bytes(data: &[u8]) -> Instruction {
        if data.len() == 1 {
            return Instruction {
                opcode: Opcode::OP_PUSHBYTES_N(1),
                data: data.to_vec(),
            };
        }
        Instruction::push(data)
    }

    /// Reads the instruction at the start of `bytes`, returning it with the
    /// number of bytes it occupied.
    ///
    /// Truncated length prefixes and payloads are [`ExecError::BadOpcode`].
    pub fn read(bytes: &[u8]) -> Result<(Instruction, usize), ExecError> {
        let (first, rest) = bytes.split_first().ok_or(ExecError::BadOpcode)?;
        let opcode = Opcode::from(*first);
        if !opcode.is_push() {
            return Ok((Instruction::op(opcode), 1));
        }

        let width = opcode.prefix_width();
        let len = match opcode {
            Opcode::OP_0 => 0,
            Opcode::OP_PUSHBYTES_N(n) => n as usize,
            _ => {
                let prefix = rest.get(..width).ok_or(ExecError::BadOpcode)?;
                let mut buf = [0u8; 4];
                buf[..width].copy_from_slice(prefix);
                u32::from_le_bytes(buf) as usize
            }
        };
        let start = 1 + width;
        let end = start.checked_add(len).ok_or(ExecError::BadOpcode)?;
        let data = bytes.get(start..end).ok_or(ExecError::BadOpcode)?;
        Ok((
            Instruction {
                opcode,
                data: data.to_vec(),
            },
            end,
        ))
    }

    /// Appends the encoding to `out`.
    ///
    /// The length prefix is written at the width of the stored opcode, callers
    /// creating instructions by hand should [`verify`](Self::verify) first.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.opcode.to_u8());
        let len = self.data.len();
        match self.opcode {
            Opcode::OP_PUSHDATA1 => out.push(len as u8),
            Opcode::OP_PUSHDATA2 => out.extend_from_slice(&(len as u16).to_le_bytes()),
            Opcode::OP_PUSHDATA4 => out.extend_from_slice(&(len as u32).to_le_bytes()),
            _ => {}
        }
        out.extend_from_slice(&self.data);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_size());
        self.write_to(&mut out);
        out
    }

    /// Size of the encoding in bytes.
    pub fn serialized_size(&self) -> usize {
        1 + self.opcode.prefix_width() + self.data.len()
    }

    /// Whether a push uses the smallest possible encoding.
    ///
    /// Non-push opcodes are minimal as long as they carry no payload.
    pub fn is_minimal(&self) -> bool {
        let len = self.data.len();
        match self.opcode {
            Opcode::OP_0 => len == 0,
            Opcode::OP_PUSHBYTES_N(_) => {
                // should have used OP_0, OP_1NEGATE or OP_1 to OP_16
                !(len == 1 && (self.data[0] == 0x81 || (1..=16).contains(&self.data[0])))
            }
            Opcode::OP_PUSHDATA1 => len > MAX_DIRECT_PUSH,
            Opcode::OP_PUSHDATA2 => len > 0xff,
            Opcode::OP_PUSHDATA4 => len > 0xffff,
            _ => len == 0,
        }
    }

    /// Checks the instruction is well formed.
    ///
    /// Invalid opcodes are [`ExecError::BadOpcode`], payloads that do not fit
    /// the opcode are [`ExecError::PushSize`], and non-minimal pushes are
    /// [`ExecError::MinimalData`] when `MINIMALDATA` is set.
    pub fn verify(&self, flags: ScriptFlags) -> Result<(), ExecError> {
        if self.opcode.is_invalid() {
            return Err(ExecError::BadOpcode);
        }
        let len = self.data.len() as u64;
        let fits = match self.opcode {
            Opcode::OP_PUSHBYTES_N(n) => len == n as u64,
            Opcode::OP_PUSHDATA1 => len <= 0xff,
            Opcode::OP_PUSHDATA2 => len <= 0xffff,
            Opcode::OP_PUSHDATA4 => len <= 0xffff_ffff,
            _ => len == 0,
        };
        if !fits {
            return Err(ExecError::PushSize);
        }
        if flags.require_minimal() && !self.is_minimal() {
            return Err(ExecError::MinimalData);
        }
        Ok(())
    }
}

impl From<Opcode> for Instruction {
    fn from(opcode: Opcode) -> Instruction {
        Instruction::op(opcode)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.opcode {
            Opcode::OP_0 if self.data.is_empty() => f.write_str("0"),
            Opcode::OP_PUSHBYTES_N(_) if self.is_minimal() => {
                write!(f, "0x{}", self.data.as_hex())
            }
            op if op.is_push() => write!(f, "{} 0x{}", op, self.data.as_hex()),
            op => {
                if let Some(n) = op.small_int() {
                    write!(f, "{}", n)
                } else if self.data.is_empty() {
                    write!(f, "{}", op)
                } else {
                    write!(f, "{} 0x{}", op, self.data.as_hex())
                }
            }
        }
    }
}
