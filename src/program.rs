//! Whole scripts as sequences of instructions.

use std::fmt;

use crate::instruction::Instruction;
use crate::opcode::Opcode;
use crate::{ExecError, ScriptFlags};

/// A decoded script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Program(Vec<Instruction>);

/// Tracks `IF`/`ELSE`/`ENDIF` nesting while scanning a script.
///
/// Each open conditional records whether its `ELSE` was already seen.
#[derive(Default)]
struct Nesting(Vec<bool>);

impl Nesting {
    fn step(&mut self, op: Opcode, post_genesis: bool) -> Result<(), ExecError> {
        match op {
            Opcode::OP_IF | Opcode::OP_NOTIF => self.0.push(false),
            Opcode::OP_ELSE => {
                let seen = self.0.last_mut().ok_or(ExecError::UnbalancedConditional)?;
                // only one ELSE per IF after Genesis
                if *seen && post_genesis {
                    return Err(ExecError::UnbalancedConditional);
                }
                *seen = true;
            }
            Opcode::OP_ENDIF => {
                self.0.pop().ok_or(ExecError::UnbalancedConditional)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn finish(&self) -> Result<(), ExecError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ExecError::UnbalancedConditional)
        }
    }
}

impl Program {
    pub fn new() -> Program {
        Program(Vec::new())
    }

    /// Parses `bytes` into instructions.
    ///
    /// Fails on truncated pushes, invalid opcodes and unbalanced conditionals.
    /// With `post_genesis`, an `OP_RETURN` outside any conditional ends the
    /// script and keeps the remaining bytes as its payload.
    pub fn decode(bytes: &[u8], post_genesis: bool) -> Result<Program, ExecError> {
        let mut instructions = Vec::new();
        let mut nesting = Nesting::default();
        let mut pos = 0;

        while pos < bytes.len() {
            let (mut ins, used) = Instruction::read(&bytes[pos..])?;
            ins.verify(ScriptFlags::NONE)?;
            pos += used;

            if ins.opcode == Opcode::OP_RETURN && post_genesis && nesting.is_empty() {
                ins.data = bytes[pos..].to_vec();
                instructions.push(ins);
                break;
            }
            nesting.step(ins.opcode, post_genesis)?;
            instructions.push(ins);
        }

        nesting.finish()?;
        Ok(Program(instructions))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_size());
        for ins in &self.0 {
            ins.write_to(&mut out);
        }
        out
    }

    pub fn serialized_size(&self) -> usize {
        self.0.iter().map(Instruction::serialized_size).sum()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.0
    }

    pub fn push(&mut self, ins: impl Into<Instruction>) {
        self.0.push(ins.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.0.iter()
    }

    /// Whether every instruction is at or below `OP_16`, the node's notion of
    /// a push.
    pub fn is_push_only(&self) -> bool {
        self.0.iter().all(|i| i.opcode <= Opcode::OP_16)
    }

    /// Checks a script before it is run.
    ///
    /// A script made only of `OP_RETURN` (before Genesis) or
    /// `OP_FALSE OP_RETURN` (after it) is an unspendable data carrier and is
    /// accepted as is. Otherwise every instruction must verify under `flags`,
    /// conditionals must balance, and `OP_RETURN` may appear before Genesis
    /// only as the whole script.
    pub fn pre_verify(&self, flags: ScriptFlags) -> Result<(), ExecError> {
        let safe_return = flags.utxo_after_genesis();
        match self.0.as_slice() {
            [] => return Ok(()),
            [ret] if !safe_return && ret.opcode == Opcode::OP_RETURN => return Ok(()),
            [zero, ret]
                if safe_return
                    && zero.opcode == Opcode::OP_0
                    && zero.data.is_empty()
                    && ret.opcode == Opcode::OP_RETURN =>
            {
                return Ok(())
            }
            _ => {}
        }

        let mut nesting = Nesting::default();
        let last = self.0.len() - 1;
        for (idx, ins) in self.0.iter().enumerate() {
            if ins.opcode == Opcode::OP_RETURN {
                if !safe_return {
                    return Err(ExecError::OpReturn);
                }
                if nesting.is_empty() && idx == last {
                    return Ok(());
                }
                if !ins.data.is_empty() {
                    return Err(ExecError::OpReturn);
                }
                continue;
            }
            ins.verify(flags)?;
            nesting.step(ins.opcode, safe_return)?;
        }
        nesting.finish()
    }
}

impl From<Vec<Instruction>> for Program {
    fn from(instructions: Vec<Instruction>) -> Program {
        Program(instructions)
    }
}

impl FromIterator<Instruction> for Program {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Program {
        Program(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for ins in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}", ins)?;
            first = false;
        }
        Ok(())
    }
}

/// Whether `script` is the pay-to-script-hash pattern
/// `OP_HASH160 <20 bytes> OP_EQUAL`.
pub fn is_p2sh(script: &[u8]) -> bool {
    script.len() == 23
        && script[0] == Opcode::OP_HASH160.to_u8()
        && script[1] == 0x14
        && script[22] == Opcode::OP_EQUAL.to_u8()
}

/// Whether the raw script contains only push operations.
///
/// Truncated scripts are not push only.
pub fn is_push_only(script: &[u8]) -> bool {
    let mut pos = 0;
    while pos < script.len() {
        match Instruction::read(&script[pos..]) {
            Ok((ins, used)) => {
                if ins.opcode > Opcode::OP_16 {
                    return false;
                }
                pos += used;
            }
            Err(_) => return false,
        }
    }
    true
}

/// Removes every occurrence of `pattern` that starts on an instruction
/// boundary of `script`.
///
/// Scanning stops at the first unreadable instruction and the rest of the
/// script is kept as is.
pub fn find_and_delete(script: &[u8], pattern: &[u8]) -> Vec<u8> {
    if pattern.is_empty() {
        return script.to_vec();
    }

    let mut out = Vec::with_capacity(script.len());
    let mut pos = 0;
    while pos < script.len() {
        if script[pos..].starts_with(pattern) {
            pos += pattern.len();
            continue;
        }
        match Instruction::read(&script[pos..]) {
            Ok((_, used)) => {
                out.extend_from_slice(&script[pos..pos + used]);
                pos += used;
            }
            Err(_) => {
                out.extend_from_slice(&script[pos..]);
                break;
            }
        }
    }
    out
}
