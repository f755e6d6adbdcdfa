//! Implements the ASM parser for [`Program`].

use std::fmt;
use std::str::FromStr;

use bitcoin::hex::{DisplayHex, FromHex};
use thiserror::Error;

use crate::number::ScriptNum;
use crate::{parse_opcode, ExecError, Instruction, Opcode, Program, ScriptFlags};

/// Trait that something can be parsed from ASM.
pub trait FromAsm: Sized {
    /// Parses `Self` from ASM.
    fn from_asm(asm: &str) -> Result<Self, FromAsmError>;
}

impl FromAsm for Program {
    fn from_asm(asm: &str) -> Result<Self, FromAsmError> {
        let mut program = Program::new();
        let mut words = iter_words(asm);
        while let Some((pos, mut word)) = words.next() {
            if let Ok(op) = parse_opcode(word) {
                // explicit pushes take their payload from the next word
                if op.is_push() && op != Opcode::OP_0 {
                    let (next, payload) = words
                        .next()
                        .ok_or(err(pos, FromAsmErrorKind::UnexpectedEOF))?;
                    let data = parse_hex(payload).ok_or(err(next, FromAsmErrorKind::InvalidHex))?;
                    let ins = Instruction { opcode: op, data };
                    ins.verify(ScriptFlags::NONE).map_err(|e| match e {
                        ExecError::PushSize => err(next, FromAsmErrorKind::PushSizeMismatch),
                        _ => err(pos, FromAsmErrorKind::UnknownInstruction),
                    })?;
                    program.push(ins);
                } else {
                    program.push(op);
                }
                continue;
            }

            // Angle brackets always hold hex.
            if word.starts_with('<') && word.ends_with('>') && word.len() >= 2 {
                let data = parse_hex(&word[1..word.len() - 1])
                    .ok_or(err(pos, FromAsmErrorKind::InvalidHex))?;
                program.push(Instruction::push_bytes(&data));
                continue;
            }
            // Try a number.
            if let Ok(i) = i64::from_str(word) {
                program.push(Instruction::push(&ScriptNum::from(i).to_bytes()));
                continue;
            }
            // Finally, try hex in various forms.
            if let Some(stripped) = word.strip_prefix("0x") {
                word = stripped;
            }
            match parse_hex(word) {
                Some(data) => program.push(Instruction::push_bytes(&data)),
                None => return Err(err(pos, FromAsmErrorKind::UnknownInstruction)),
            }
        }
        Ok(program)
    }
}

fn parse_hex(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    Vec::<u8>::from_hex(hex).ok()
}

/// Create an iterator over instruction words and their position in the file.
fn iter_words(asm: &str) -> impl Iterator<Item = ((usize, usize), &str)> {
    asm.lines().enumerate().flat_map(|(line_idx, line)| {
        let content = line.split('#').next().unwrap_or("");
        let content = content.split("//").next().unwrap_or("");
        content
            .split_whitespace()
            .enumerate()
            .map(move |(word_idx, word)| ((line_idx, word_idx), word))
    })
}

fn err(position: (usize, usize), kind: FromAsmErrorKind) -> FromAsmError {
    FromAsmError { position, kind }
}

/// The different kinds of [`FromAsmError`] that can occur.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum FromAsmErrorKind {
    /// ASM ended unexpectedly.
    #[error("unexpected end of input")]
    UnexpectedEOF,
    /// We were not able to interpret the instruction.
    #[error("unknown instruction")]
    UnknownInstruction,
    /// Invalid hexadecimal bytes.
    #[error("invalid hex")]
    InvalidHex,
    /// Explicit push opcode whose payload does not have the announced size.
    #[error("payload does not fit the push opcode")]
    PushSizeMismatch,
}

/// Error from parsing Script ASM.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at line {}, word {}", .position.0 + 1, .position.1 + 1)]
pub struct FromAsmError {
    /// The position of the instruction that caused the error.
    ///
    /// The value is (line, word) with word incremented after
    /// every chunk of whitespace, both counted from zero.
    pub position: (usize, usize),
    /// The kind of error that occurred.
    pub kind: FromAsmErrorKind,
}

/// Wrapper to fmt::Display raw script bytes as ASM.
///
/// Instructions are read one at a time, an unreadable tail is printed as
/// hex in square brackets.
pub struct ScriptAsm<'a>(pub &'a [u8]);

impl<'a> fmt::Display for ScriptAsm<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut pos = 0;
        while pos < self.0.len() {
            if pos > 0 {
                f.write_str(" ")?;
            }
            match Instruction::read(&self.0[pos..]) {
                Ok((ins, used)) => {
                    write!(f, "{}", ins)?;
                    pos += used;
                }
                Err(_) => return write!(f, "[{}]", self.0[pos..].as_hex()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asm(s: &str) -> Vec<u8> {
        Program::from_asm(s).unwrap().encode()
    }

    #[test]
    fn opcodes_and_numbers() {
        assert_eq!(asm("OP_1 OP_2 OP_ADD"), vec![0x51, 0x52, 0x93]);
        assert_eq!(asm("1 2 ADD"), vec![0x51, 0x52, 0x93]);
        assert_eq!(asm("0 -1 17"), vec![0x00, 0x4f, 0x01, 0x11]);
        assert_eq!(asm("1000"), vec![0x02, 0xe8, 0x03]);
        assert_eq!(asm("-1000"), vec![0x02, 0xe8, 0x83]);
    }

    #[test]
    fn hex_pushes() {
        assert_eq!(asm("0xdead"), vec![0x02, 0xde, 0xad]);
        assert_eq!(asm("<beef>"), vec![0x02, 0xbe, 0xef]);
        assert_eq!(asm("<01>"), vec![0x01, 0x01]);
        assert_eq!(asm("<>"), vec![0x00]);
        assert_eq!(asm("OP_PUSHDATA1 0x0102"), vec![0x4c, 0x02, 0x01, 0x02]);
        assert_eq!(asm("OP_PUSHBYTES_1 05"), vec![0x01, 0x05]);
    }

    #[test]
    fn comments_and_lines() {
        let text = "OP_1 # one\n// nothing here\nOP_2 OP_ADD // sum\n";
        assert_eq!(asm(text), vec![0x51, 0x52, 0x93]);
    }

    #[test]
    fn errors_carry_positions() {
        let e = Program::from_asm("OP_1\nOP_2 OP_FOO").unwrap_err();
        assert_eq!(e.position, (1, 1));
        assert_eq!(e.kind, FromAsmErrorKind::UnknownInstruction);
        assert_eq!(e.to_string(), "unknown instruction at line 2, word 2");

        let e = Program::from_asm("OP_PUSHDATA1").unwrap_err();
        assert_eq!(e.kind, FromAsmErrorKind::UnexpectedEOF);

        let e = Program::from_asm("OP_PUSHBYTES_2 0x01").unwrap_err();
        assert_eq!(e.position, (0, 1));
        assert_eq!(e.kind, FromAsmErrorKind::PushSizeMismatch);

        let e = Program::from_asm("<0g>").unwrap_err();
        assert_eq!(e.kind, FromAsmErrorKind::InvalidHex);
    }

    #[test]
    fn display_parses_back() {
        let bytes = vec![0x00, 0x51, 0x4f, 0x02, 0xaa, 0xbb, 0x01, 0x05, 0x4c, 0x01, 0xcc, 0x76, 0x87];
        let program = Program::decode(&bytes, true).unwrap();
        let text = program.to_string();
        assert_eq!(Program::from_asm(&text).unwrap(), program);
    }

    #[test]
    fn script_asm_shows_unreadable_tail() {
        assert_eq!(ScriptAsm(&[0x51, 0x76]).to_string(), "1 OP_DUP");
        assert_eq!(ScriptAsm(&[0x51, 0x4c]).to_string(), "1 [4c]");
        assert_eq!(ScriptAsm(&[]).to_string(), "");
    }
}
