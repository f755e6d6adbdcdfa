use crate::opcode::{Opcode, MAX_DIRECT_PUSH, OP_FALSE, OP_NOP2, OP_NOP3, OP_TRUE};

/// Parses a string into a script [`Opcode`].
///
/// Accepts both the full opcode name (e.g. "OP_CHECKSIG") and the shorter version without the "OP_" prefix
/// (e.g. "CHECKSIG"), the aliases `OP_FALSE`, `OP_TRUE`, `OP_NOP2` and `OP_NOP3`, and `OP_PUSHBYTES_1`
/// to `OP_PUSHBYTES_75`.
///
/// # Examples
///
/// ```
/// use sv_scriptexec::{parse_opcode, Opcode};
///
/// assert_eq!(parse_opcode("OP_CHECKSIG").unwrap(), Opcode::OP_CHECKSIG);
/// assert_eq!(parse_opcode("CHECKSIG").unwrap(), Opcode::OP_CHECKSIG);
/// assert_eq!(parse_opcode("TRUE").unwrap(), Opcode::OP_1);
/// assert!(parse_opcode("INVALID").is_err());
/// ```
#[allow(clippy::result_unit_err)]
pub fn parse_opcode(s: &str) -> Result<Opcode, ()> {
    let name = s.strip_prefix("OP_").unwrap_or(s);
    match name {
        // Special cases with aliases
        "FALSE" => return Ok(OP_FALSE),
        "TRUE" => return Ok(OP_TRUE),
        "NOP2" => return Ok(OP_NOP2),
        "NOP3" => return Ok(OP_NOP3),
        _ => {}
    }

    if let Some(n) = name.strip_prefix("PUSHBYTES_") {
        return match n.parse::<usize>() {
            Ok(0) => Ok(Opcode::OP_0),
            Ok(n) if n <= MAX_DIRECT_PUSH && !n.to_string().starts_with('0') => {
                Ok(Opcode::OP_PUSHBYTES_N(n as u8))
            }
            _ => Err(()),
        };
    }

    Opcode::from_name(&format!("OP_{}", name)).ok_or(())
}
