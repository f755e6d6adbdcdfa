use std::fmt;

use bitcoin::hex::DisplayHex;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::asm::ScriptAsm;
use crate::{ExecError, ExecStats, Opcode, Phase};

/// Simple utility wrapper to serde-serialize using [fmt::Display].
struct FmtSer<'a, T: fmt::Display>(&'a T);
impl<'a, T: fmt::Display> Serialize for FmtSer<'a, T> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&self.0)
    }
}

/// Wrapper to serialize a stack, bottom first, as hex elements.
struct StackSer<'a, I>(&'a I);
impl<'a, I> Serialize for StackSer<'a, I>
where
    I: Clone + Iterator,
    I::Item: AsRef<[u8]>,
{
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(None)?;
        for i in self.0.clone() {
            seq.serialize_element(&FmtSer(&i.as_ref().as_hex()))?;
        }
        seq.end()
    }
}

/// Snapshot of a machine between two steps.
pub struct RunStep<'a> {
    pub phase: Phase,
    pub remaining_script: &'a [u8],
    pub stack: &'a crate::LimitedStack,
    pub altstack: &'a crate::LimitedStack,
    pub stats: Option<&'a ExecStats>,
}

impl<'a> Serialize for RunStep<'a> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut m = s.serialize_map(None)?;
        m.serialize_entry("phase", &self.phase)?;
        m.serialize_entry(
            "remaining_script_hex",
            &FmtSer(&self.remaining_script.as_hex()),
        )?;
        m.serialize_entry(
            "remaining_script_asm",
            &FmtSer(&ScriptAsm(self.remaining_script)),
        )?;
        m.serialize_entry("stack", &StackSer(&self.stack.iter()))?;
        m.serialize_entry("altstack", &StackSer(&self.altstack.iter()))?;
        if let Some(stats) = self.stats {
            m.serialize_entry("stats", stats)?;
        }
        m.end()
    }
}

pub struct RunResult<'a> {
    pub success: bool,
    pub error: Option<ExecError>,
    pub opcode: Option<Opcode>,
    pub phase: Phase,
    pub final_stack: &'a [Vec<u8>],
    pub stats: Option<&'a ExecStats>,
}

impl<'a> RunResult<'a> {
    pub fn new(res: &'a crate::ExecutionResult, stats: Option<&'a ExecStats>) -> Self {
        RunResult {
            success: res.success,
            error: res.error,
            opcode: res.opcode,
            phase: res.phase,
            final_stack: &res.final_stack,
            stats,
        }
    }
}

impl<'a> Serialize for RunResult<'a> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut m = s.serialize_map(None)?;
        m.serialize_entry("success", &self.success)?;
        if let Some(ref err) = self.error {
            m.serialize_entry("error", &FmtSer(err))?;
        }
        if let Some(opcode) = self.opcode {
            m.serialize_entry("opcode", &FmtSer(&opcode))?;
        }
        m.serialize_entry("phase", &self.phase)?;
        m.serialize_entry("final_stack", &StackSer(&self.final_stack.iter()))?;
        if let Some(stats) = self.stats {
            m.serialize_entry("stats", stats)?;
        }
        m.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{verify_unchecked, Exec, NoSignatureCheck, Options};
    use serde_json::json;

    #[test]
    fn step_snapshot() {
        let mut exec = Exec::new(&[], &[0x51, 0x52, 0x6b], 0u32, Options::default(), NoSignatureCheck)
            .unwrap();
        exec.exec_next().unwrap();
        exec.exec_next().unwrap();
        let step = RunStep {
            phase: exec.phase(),
            remaining_script: exec.remaining_script(),
            stack: exec.stack(),
            altstack: exec.altstack(),
            stats: None,
        };
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(
            value,
            json!({
                "phase": "lock",
                "remaining_script_hex": "526b",
                "remaining_script_asm": "2 OP_TOALTSTACK",
                "stack": ["01"],
                "altstack": [],
            })
        );
    }

    #[test]
    fn failed_result() {
        let res = verify_unchecked(&[], &[0x51, 0x69, 0x69], 0u32, Options::default()).unwrap();
        let stats = ExecStats {
            op_count: 2,
            max_combined_size: 33,
            steps: 3,
        };
        let value = serde_json::to_value(RunResult::new(&res, Some(&stats))).unwrap();
        assert_eq!(
            value,
            json!({
                "success": false,
                "error": "operation not valid with the current stack size",
                "opcode": "OP_VERIFY",
                "phase": "lock",
                "final_stack": [],
                "stats": { "op_count": 2, "max_combined_size": 33, "steps": 3 },
            })
        );
    }
}
