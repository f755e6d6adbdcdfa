use core::cmp;
use std::fmt;

use bitcoin::hashes::{hash160, ripemd160, sha1, sha256, sha256d, Hash};
use log::{debug, trace};
use serde::Serialize;

mod error;
pub use error::{ConfigError, Error, ExecError};

pub mod asm;
pub use asm::{FromAsm, FromAsmError, FromAsmErrorKind};

pub mod config;
pub use config::ScriptConfig;

pub mod flags;
pub use flags::ScriptFlags;

pub mod instruction;
pub use instruction::Instruction;

pub mod json;

pub mod number;
pub use number::ScriptNum;

pub mod opcode;
pub use opcode::Opcode;

pub mod parse;
pub use parse::parse_opcode;

pub mod program;
pub use program::Program;

pub mod signatures;
pub use signatures::{EcdsaChecker, NoSignatureCheck, SignatureChecker, SignatureOutcome};

mod stack;
pub use stack::{Branch, ConditionStack, LimitedStack, ELEMENT_OVERHEAD};

mod utils;

#[cfg(test)]
mod tests;

use config::{MAX_SCRIPT_ELEMENT_SIZE_BEFORE_GENESIS, MAX_STACK_ELEMENTS_BEFORE_GENESIS};
use flags::{
    VERIFY_CHECKLOCKTIMEVERIFY, VERIFY_CHECKSEQUENCEVERIFY, VERIFY_CLEANSTACK,
    VERIFY_DISCOURAGE_UPGRADABLE_NOPS, VERIFY_MINIMALIF, VERIFY_NULLDUMMY, VERIFY_NULLFAIL,
    VERIFY_P2SH, VERIFY_SIGPUSHONLY,
};
use number::{cast_to_bool, is_minimally_encoded, minimally_encode, LOCKTIME_NUM_SIZE};
use opcode::Opcode::*;
use program::{find_and_delete, is_p2sh, is_push_only};
use signatures::{check_pubkey_encoding, check_signature_encoding, uses_fork_id};

/// Bit 31 of a sequence number disables its relative lock time.
const SEQUENCE_LOCKTIME_DISABLE_FLAG: i64 = 1 << 31;

/// Used to fine-tune different variables during execution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Options {
    pub config: ScriptConfig,
    /// Apply consensus ceilings instead of policy ceilings.
    pub consensus: bool,
}

/// The script currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Unlock,
    Lock,
    /// The serialized script of a pay-to-script-hash spend.
    Redeem,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Phase::Unlock => "unlock",
            Phase::Lock => "lock",
            Phase::Redeem => "redeem",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    pub error: Option<ExecError>,
    pub opcode: Option<Opcode>,
    pub phase: Phase,
    pub final_stack: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecStats {
    /// Operations counted in the running phase.
    pub op_count: u64,
    /// Highest combined size of main and alt stack seen so far.
    pub max_combined_size: u64,
    /// Instructions read over all phases.
    pub steps: u64,
}

/// Partial execution of a script pair.
pub struct Exec<C: SignatureChecker = NoSignatureCheck> {
    flags: ScriptFlags,
    checker: C,
    result: Option<ExecutionResult>,

    unlock: Vec<u8>,
    lock: Vec<u8>,
    redeem: Vec<u8>,
    phase: Phase,
    p2sh: bool,
    /// Main stack right after the unlocking script, kept for the redeem phase.
    p2sh_stack: Vec<Vec<u8>>,

    pc: usize,
    current_position: usize,
    // Start of the script code, moved past every executed OP_CODESEPARATOR.
    codesep_pos: usize,
    returned: bool,
    cond_stack: ConditionStack,
    stack: LimitedStack,
    altstack: LimitedStack,

    utxo_after_genesis: bool,
    max_ops: u64,
    max_pubkeys: u64,
    max_num_len: usize,
    max_script_size: u64,
    stats: ExecStats,
}

impl<C: SignatureChecker> Exec<C> {
    /// Builds a machine that runs `unlock` and then `lock`.
    ///
    /// Only invalid flags are an `Err`. Scripts that cannot run, for being
    /// malformed or too large, produce a failed [`ExecutionResult`] on the
    /// first step.
    pub fn new(
        unlock: &[u8],
        lock: &[u8],
        flags: impl Into<u32>,
        options: Options,
        checker: C,
    ) -> Result<Exec<C>, Error> {
        let flags = ScriptFlags::from_bits(flags.into())?;
        let genesis = flags.utxo_after_genesis();
        let consensus = options.consensus;
        let config = &options.config;

        let stack = LimitedStack::new(config.max_stack_memory_usage(genesis, consensus));
        let altstack = stack.make_child();
        let mut exec = Exec {
            flags,
            checker,
            result: None,

            unlock: unlock.to_vec(),
            lock: lock.to_vec(),
            redeem: Vec::new(),
            phase: Phase::Unlock,
            p2sh: flags.has(VERIFY_P2SH) && !genesis && is_p2sh(lock),
            p2sh_stack: Vec::new(),

            pc: 0,
            current_position: 0,
            codesep_pos: 0,
            returned: false,
            cond_stack: ConditionStack::new(),
            stack,
            altstack,

            utxo_after_genesis: genesis,
            max_ops: config.max_ops_per_script(genesis, consensus),
            max_pubkeys: config.max_pubkeys_per_multisig(genesis, consensus),
            max_num_len: usize::try_from(config.max_script_num_length(genesis, consensus))
                .unwrap_or(usize::MAX),
            max_script_size: config.max_script_size(genesis, consensus),
            stats: ExecStats::default(),
        };

        if exec.flags.has(VERIFY_SIGPUSHONLY) && !is_push_only(&exec.unlock) {
            let _ = exec.fail(ExecError::SigPushOnly);
        } else {
            let _ = exec.enter_phase(Phase::Unlock);
        }
        Ok(exec)
    }

    /// Builds a machine over decoded programs.
    pub fn from_programs(
        unlock: &Program,
        lock: &Program,
        flags: impl Into<u32>,
        options: Options,
        checker: C,
    ) -> Result<Exec<C>, Error> {
        Self::new(&unlock.encode(), &lock.encode(), flags, options, checker)
    }

    /// Builds a machine whose main stack starts out with `stack`, bottom first.
    pub fn with_stack(
        unlock: &[u8],
        lock: &[u8],
        flags: impl Into<u32>,
        options: Options,
        checker: C,
        stack: Vec<Vec<u8>>,
    ) -> Result<Exec<C>, Error> {
        let mut ret = Self::new(unlock, lock, flags, options, checker)?;
        for item in stack {
            ret.stack.push(item)?;
        }
        Ok(ret)
    }

    //////////////////
    // SOME GETTERS //
    //////////////////

    pub fn result(&self) -> Option<&ExecutionResult> {
        self.result.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn flags(&self) -> ScriptFlags {
        self.flags
    }

    /// Offset of the next instruction within the running script.
    pub fn script_position(&self) -> usize {
        self.pc
    }

    /// Offset of the instruction executed last.
    pub fn current_position(&self) -> usize {
        self.current_position
    }

    /// The bytes of the running script not executed yet.
    pub fn remaining_script(&self) -> &[u8] {
        let script = self.script();
        &script[cmp::min(self.pc, script.len())..]
    }

    pub fn stack(&self) -> &LimitedStack {
        &self.stack
    }

    pub fn altstack(&self) -> &LimitedStack {
        &self.altstack
    }

    pub fn stats(&self) -> &ExecStats {
        &self.stats
    }

    ///////////////
    // UTILITIES //
    ///////////////

    fn script(&self) -> &[u8] {
        match self.phase {
            Phase::Unlock => &self.unlock,
            Phase::Lock => &self.lock,
            Phase::Redeem => &self.redeem,
        }
    }

    fn finish(&mut self, error: Option<ExecError>, opcode: Option<Opcode>) -> &ExecutionResult {
        if let Some(err) = error {
            debug!("{} script failed at {}: {}", self.phase, self.current_position, err);
        }
        let res = ExecutionResult {
            success: error.is_none(),
            error,
            opcode,
            phase: self.phase,
            final_stack: self.stack.to_vec(),
        };
        self.result.insert(res)
    }

    fn fail(&mut self, err: ExecError) -> Result<(), &ExecutionResult> {
        Err(self.finish(Some(err), None))
    }

    fn failop(&mut self, err: ExecError, op: Opcode) -> Result<(), &ExecutionResult> {
        Err(self.finish(Some(err), Some(op)))
    }

    fn require_minimal(&self) -> bool {
        self.flags.require_minimal()
    }

    fn topnum(&self, offset: isize) -> Result<ScriptNum, ExecError> {
        self.stack
            .topnum(offset, self.require_minimal(), self.max_num_len)
    }

    fn update_stats(&mut self) {
        self.stats.max_combined_size =
            cmp::max(self.stats.max_combined_size, self.stack.combined_size());
    }

    /// Resets the per-script state and starts running `phase`.
    fn enter_phase(&mut self, phase: Phase) -> Result<(), &ExecutionResult> {
        self.phase = phase;
        self.pc = 0;
        self.current_position = 0;
        self.codesep_pos = 0;
        self.returned = false;
        self.cond_stack = ConditionStack::new();
        self.altstack.clear();
        self.stats.op_count = 0;

        let size = self.script().len() as u64;
        debug!("starting {} script ({} bytes)", phase, size);
        if size > self.max_script_size {
            return self.fail(ExecError::ScriptSize);
        }
        Ok(())
    }

    fn finish_phase(&mut self) -> Result<(), &ExecutionResult> {
        if !self.cond_stack.is_empty() {
            return self.fail(ExecError::UnbalancedConditional);
        }
        debug!("{} script done, stack: {}", self.phase, self.stack);

        match self.phase {
            Phase::Unlock => {
                if self.p2sh {
                    self.p2sh_stack = self.stack.to_vec();
                }
                self.enter_phase(Phase::Lock)
            }
            Phase::Lock if self.p2sh => {
                if !self.top_is_true() {
                    return self.fail(ExecError::EvalFalse);
                }
                if !is_push_only(&self.unlock) {
                    return self.fail(ExecError::SigPushOnly);
                }

                self.stack.clear();
                for item in std::mem::take(&mut self.p2sh_stack) {
                    if let Err(err) = self.stack.push(item) {
                        return self.fail(err);
                    }
                }
                match self.stack.pop() {
                    Ok(redeem) => self.redeem = redeem,
                    Err(err) => return self.fail(err),
                }
                self.enter_phase(Phase::Redeem)
            }
            Phase::Lock | Phase::Redeem => {
                if !self.top_is_true() {
                    return self.fail(ExecError::EvalFalse);
                }
                if self.flags.has(VERIFY_CLEANSTACK) && self.stack.len() != 1 {
                    return self.fail(ExecError::CleanStack);
                }
                Err(self.finish(None, None))
            }
        }
    }

    fn top_is_true(&self) -> bool {
        self.stack.top(-1).map_or(false, cast_to_bool)
    }

    ///////////////
    // EXECUTION //
    ///////////////

    /// Executes the next instruction, or moves on to the next script when the
    /// running one is exhausted.
    ///
    /// Returns the result once execution is done.
    pub fn exec_next(&mut self) -> Result<(), &ExecutionResult> {
        if let Some(ref res) = self.result {
            return Err(res);
        }

        let script = self.script();
        if self.pc >= script.len() {
            return self.finish_phase();
        }
        let read = Instruction::read(&script[self.pc..]);

        self.current_position = self.pc;
        let (instruction, len) = match read {
            Ok(r) => r,
            Err(err) => return self.fail(err),
        };
        self.pc += len;
        self.stats.steps += 1;

        let op = instruction.opcode;
        let exec = self.cond_stack.all_true() && (!self.returned || op == OP_RETURN);
        trace!(
            "{} {:>5}: {} (exec: {})",
            self.phase,
            self.current_position,
            instruction,
            exec
        );

        if let Err(err) = self.exec_instruction(instruction, exec) {
            return self.failop(err, op);
        }
        self.update_stats();
        Ok(())
    }

    /// Runs until the machine halts.
    pub fn run(&mut self) -> ExecutionResult {
        loop {
            if let Err(res) = self.exec_next() {
                return res.clone();
            }
        }
    }

    fn exec_instruction(&mut self, instruction: Instruction, exec: bool) -> Result<(), ExecError> {
        let op = instruction.opcode;

        // Some things we do even when we're not executing.
        if !self.utxo_after_genesis && instruction.data.len() > MAX_SCRIPT_ELEMENT_SIZE_BEFORE_GENESIS
        {
            return Err(ExecError::PushSize);
        }
        if op.is_counted() {
            self.stats.op_count += 1;
            if self.stats.op_count > self.max_ops {
                return Err(ExecError::OpCount);
            }
        }
        if op.is_disabled() && (!self.utxo_after_genesis || exec) {
            return Err(ExecError::DisabledOpcode);
        }

        if op.is_push() {
            if exec {
                if self.require_minimal() && !instruction.is_minimal() {
                    return Err(ExecError::MinimalData);
                }
                self.stack.push(instruction.data)?;
            }
        } else if exec || op.is_conditional() {
            self.exec_opcode(op, exec)?;
        }

        if !self.utxo_after_genesis
            && self.stack.len() + self.altstack.len() > MAX_STACK_ELEMENTS_BEFORE_GENESIS
        {
            return Err(ExecError::StackSize);
        }
        Ok(())
    }

    fn exec_opcode(&mut self, op: Opcode, exec: bool) -> Result<(), ExecError> {
        // Remember to leave stack intact until all errors have occurred.
        match op {
            //
            // Push value
            OP_1NEGATE | OP_1 | OP_2 | OP_3 | OP_4 | OP_5 | OP_6 | OP_7 | OP_8 | OP_9 | OP_10
            | OP_11 | OP_12 | OP_13 | OP_14 | OP_15 | OP_16 => {
                let n = op.small_int().ok_or(ExecError::BadOpcode)?;
                self.stack.pushnum(&ScriptNum::from(n as i64))?;
            }

            //
            // Control
            OP_NOP => {}

            op if op.is_upgradable_nop() => {
                if self.flags.has(VERIFY_DISCOURAGE_UPGRADABLE_NOPS) {
                    return Err(ExecError::DiscourageUpgradableNops);
                }
            }

            OP_CHECKLOCKTIMEVERIFY => {
                if !self.flags.has(VERIFY_CHECKLOCKTIMEVERIFY) || self.utxo_after_genesis {
                    // treated as OP_NOP2
                    if self.flags.has(VERIFY_DISCOURAGE_UPGRADABLE_NOPS) {
                        return Err(ExecError::DiscourageUpgradableNops);
                    }
                } else {
                    let lock_time = self.stack.topnum(-1, self.require_minimal(), LOCKTIME_NUM_SIZE)?;
                    if lock_time.is_negative() {
                        return Err(ExecError::NegativeLocktime);
                    }
                    if !self.checker.check_lock_time(&lock_time) {
                        return Err(ExecError::UnsatisfiedLocktime);
                    }
                }
            }

            OP_CHECKSEQUENCEVERIFY => {
                if !self.flags.has(VERIFY_CHECKSEQUENCEVERIFY) || self.utxo_after_genesis {
                    // treated as OP_NOP3
                    if self.flags.has(VERIFY_DISCOURAGE_UPGRADABLE_NOPS) {
                        return Err(ExecError::DiscourageUpgradableNops);
                    }
                } else {
                    let sequence = self.stack.topnum(-1, self.require_minimal(), LOCKTIME_NUM_SIZE)?;
                    if sequence.is_negative() {
                        return Err(ExecError::NegativeLocktime);
                    }
                    let disabled = sequence.to_i64_saturating() & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0;
                    if !disabled && !self.checker.check_sequence(&sequence) {
                        return Err(ExecError::UnsatisfiedLocktime);
                    }
                }
            }

            OP_IF | OP_NOTIF => {
                // (cond -- )
                let mut taken = false;
                if exec {
                    let top = self
                        .stack
                        .top(-1)
                        .map_err(|_| ExecError::UnbalancedConditional)?;
                    if self.flags.has(VERIFY_MINIMALIF)
                        && (top.len() > 1 || (top.len() == 1 && top[0] != 1))
                    {
                        return Err(ExecError::MinimalIf);
                    }
                    taken = cast_to_bool(top);
                    if op == OP_NOTIF {
                        taken = !taken;
                    }
                    self.stack.pop()?;
                }
                self.cond_stack.push(taken);
            }

            OP_ELSE => self.cond_stack.toggle_top(self.utxo_after_genesis)?,

            OP_ENDIF => {
                self.cond_stack.pop()?;
            }

            OP_VERIF | OP_VERNOTIF => {
                // only tolerated in unexecuted branches of post-Genesis scripts
                if exec || !self.utxo_after_genesis {
                    return Err(ExecError::BadOpcode);
                }
            }

            OP_VERIFY => {
                // (true -- ) or (false -- false) and return
                if !cast_to_bool(self.stack.top(-1)?) {
                    return Err(ExecError::Verify);
                }
                self.stack.pop()?;
            }

            OP_RETURN => {
                if !self.utxo_after_genesis {
                    return Err(ExecError::OpReturn);
                }
                if self.cond_stack.is_empty() {
                    // the rest of the script is never parsed
                    self.pc = self.script().len();
                } else {
                    self.returned = true;
                }
            }

            //
            // Stack operations
            OP_TOALTSTACK => {
                self.stack.move_top_to(&mut self.altstack)?;
            }

            OP_FROMALTSTACK => {
                if self.altstack.is_empty() {
                    return Err(ExecError::InvalidAltstackOperation);
                }
                self.altstack.move_top_to(&mut self.stack)?;
            }

            OP_2DROP => {
                // (x1 x2 -- )
                self.stack.popn(2)?;
            }

            OP_2DUP => {
                // (x1 x2 -- x1 x2 x1 x2)
                let x1 = self.stack.top(-2)?.to_vec();
                let x2 = self.stack.top(-1)?.to_vec();
                self.stack.push(x1)?;
                self.stack.push(x2)?;
            }

            OP_3DUP => {
                // (x1 x2 x3 -- x1 x2 x3 x1 x2 x3)
                let x1 = self.stack.top(-3)?.to_vec();
                let x2 = self.stack.top(-2)?.to_vec();
                let x3 = self.stack.top(-1)?.to_vec();
                self.stack.push(x1)?;
                self.stack.push(x2)?;
                self.stack.push(x3)?;
            }

            OP_2OVER => {
                // (x1 x2 x3 x4 -- x1 x2 x3 x4 x1 x2)
                self.stack.needn(4)?;
                let x1 = self.stack.top(-4)?.to_vec();
                let x2 = self.stack.top(-3)?.to_vec();
                self.stack.push(x1)?;
                self.stack.push(x2)?;
            }

            OP_2ROT => {
                // (x1 x2 x3 x4 x5 x6 -- x3 x4 x5 x6 x1 x2)
                self.stack.needn(6)?;
                for item in self.stack.erase_range(-6, -4)? {
                    self.stack.push(item)?;
                }
            }

            OP_2SWAP => {
                // (x1 x2 x3 x4 -- x3 x4 x1 x2)
                self.stack.needn(4)?;
                self.stack.swap(-4, -2)?;
                self.stack.swap(-3, -1)?;
            }

            OP_IFDUP => {
                // (x - 0 | x x)
                let top = self.stack.top(-1)?;
                if cast_to_bool(top) {
                    let dup = top.to_vec();
                    self.stack.push(dup)?;
                }
            }

            OP_DEPTH => {
                // -- stacksize
                let depth = ScriptNum::from(self.stack.len() as i64);
                self.stack.pushnum(&depth)?;
            }

            OP_DROP => {
                // (x -- )
                self.stack.pop()?;
            }

            OP_DUP => {
                // (x -- x x)
                let top = self.stack.top(-1)?.to_vec();
                self.stack.push(top)?;
            }

            OP_NIP => {
                // (x1 x2 -- x2)
                self.stack.needn(2)?;
                self.stack.erase(-2)?;
            }

            OP_OVER => {
                // (x1 x2 -- x1 x2 x1)
                let under_top = self.stack.top(-2)?.to_vec();
                self.stack.push(under_top)?;
            }

            OP_PICK | OP_ROLL => {
                // (xn ... x2 x1 x0 n - xn ... x2 x1 x0 xn)
                // (xn ... x2 x1 x0 n - ... x2 x1 x0 xn)
                self.stack.needn(2)?;
                let n = self.stack.popnum(self.require_minimal(), self.max_num_len)?;
                let n = match n.to_usize_saturating() {
                    Some(n) if n < self.stack.len() => n as isize,
                    _ => return Err(ExecError::InvalidStackOperation),
                };
                let elem = if op == OP_ROLL {
                    self.stack.erase(-n - 1)?
                } else {
                    self.stack.top(-n - 1)?.to_vec()
                };
                self.stack.push(elem)?;
            }

            OP_ROT => {
                // (x1 x2 x3 -- x2 x3 x1)
                self.stack.needn(3)?;
                self.stack.swap(-3, -2)?;
                self.stack.swap(-2, -1)?;
            }

            OP_SWAP => {
                // (x1 x2 -- x2 x1)
                self.stack.swap(-2, -1)?;
            }

            OP_TUCK => {
                // (x1 x2 -- x2 x1 x2)
                self.stack.needn(2)?;
                let x2 = self.stack.top(-1)?.to_vec();
                self.stack.insert_at(-3, x2)?;
            }

            //
            // Splice operations
            OP_CAT => {
                // (x1 x2 -- x1|x2)
                self.stack.needn(2)?;
                let x1 = self.stack.top(-2)?;
                let x2 = self.stack.top(-1)?;
                if !self.utxo_after_genesis
                    && x1.len() + x2.len() > MAX_SCRIPT_ELEMENT_SIZE_BEFORE_GENESIS
                {
                    return Err(ExecError::PushSize);
                }
                let ret = [x1, x2].concat();
                self.stack.popn(2)?;
                self.stack.push(ret)?;
            }

            OP_SPLIT => {
                // (in position -- x1 x2)
                self.stack.needn(2)?;
                let position = self.topnum(-1)?;
                let data = self.stack.top(-2)?;
                let position = match position.to_usize_saturating() {
                    Some(p) if p <= data.len() => p,
                    _ => return Err(ExecError::InvalidSplitRange),
                };
                let (x1, x2) = data.split_at(position);
                let (x1, x2) = (x1.to_vec(), x2.to_vec());
                self.stack.popn(2)?;
                self.stack.push(x1)?;
                self.stack.push(x2)?;
            }

            OP_NUM2BIN => {
                // (in size -- out)
                self.stack.needn(2)?;
                let limit = if self.utxo_after_genesis {
                    i32::MAX as usize
                } else {
                    MAX_SCRIPT_ELEMENT_SIZE_BEFORE_GENESIS
                };
                let size = match self.topnum(-1)?.to_usize_saturating() {
                    Some(size) if size <= limit => size,
                    _ => return Err(ExecError::PushSize),
                };
                self.stack.fits_after_pop(2, size)?;
                let raw = self.stack.top(-2)?.to_vec();
                let out = utils::num2bin(raw, size)?;
                self.stack.popn(2)?;
                self.stack.push(out)?;
            }

            OP_BIN2NUM => {
                // (in -- out)
                let mut n = self.stack.top(-1)?.to_vec();
                minimally_encode(&mut n);
                if !is_minimally_encoded(&n, self.max_num_len) {
                    return Err(ExecError::InvalidNumberRange);
                }
                self.stack.replace_top(n)?;
            }

            OP_SIZE => {
                // (in -- in size)
                let size = ScriptNum::from(self.stack.top(-1)?.len() as i64);
                self.stack.pushnum(&size)?;
            }

            //
            // Bitwise logic
            OP_INVERT => {
                // (in -- out)
                let inverted = self.stack.top(-1)?.iter().map(|b| !b).collect();
                self.stack.replace_top(inverted)?;
            }

            OP_AND | OP_OR | OP_XOR => {
                // (x1 x2 -- out)
                self.stack.needn(2)?;
                let x1 = self.stack.top(-2)?;
                let x2 = self.stack.top(-1)?;
                if x1.len() != x2.len() {
                    return Err(ExecError::InvalidOperandSize);
                }
                let ret: Vec<u8> = x1
                    .iter()
                    .zip(x2)
                    .map(|(a, b)| match op {
                        OP_AND => a & b,
                        OP_OR => a | b,
                        _ => a ^ b,
                    })
                    .collect();
                self.stack.popn(2)?;
                self.stack.push(ret)?;
            }

            OP_LSHIFT | OP_RSHIFT => {
                // (x n -- out)
                self.stack.needn(2)?;
                let n = match self.topnum(-1)?.to_usize_saturating() {
                    Some(n) => n,
                    None => return Err(ExecError::InvalidNumberRange),
                };
                let data = self.stack.top(-2)?;
                let ret = if op == OP_LSHIFT {
                    utils::lshift(data, n)
                } else {
                    utils::rshift(data, n)
                };
                self.stack.popn(2)?;
                self.stack.push(ret)?;
            }

            OP_EQUAL | OP_EQUALVERIFY => {
                // (x1 x2 - bool)
                self.stack.needn(2)?;
                let equal = self.stack.top(-2)? == self.stack.top(-1)?;
                self.stack.popn(2)?;
                self.stack.pushbool(equal)?;
                if op == OP_EQUALVERIFY {
                    if !equal {
                        return Err(ExecError::EqualVerify);
                    }
                    self.stack.pop()?;
                }
            }

            //
            // Numeric
            OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                // (in -- out)
                let x = self.topnum(-1)?;
                let one = ScriptNum::from(1);
                let res = match op {
                    OP_1ADD => &x + &one,
                    OP_1SUB => &x - &one,
                    OP_NEGATE => -&x,
                    OP_ABS => x.abs(),
                    OP_NOT => ScriptNum::from(x.is_zero()),
                    _ => ScriptNum::from(!x.is_zero()),
                };
                self.stack.pop()?;
                self.stack.pushnum(&res)?;
            }

            OP_ADD
            | OP_SUB
            | OP_MUL
            | OP_DIV
            | OP_MOD
            | OP_BOOLAND
            | OP_BOOLOR
            | OP_NUMEQUAL
            | OP_NUMEQUALVERIFY
            | OP_NUMNOTEQUAL
            | OP_LESSTHAN
            | OP_GREATERTHAN
            | OP_LESSTHANOREQUAL
            | OP_GREATERTHANOREQUAL
            | OP_MIN
            | OP_MAX => {
                // (x1 x2 -- out)
                self.stack.needn(2)?;
                let x1 = self.topnum(-2)?;
                let x2 = self.topnum(-1)?;
                let res = match op {
                    OP_ADD => &x1 + &x2,
                    OP_SUB => &x1 - &x2,
                    OP_MUL => &x1 * &x2,
                    OP_DIV => {
                        if x2.is_zero() {
                            return Err(ExecError::DivByZero);
                        }
                        &x1 / &x2
                    }
                    OP_MOD => {
                        if x2.is_zero() {
                            return Err(ExecError::ModByZero);
                        }
                        &x1 % &x2
                    }
                    OP_BOOLAND => ScriptNum::from(!x1.is_zero() && !x2.is_zero()),
                    OP_BOOLOR => ScriptNum::from(!x1.is_zero() || !x2.is_zero()),
                    OP_NUMEQUAL | OP_NUMEQUALVERIFY => ScriptNum::from(x1 == x2),
                    OP_NUMNOTEQUAL => ScriptNum::from(x1 != x2),
                    OP_LESSTHAN => ScriptNum::from(x1 < x2),
                    OP_GREATERTHAN => ScriptNum::from(x1 > x2),
                    OP_LESSTHANOREQUAL => ScriptNum::from(x1 <= x2),
                    OP_GREATERTHANOREQUAL => ScriptNum::from(x1 >= x2),
                    OP_MIN => cmp::min(x1, x2),
                    _ => cmp::max(x1, x2),
                };
                self.stack.popn(2)?;
                self.stack.pushnum(&res)?;
                if op == OP_NUMEQUALVERIFY {
                    if !cast_to_bool(self.stack.top(-1)?) {
                        return Err(ExecError::NumEqualVerify);
                    }
                    self.stack.pop()?;
                }
            }

            OP_WITHIN => {
                // (x min max -- out)
                self.stack.needn(3)?;
                let x = self.topnum(-3)?;
                let min = self.topnum(-2)?;
                let max = self.topnum(-1)?;
                self.stack.popn(3)?;
                self.stack.pushbool(min <= x && x < max)?;
            }

            //
            // Crypto

            // (in -- hash)
            OP_RIPEMD160 => {
                let top = self.stack.pop()?;
                self.stack
                    .push(ripemd160::Hash::hash(&top).to_byte_array().to_vec())?;
            }
            OP_SHA1 => {
                let top = self.stack.pop()?;
                self.stack
                    .push(sha1::Hash::hash(&top).to_byte_array().to_vec())?;
            }
            OP_SHA256 => {
                let top = self.stack.pop()?;
                self.stack
                    .push(sha256::Hash::hash(&top).to_byte_array().to_vec())?;
            }
            OP_HASH160 => {
                let top = self.stack.pop()?;
                self.stack
                    .push(hash160::Hash::hash(&top).to_byte_array().to_vec())?;
            }
            OP_HASH256 => {
                let top = self.stack.pop()?;
                self.stack
                    .push(sha256d::Hash::hash(&top).to_byte_array().to_vec())?;
            }

            OP_CODESEPARATOR => {
                // the script code starts right after this opcode
                self.codesep_pos = self.pc;
            }

            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                // (sig pubkey -- bool)
                self.stack.needn(2)?;
                let sig = self.stack.top(-2)?.to_vec();
                let pubkey = self.stack.top(-1)?.to_vec();
                check_signature_encoding(&sig, self.flags)?;
                check_pubkey_encoding(&pubkey, self.flags)?;

                let script_code = self.script_code(std::slice::from_ref(&sig));
                let success = self.check_sig(&sig, &pubkey, &script_code);
                if !success && self.flags.has(VERIFY_NULLFAIL) && !sig.is_empty() {
                    return Err(ExecError::SigNullFail);
                }

                self.stack.popn(2)?;
                self.stack.pushbool(success)?;
                if op == OP_CHECKSIGVERIFY {
                    if !success {
                        return Err(ExecError::CheckSigVerify);
                    }
                    self.stack.pop()?;
                }
            }

            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => self.check_multisig(op)?,

            // remainder
            _ => return Err(ExecError::BadOpcode),
        }

        Ok(())
    }

    /// The running script from the last executed `OP_CODESEPARATOR`, with
    /// `sigs` removed unless they commit to the fork id.
    fn script_code(&self, sigs: &[Vec<u8>]) -> Vec<u8> {
        let mut code = self.script()[self.codesep_pos..].to_vec();
        for sig in sigs {
            if !uses_fork_id(sig, self.flags) {
                code = find_and_delete(&code, &Instruction::push_bytes(sig).to_bytes());
            }
        }
        code
    }

    fn check_sig(&self, sig: &[u8], pubkey: &[u8], script_code: &[u8]) -> bool {
        let outcome = self.checker.check_sig(sig, pubkey, script_code, self.flags);
        trace!("signature check: {:?}", outcome);
        outcome == SignatureOutcome::Valid
    }

    fn check_multisig(&mut self, op: Opcode) -> Result<(), ExecError> {
        // ([dummy] [sig ...] nsigs [pubkey ...] npubkeys -- bool)
        let mut i: usize = 1;
        let keys_count = self.topnum(-(i as isize))?;
        if keys_count.is_negative() {
            return Err(ExecError::PubkeyCount);
        }
        let keys_count = keys_count.to_usize_saturating().unwrap_or(usize::MAX);
        if keys_count as u64 > self.max_pubkeys {
            return Err(ExecError::PubkeyCount);
        }
        self.stats.op_count = self.stats.op_count.saturating_add(keys_count as u64);
        if self.stats.op_count > self.max_ops {
            return Err(ExecError::OpCount);
        }

        i += 1;
        let mut ikey = i;
        // number of elements to pop before reaching the signatures
        let mut ikey2 = keys_count + 2;
        i = i.checked_add(keys_count).ok_or(ExecError::InvalidStackOperation)?;
        self.stack.needn(i)?;

        let sigs_count = self.topnum(-(i as isize))?;
        if sigs_count.is_negative() {
            return Err(ExecError::SigCount);
        }
        let sigs_count = sigs_count.to_usize_saturating().unwrap_or(usize::MAX);
        if sigs_count > keys_count {
            return Err(ExecError::SigCount);
        }
        i += 1;
        let mut isig = i;
        i += sigs_count;
        self.stack.needn(i)?;

        let mut sigs = Vec::with_capacity(sigs_count);
        for k in 0..sigs_count {
            sigs.push(self.stack.top(-((isig + k) as isize))?.to_vec());
        }
        let script_code = self.script_code(&sigs);

        let mut keys_left = keys_count;
        let mut sigs_left = sigs_count;
        let mut success = true;
        while success && sigs_left > 0 {
            let sig = self.stack.top(-(isig as isize))?;
            let pubkey = self.stack.top(-(ikey as isize))?;
            check_signature_encoding(sig, self.flags)?;
            check_pubkey_encoding(pubkey, self.flags)?;

            if self.check_sig(sig, pubkey, &script_code) {
                isig += 1;
                sigs_left -= 1;
            }
            ikey += 1;
            keys_left -= 1;

            // more signatures left than keys means too many have failed
            if sigs_left > keys_left {
                success = false;
            }
        }

        // clean up the arguments, all signatures must be empty on failure
        while i > 1 {
            i -= 1;
            if !success
                && self.flags.has(VERIFY_NULLFAIL)
                && ikey2 == 0
                && !self.stack.top(-1)?.is_empty()
            {
                return Err(ExecError::SigNullFail);
            }
            ikey2 = ikey2.saturating_sub(1);
            self.stack.pop()?;
        }

        // the extra element consumed by the historical off-by-one
        if self.flags.has(VERIFY_NULLDUMMY) && !self.stack.top(-1)?.is_empty() {
            return Err(ExecError::SigNullDummy);
        }
        self.stack.pop()?;

        self.stack.pushbool(success)?;
        if op == OP_CHECKMULTISIGVERIFY {
            if !success {
                return Err(ExecError::CheckMultiSigVerify);
            }
            self.stack.pop()?;
        }
        Ok(())
    }
}

/// Runs `unlock` and then `lock` to completion.
pub fn evaluate<C: SignatureChecker>(
    unlock: &[u8],
    lock: &[u8],
    flags: impl Into<u32>,
    options: Options,
    checker: C,
) -> Result<ExecutionResult, Error> {
    let mut exec = Exec::new(unlock, lock, flags, options, checker)?;
    Ok(exec.run())
}

/// Like [`evaluate`] but every signature is accepted.
pub fn verify_unchecked(
    unlock: &[u8],
    lock: &[u8],
    flags: impl Into<u32>,
    options: Options,
) -> Result<ExecutionResult, Error> {
    evaluate(unlock, lock, flags, options, NoSignatureCheck)
}
