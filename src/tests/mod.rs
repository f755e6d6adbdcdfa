use std::cell::RefCell;

use crate::flags::{GENESIS, UTXO_AFTER_GENESIS};
use crate::*;

mod basic;

/// Flags of a plain post-Genesis spend.
const POST: u32 = GENESIS | UTXO_AFTER_GENESIS;
/// Flags of a plain pre-Genesis spend.
const PRE: u32 = 0;

fn script(asm: &str) -> Vec<u8> {
    Program::from_asm(asm).expect("error parsing script").encode()
}

fn run_with(unlock: &str, lock: &str, flags: u32, options: Options) -> ExecutionResult {
    verify_unchecked(&script(unlock), &script(lock), flags, options).expect("error creating exec")
}

fn run(lock: &str, flags: u32) -> ExecutionResult {
    run_with("", lock, flags, Options::default())
}

#[track_caller]
fn assert_success(res: &ExecutionResult) {
    assert!(res.success, "unexpected failure: {:?}", res);
    assert_eq!(res.error, None);
}

#[track_caller]
fn assert_error(res: &ExecutionResult, err: ExecError) {
    assert!(!res.success, "unexpected success: {:?}", res);
    assert_eq!(res.error, Some(err), "{:?}", res);
}

/// Signature checker accepting a signature when it equals the public key
/// followed by the sighash byte. Remembers every script code it was given.
#[derive(Default)]
struct FakeChecker {
    max_lock_time: i64,
    script_codes: RefCell<Vec<Vec<u8>>>,
}

impl SignatureChecker for FakeChecker {
    fn check_sig(&self, sig: &[u8], pubkey: &[u8], script_code: &[u8], _: ScriptFlags) -> SignatureOutcome {
        self.script_codes.borrow_mut().push(script_code.to_vec());
        match sig.split_last() {
            Some((_, body)) if body == pubkey => SignatureOutcome::Valid,
            Some(_) => SignatureOutcome::Invalid,
            None => SignatureOutcome::Malformed,
        }
    }

    fn check_lock_time(&self, lock_time: &ScriptNum) -> bool {
        lock_time.to_i64_saturating() <= self.max_lock_time
    }

    fn check_sequence(&self, sequence: &ScriptNum) -> bool {
        sequence.to_i64_saturating() <= self.max_lock_time
    }
}

fn run_checked(lock: &str, flags: u32, checker: &FakeChecker) -> ExecutionResult {
    evaluate(&[], &script(lock), flags, Options::default(), checker).expect("error creating exec")
}
