use bitcoin::hashes::{hash160, Hash};

use super::*;
use crate::flags::{
    VERIFY_CLEANSTACK, VERIFY_DISCOURAGE_UPGRADABLE_NOPS, VERIFY_MINIMALDATA, VERIFY_MINIMALIF,
    VERIFY_P2SH, VERIFY_SIGPUSHONLY,
};

#[test]
fn basic() {
    let script_asm = "OP_IF OP_2 OP_ELSE OP_4 OP_4 OP_CAT OP_ENDIF";

    let program = Program::from_asm(script_asm).expect("error parsing script");
    println!("Script in hex: {}", bitcoin::hex::DisplayHex::as_hex(&program.encode()[..]));
    println!("Script size: {} bytes", program.serialized_size());

    let mut exec = Exec::with_stack(
        &[],
        &program.encode(),
        POST,
        Options::default(),
        NoSignatureCheck,
        vec![vec![]],
    )
    .expect("error creating exec");

    loop {
        println!("Remaining script: [{}]", asm::ScriptAsm(exec.remaining_script()));
        println!("Stack: [{}]", exec.stack());
        println!("AltStack: [{}]", exec.altstack());
        println!("--------------------------------------------------");

        let next = exec.exec_next();
        if next.is_err() {
            println!("Error {next:?}");
            break;
        }
    }

    let result = exec.result().unwrap();
    assert_success(result);
    assert_eq!(result.phase, Phase::Lock);
    assert_eq!(result.final_stack, vec![vec![4, 4]]);
}

#[test]
fn result_is_sticky() {
    let mut exec = Exec::new(&[], &script("0"), POST, Options::default(), NoSignatureCheck).unwrap();
    let first = exec.run();
    assert_error(&first, ExecError::EvalFalse);
    assert_eq!(exec.exec_next(), Err(&first));
    assert_eq!(exec.run(), first);
}

#[test]
fn arithmetic() {
    assert_success(&run("2 3 OP_ADD 5 OP_NUMEQUAL", POST));
    assert_success(&run("2 3 OP_SUB -1 OP_NUMEQUAL", POST));
    assert_success(&run("-7 2 OP_DIV -3 OP_NUMEQUALVERIFY -7 2 OP_MOD -1 OP_NUMEQUAL", POST));
    assert_success(&run("5 OP_NEGATE OP_ABS 5 OP_NUMEQUAL", POST));
    assert_success(&run("0 OP_NOT 7 OP_0NOTEQUAL OP_BOOLAND", POST));
    assert_success(&run("3 2 5 OP_WITHIN", POST));
    assert_success(&run("5 2 5 OP_WITHIN OP_NOT", POST));
    assert_success(&run("3 OP_1ADD OP_1SUB 3 OP_NUMEQUAL", POST));
    assert_success(&run("3 9 OP_MIN 3 OP_NUMEQUAL", POST));
    assert_success(&run("1 2 OP_LESSTHAN 2 2 OP_GREATERTHANOREQUAL OP_BOOLAND", POST));

    assert_error(&run("1 0 OP_DIV", POST), ExecError::DivByZero);
    assert_error(&run("1 0 OP_MOD", POST), ExecError::ModByZero);
    assert_error(&run("1 2 OP_NUMEQUALVERIFY", POST), ExecError::NumEqualVerify);
    assert_error(&run("OP_ADD", POST), ExecError::InvalidStackOperation);
}

#[test]
fn big_numbers_after_genesis() {
    let lock = "2147483647 2147483647 OP_MUL 4611686014132420609 OP_NUMEQUAL";
    assert_success(&run(lock, POST));
    // the product does not fit in four bytes
    assert_error(&run(lock, PRE), ExecError::ScriptNumOverflow);
}

#[test]
fn minimal_numbers() {
    assert_success(&run("0x0500 OP_1ADD", POST));
    assert_error(
        &run("0x0500 OP_1ADD", POST | VERIFY_MINIMALDATA),
        ExecError::ScriptNumMinEncode
    );
}

#[test]
fn minimal_pushes() {
    let lock = [0x01, 0x05];
    let res = verify_unchecked(&[], &lock, POST, Options::default()).unwrap();
    assert_success(&res);
    let res = verify_unchecked(&[], &lock, POST | VERIFY_MINIMALDATA, Options::default()).unwrap();
    assert_error(&res, ExecError::MinimalData);
}

#[test]
fn splice() {
    assert_success(&run("0x01 0x02 OP_CAT 0x0102 OP_EQUAL", POST));
    assert_success(&run(
        "0x0102030405 2 OP_SPLIT 0x030405 OP_EQUALVERIFY 0x0102 OP_EQUAL",
        POST,
    ));
    assert_success(&run("0x0102 0 OP_SPLIT 0x0102 OP_EQUALVERIFY OP_SIZE OP_NOT", POST));
    assert_error(&run("0x0102 3 OP_SPLIT", POST), ExecError::InvalidSplitRange);
    assert_error(&run("0x0102 -1 OP_SPLIT", POST), ExecError::InvalidSplitRange);

    let res = run("0x010203 OP_SIZE", POST);
    assert_success(&res);
    assert_eq!(res.final_stack, vec![vec![1, 2, 3], vec![3]]);
}

#[test]
fn number_conversion() {
    assert_success(&run("2 4 OP_NUM2BIN 0x02000000 OP_EQUAL", POST));
    assert_success(&run("-5 4 OP_NUM2BIN 0x05000080 OP_EQUAL", POST));
    assert_success(&run("0x0500000080 OP_BIN2NUM -5 OP_NUMEQUAL", POST));
    assert_error(&run("0x0102 1 OP_NUM2BIN", POST), ExecError::ImpossibleEncoding);
    assert_error(&run("1 -1 OP_NUM2BIN", POST), ExecError::PushSize);
    assert_error(&run("1 521 OP_NUM2BIN", PRE), ExecError::PushSize);
    assert_success(&run("1 521 OP_NUM2BIN OP_SIZE 521 OP_NUMEQUAL", POST));
    assert_error(&run("0x0000000001 OP_BIN2NUM", PRE), ExecError::InvalidNumberRange);
}

#[test]
fn bitwise() {
    assert_success(&run("0x0f 0xf0 OP_OR 0xff OP_EQUAL", POST));
    assert_success(&run("0x0f 0xff OP_AND 0x0f OP_EQUAL", POST));
    assert_success(&run("0x0f 0xff OP_XOR 0xf0 OP_EQUAL", POST));
    assert_success(&run("0x00ff OP_INVERT 0xff00 OP_EQUAL", POST));
    assert_success(&run("0x0180 1 OP_LSHIFT 0x0300 OP_EQUAL", POST));
    assert_success(&run("0x0180 1 OP_RSHIFT 0x00c0 OP_EQUAL", POST));
    assert_error(&run("0x0f 0xf0f0 OP_AND", POST), ExecError::InvalidOperandSize);
    assert_error(&run("0x01 -1 OP_LSHIFT", POST), ExecError::InvalidNumberRange);
}

#[test]
fn stack_operations() {
    let cases: &[(&str, &[&[u8]])] = &[
        ("1 2 3 OP_ROT", &[&[2], &[3], &[1]]),
        ("1 2 3 4 5 6 OP_2ROT", &[&[3], &[4], &[5], &[6], &[1], &[2]]),
        ("1 2 3 4 OP_2SWAP", &[&[3], &[4], &[1], &[2]]),
        ("1 2 3 4 OP_2OVER", &[&[1], &[2], &[3], &[4], &[1], &[2]]),
        ("1 2 OP_2DUP", &[&[1], &[2], &[1], &[2]]),
        ("1 2 3 OP_3DUP", &[&[1], &[2], &[3], &[1], &[2], &[3]]),
        ("1 2 3 2 OP_PICK", &[&[1], &[2], &[3], &[1]]),
        ("1 2 3 2 OP_ROLL", &[&[2], &[3], &[1]]),
        ("1 2 3 0 OP_ROLL", &[&[1], &[2], &[3]]),
        ("1 2 OP_TUCK", &[&[2], &[1], &[2]]),
        ("1 2 OP_NIP", &[&[2]]),
        ("1 2 OP_OVER", &[&[1], &[2], &[1]]),
        ("1 2 OP_SWAP", &[&[2], &[1]]),
        ("5 5 OP_DEPTH", &[&[5], &[5], &[2]]),
        ("3 OP_IFDUP", &[&[3], &[3]]),
        ("1 2 3 OP_2DROP", &[&[1]]),
        ("1 2 OP_DROP", &[&[1]]),
    ];
    for (lock, expected) in cases {
        let res = run(lock, POST);
        assert_success(&res);
        let expected: Vec<Vec<u8>> = expected.iter().map(|e| e.to_vec()).collect();
        assert_eq!(res.final_stack, expected, "{}", lock);
    }

    assert_error(&run("0 OP_IFDUP", POST), ExecError::EvalFalse);
    assert_error(&run("1 1 OP_PICK", POST), ExecError::InvalidStackOperation);
    assert_error(&run("1 -1 OP_PICK", POST), ExecError::InvalidStackOperation);
    assert_error(&run("1 2 3 OP_2ROT", POST), ExecError::InvalidStackOperation);
    assert_error(&run("OP_DUP", POST), ExecError::InvalidStackOperation);
}

#[test]
fn altstack() {
    assert_success(&run("1 OP_TOALTSTACK OP_FROMALTSTACK", POST));
    assert_error(&run("OP_FROMALTSTACK", POST), ExecError::InvalidAltstackOperation);
    assert_error(&run("OP_TOALTSTACK", POST), ExecError::InvalidStackOperation);

    // every script starts with an empty altstack
    let res = run_with("1 1 OP_TOALTSTACK", "OP_FROMALTSTACK", POST, Options::default());
    assert_error(&res, ExecError::InvalidAltstackOperation);
    assert_eq!(res.phase, Phase::Lock);
}

#[test]
fn hashes() {
    assert_success(&run(
        "0 OP_SHA256 0xe3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855 OP_EQUAL",
        POST,
    ));
    assert_success(&run("0 OP_SHA1 0xda39a3ee5e6b4b0d3255bfef95601890afd80709 OP_EQUAL", POST));
    assert_success(&run("0 OP_RIPEMD160 0x9c1185a5c5e9fc54612808977ee8f548b2258d31 OP_EQUAL", POST));
    assert_success(&run("0 OP_HASH160 0xb472a266d0bd89c13706a4132ccfb16f7c3b9fcb OP_EQUAL", POST));
    assert_success(&run(
        "0 OP_HASH256 0x5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456 OP_EQUAL",
        POST,
    ));
    assert_error(&run("1 2 OP_EQUALVERIFY", POST), ExecError::EqualVerify);
}

#[test]
fn conditionals() {
    let res = run("1 OP_IF 2 OP_ELSE 3 OP_ENDIF", POST);
    assert_eq!(res.final_stack, vec![vec![2]]);
    let res = run("0 OP_IF 2 OP_ELSE 3 OP_ENDIF", POST);
    assert_eq!(res.final_stack, vec![vec![3]]);
    let res = run("0 OP_NOTIF 7 OP_ENDIF", POST);
    assert_eq!(res.final_stack, vec![vec![7]]);
    let res = run("1 0 OP_IF OP_IF 5 OP_ENDIF OP_ELSE 6 OP_ENDIF", POST);
    assert_eq!(res.final_stack, vec![vec![1], vec![6]]);

    assert_error(&run("OP_IF 1 OP_ENDIF", POST), ExecError::UnbalancedConditional);
    assert_error(&run("1 OP_ENDIF", POST), ExecError::UnbalancedConditional);
    assert_error(&run("1 OP_ELSE", POST), ExecError::UnbalancedConditional);

    let res = run("1 1 OP_IF", POST);
    assert_error(&res, ExecError::UnbalancedConditional);
    assert_eq!(res.opcode, None);

    // conditionals do not span scripts
    let res = run_with("1 OP_IF", "OP_ENDIF", POST, Options::default());
    assert_error(&res, ExecError::UnbalancedConditional);
    assert_eq!(res.phase, Phase::Unlock);
}

#[test]
fn single_else_after_genesis() {
    let lock = "1 1 OP_IF OP_ELSE OP_ELSE OP_ENDIF";
    assert_error(&run(lock, POST), ExecError::UnbalancedConditional);
    assert_success(&run(lock, PRE));
}

#[test]
fn minimal_if() {
    assert_success(&run("2 OP_IF 1 OP_ENDIF", POST));
    assert_error(&run("2 OP_IF 1 OP_ENDIF", POST | VERIFY_MINIMALIF), ExecError::MinimalIf);
    assert_success(&run("1 OP_IF 1 OP_ENDIF", POST | VERIFY_MINIMALIF));
}

#[test]
fn unexecuted_branches() {
    assert_success(&run("0 OP_IF OP_RESERVED OP_VER OP_ENDIF 1", POST));
    assert_error(&run("1 OP_IF OP_RESERVED OP_ENDIF", POST), ExecError::BadOpcode);

    assert_success(&run("0 OP_IF OP_VERIF OP_ENDIF 1", POST));
    assert_error(&run("0 OP_IF OP_VERIF OP_ENDIF 1", PRE), ExecError::BadOpcode);
    assert_error(&run("1 OP_IF OP_VERIF OP_ENDIF", POST), ExecError::BadOpcode);

    assert_success(&run("0 OP_IF OP_2MUL OP_ENDIF 1", POST));
    assert_error(&run("0 OP_IF OP_2MUL OP_ENDIF 1", PRE), ExecError::DisabledOpcode);
    assert_error(&run("2 OP_2DIV", POST), ExecError::DisabledOpcode);
}

#[test]
fn op_return() {
    assert_error(&run("1 OP_RETURN", PRE), ExecError::OpReturn);
    assert_error(&run("0 OP_IF OP_RETURN OP_ENDIF", PRE), ExecError::EvalFalse);

    // the rest of the script is not even parsed
    let lock = [0x51, 0x6a, 0xff, 0x4c];
    let res = verify_unchecked(&[], &lock, POST, Options::default()).unwrap();
    assert_success(&res);
    assert_eq!(res.final_stack, vec![vec![1]]);

    assert_error(&run("0 OP_RETURN", POST), ExecError::EvalFalse);

    // a return in the unlocking script only ends that script
    assert_success(&run_with("1 OP_RETURN", "OP_VERIFY 1", POST, Options::default()));

    // inside a branch, the remaining instructions are only balanced
    let res = run("7 1 OP_IF OP_RETURN OP_ENDIF 0 OP_VERIFY", POST);
    assert_success(&res);
    assert_eq!(res.final_stack, vec![vec![7]]);
    assert_error(&run("7 1 OP_IF OP_RETURN", POST), ExecError::UnbalancedConditional);
}

#[test]
fn upgradable_nops() {
    assert_success(&run("1 OP_NOP1 OP_NOP10", POST));
    assert_error(
        &run("1 OP_NOP5", POST | VERIFY_DISCOURAGE_UPGRADABLE_NOPS),
        ExecError::DiscourageUpgradableNops
    );
    assert_success(&run("1 OP_NOP", POST | VERIFY_DISCOURAGE_UPGRADABLE_NOPS));
}

#[test]
fn clean_stack() {
    assert_success(&run("1", POST | VERIFY_CLEANSTACK));
    assert_error(&run("1 1", POST | VERIFY_CLEANSTACK), ExecError::CleanStack);
    assert_error(&run("1 0", POST | VERIFY_CLEANSTACK), ExecError::EvalFalse);
    assert_error(&run("", POST), ExecError::EvalFalse);
}

#[test]
fn sig_push_only() {
    let exec = Exec::new(
        &script("1 OP_DUP"),
        &script("OP_EQUAL"),
        POST | VERIFY_SIGPUSHONLY,
        Options::default(),
        NoSignatureCheck,
    )
    .unwrap();
    let res = exec.result().expect("fails before the first step");
    assert_error(res, ExecError::SigPushOnly);

    let res = run_with("1 OP_DUP", "OP_EQUAL", POST, Options::default());
    assert_success(&res);
}

fn p2sh_lock(redeem: &[u8]) -> Vec<u8> {
    let mut lock = vec![0xa9, 0x14];
    lock.extend_from_slice(&hash160::Hash::hash(redeem).to_byte_array());
    lock.push(0x87);
    lock
}

#[test]
fn pay_to_script_hash() {
    let redeem = script("2 3 OP_ADD 5 OP_EQUAL");
    let lock = p2sh_lock(&redeem);
    let unlock = Instruction::push(&redeem).to_bytes();

    let res = verify_unchecked(&unlock, &lock, PRE | VERIFY_P2SH, Options::default()).unwrap();
    assert_success(&res);
    assert_eq!(res.phase, Phase::Redeem);
    assert_eq!(res.final_stack, vec![vec![1]]);

    // without the flag only the hash is checked
    let res = verify_unchecked(&unlock, &lock, PRE, Options::default()).unwrap();
    assert_success(&res);
    assert_eq!(res.phase, Phase::Lock);

    // post-Genesis outputs are never redeemed
    let res = verify_unchecked(&unlock, &lock, POST | VERIFY_P2SH, Options::default()).unwrap();
    assert_success(&res);
    assert_eq!(res.phase, Phase::Lock);

    let wrong = script("2 3 OP_ADD 6 OP_EQUAL");
    let res = verify_unchecked(
        &Instruction::push(&wrong).to_bytes(),
        &p2sh_lock(&wrong),
        PRE | VERIFY_P2SH,
        Options::default(),
    )
    .unwrap();
    assert_error(&res, ExecError::EvalFalse);
    assert_eq!(res.phase, Phase::Redeem);

    let mut not_push_only = unlock.clone();
    not_push_only.push(Opcode::OP_NOP.to_u8());
    let res = verify_unchecked(&not_push_only, &lock, PRE | VERIFY_P2SH, Options::default()).unwrap();
    assert_error(&res, ExecError::SigPushOnly);
}

#[test]
fn stats() {
    let mut exec = Exec::new(
        &script("0x0102"),
        &script("OP_DUP OP_CAT OP_SIZE 4 OP_NUMEQUAL"),
        POST,
        Options::default(),
        NoSignatureCheck,
    )
    .unwrap();
    let res = exec.run();
    assert_success(&res);
    assert_eq!(exec.stats().steps, 6);
    // small integer pushes are not counted
    assert_eq!(exec.stats().op_count, 3);
    // reached with [01020102] [04] [04]
    assert_eq!(exec.stats().max_combined_size, 3 * ELEMENT_OVERHEAD + 6);
}
