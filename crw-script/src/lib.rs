//! A from-scratch Bitcoin script interpreter: stack machine, signature
//! hashing, and the pattern recognizers the chain engine needs to classify
//! output scripts.

pub mod checker;
pub mod error;
pub mod flags;
pub mod interpreter;
pub mod number;
pub mod opcode;
pub mod patterns;
pub mod sighash;

pub use checker::{NullChecker, SignatureChecker};
pub use error::ScriptError;
pub use flags::Flags;
pub use interpreter::Interpreter;

use sha2::{Digest, Sha256};

use crw_chain::{
    amount::{Amount, NonNegative},
    transaction::Transaction,
    transparent,
};

use sighash::{SpentOutput, TransactionSignatureChecker};

/// Verifies that spending `input_index` of `tx` against `spent_script`
/// (the output script of the UTXO it spends, worth `amount`) is valid under
/// `flags`.
///
/// This is the single entry point callers outside this crate should use;
/// everything else here is plumbing `verify` assembles.
pub fn verify(
    spent_script: &[u8],
    amount: Amount<NonNegative>,
    tx: &Transaction,
    input_index: usize,
    flags: Flags,
) -> Result<(), ScriptError> {
    let (unlock_script, witness) = match tx.inputs.get(input_index) {
        Some(transparent::Input::PrevOut { unlock_script, witness, .. }) => (&unlock_script.0, witness),
        _ => return Err(ScriptError::InvalidStackOperation),
    };

    let checker = TransactionSignatureChecker::new(
        tx,
        input_index,
        SpentOutput { amount, is_witness: !witness.is_empty() || patterns::is_witness_program(spent_script) },
        flags,
    );

    if flags.contains(Flags::P2SH) && patterns::is_p2sh(spent_script) && !patterns::is_push_only(unlock_script) {
        return Err(ScriptError::SigScriptNotPushOnly);
    }

    let mut engine = Interpreter::new(flags, &checker);
    engine.run(unlock_script)?;

    let stack_after_unlock = engine.stack().clone();

    let mut engine = Interpreter::new(flags, &checker);
    engine.set_stack(stack_after_unlock.clone());
    engine.run(spent_script)?;

    if flags.contains(Flags::P2SH) && patterns::is_p2sh(spent_script) {
        // `spent_script` (HASH160 <hash> EQUAL) must itself have accepted;
        // the redeem script is then re-extracted from the stack as it stood
        // before that check ran, since OP_HASH160/OP_EQUAL consumed it.
        engine.success().map_err(|_| ScriptError::RedeemScriptMismatch)?;

        let mut stack = stack_after_unlock;
        let redeem_script = stack.pop().ok_or(ScriptError::StackUnderflow)?;

        if flags.contains(Flags::WITNESS) && patterns::is_witness_program(&redeem_script) {
            return verify_witness_program(&redeem_script, witness, amount, tx, input_index, flags);
        }

        let mut engine = Interpreter::new(flags, &checker);
        engine.set_stack(stack);
        engine.run(&redeem_script)?;
        return engine.success();
    }

    if flags.contains(Flags::WITNESS) && patterns::is_witness_program(spent_script) {
        return verify_witness_program(spent_script, witness, amount, tx, input_index, flags);
    }

    engine.success()
}

fn verify_witness_program(
    program: &[u8],
    witness: &[Vec<u8>],
    amount: Amount<NonNegative>,
    tx: &Transaction,
    input_index: usize,
    flags: Flags,
) -> Result<(), ScriptError> {
    let checker = TransactionSignatureChecker::new(
        tx,
        input_index,
        SpentOutput { amount, is_witness: true },
        flags,
    );

    if patterns::is_p2wpkh(program) {
        if witness.len() != 2 {
            return Err(ScriptError::InvalidWitnessProgram);
        }
        let pubkey_hash = &program[2..22];
        let script_code = p2pkh_script_code(pubkey_hash);
        let mut engine = Interpreter::new(flags, &checker);
        engine.set_stack(vec![witness[0].clone(), witness[1].clone()]);
        engine.run(&script_code)?;
        return engine.success();
    }

    if patterns::is_p2wsh(program) {
        let witness_script = witness.last().ok_or(ScriptError::InvalidWitnessProgram)?;
        let digest = Sha256::digest(witness_script);
        if digest.as_slice() != &program[2..34] {
            return Err(ScriptError::InvalidWitnessProgram);
        }
        let mut engine = Interpreter::new(flags, &checker);
        engine.set_stack(witness[..witness.len() - 1].to_vec());
        engine.run(witness_script)?;
        return engine.success();
    }

    Err(ScriptError::InvalidWitnessProgram)
}

fn p2pkh_script_code(pubkey_hash: &[u8]) -> Vec<u8> {
    let mut script = vec![opcode::OP_DUP, opcode::OP_HASH160, 0x14];
    script.extend_from_slice(pubkey_hash);
    script.push(opcode::OP_EQUALVERIFY);
    script.push(opcode::OP_CHECKSIG);
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crw_chain::transaction::LockTime;

    fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
        p2pkh_script_code(pubkey_hash)
    }

    #[test]
    fn runs_a_trivial_true_script() {
        let checker = NullChecker;
        let mut engine = Interpreter::new(Flags::NONE, &checker);
        engine.run(&[opcode::OP_1]).unwrap();
        assert!(engine.success().is_ok());
    }

    #[test]
    fn rejects_disabled_opcode() {
        let checker = NullChecker;
        let mut engine = Interpreter::new(Flags::NONE, &checker);
        let err = engine.run(&[0x8d]).unwrap_err();
        assert!(matches!(err, ScriptError::DisabledOpcode(_)));
    }

    #[test]
    fn p2pkh_script_code_has_expected_shape() {
        let hash = [7u8; 20];
        let code = p2pkh_script(&hash);
        assert_eq!(code.len(), 25);
        assert_eq!(code[0], opcode::OP_DUP);
        assert_eq!(code[code.len() - 1], opcode::OP_CHECKSIG);
    }

    #[test]
    fn verify_fails_cleanly_on_missing_input() {
        let tx = Transaction::new(1, Vec::new(), Vec::new(), LockTime::new_height(crw_chain::block::Height(0)));
        let amount = Amount::<NonNegative>::zero();
        let err = verify(&[opcode::OP_1], amount, &tx, 0, Flags::NONE).unwrap_err();
        assert!(matches!(err, ScriptError::InvalidStackOperation));
    }

    #[test]
    fn p2sh_rejects_a_non_push_only_scriptsig() {
        use crw_chain::transparent::{self, Input, OutPoint};

        let redeem_script = vec![opcode::OP_1];
        let digest = ripemd160::Ripemd160::digest(&Sha256::digest(&redeem_script));
        let mut spent_script = vec![opcode::OP_HASH160, 0x14];
        spent_script.extend_from_slice(&digest);
        spent_script.push(opcode::OP_EQUAL);

        // Pushes the redeem script, then runs a non-push opcode: not
        // push-only, so a P2SH spend must reject this before even
        // considering whether the redeem script itself would pass.
        let mut unlock_script = vec![redeem_script.len() as u8];
        unlock_script.extend_from_slice(&redeem_script);
        unlock_script.push(opcode::OP_CHECKSIG);

        let input = Input::PrevOut {
            outpoint: OutPoint { hash: crw_chain::transaction::Hash([0; 32]), index: 0 },
            unlock_script: transparent::Script::new(unlock_script).unwrap(),
            sequence: 0,
            witness: Vec::new(),
        };
        let tx = Transaction::new(1, vec![input], Vec::new(), LockTime::new_height(crw_chain::block::Height(0)));

        let amount = Amount::<NonNegative>::zero();
        let err = verify(&spent_script, amount, &tx, 0, Flags::P2SH).unwrap_err();
        assert!(matches!(err, ScriptError::SigScriptNotPushOnly));
    }
}
