//! The script stack machine.

use ripemd160::Ripemd160;
use sha2::{Digest, Sha256};

use crate::{checker::SignatureChecker, error::ScriptError, flags::Flags, number, opcode::*};

/// Hard limits the interpreter enforces independent of any soft fork.
pub const MAX_SCRIPT_SIZE: usize = 10_000;
pub const MAX_STACK_SIZE: usize = 1_000;
pub const MAX_OPS_PER_SCRIPT: usize = 201;
pub const MAX_PUBKEYS_PER_MULTISIG: i64 = 20;
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

type Stack = Vec<Vec<u8>>;

/// One decoded script instruction.
pub(crate) struct Instruction<'a> {
    pub(crate) opcode: u8,
    pub(crate) data: Option<&'a [u8]>,
}

/// Reads the instruction starting at `script[*pos]`, advancing `*pos` past
/// it. Returns `Ok(None)` once the script is exhausted.
pub(crate) fn next_instruction<'a>(script: &'a [u8], pos: &mut usize) -> Result<Option<Instruction<'a>>, ScriptError> {
    if *pos >= script.len() {
        return Ok(None);
    }
    let opcode = script[*pos];
    *pos += 1;

    if opcode >= OP_1NEGATE && opcode != OP_PUSHDATA1 && opcode != OP_PUSHDATA2 && opcode != OP_PUSHDATA4 {
        return Ok(Some(Instruction { opcode, data: None }));
    }

    let len = if opcode <= 0x4b {
        opcode as usize
    } else if opcode == OP_PUSHDATA1 {
        let n = *script.get(*pos).ok_or(ScriptError::InvalidStackOperation)? as usize;
        *pos += 1;
        n
    } else if opcode == OP_PUSHDATA2 {
        let bytes = script.get(*pos..*pos + 2).ok_or(ScriptError::InvalidStackOperation)?;
        *pos += 2;
        u16::from_le_bytes([bytes[0], bytes[1]]) as usize
    } else if opcode == OP_PUSHDATA4 {
        let bytes = script.get(*pos..*pos + 4).ok_or(ScriptError::InvalidStackOperation)?;
        *pos += 4;
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
    } else {
        unreachable!("opcode already matched a push form above")
    };

    if len > MAX_SCRIPT_ELEMENT_SIZE {
        return Err(ScriptError::PushSizeExceeded(len, MAX_SCRIPT_ELEMENT_SIZE));
    }
    let data = script.get(*pos..*pos + len).ok_or(ScriptError::InvalidStackOperation)?;
    *pos += len;
    Ok(Some(Instruction { opcode, data: Some(data) }))
}

/// Executes Bitcoin script against an explicit stack, flags, and
/// [`SignatureChecker`].
pub struct Interpreter<'c, C: SignatureChecker> {
    flags: Flags,
    checker: &'c C,
    stack: Stack,
    alt_stack: Stack,
    cond_stack: Vec<bool>,
    op_count: usize,
}

impl<'c, C: SignatureChecker> Interpreter<'c, C> {
    pub fn new(flags: Flags, checker: &'c C) -> Self {
        Interpreter {
            flags,
            checker,
            stack: Vec::new(),
            alt_stack: Vec::new(),
            cond_stack: Vec::new(),
            op_count: 0,
        }
    }

    /// The data stack, for tests and for handing off the P2SH redeem script.
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn set_stack(&mut self, stack: Stack) {
        self.stack = stack;
    }

    fn executing(&self) -> bool {
        self.cond_stack.iter().all(|&b| b)
    }

    fn push(&mut self, item: Vec<u8>) -> Result<(), ScriptError> {
        if item.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(ScriptError::PushSizeExceeded(item.len(), MAX_SCRIPT_ELEMENT_SIZE));
        }
        self.stack.push(item);
        if self.stack.len() + self.alt_stack.len() > MAX_STACK_SIZE {
            return Err(ScriptError::StackTooDeep(self.stack.len() + self.alt_stack.len(), MAX_STACK_SIZE));
        }
        Ok(())
    }

    fn pop(&mut self) -> Result<Vec<u8>, ScriptError> {
        self.stack.pop().ok_or(ScriptError::StackUnderflow)
    }

    fn top(&self, back: usize) -> Result<&Vec<u8>, ScriptError> {
        let len = self.stack.len();
        if back >= len {
            return Err(ScriptError::StackUnderflow);
        }
        Ok(&self.stack[len - 1 - back])
    }

    fn pop_num(&mut self) -> Result<i64, ScriptError> {
        let bytes = self.pop()?;
        number::decode(&bytes, true)
    }

    fn push_num(&mut self, value: i64) -> Result<(), ScriptError> {
        self.push(number::encode(value))
    }

    fn push_bool(&mut self, value: bool) -> Result<(), ScriptError> {
        self.push(if value { vec![1] } else { Vec::new() })
    }

    /// Runs `script` to completion against the interpreter's current stack.
    ///
    /// Does not itself check the final stack-top value; callers evaluating
    /// a full scriptSig + scriptPubKey pair should call
    /// [`Interpreter::success`] once all scripts have run.
    pub fn run(&mut self, script: &[u8]) -> Result<(), ScriptError> {
        if script.len() > MAX_SCRIPT_SIZE {
            return Err(ScriptError::ScriptTooLarge(script.len()));
        }

        let mut pos = 0;
        let mut code_separator = 0;
        while let Some(instruction) = next_instruction(script, &mut pos)? {
            let Instruction { opcode, data } = instruction;

            if is_disabled(opcode) {
                return Err(ScriptError::DisabledOpcode(opcode));
            }

            if opcode > OP_16 {
                self.op_count += 1;
                if self.op_count > MAX_OPS_PER_SCRIPT {
                    return Err(ScriptError::OpCountExceeded(self.op_count, MAX_OPS_PER_SCRIPT));
                }
            }

            let branch_active = self.executing();

            if !branch_active && !matches!(opcode, OP_IF | OP_NOTIF | OP_ELSE | OP_ENDIF) {
                continue;
            }

            if let Some(data) = data {
                if branch_active {
                    self.push(data.to_vec())?;
                }
                continue;
            }

            if is_small_int(opcode) {
                if branch_active {
                    self.push_num(number::small_int_value(opcode))?;
                }
                continue;
            }

            match opcode {
                OP_NOP | OP_RESERVED | OP_VER => {}
                OP_NOP1 | OP_NOP4..=OP_NOP10 => {}

                OP_IF | OP_NOTIF => {
                    let mut value = false;
                    if branch_active {
                        let top = self.pop()?;
                        if self.flags.contains(Flags::MINIMAL_IF) && top.len() > 1 {
                            return Err(ScriptError::InvalidStackOperation);
                        }
                        value = number::to_bool(&top);
                        if opcode == OP_NOTIF {
                            value = !value;
                        }
                    }
                    self.cond_stack.push(value);
                }
                OP_ELSE => {
                    let top = self.cond_stack.last_mut().ok_or(ScriptError::UnbalancedConditional)?;
                    *top = !*top;
                }
                OP_ENDIF => {
                    self.cond_stack.pop().ok_or(ScriptError::UnbalancedConditional)?;
                }

                OP_VERIFY => {
                    if !number::to_bool(&self.pop()?) {
                        return Err(ScriptError::VerifyFailed);
                    }
                }
                OP_RETURN => return Err(ScriptError::EvalFalse),

                OP_TOALTSTACK => {
                    let item = self.pop()?;
                    self.alt_stack.push(item);
                }
                OP_FROMALTSTACK => {
                    let item = self.alt_stack.pop().ok_or(ScriptError::InvalidStackOperation)?;
                    self.push(item)?;
                }
                OP_2DROP => {
                    self.pop()?;
                    self.pop()?;
                }
                OP_2DUP => {
                    let a = self.top(1)?.clone();
                    let b = self.top(0)?.clone();
                    self.push(a)?;
                    self.push(b)?;
                }
                OP_3DUP => {
                    let a = self.top(2)?.clone();
                    let b = self.top(1)?.clone();
                    let c = self.top(0)?.clone();
                    self.push(a)?;
                    self.push(b)?;
                    self.push(c)?;
                }
                OP_2OVER => {
                    let a = self.top(3)?.clone();
                    let b = self.top(2)?.clone();
                    self.push(a)?;
                    self.push(b)?;
                }
                OP_2ROT => {
                    if self.stack.len() < 6 {
                        return Err(ScriptError::StackUnderflow);
                    }
                    let len = self.stack.len();
                    let a = self.stack.remove(len - 6);
                    let b = self.stack.remove(len - 6);
                    self.push(a)?;
                    self.push(b)?;
                }
                OP_2SWAP => {
                    if self.stack.len() < 4 {
                        return Err(ScriptError::StackUnderflow);
                    }
                    let len = self.stack.len();
                    self.stack.swap(len - 4, len - 2);
                    self.stack.swap(len - 3, len - 1);
                }
                OP_IFDUP => {
                    let top = self.top(0)?.clone();
                    if number::to_bool(&top) {
                        self.push(top)?;
                    }
                }
                OP_DEPTH => self.push_num(self.stack.len() as i64)?,
                OP_DROP => {
                    self.pop()?;
                }
                OP_DUP => {
                    let top = self.top(0)?.clone();
                    self.push(top)?;
                }
                OP_NIP => {
                    let len = self.stack.len();
                    if len < 2 {
                        return Err(ScriptError::StackUnderflow);
                    }
                    self.stack.remove(len - 2);
                }
                OP_OVER => {
                    let item = self.top(1)?.clone();
                    self.push(item)?;
                }
                OP_PICK | OP_ROLL => {
                    let n = self.pop_num()?;
                    if n < 0 || n as usize >= self.stack.len() {
                        return Err(ScriptError::InvalidStackOperation);
                    }
                    let idx = self.stack.len() - 1 - n as usize;
                    let item = if opcode == OP_PICK {
                        self.stack[idx].clone()
                    } else {
                        self.stack.remove(idx)
                    };
                    self.push(item)?;
                }
                OP_ROT => {
                    let len = self.stack.len();
                    if len < 3 {
                        return Err(ScriptError::StackUnderflow);
                    }
                    self.stack.swap(len - 3, len - 2);
                    self.stack.swap(len - 2, len - 1);
                }
                OP_SWAP => {
                    let len = self.stack.len();
                    if len < 2 {
                        return Err(ScriptError::StackUnderflow);
                    }
                    self.stack.swap(len - 2, len - 1);
                }
                OP_TUCK => {
                    let len = self.stack.len();
                    if len < 2 {
                        return Err(ScriptError::StackUnderflow);
                    }
                    let top = self.stack[len - 1].clone();
                    self.stack.insert(len - 2, top);
                }

                OP_SIZE => {
                    let size = self.top(0)?.len() as i64;
                    self.push_num(size)?;
                }

                OP_EQUAL | OP_EQUALVERIFY => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let equal = a == b;
                    if opcode == OP_EQUALVERIFY {
                        if !equal {
                            return Err(ScriptError::VerifyFailed);
                        }
                    } else {
                        self.push_bool(equal)?;
                    }
                }

                OP_1ADD => {
                    let v = self.pop_num()?;
                    self.push_num(v + 1)?;
                }
                OP_1SUB => {
                    let v = self.pop_num()?;
                    self.push_num(v - 1)?;
                }
                OP_NEGATE => {
                    let v = self.pop_num()?;
                    self.push_num(-v)?;
                }
                OP_ABS => {
                    let v = self.pop_num()?;
                    self.push_num(v.abs())?;
                }
                OP_NOT => {
                    let v = self.pop_num()?;
                    self.push_bool(v == 0)?;
                }
                OP_0NOTEQUAL => {
                    let v = self.pop_num()?;
                    self.push_bool(v != 0)?;
                }
                OP_ADD => {
                    let b = self.pop_num()?;
                    let a = self.pop_num()?;
                    self.push_num(a.checked_add(b).ok_or(ScriptError::NumericOverflow)?)?;
                }
                OP_SUB => {
                    let b = self.pop_num()?;
                    let a = self.pop_num()?;
                    self.push_num(a.checked_sub(b).ok_or(ScriptError::NumericOverflow)?)?;
                }
                OP_BOOLAND => {
                    let b = self.pop_num()?;
                    let a = self.pop_num()?;
                    self.push_bool(a != 0 && b != 0)?;
                }
                OP_BOOLOR => {
                    let b = self.pop_num()?;
                    let a = self.pop_num()?;
                    self.push_bool(a != 0 || b != 0)?;
                }
                OP_NUMEQUAL | OP_NUMEQUALVERIFY => {
                    let b = self.pop_num()?;
                    let a = self.pop_num()?;
                    let equal = a == b;
                    if opcode == OP_NUMEQUALVERIFY {
                        if !equal {
                            return Err(ScriptError::VerifyFailed);
                        }
                    } else {
                        self.push_bool(equal)?;
                    }
                }
                OP_NUMNOTEQUAL => {
                    let b = self.pop_num()?;
                    let a = self.pop_num()?;
                    self.push_bool(a != b)?;
                }
                OP_LESSTHAN => {
                    let b = self.pop_num()?;
                    let a = self.pop_num()?;
                    self.push_bool(a < b)?;
                }
                OP_GREATERTHAN => {
                    let b = self.pop_num()?;
                    let a = self.pop_num()?;
                    self.push_bool(a > b)?;
                }
                OP_LESSTHANOREQUAL => {
                    let b = self.pop_num()?;
                    let a = self.pop_num()?;
                    self.push_bool(a <= b)?;
                }
                OP_GREATERTHANOREQUAL => {
                    let b = self.pop_num()?;
                    let a = self.pop_num()?;
                    self.push_bool(a >= b)?;
                }
                OP_MIN => {
                    let b = self.pop_num()?;
                    let a = self.pop_num()?;
                    self.push_num(a.min(b))?;
                }
                OP_MAX => {
                    let b = self.pop_num()?;
                    let a = self.pop_num()?;
                    self.push_num(a.max(b))?;
                }
                OP_WITHIN => {
                    let max = self.pop_num()?;
                    let min = self.pop_num()?;
                    let x = self.pop_num()?;
                    self.push_bool(x >= min && x < max)?;
                }

                OP_RIPEMD160 => {
                    let item = self.pop()?;
                    self.push(Ripemd160::digest(&item).to_vec())?;
                }
                OP_SHA256 => {
                    let item = self.pop()?;
                    self.push(Sha256::digest(&item).to_vec())?;
                }
                OP_HASH160 => {
                    let item = self.pop()?;
                    let sha = Sha256::digest(&item);
                    self.push(Ripemd160::digest(&sha).to_vec())?;
                }
                OP_HASH256 => {
                    let item = self.pop()?;
                    let first = Sha256::digest(&item);
                    let second = Sha256::digest(&first);
                    self.push(second.to_vec())?;
                }
                OP_SHA1 => return Err(ScriptError::DisabledOpcode(opcode)),
                OP_CODESEPARATOR => {
                    code_separator = pos;
                }

                OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                    let pubkey = self.pop()?;
                    let signature = self.pop()?;
                    let script_code = &script[code_separator..];
                    let ok = self.checker.check_sig(&signature, &pubkey, script_code)?;
                    if opcode == OP_CHECKSIGVERIFY {
                        if !ok {
                            return Err(ScriptError::VerifyFailed);
                        }
                    } else {
                        self.push_bool(ok)?;
                    }
                }
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                    let ok = self.check_multisig(&script[code_separator..])?;
                    if opcode == OP_CHECKMULTISIGVERIFY {
                        if !ok {
                            return Err(ScriptError::VerifyFailed);
                        }
                    } else {
                        self.push_bool(ok)?;
                    }
                }

                OP_CHECKLOCKTIMEVERIFY => {
                    if !self.flags.contains(Flags::CHECKLOCKTIMEVERIFY) {
                        continue;
                    }
                    let bytes = self.top(0)?.clone();
                    let lock_time = number::decode(&bytes, true).map_err(|_| ScriptError::UnsatisfiedLockTime)?;
                    if lock_time < 0 || !self.checker.check_lock_time(lock_time) {
                        return Err(ScriptError::UnsatisfiedLockTime);
                    }
                }
                OP_CHECKSEQUENCEVERIFY => {
                    if !self.flags.contains(Flags::CHECKSEQUENCEVERIFY) {
                        continue;
                    }
                    let bytes = self.top(0)?.clone();
                    let sequence = number::decode(&bytes, true).map_err(|_| ScriptError::UnsatisfiedSequence)?;
                    if sequence < 0 || !self.checker.check_sequence(sequence) {
                        return Err(ScriptError::UnsatisfiedSequence);
                    }
                }

                other => return Err(ScriptError::UnknownOpcode(other)),
            }

            if self.stack.len() + self.alt_stack.len() > MAX_STACK_SIZE {
                return Err(ScriptError::StackTooDeep(self.stack.len() + self.alt_stack.len(), MAX_STACK_SIZE));
            }
        }

        if !self.cond_stack.is_empty() {
            return Err(ScriptError::UnbalancedConditional);
        }
        Ok(())
    }

    fn check_multisig(&mut self, script_code: &[u8]) -> Result<bool, ScriptError> {
        let key_count = self.pop_num()?;
        if !(0..=MAX_PUBKEYS_PER_MULTISIG).contains(&key_count) {
            return Err(ScriptError::PubkeyCount);
        }
        let mut pubkeys = Vec::with_capacity(key_count as usize);
        for _ in 0..key_count {
            pubkeys.push(self.pop()?);
        }

        let sig_count = self.pop_num()?;
        if !(0..=key_count).contains(&sig_count) {
            return Err(ScriptError::PubkeyCount);
        }
        let mut signatures = Vec::with_capacity(sig_count as usize);
        for _ in 0..sig_count {
            signatures.push(self.pop()?);
        }

        // Historic off-by-one in the reference implementation: one extra
        // stack item is popped and discarded ("the dummy element").
        let dummy = self.pop()?;
        if self.flags.contains(Flags::NULLDUMMY) && !dummy.is_empty() {
            return Err(ScriptError::InvalidStackOperation);
        }

        let mut key_iter = pubkeys.iter();
        'sig: for signature in signatures.iter().rev() {
            for pubkey in key_iter.by_ref() {
                if self.checker.check_sig(signature, pubkey, script_code)? {
                    continue 'sig;
                }
            }
            return Ok(false);
        }
        Ok(true)
    }

    /// After running every script in a spend, checks that evaluation ended
    /// with exactly one, truthy, stack element.
    pub fn success(&self) -> Result<(), ScriptError> {
        if self.stack.len() != 1 {
            return Err(ScriptError::InvalidStackOperation);
        }
        if !number::to_bool(&self.stack[0]) {
            return Err(ScriptError::EvalFalse);
        }
        Ok(())
    }
}
