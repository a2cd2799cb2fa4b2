//! Reference interpreter for Frontier/Homestead bytecode.
//!
//! Runs pre-analysed code against any [`Host`]. Every external fact is asked
//! for through `query`, every state change goes through `update`, and nested
//! calls or creations go through `call`. The interpreter itself holds no
//! global state.

use evmjit_abi::raw::CREATE_OUTPUT_SIZE;
use evmjit_abi::value::{h160_to_u256, u256_to_h160};
use evmjit_abi::{CallKind, CallMessage, Host, Mode, QueryKey, UpdateKey, Value, H160, U256};
use sha3::{Digest, Keccak256};

use crate::arith;
use crate::cache::CompiledCode;
use crate::gas;
use crate::memory::Memory;
use crate::LOG_TARGET;

pub(crate) const STACK_LIMIT: usize = 1024;

/// Why an execution ended with an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    OutOfGas,
    StackUnderflow,
    StackOverflow,
    BadJump(usize),
    InvalidOpcode(u8),
    NegativeGas,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fault::OutOfGas => write!(f, "out of gas"),
            Fault::StackUnderflow => write!(f, "stack underflow"),
            Fault::StackOverflow => write!(f, "stack overflow"),
            Fault::BadJump(dest) => write!(f, "jump to non-JUMPDEST {dest}"),
            Fault::InvalidOpcode(op) => write!(f, "invalid opcode 0x{op:02x}"),
            Fault::NegativeGas => write!(f, "negative gas budget"),
        }
    }
}

impl std::error::Error for Fault {}

/// Normal end of execution: STOP, RETURN, SELFDESTRUCT or running off the
/// end of the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Halt {
    pub gas_left: u64,
    pub output: Vec<u8>,
}

pub(crate) struct Frame<'a> {
    pub mode: Mode,
    pub code: &'a CompiledCode,
    pub input: &'a [u8],
    pub value: U256,
}

pub(crate) fn run<H: Host + ?Sized>(
    host: &mut H,
    frame: &Frame<'_>,
    gas: i64,
) -> Result<Halt, Fault> {
    let gas = u64::try_from(gas).map_err(|_| Fault::NegativeGas)?;
    let mut interp = Interpreter {
        host,
        frame,
        stack: Vec::with_capacity(32),
        memory: Memory::default(),
        pc: 0,
        gas,
    };
    interp.run()
}

fn to_usize(v: U256) -> Option<usize> {
    if v > U256::from(u64::MAX) {
        return None;
    }
    usize::try_from(v.low_u64()).ok()
}

fn push_width(op: u8) -> Option<usize> {
    (0x60..=0x7f).contains(&op).then(|| usize::from(op - 0x5f))
}

struct Interpreter<'h, 'f, H: Host + ?Sized> {
    host: &'h mut H,
    frame: &'f Frame<'f>,
    stack: Vec<U256>,
    memory: Memory,
    pc: usize,
    gas: u64,
}

impl<H: Host + ?Sized> Interpreter<'_, '_, H> {
    fn charge(&mut self, cost: u64) -> Result<(), Fault> {
        self.gas = self.gas.checked_sub(cost).ok_or(Fault::OutOfGas)?;
        Ok(())
    }

    fn pop(&mut self) -> Result<U256, Fault> {
        self.stack.pop().ok_or(Fault::StackUnderflow)
    }

    fn push(&mut self, v: U256) -> Result<(), Fault> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(Fault::StackOverflow);
        }
        self.stack.push(v);
        Ok(())
    }

    fn push_bool(&mut self, b: bool) -> Result<(), Fault> {
        self.push(if b { U256::one() } else { U256::zero() })
    }

    fn push_i64(&mut self, v: i64) -> Result<(), Fault> {
        self.push(U256::from(v.max(0) as u64))
    }

    fn binary(&mut self, f: impl FnOnce(U256, U256) -> U256) -> Result<(), Fault> {
        let a = self.pop()?;
        let b = self.pop()?;
        self.push(f(a, b))
    }

    fn ternary(&mut self, f: impl FnOnce(U256, U256, U256) -> U256) -> Result<(), Fault> {
        let a = self.pop()?;
        let b = self.pop()?;
        let c = self.pop()?;
        self.push(f(a, b, c))
    }

    /// Charges for and grows memory to cover `[offset, offset + size)`.
    /// Zero-sized ranges yield `(0, 0)` whatever the offset.
    fn mem_range(&mut self, offset: U256, size: U256) -> Result<(usize, usize), Fault> {
        if size.is_zero() {
            return Ok((0, 0));
        }
        let cost = self
            .memory
            .expansion_cost(offset, size)
            .ok_or(Fault::OutOfGas)?;
        self.charge(cost)?;
        // Both fit in u32 once expansion_cost accepted them.
        let (offset, size) = (offset.low_u64() as usize, size.low_u64() as usize);
        self.memory.grow(offset, size);
        Ok((offset, size))
    }

    fn charge_copy(&mut self, size: usize) -> Result<(), Fault> {
        self.charge(gas::COPY_WORD * gas::words_for(size as u64))
    }

    fn query_u256(&mut self, key: QueryKey, arg: Value<'_>) -> U256 {
        self.host.query(key, arg).as_u256().unwrap_or_default()
    }

    fn query_address(&mut self, key: QueryKey) -> U256 {
        let addr = self
            .host
            .query(key, Value::Unused)
            .as_h160()
            .unwrap_or_default();
        h160_to_u256(addr)
    }

    fn query_i64(&mut self, key: QueryKey) -> i64 {
        self.host
            .query(key, Value::Unused)
            .as_i64()
            .unwrap_or_default()
    }

    fn jump(&mut self, dest: U256) -> Result<(), Fault> {
        let target = to_usize(dest).unwrap_or(usize::MAX);
        if !self.frame.code.is_jumpdest(target) {
            return Err(Fault::BadJump(target));
        }
        self.pc = target;
        Ok(())
    }

    fn run(&mut self) -> Result<Halt, Fault> {
        let frame = self.frame;
        let code = frame.code.code();
        loop {
            let Some(&op) = code.get(self.pc) else {
                return Ok(self.halt(Vec::new()));
            };
            let cost = gas::static_cost(op, self.frame.mode).ok_or(Fault::InvalidOpcode(op))?;
            self.charge(cost)?;
            self.pc += 1;

            match op {
                0x00 => return Ok(self.halt(Vec::new())),
                0x01 => self.binary(|a, b| a.overflowing_add(b).0)?,
                0x02 => self.binary(|a, b| a.overflowing_mul(b).0)?,
                0x03 => self.binary(|a, b| a.overflowing_sub(b).0)?,
                0x04 => self.binary(|a, b| if b.is_zero() { b } else { a / b })?,
                0x05 => self.binary(arith::sdiv)?,
                0x06 => self.binary(|a, b| if b.is_zero() { b } else { a % b })?,
                0x07 => self.binary(arith::smod)?,
                0x08 => self.ternary(arith::addmod)?,
                0x09 => self.ternary(arith::mulmod)?,
                0x0a => {
                    let base = self.pop()?;
                    let exp = self.pop()?;
                    self.charge(gas::EXP_BYTE * arith::byte_len(exp))?;
                    self.push(base.overflowing_pow(exp).0)?;
                }
                0x0b => self.binary(arith::signextend)?,

                0x10 => self.binary(|a, b| bool_word(a < b))?,
                0x11 => self.binary(|a, b| bool_word(a > b))?,
                0x12 => self.binary(|a, b| bool_word(arith::slt(a, b)))?,
                0x13 => self.binary(|a, b| bool_word(arith::slt(b, a)))?,
                0x14 => self.binary(|a, b| bool_word(a == b))?,
                0x15 => {
                    let a = self.pop()?;
                    self.push_bool(a.is_zero())?;
                }
                0x16 => self.binary(|a, b| a & b)?,
                0x17 => self.binary(|a, b| a | b)?,
                0x18 => self.binary(|a, b| a ^ b)?,
                0x19 => {
                    let a = self.pop()?;
                    self.push(!a)?;
                }
                0x1a => self.binary(|i, x| match to_usize(i) {
                    Some(i) if i < 32 => U256::from(x.to_big_endian()[i]),
                    _ => U256::zero(),
                })?,

                0x20 => {
                    let offset = self.pop()?;
                    let size = self.pop()?;
                    let (off, len) = self.mem_range(offset, size)?;
                    self.charge(gas::SHA3_WORD * gas::words_for(len as u64))?;
                    let digest = Keccak256::digest(self.memory.slice(off, len));
                    self.push(U256::from_big_endian(digest.as_slice()))?;
                }

                0x30 => {
                    let v = self.query_address(QueryKey::Address);
                    self.push(v)?;
                }
                0x31 => {
                    let addr = u256_to_h160(self.pop()?);
                    let v = self.query_u256(QueryKey::Balance, Value::Address(addr));
                    self.push(v)?;
                }
                0x32 => {
                    let v = self.query_address(QueryKey::Origin);
                    self.push(v)?;
                }
                0x33 => {
                    let v = self.query_address(QueryKey::Caller);
                    self.push(v)?;
                }
                0x34 => self.push(self.frame.value)?,
                0x35 => {
                    let offset = self.pop()?;
                    let mut word = [0u8; 32];
                    copy_padded_into(&mut word, self.frame.input, offset);
                    self.push(U256::from_big_endian(&word))?;
                }
                0x36 => self.push(U256::from(self.frame.input.len() as u64))?,
                0x37 | 0x39 => {
                    let mem_offset = self.pop()?;
                    let src_offset = self.pop()?;
                    let size = self.pop()?;
                    let (off, len) = self.mem_range(mem_offset, size)?;
                    self.charge_copy(len)?;
                    let src = if op == 0x37 { frame.input } else { code };
                    self.memory.copy_padded(off, src, src_offset, len);
                }
                0x38 => self.push(U256::from(code.len() as u64))?,
                0x3a => {
                    let v = self.query_u256(QueryKey::GasPrice, Value::Unused);
                    self.push(v)?;
                }
                0x3b => {
                    let addr = u256_to_h160(self.pop()?);
                    let len = self
                        .host
                        .query(QueryKey::CodeByAddress, Value::Address(addr))
                        .as_bytes()
                        .map_or(0, <[u8]>::len);
                    self.push(U256::from(len as u64))?;
                }
                0x3c => {
                    let addr = u256_to_h160(self.pop()?);
                    let mem_offset = self.pop()?;
                    let src_offset = self.pop()?;
                    let size = self.pop()?;
                    let (off, len) = self.mem_range(mem_offset, size)?;
                    self.charge_copy(len)?;
                    let ext = self
                        .host
                        .query(QueryKey::CodeByAddress, Value::Address(addr));
                    let ext = ext.as_bytes().unwrap_or_default();
                    self.memory.copy_padded(off, ext, src_offset, len);
                }

                0x40 => {
                    let number = self.pop()?;
                    let v = self.blockhash(number);
                    self.push(v)?;
                }
                0x41 => {
                    let v = self.query_address(QueryKey::Coinbase);
                    self.push(v)?;
                }
                0x42 => {
                    let v = self.query_i64(QueryKey::Timestamp);
                    self.push_i64(v)?;
                }
                0x43 => {
                    let v = self.query_i64(QueryKey::Number);
                    self.push_i64(v)?;
                }
                0x44 => {
                    let v = self.query_u256(QueryKey::Difficulty, Value::Unused);
                    self.push(v)?;
                }
                0x45 => {
                    let v = self.query_i64(QueryKey::GasLimit);
                    self.push_i64(v)?;
                }

                0x50 => {
                    self.pop()?;
                }
                0x51 => {
                    let offset = self.pop()?;
                    let (off, _) = self.mem_range(offset, U256::from(32u64))?;
                    let v = self.memory.load_word(off);
                    self.push(v)?;
                }
                0x52 => {
                    let offset = self.pop()?;
                    let v = self.pop()?;
                    let (off, _) = self.mem_range(offset, U256::from(32u64))?;
                    self.memory.store_word(off, v);
                }
                0x53 => {
                    let offset = self.pop()?;
                    let v = self.pop()?;
                    let (off, _) = self.mem_range(offset, U256::one())?;
                    self.memory.store_byte(off, v.low_u64() as u8);
                }
                0x54 => {
                    let key = self.pop()?;
                    let v = self.query_u256(QueryKey::Sload, Value::Uint256(key));
                    self.push(v)?;
                }
                0x55 => {
                    let key = self.pop()?;
                    let value = self.pop()?;
                    let current = self.query_u256(QueryKey::Sload, Value::Uint256(key));
                    let cost = if current.is_zero() && !value.is_zero() {
                        gas::SSTORE_SET
                    } else {
                        gas::SSTORE_RESET
                    };
                    self.charge(cost)?;
                    self.host
                        .update(UpdateKey::Sstore, Value::Uint256(key), Value::Uint256(value));
                }
                0x56 => {
                    let dest = self.pop()?;
                    self.jump(dest)?;
                }
                0x57 => {
                    let dest = self.pop()?;
                    let cond = self.pop()?;
                    if !cond.is_zero() {
                        self.jump(dest)?;
                    }
                }
                0x58 => self.push(U256::from((self.pc - 1) as u64))?,
                0x59 => self.push(U256::from(self.memory.len() as u64))?,
                0x5a => self.push(U256::from(self.gas))?,
                0x5b => {}

                0x60..=0x7f => {
                    let width = push_width(op).unwrap_or(0);
                    let start = self.pc.min(code.len());
                    let end = (self.pc + width).min(code.len());
                    let mut word = [0u8; 32];
                    word[32 - width..32 - width + (end - start)].copy_from_slice(&code[start..end]);
                    self.pc += width;
                    self.push(U256::from_big_endian(&word))?;
                }
                0x80..=0x8f => {
                    let n = usize::from(op - 0x7f);
                    let v = *self
                        .stack
                        .len()
                        .checked_sub(n)
                        .and_then(|i| self.stack.get(i))
                        .ok_or(Fault::StackUnderflow)?;
                    self.push(v)?;
                }
                0x90..=0x9f => {
                    let n = usize::from(op - 0x8f);
                    let top = self.stack.len().checked_sub(1).ok_or(Fault::StackUnderflow)?;
                    let other = top.checked_sub(n).ok_or(Fault::StackUnderflow)?;
                    self.stack.swap(top, other);
                }

                0xa0..=0xa4 => {
                    let topics = usize::from(op - 0xa0);
                    let offset = self.pop()?;
                    let size = self.pop()?;
                    let mut topic_bytes = Vec::with_capacity(32 * topics);
                    for _ in 0..topics {
                        topic_bytes.extend_from_slice(&self.pop()?.to_big_endian());
                    }
                    let (off, len) = self.mem_range(offset, size)?;
                    self.charge(gas::LOG_DATA * len as u64)?;
                    self.host.update(
                        UpdateKey::Log,
                        Value::Bytes(self.memory.slice(off, len)),
                        Value::Bytes(&topic_bytes),
                    );
                }

                0xf0 => {
                    let value = self.pop()?;
                    let offset = self.pop()?;
                    let size = self.pop()?;
                    let (off, len) = self.mem_range(offset, size)?;
                    let v = self.create(value, off, len)?;
                    self.push(v)?;
                }
                0xf1 | 0xf2 | 0xf4 => {
                    let kind = match op {
                        0xf1 => CallKind::Call,
                        0xf2 => CallKind::CallCode,
                        _ => CallKind::DelegateCall,
                    };
                    let ok = self.call(kind)?;
                    self.push_bool(ok)?;
                }
                0xf3 => {
                    let offset = self.pop()?;
                    let size = self.pop()?;
                    let (off, len) = self.mem_range(offset, size)?;
                    let output = self.memory.slice(off, len).to_vec();
                    return Ok(self.halt(output));
                }
                0xff => {
                    let beneficiary = u256_to_h160(self.pop()?);
                    self.host
                        .update(UpdateKey::Selfdestruct, Value::Address(beneficiary), Value::Unused);
                    return Ok(self.halt(Vec::new()));
                }
                _ => return Err(Fault::InvalidOpcode(op)),
            }
        }
    }

    fn halt(&self, output: Vec<u8>) -> Halt {
        Halt {
            gas_left: self.gas,
            output,
        }
    }

    /// Only the 256 most recent complete blocks are visible.
    fn blockhash(&mut self, number: U256) -> U256 {
        let current = self.query_i64(QueryKey::Number);
        let Some(n) = to_usize(number).and_then(|n| i64::try_from(n).ok()) else {
            return U256::zero();
        };
        if n >= current || current - n > 256 {
            return U256::zero();
        }
        self.query_u256(QueryKey::Blockhash, Value::Int64(n))
    }

    fn create(&mut self, value: U256, off: usize, len: usize) -> Result<U256, Fault> {
        let init_code = self.memory.slice(off, len).to_vec();
        let given = self.gas;
        self.gas = 0;
        let msg = CallMessage {
            kind: CallKind::Create,
            gas: given as i64,
            address: H160::zero(),
            value,
            input: &init_code,
        };
        let mut out = [0u8; CREATE_OUTPUT_SIZE];
        let ret = self.host.call(&msg, &mut out);
        if ret < 0 {
            log::debug!(target: LOG_TARGET, "nested create failed ({ret})");
            return Ok(U256::zero());
        }
        self.gas = (ret as u64).min(given);
        Ok(h160_to_u256(H160::from(out)))
    }

    /// Returns whether the nested call succeeded. Only engine-side faults
    /// (gas, stack) propagate; a failing callee does not.
    fn call(&mut self, kind: CallKind) -> Result<bool, Fault> {
        let requested = self.pop()?;
        let address = u256_to_h160(self.pop()?);
        let value = if kind == CallKind::DelegateCall {
            self.frame.value
        } else {
            self.pop()?
        };
        let in_offset = self.pop()?;
        let in_size = self.pop()?;
        let out_offset = self.pop()?;
        let out_size = self.pop()?;

        let (in_off, in_len) = self.mem_range(in_offset, in_size)?;
        let (out_off, out_len) = self.mem_range(out_offset, out_size)?;

        let transfers = kind.transfers_value() && !value.is_zero();
        if transfers {
            self.charge(gas::CALL_VALUE)?;
        }
        if requested > U256::from(self.gas) {
            return Err(Fault::OutOfGas);
        }
        let requested = requested.low_u64();
        self.charge(requested)?;
        let given = if transfers {
            requested.saturating_add(gas::CALL_STIPEND)
        } else {
            requested
        }
        .min(i64::MAX as u64);

        let input = self.memory.slice(in_off, in_len).to_vec();
        let msg = CallMessage {
            kind,
            gas: given as i64,
            address,
            value,
            input: &input,
        };
        let ret = self
            .host
            .call(&msg, self.memory.slice_mut(out_off, out_len));
        if ret < 0 {
            log::debug!(target: LOG_TARGET, "nested {kind:?} to {address:?} failed ({ret})");
            return Ok(false);
        }
        self.gas += (ret as u64).min(given);
        Ok(true)
    }
}

fn bool_word(b: bool) -> U256 {
    if b {
        U256::one()
    } else {
        U256::zero()
    }
}

fn copy_padded_into(dst: &mut [u8], src: &[u8], offset: U256) {
    let Some(start) = to_usize(offset).filter(|&s| s < src.len()) else {
        return;
    };
    let n = dst.len().min(src.len() - start);
    dst[..n].copy_from_slice(&src[start..start + n]);
}
