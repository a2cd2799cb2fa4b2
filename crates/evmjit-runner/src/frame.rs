//! The runner's host: one [`FrameHost`] per executing frame, all sharing a
//! [`Session`] that owns the world state.
//!
//! Nested calls and creations re-enter the engine through `evm_execute` on
//! the same instance, with a fresh frame as the environment handle.

use std::cell::RefCell;
use std::rc::Rc;

use evmjit::exports::{evm_destroy_result, evm_execute};
use evmjit::result_output;
use evmjit_abi::adapter::env_handle;
use evmjit_abi::raw::evm_instance;
use evmjit_abi::value::{hash256_from_h256, uint256_from_u256};
use evmjit_abi::{CallKind, CallMessage, Host, Mode, QueryKey, UpdateKey, Value};
use primitive_types::{H160, H256, U256};
use sha3::{Digest, Keccak256};

use crate::world::{call_kind_name, hex_address, hex_bytes, CallRecord, LogEntry, World};
use crate::LOG_TARGET;

/// Gas charged per byte of code stored by a successful CREATE.
const CODE_DEPOSIT_PER_BYTE: i64 = 200;

/// Frames the runner stacks up, the top-level one included. Calls and
/// creations that would go deeper fail without entering the engine.
pub const MAX_FRAME_DEPTH: usize = 1024;

pub struct Session {
    pub instance: *mut evm_instance,
    pub mode: Mode,
    pub world: RefCell<World>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub gas_left: i64,
    pub output: Vec<u8>,
}

impl Execution {
    pub fn succeeded(&self) -> bool {
        self.gas_left >= 0
    }
}

pub struct FrameHost {
    session: Rc<Session>,
    depth: usize,
    address: H160,
    caller: H160,
    origin: H160,
    gas_price: U256,
    // Backs byte answers to CODE_BY_ADDRESS until the next query.
    code_buf: Vec<u8>,
}

impl FrameHost {
    pub fn top_level(
        session: Rc<Session>,
        address: H160,
        caller: H160,
        origin: H160,
        gas_price: U256,
    ) -> Self {
        FrameHost {
            session,
            depth: 0,
            address,
            caller,
            origin,
            gas_price,
            code_buf: Vec::new(),
        }
    }

    fn child(&self, address: H160, caller: H160) -> FrameHost {
        FrameHost {
            session: Rc::clone(&self.session),
            depth: self.depth + 1,
            address,
            caller,
            origin: self.origin,
            gas_price: self.gas_price,
            code_buf: Vec::new(),
        }
    }

    fn world(&self) -> std::cell::RefMut<'_, World> {
        self.session.world.borrow_mut()
    }

    fn message_call(&mut self, msg: &CallMessage<'_>, output: &mut [u8]) -> i64 {
        let (frame_address, caller) = match msg.kind {
            CallKind::Call => (msg.address, self.address),
            CallKind::CallCode => (self.address, self.address),
            _ => (self.address, self.caller),
        };
        let (code, snapshot) = {
            let mut world = self.world();
            let snapshot = world.snapshot();
            if msg.kind.transfers_value() && !world.transfer(self.address, frame_address, msg.value)
            {
                log::debug!(target: LOG_TARGET, "insufficient balance for {:?}", msg.kind);
                return -1;
            }
            (world.code(&msg.address).to_vec(), snapshot)
        };
        if code.is_empty() {
            return msg.gas;
        }

        let mut child = self.child(frame_address, caller);
        let exec = execute(&mut child, &code, msg.gas, msg.input, msg.value);
        if !exec.succeeded() {
            self.world().revert(snapshot);
            return -1;
        }
        let n = exec.output.len().min(output.len());
        output[..n].copy_from_slice(&exec.output[..n]);
        exec.gas_left
    }

    fn create(&mut self, msg: &CallMessage<'_>, output: &mut [u8]) -> i64 {
        let sender = self.address;
        let (address, snapshot) = {
            let mut world = self.world();
            let snapshot = world.snapshot();
            let address = world.next_create_address(sender);
            if !world.transfer(sender, address, msg.value) {
                world.revert(snapshot);
                return -1;
            }
            world.accounts.entry(address).or_default();
            (address, snapshot)
        };

        let mut gas_left = msg.gas;
        if !msg.input.is_empty() {
            let mut child = self.child(address, sender);
            let exec = execute(&mut child, msg.input, msg.gas, &[], msg.value);
            if !exec.succeeded() {
                self.world().revert(snapshot);
                return -1;
            }
            gas_left = exec.gas_left;
            let deposit = CODE_DEPOSIT_PER_BYTE.saturating_mul(exec.output.len() as i64);
            if deposit <= gas_left {
                gas_left -= deposit;
                self.world().accounts.entry(address).or_default().code = exec.output;
            } else if self.session.mode == Mode::Homestead {
                self.world().revert(snapshot);
                return -1;
            }
        }
        let n = output.len().min(20);
        output[..n].copy_from_slice(&address.as_bytes()[..n]);
        gas_left
    }
}

impl Host for FrameHost {
    fn query(&mut self, key: QueryKey, arg: Value<'_>) -> Value<'_> {
        log::trace!(target: LOG_TARGET, "query {} at depth {}", key.as_str(), self.depth);
        match key {
            QueryKey::Sload => {
                let slot = arg.as_u256().unwrap_or_default();
                Value::Uint256(self.world().storage(&self.address, &slot))
            }
            QueryKey::Address => Value::Address(self.address),
            QueryKey::Caller => Value::Address(self.caller),
            QueryKey::Origin => Value::Address(self.origin),
            QueryKey::GasPrice => Value::Uint256(self.gas_price),
            QueryKey::Coinbase => Value::Address(self.world().block.coinbase),
            QueryKey::Difficulty => Value::Uint256(self.world().block.difficulty),
            QueryKey::GasLimit => Value::Int64(self.world().block.gas_limit),
            QueryKey::Number => Value::Int64(self.world().block.number),
            QueryKey::Timestamp => Value::Int64(self.world().block.timestamp),
            QueryKey::CodeByAddress => {
                let address = arg.as_h160().unwrap_or_default();
                let code = self.world().code(&address).to_vec();
                self.code_buf = code;
                Value::Bytes(&self.code_buf)
            }
            QueryKey::Balance => {
                let address = arg.as_h160().unwrap_or_default();
                Value::Uint256(self.world().balance(&address))
            }
            QueryKey::Blockhash => {
                let number = arg.as_i64().unwrap_or(-1);
                Value::Hash256(self.world().block.block_hash(number))
            }
        }
    }

    fn update(&mut self, key: UpdateKey, arg1: Value<'_>, arg2: Value<'_>) {
        let address = self.address;
        match key {
            UpdateKey::Sstore => {
                let slot = arg1.as_u256().unwrap_or_default();
                let value = arg2.as_u256().unwrap_or_default();
                self.world().set_storage(address, slot, value);
            }
            UpdateKey::Log => {
                let data = arg1.as_bytes().unwrap_or_default();
                let topics = arg2.as_bytes().unwrap_or_default();
                let entry = LogEntry {
                    address: hex_address(&address),
                    topics: topics.chunks(32).map(hex_bytes).collect(),
                    data: hex_bytes(data),
                };
                self.world().logs.push(entry);
            }
            UpdateKey::Selfdestruct => {
                let beneficiary = arg1.as_h160().unwrap_or_default();
                self.world().selfdestruct(address, beneficiary);
            }
        }
    }

    fn call(&mut self, msg: &CallMessage<'_>, output: &mut [u8]) -> i64 {
        let gas_left = if self.depth + 1 >= MAX_FRAME_DEPTH {
            log::debug!(target: LOG_TARGET, "frame depth limit {MAX_FRAME_DEPTH} reached");
            -1
        } else if msg.kind == CallKind::Create {
            self.create(msg, output)
        } else {
            self.message_call(msg, output)
        };
        let record = CallRecord {
            kind: call_kind_name(msg.kind),
            depth: self.depth,
            from: hex_address(&self.address),
            to: if msg.kind.has_target() {
                hex_address(&msg.address)
            } else {
                String::new()
            },
            gas: msg.gas,
            value: format!("{:#x}", msg.value),
            input: hex_bytes(msg.input),
            gas_left,
        };
        self.world().calls.push(record);
        gas_left
    }
}

pub fn code_hash(code: &[u8]) -> H256 {
    H256::from_slice(&Keccak256::digest(code))
}

/// Runs `code` in `host`'s frame through `evm_execute` and copies the
/// output out of the engine-owned result.
pub fn execute(host: &mut FrameHost, code: &[u8], gas: i64, input: &[u8], value: U256) -> Execution {
    let instance = host.session.instance;
    let mode = host.session.mode;
    let res = unsafe {
        evm_execute(
            instance,
            env_handle(host),
            mode.to_raw(),
            hash256_from_h256(code_hash(code)),
            code.as_ptr(),
            code.len(),
            gas,
            input.as_ptr(),
            input.len(),
            uint256_from_u256(value),
        )
    };
    let output = result_output(&res).map(<[u8]>::to_vec).unwrap_or_default();
    let gas_left = res.gas_left;
    unsafe { evm_destroy_result(res) };
    Execution { gas_left, output }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::EngineHandle;
    use crate::world::Account;

    fn addr(n: u64) -> H160 {
        H160::from_low_u64_be(n)
    }

    fn session(handle: &EngineHandle, world: World) -> Rc<Session> {
        Rc::new(Session {
            instance: handle.raw(),
            mode: Mode::Homestead,
            world: RefCell::new(world),
        })
    }

    fn with_code(code: &[u8]) -> Account {
        Account {
            code: code.to_vec(),
            ..Account::default()
        }
    }

    #[test]
    fn sstore_lands_in_the_frame_account() {
        let handle = EngineHandle::new(false).expect("create");
        let s = session(&handle, World::default());
        let mut host = FrameHost::top_level(Rc::clone(&s), addr(1), addr(2), addr(2), U256::one());
        // PUSH1 7 PUSH1 3 SSTORE
        let exec = execute(&mut host, &[0x60, 0x07, 0x60, 0x03, 0x55], 30_000, &[], U256::zero());
        assert_eq!(exec.gas_left, 30_000 - 6 - 20_000);
        assert_eq!(
            s.world.borrow().storage(&addr(1), &U256::from(3u64)),
            U256::from(7u64)
        );
    }

    #[test]
    fn failed_nested_call_rolls_back_its_writes() {
        let handle = EngineHandle::new(false).expect("create");
        let mut world = World::default();
        // Callee: PUSH1 1 PUSH1 0 SSTORE INVALID
        world
            .accounts
            .insert(addr(0xbeef), with_code(&[0x60, 0x01, 0x60, 0x00, 0x55, 0xfe]));
        let s = session(&handle, world);
        let mut host = FrameHost::top_level(Rc::clone(&s), addr(1), addr(2), addr(2), U256::one());
        let msg = CallMessage {
            kind: CallKind::Call,
            gas: 50_000,
            address: addr(0xbeef),
            value: U256::zero(),
            input: &[],
        };
        assert!(host.call(&msg, &mut []) < 0);
        let world = s.world.borrow();
        assert_eq!(world.storage(&addr(0xbeef), &U256::zero()), U256::zero());
        assert_eq!(world.calls.len(), 1);
        assert!(world.calls[0].gas_left < 0);
    }

    #[test]
    fn call_without_funds_fails_and_call_to_empty_code_keeps_gas() {
        let handle = EngineHandle::new(false).expect("create");
        let s = session(&handle, World::default());
        let mut host = FrameHost::top_level(Rc::clone(&s), addr(1), addr(2), addr(2), U256::one());
        let mut msg = CallMessage {
            kind: CallKind::Call,
            gas: 2_300,
            address: addr(9),
            value: U256::one(),
            input: &[],
        };
        assert_eq!(host.call(&msg, &mut []), -1);
        msg.value = U256::zero();
        assert_eq!(host.call(&msg, &mut []), 2_300);
    }

    #[test]
    fn create_stores_returned_code_at_a_fresh_address() {
        let handle = EngineHandle::new(false).expect("create");
        let s = session(&handle, World::default());
        let mut host = FrameHost::top_level(Rc::clone(&s), addr(1), addr(2), addr(2), U256::one());
        // Init code: PUSH1 0xff PUSH1 0 MSTORE8 PUSH1 1 PUSH1 0 RETURN
        let init = [0x60, 0xff, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xf3];
        let msg = CallMessage {
            kind: CallKind::Create,
            gas: 10_000,
            address: H160::zero(),
            value: U256::zero(),
            input: &init,
        };
        let mut out = [0u8; 20];
        let gas_left = host.call(&msg, &mut out);
        // 4 pushes, MSTORE8, one memory word, then the deposit for one byte.
        assert_eq!(gas_left, 10_000 - 4 * 3 - 3 - 3 - 200);
        let created = H160::from(out);
        assert_eq!(s.world.borrow().code(&created), &[0xff]);
        assert_eq!(s.world.borrow().accounts[&addr(1)].nonce, 1);
    }

    #[test]
    fn calls_past_the_frame_limit_fail_without_running() {
        let handle = EngineHandle::new(false).expect("create");
        let mut world = World::default();
        // PUSH1 1 PUSH1 0 SSTORE
        world
            .accounts
            .insert(addr(0xbeef), with_code(&[0x60, 0x01, 0x60, 0x00, 0x55]));
        let s = session(&handle, world);
        let mut host = FrameHost::top_level(Rc::clone(&s), addr(1), addr(2), addr(2), U256::one());
        host.depth = MAX_FRAME_DEPTH - 1;
        let msg = CallMessage {
            kind: CallKind::Call,
            gas: 50_000,
            address: addr(0xbeef),
            value: U256::zero(),
            input: &[],
        };
        assert_eq!(host.call(&msg, &mut []), -1);
        let create = CallMessage {
            kind: CallKind::Create,
            input: &[0x00],
            ..msg
        };
        assert_eq!(host.call(&create, &mut [0u8; 20]), -1);

        host.depth = MAX_FRAME_DEPTH - 2;
        assert_eq!(host.call(&msg, &mut []), 50_000 - 6 - 20_000);
        let world = s.world.borrow();
        assert_eq!(world.calls.len(), 3);
        assert_eq!(world.calls[0].depth, MAX_FRAME_DEPTH - 1);
        assert!(!world.exists(&addr(1)));
    }

    #[test]
    fn logs_split_topics_into_words() {
        let handle = EngineHandle::new(false).expect("create");
        let s = session(&handle, World::default());
        let mut host = FrameHost::top_level(Rc::clone(&s), addr(1), addr(2), addr(2), U256::one());
        let topics = [[0x11u8; 32], [0x22u8; 32]].concat();
        host.update(UpdateKey::Log, Value::Bytes(&[1, 2]), Value::Bytes(&topics));
        let world = s.world.borrow();
        assert_eq!(world.logs[0].topics.len(), 2);
        assert_eq!(world.logs[0].data, "0x0102");
    }
}
