use std::collections::BTreeMap;

use anyhow::{Context, Result};
use primitive_types::{H160, H256, U256};
use serde::Serialize;
use sha3::{Digest, Keccak256};

use evmjit_abi::CallKind;

use crate::fixture::{parse_address, parse_bytes, parse_i64, parse_u256, AccountJson, EnvJson};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: U256,
    pub nonce: u64,
    pub code: Vec<u8>,
    pub storage: BTreeMap<U256, U256>,
}

impl Account {
    pub fn from_json(json: &AccountJson) -> Result<Self> {
        let mut storage = BTreeMap::new();
        for (k, v) in &json.storage {
            let v = parse_u256(v).with_context(|| format!("storage value at {k}"))?;
            if !v.is_zero() {
                storage.insert(parse_u256(k).context("storage key")?, v);
            }
        }
        Ok(Account {
            balance: parse_u256(&json.balance).context("balance")?,
            nonce: parse_u256(&json.nonce).context("nonce")?.low_u64(),
            code: parse_bytes(&json.code).context("code")?,
            storage,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockEnv {
    pub coinbase: H160,
    pub difficulty: U256,
    pub gas_limit: i64,
    pub number: i64,
    pub timestamp: i64,
}

impl BlockEnv {
    pub fn from_json(env: &EnvJson) -> Result<Self> {
        Ok(BlockEnv {
            coinbase: parse_address(&env.current_coinbase).context("currentCoinbase")?,
            difficulty: parse_u256(&env.current_difficulty).context("currentDifficulty")?,
            gas_limit: parse_i64(&env.current_gas_limit).context("currentGasLimit")?,
            number: parse_i64(&env.current_number).context("currentNumber")?,
            timestamp: parse_i64(&env.current_timestamp).context("currentTimestamp")?,
        })
    }

    /// Hash of an ancestor block. Test chains have no real history, so the
    /// hash is derived from the decimal block number.
    pub fn block_hash(&self, number: i64) -> H256 {
        if number < 0 || number >= self.number {
            return H256::zero();
        }
        H256::from_slice(&Keccak256::digest(number.to_string().as_bytes()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    pub kind: &'static str,
    pub depth: usize,
    pub from: String,
    pub to: String,
    pub gas: i64,
    pub value: String,
    pub input: String,
    pub gas_left: i64,
}

pub fn call_kind_name(kind: CallKind) -> &'static str {
    match kind {
        CallKind::Call => "call",
        CallKind::DelegateCall => "delegatecall",
        CallKind::CallCode => "callcode",
        CallKind::Create => "create",
    }
}

pub fn hex_address(a: &H160) -> String {
    format!("0x{}", hex::encode(a.as_bytes()))
}

pub fn hex_bytes(b: &[u8]) -> String {
    format!("0x{}", hex::encode(b))
}

/// Account state mutated by the running tests. Logs and self-destructs are
/// journaled with it so a failed nested frame can be rolled back; the call
/// trace is not.
#[derive(Debug, Clone, Default)]
pub struct World {
    pub accounts: BTreeMap<H160, Account>,
    pub block: BlockEnv,
    pub logs: Vec<LogEntry>,
    pub selfdestructs: Vec<H160>,
    pub calls: Vec<CallRecord>,
}

/// Opaque checkpoint taken before a nested frame.
pub struct Snapshot {
    accounts: BTreeMap<H160, Account>,
    logs: usize,
    selfdestructs: usize,
}

impl World {
    pub fn from_pre(block: BlockEnv, pre: &BTreeMap<String, AccountJson>) -> Result<Self> {
        let mut accounts = BTreeMap::new();
        for (addr, json) in pre {
            let address = parse_address(addr)?;
            let account =
                Account::from_json(json).with_context(|| format!("pre-state account {addr}"))?;
            accounts.insert(address, account);
        }
        Ok(World {
            accounts,
            block,
            ..World::default()
        })
    }

    pub fn exists(&self, address: &H160) -> bool {
        self.accounts.contains_key(address)
    }

    pub fn storage(&self, address: &H160, key: &U256) -> U256 {
        self.accounts
            .get(address)
            .and_then(|a| a.storage.get(key).copied())
            .unwrap_or_default()
    }

    pub fn set_storage(&mut self, address: H160, key: U256, value: U256) {
        let account = self.accounts.entry(address).or_default();
        if value.is_zero() {
            account.storage.remove(&key);
        } else {
            account.storage.insert(key, value);
        }
    }

    pub fn balance(&self, address: &H160) -> U256 {
        self.accounts
            .get(address)
            .map(|a| a.balance)
            .unwrap_or_default()
    }

    pub fn code(&self, address: &H160) -> &[u8] {
        self.accounts
            .get(address)
            .map_or(&[][..], |a| a.code.as_slice())
    }

    /// Moves `value` from `from` to `to`. Returns false, changing nothing,
    /// when `from` cannot cover it.
    pub fn transfer(&mut self, from: H160, to: H160, value: U256) -> bool {
        if value.is_zero() {
            return true;
        }
        if self.balance(&from) < value {
            return false;
        }
        self.accounts.entry(from).or_default().balance -= value;
        let dest = self.accounts.entry(to).or_default();
        dest.balance = dest.balance.saturating_add(value);
        true
    }

    /// Address of the next contract created by `sender`; bumps its nonce.
    pub fn next_create_address(&mut self, sender: H160) -> H160 {
        let account = self.accounts.entry(sender).or_default();
        let nonce = account.nonce;
        account.nonce += 1;
        let mut hasher = Keccak256::new();
        hasher.update(sender.as_bytes());
        hasher.update(nonce.to_be_bytes());
        H160::from_slice(&hasher.finalize()[12..])
    }

    pub fn selfdestruct(&mut self, address: H160, beneficiary: H160) {
        let balance = self.balance(&address);
        if address != beneficiary {
            self.transfer(address, beneficiary, balance);
        }
        if !self.selfdestructs.contains(&address) {
            self.selfdestructs.push(address);
        }
    }

    /// Removes accounts that self-destructed during the finished
    /// transaction.
    pub fn finalize(&mut self) {
        for address in std::mem::take(&mut self.selfdestructs) {
            self.accounts.remove(&address);
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            accounts: self.accounts.clone(),
            logs: self.logs.len(),
            selfdestructs: self.selfdestructs.len(),
        }
    }

    pub fn revert(&mut self, snapshot: Snapshot) {
        self.accounts = snapshot.accounts;
        self.logs.truncate(snapshot.logs);
        self.selfdestructs.truncate(snapshot.selfdestructs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> H160 {
        H160::from_low_u64_be(n)
    }

    #[test]
    fn zero_storage_values_are_not_kept() {
        let mut w = World::default();
        w.set_storage(addr(1), U256::one(), U256::from(5u64));
        assert_eq!(w.storage(&addr(1), &U256::one()), U256::from(5u64));
        w.set_storage(addr(1), U256::one(), U256::zero());
        assert!(w.accounts[&addr(1)].storage.is_empty());
    }

    #[test]
    fn transfer_requires_funds() {
        let mut w = World::default();
        w.accounts.entry(addr(1)).or_default().balance = U256::from(10u64);
        assert!(!w.transfer(addr(1), addr(2), U256::from(11u64)));
        assert!(!w.exists(&addr(2)));
        assert!(w.transfer(addr(1), addr(2), U256::from(4u64)));
        assert_eq!(w.balance(&addr(1)), U256::from(6u64));
        assert_eq!(w.balance(&addr(2)), U256::from(4u64));
    }

    #[test]
    fn create_addresses_depend_on_nonce() {
        let mut w = World::default();
        let a = w.next_create_address(addr(7));
        let b = w.next_create_address(addr(7));
        assert_ne!(a, b);
        assert_eq!(w.accounts[&addr(7)].nonce, 2);
    }

    #[test]
    fn revert_restores_accounts_and_logs() {
        let mut w = World::default();
        w.set_storage(addr(1), U256::zero(), U256::one());
        let snap = w.snapshot();
        w.set_storage(addr(1), U256::zero(), U256::from(9u64));
        w.logs.push(LogEntry {
            address: hex_address(&addr(1)),
            topics: Vec::new(),
            data: "0x".to_string(),
        });
        w.selfdestruct(addr(1), addr(2));
        w.revert(snap);
        assert_eq!(w.storage(&addr(1), &U256::zero()), U256::one());
        assert!(w.logs.is_empty());
        assert!(w.selfdestructs.is_empty());
    }

    #[test]
    fn block_hash_only_covers_past_blocks() {
        let block = BlockEnv {
            number: 10,
            ..BlockEnv::default()
        };
        assert_eq!(block.block_hash(10), H256::zero());
        assert_eq!(block.block_hash(-1), H256::zero());
        assert_ne!(block.block_hash(9), H256::zero());
        assert_ne!(block.block_hash(9), block.block_hash(8));
    }
}
