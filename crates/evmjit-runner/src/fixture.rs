//! Ethereum VMTests fixture files.
//!
//! Numbers arrive as strings, either `0x`-prefixed hex or plain decimal.
//! The raw serde structs keep them as strings; `parse_*` turn them into
//! typed values when a test is set up.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use primitive_types::{H160, U256};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct VmTest {
    pub env: EnvJson,
    pub exec: ExecJson,
    #[serde(default)]
    pub pre: BTreeMap<String, AccountJson>,
    /// Absent when the execution is expected to end with an exception.
    #[serde(default)]
    pub gas: Option<String>,
    #[serde(default)]
    pub out: Option<String>,
    #[serde(default)]
    pub post: Option<BTreeMap<String, AccountJson>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvJson {
    pub current_coinbase: String,
    pub current_difficulty: String,
    pub current_gas_limit: String,
    pub current_number: String,
    pub current_timestamp: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecJson {
    pub address: String,
    pub caller: String,
    pub code: String,
    #[serde(default)]
    pub data: String,
    pub gas: String,
    pub gas_price: String,
    pub origin: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountJson {
    #[serde(default)]
    pub balance: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub storage: BTreeMap<String, String>,
}

pub fn load_fixture(path: &Path) -> Result<BTreeMap<String, VmTest>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read fixture: {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse fixture: {}", path.display()))
}

fn decode_hex(digits: &str) -> Result<Vec<u8>> {
    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    hex::decode(&padded).with_context(|| format!("invalid hex {digits:?}"))
}

pub fn parse_bytes(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    let digits = s.strip_prefix("0x").unwrap_or(s);
    decode_hex(digits)
}

pub fn parse_u256(s: &str) -> Result<U256> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(U256::zero());
    }
    match s.strip_prefix("0x") {
        Some(digits) => {
            let bytes = decode_hex(digits)?;
            let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
            let significant = &bytes[first..];
            if significant.len() > 32 {
                bail!("value {s} does not fit in 256 bits");
            }
            Ok(U256::from_big_endian(significant))
        }
        None => U256::from_dec_str(s).map_err(|e| anyhow::anyhow!("invalid number {s:?}: {e:?}")),
    }
}

pub fn parse_i64(s: &str) -> Result<i64> {
    let v = parse_u256(s)?;
    if v > U256::from(i64::MAX as u64) {
        bail!("value {s} does not fit in a signed 64-bit integer");
    }
    Ok(v.low_u64() as i64)
}

pub fn parse_address(s: &str) -> Result<H160> {
    let bytes = parse_bytes(s)?;
    if bytes.len() != 20 {
        bail!("address {s:?} is {} bytes, expected 20", bytes.len());
    }
    Ok(H160::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_accept_hex_and_decimal() {
        assert_eq!(parse_u256("0x0100").unwrap(), U256::from(256u64));
        assert_eq!(parse_u256("0x100").unwrap(), U256::from(256u64));
        assert_eq!(parse_u256("100000").unwrap(), U256::from(100_000u64));
        assert_eq!(parse_u256("").unwrap(), U256::zero());
        assert!(parse_u256("0xzz").is_err());
    }

    #[test]
    fn leading_zero_bytes_do_not_count_against_width() {
        let s = format!("0x{}{}", "00".repeat(8), "ff".repeat(32));
        assert_eq!(parse_u256(&s).unwrap(), U256::MAX);
        let too_wide = format!("0x01{}", "00".repeat(32));
        assert!(parse_u256(&too_wide).is_err());
    }

    #[test]
    fn gas_must_fit_i64() {
        assert_eq!(parse_i64("0x0186a0").unwrap(), 100_000);
        assert!(parse_i64("0x8000000000000000").is_err());
    }

    #[test]
    fn addresses_are_twenty_bytes() {
        let a = parse_address("0x0f572e5295c57f15886f9b263e2f6d2d6c7b5ec6").unwrap();
        assert_eq!(a.as_bytes()[0], 0x0f);
        assert!(parse_address("0x1234").is_err());
    }

    #[test]
    fn minimal_test_deserializes() {
        let json = r#"{
            "t": {
                "env": {
                    "currentCoinbase": "0x2adc25665018aa1fe0e6bc666dac8fc2697ff9ba",
                    "currentDifficulty": "0x0100",
                    "currentGasLimit": "0x0f4240",
                    "currentNumber": "0x00",
                    "currentTimestamp": "0x01"
                },
                "exec": {
                    "address": "0x0f572e5295c57f15886f9b263e2f6d2d6c7b5ec6",
                    "caller": "0xcd1722f3947def4cf144679da39c4c32bdc35681",
                    "code": "0x00",
                    "gas": "0x0186a0",
                    "gasPrice": "0x5af3107a4000",
                    "origin": "0xcd1722f3947def4cf144679da39c4c32bdc35681",
                    "value": "0x0de0b6b3a7640000"
                }
            }
        }"#;
        let tests: BTreeMap<String, VmTest> = serde_json::from_str(json).unwrap();
        let t = &tests["t"];
        assert!(t.gas.is_none());
        assert!(t.pre.is_empty());
        assert_eq!(t.exec.data, "");
    }
}
