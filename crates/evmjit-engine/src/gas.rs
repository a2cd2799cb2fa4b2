//! Frontier/Homestead gas figures for the opcodes the interpreter knows.

use evmjit_abi::Mode;

pub const ZERO: u64 = 0;
pub const BASE: u64 = 2;
pub const VERY_LOW: u64 = 3;
pub const LOW: u64 = 5;
pub const MID: u64 = 8;
pub const HIGH: u64 = 10;
pub const EXT: u64 = 20;
pub const JUMPDEST: u64 = 1;

pub const EXP: u64 = 10;
pub const EXP_BYTE: u64 = 10;
pub const SHA3: u64 = 30;
pub const SHA3_WORD: u64 = 6;
pub const COPY_WORD: u64 = 3;
pub const SLOAD: u64 = 50;
pub const SSTORE_SET: u64 = 20_000;
pub const SSTORE_RESET: u64 = 5_000;
pub const LOG: u64 = 375;
pub const LOG_TOPIC: u64 = 375;
pub const LOG_DATA: u64 = 8;
pub const CREATE: u64 = 32_000;
pub const CALL: u64 = 40;
pub const CALL_VALUE: u64 = 9_000;
pub const CALL_STIPEND: u64 = 2_300;
pub const MEMORY_WORD: u64 = 3;
pub const QUAD_COEFF_DIV: u64 = 512;

/// Static part of an opcode's cost, or `None` when `op` is not a valid
/// instruction in `mode`. Dynamic parts (memory, copies, storage, calls) are
/// charged by the interpreter.
pub fn static_cost(op: u8, mode: Mode) -> Option<u64> {
    let cost = match op {
        0x00 => ZERO,
        0x01 | 0x03 => VERY_LOW,
        0x02 | 0x04 | 0x05 | 0x06 | 0x07 | 0x0b => LOW,
        0x08 | 0x09 => MID,
        0x0a => EXP,
        0x10..=0x1a => VERY_LOW,
        0x20 => SHA3,
        0x30 | 0x32 | 0x33 | 0x34 | 0x36 | 0x38 | 0x3a => BASE,
        0x31 | 0x3b | 0x3c => EXT,
        0x35 | 0x37 | 0x39 => VERY_LOW,
        0x40 => EXT,
        0x41..=0x45 => BASE,
        0x50 => BASE,
        0x51..=0x53 => VERY_LOW,
        0x54 => SLOAD,
        0x55 => ZERO,
        0x56 => MID,
        0x57 => HIGH,
        0x58 | 0x59 | 0x5a => BASE,
        0x5b => JUMPDEST,
        0x60..=0x7f => VERY_LOW,
        0x80..=0x8f => VERY_LOW,
        0x90..=0x9f => VERY_LOW,
        0xa0..=0xa4 => LOG + LOG_TOPIC * u64::from(op - 0xa0),
        0xf0 => CREATE,
        0xf1 | 0xf2 => CALL,
        0xf3 => ZERO,
        0xf4 if mode >= Mode::Homestead => CALL,
        0xff => ZERO,
        _ => return None,
    };
    Some(cost)
}

/// Total cost of `words` 32-byte words of memory.
pub fn memory_cost(words: u64) -> u64 {
    MEMORY_WORD * words + words * words / QUAD_COEFF_DIV
}

pub fn words_for(len: u64) -> u64 {
    len.div_ceil(32)
}
