//! Two's-complement and wide arithmetic on 256-bit words.

use evmjit_abi::U256;
use primitive_types::U512;

fn sign_bit() -> U256 {
    U256::one() << 255
}

pub(crate) fn is_negative(v: U256) -> bool {
    v.bit(255)
}

pub(crate) fn negate(v: U256) -> U256 {
    (!v).overflowing_add(U256::one()).0
}

fn abs(v: U256) -> U256 {
    if is_negative(v) {
        negate(v)
    } else {
        v
    }
}

pub(crate) fn sdiv(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let q = abs(a) / abs(b);
    if is_negative(a) != is_negative(b) {
        negate(q)
    } else {
        q
    }
}

/// Remainder takes the sign of the dividend.
pub(crate) fn smod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let r = abs(a) % abs(b);
    if is_negative(a) {
        negate(r)
    } else {
        r
    }
}

pub(crate) fn slt(a: U256, b: U256) -> bool {
    (a ^ sign_bit()) < (b ^ sign_bit())
}

fn widen(v: U256) -> U512 {
    let w = v.0;
    U512([w[0], w[1], w[2], w[3], 0, 0, 0, 0])
}

fn narrow(v: U512) -> U256 {
    let w = v.0;
    U256([w[0], w[1], w[2], w[3]])
}

pub(crate) fn addmod(a: U256, b: U256, n: U256) -> U256 {
    if n.is_zero() {
        return U256::zero();
    }
    narrow((widen(a) + widen(b)) % widen(n))
}

pub(crate) fn mulmod(a: U256, b: U256, n: U256) -> U256 {
    if n.is_zero() {
        return U256::zero();
    }
    narrow((widen(a) * widen(b)) % widen(n))
}

/// Extends the sign of byte `b` (counted from the least significant end).
pub(crate) fn signextend(b: U256, x: U256) -> U256 {
    if b >= U256::from(31u64) {
        return x;
    }
    let bit = b.low_u64() as usize * 8 + 7;
    let mask = (U256::one() << bit) - U256::one();
    if x.bit(bit) {
        x | !mask
    } else {
        x & mask
    }
}

/// Number of significant bytes in an exponent, for EXP pricing.
pub(crate) fn byte_len(v: U256) -> u64 {
    (v.bits() as u64).div_ceil(8)
}
