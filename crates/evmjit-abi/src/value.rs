//! Tagged values used once past the boundary, and the conversions to and from
//! the untagged [`evm_variant`].

use primitive_types::{H160, H256, U256};

use crate::keys::VariantShape;
use crate::raw::{evm_data_ref, evm_hash160, evm_hash256, evm_padded_address, evm_uint256, evm_variant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Value<'a> {
    Unused,
    Int64(i64),
    Uint256(U256),
    Hash256(H256),
    Address(H160),
    Bytes(&'a [u8]),
}

impl<'a> Value<'a> {
    pub fn shape(&self) -> VariantShape {
        match self {
            Value::Unused => VariantShape::Unused,
            Value::Int64(_) => VariantShape::Int64,
            Value::Uint256(_) => VariantShape::Uint256,
            Value::Hash256(_) => VariantShape::Hash256,
            Value::Address(_) => VariantShape::Address,
            Value::Bytes(_) => VariantShape::Bytes,
        }
    }

    /// The documented default answer for `shape`: zero, the zero address, or
    /// an empty slice.
    pub fn default_for(shape: VariantShape) -> Value<'static> {
        match shape {
            VariantShape::Unused => Value::Unused,
            VariantShape::Int64 => Value::Int64(0),
            VariantShape::Uint256 => Value::Uint256(U256::zero()),
            VariantShape::Hash256 => Value::Hash256(H256::zero()),
            VariantShape::Address => Value::Address(H160::zero()),
            VariantShape::Bytes => Value::Bytes(&[]),
        }
    }

    /// Writes the single member matching this value. Bytes not covered by
    /// that member stay zero.
    pub fn encode(&self) -> evm_variant {
        let mut out = evm_variant::zeroed();
        match *self {
            Value::Unused => {}
            Value::Int64(v) => out.int64 = v,
            Value::Uint256(v) => out.uint256 = uint256_from_u256(v),
            Value::Hash256(v) => out.hash256 = hash256_from_h256(v),
            Value::Address(v) => {
                out.address = evm_padded_address {
                    address_padding: [0; 12],
                    address: hash160_from_h160(v),
                }
            }
            Value::Bytes(b) => {
                out.data = evm_data_ref {
                    data: if b.is_empty() { std::ptr::null() } else { b.as_ptr() },
                    data_size: b.len(),
                }
            }
        }
        out
    }

    /// Reads the member `shape` names.
    ///
    /// # Safety
    /// For [`VariantShape::Bytes`] the referenced memory must stay valid and
    /// unmodified for `'a`. Every other shape is plain data.
    pub unsafe fn decode(raw: &evm_variant, shape: VariantShape) -> Value<'a> {
        match shape {
            VariantShape::Unused => Value::Unused,
            VariantShape::Int64 => Value::Int64(raw.int64),
            VariantShape::Uint256 => Value::Uint256(u256_from_uint256(raw.uint256)),
            VariantShape::Hash256 => Value::Hash256(h256_from_hash256(raw.hash256)),
            VariantShape::Address => Value::Address(h160_from_hash160(raw.address.address)),
            VariantShape::Bytes => {
                let r = raw.data;
                if r.data.is_null() || r.data_size == 0 {
                    Value::Bytes(&[])
                } else {
                    Value::Bytes(std::slice::from_raw_parts(r.data, r.data_size))
                }
            }
        }
    }

    pub fn as_u256(&self) -> Option<U256> {
        match *self {
            Value::Uint256(v) => Some(v),
            Value::Hash256(h) => Some(U256::from_big_endian(h.as_bytes())),
            Value::Int64(v) if v >= 0 => Some(U256::from(v as u64)),
            _ => None,
        }
    }

    pub fn as_h160(&self) -> Option<H160> {
        match *self {
            Value::Address(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

pub fn uint256_from_u256(v: U256) -> evm_uint256 {
    evm_uint256 { words: v.0 }
}

pub fn u256_from_uint256(v: evm_uint256) -> U256 {
    U256(v.words)
}

pub fn hash256_from_h256(v: H256) -> evm_hash256 {
    evm_hash256::from_bytes(v.0)
}

pub fn h256_from_hash256(v: evm_hash256) -> H256 {
    H256(v.bytes())
}

pub fn hash160_from_h160(v: H160) -> evm_hash160 {
    evm_hash160 { bytes: v.0 }
}

pub fn h160_from_hash160(v: evm_hash160) -> H160 {
    H160(v.bytes)
}

/// Low 20 bytes of a stack word, the way address operands are read.
pub fn u256_to_h160(v: U256) -> H160 {
    H160::from_slice(&v.to_big_endian()[12..])
}

pub fn h160_to_u256(a: H160) -> U256 {
    U256::from_big_endian(a.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint256_uses_host_order_words() {
        let v = U256::from(0x0102_0304_0506_0708u64) + (U256::one() << 192);
        let raw = Value::Uint256(v).encode();
        let words = unsafe { raw.uint256.words };
        assert_eq!(words, [0x0102_0304_0506_0708, 0, 0, 1]);
    }

    #[test]
    fn hash256_is_big_endian_bytes() {
        let v = U256::from(0xabcdu64);
        let raw = Value::Hash256(H256(v.to_big_endian())).encode();
        let bytes = unsafe { raw.hash256.bytes() };
        assert_eq!(bytes[30], 0xab);
        assert_eq!(bytes[31], 0xcd);
        assert_eq!(bytes[..30], [0u8; 30]);
    }

    #[test]
    fn address_is_padded_with_twelve_zero_bytes() {
        let a = H160::repeat_byte(0x5a);
        let raw = Value::Address(a).encode();
        let bytes = unsafe { raw.hash256.bytes() };
        assert_eq!(bytes[..12], [0u8; 12]);
        assert_eq!(&bytes[12..], a.as_bytes());
        assert_eq!(u256_to_h160(U256::from_big_endian(&bytes)), a);
    }

    #[test]
    fn each_shape_round_trips_bit_exactly() {
        let code = [0x60u8, 0x01, 0x00];
        let values = [
            Value::Int64(-42),
            Value::Int64(i64::MAX),
            Value::Uint256(U256::MAX),
            Value::Uint256(U256::from(7u64) << 130),
            Value::Hash256(H256::repeat_byte(0xee)),
            Value::Address(H160::from_low_u64_be(0xdead_beef)),
            Value::Bytes(&code),
        ];
        for v in values {
            let raw = v.encode();
            let back = unsafe { Value::decode(&raw, v.shape()) };
            assert_eq!(back, v);
            let again = back.encode();
            assert_eq!(unsafe { raw.hash256.bytes() }, unsafe { again.hash256.bytes() });
        }
    }

    #[test]
    fn empty_bytes_decode_without_touching_memory() {
        let raw = Value::Bytes(&[]).encode();
        assert!(unsafe { raw.data.data.is_null() });
        let back = unsafe { Value::decode(&raw, VariantShape::Bytes) };
        assert_eq!(back, Value::Bytes(&[]));
    }

    #[test]
    fn stack_words_convert_to_addresses() {
        let v = (U256::one() << 200) + U256::from(0x1122_3344u64);
        assert_eq!(u256_to_h160(v), H160::from_low_u64_be(0x1122_3344));
        assert_eq!(h160_to_u256(u256_to_h160(U256::from(99u64))), U256::from(99u64));
    }
}
