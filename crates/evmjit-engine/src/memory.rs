use evmjit_abi::U256;

use crate::gas;

/// Largest byte offset the interpreter will ever address. Anything beyond is
/// unpayable with a 63-bit gas budget anyway.
const MAX_MEMORY_END: u64 = u32::MAX as u64;

/// Byte-addressed, word-granular execution memory.
#[derive(Debug, Default)]
pub(crate) struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    fn words(&self) -> u64 {
        (self.bytes.len() / 32) as u64
    }

    /// Gas needed to make `[offset, offset + size)` addressable, or `None`
    /// when the range cannot be paid for at all. Zero-sized ranges are free
    /// regardless of offset.
    pub(crate) fn expansion_cost(&self, offset: U256, size: U256) -> Option<u64> {
        if size.is_zero() {
            return Some(0);
        }
        let end = offset.checked_add(size)?;
        if end > U256::from(MAX_MEMORY_END) {
            return None;
        }
        let new_words = gas::words_for(end.low_u64());
        let cur_words = self.words();
        if new_words <= cur_words {
            return Some(0);
        }
        Some(gas::memory_cost(new_words) - gas::memory_cost(cur_words))
    }

    /// Grows to cover `[offset, offset + size)`. Callers charge
    /// `expansion_cost` first, which also bounds the range.
    pub(crate) fn grow(&mut self, offset: usize, size: usize) {
        if size == 0 {
            return;
        }
        let end = offset + size;
        let new_len = end.div_ceil(32) * 32;
        if new_len > self.bytes.len() {
            self.bytes.resize(new_len, 0);
        }
    }

    pub(crate) fn slice(&self, offset: usize, size: usize) -> &[u8] {
        if size == 0 {
            return &[];
        }
        &self.bytes[offset..offset + size]
    }

    pub(crate) fn slice_mut(&mut self, offset: usize, size: usize) -> &mut [u8] {
        if size == 0 {
            return &mut [];
        }
        &mut self.bytes[offset..offset + size]
    }

    pub(crate) fn load_word(&self, offset: usize) -> U256 {
        U256::from_big_endian(self.slice(offset, 32))
    }

    pub(crate) fn store_word(&mut self, offset: usize, value: U256) {
        let be = value.to_big_endian();
        self.slice_mut(offset, 32).copy_from_slice(&be);
    }

    pub(crate) fn store_byte(&mut self, offset: usize, value: u8) {
        self.bytes[offset] = value;
    }

    /// Copies `size` bytes of `src` starting at `src_offset` into memory at
    /// `offset`, zero-filling past the end of `src`.
    pub(crate) fn copy_padded(&mut self, offset: usize, src: &[u8], src_offset: U256, size: usize) {
        let dst = self.slice_mut(offset, size);
        dst.fill(0);
        if src_offset >= U256::from(src.len() as u64) {
            return;
        }
        let start = src_offset.low_u64() as usize;
        let n = size.min(src.len() - start);
        dst[..n].copy_from_slice(&src[start..start + n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_is_charged_once() {
        let mut m = Memory::default();
        assert_eq!(m.expansion_cost(U256::zero(), U256::from(32u64)), Some(3));
        m.grow(0, 32);
        assert_eq!(m.expansion_cost(U256::zero(), U256::from(32u64)), Some(0));
        assert_eq!(m.expansion_cost(U256::from(1u64), U256::from(32u64)), Some(3));
    }

    #[test]
    fn zero_size_never_expands() {
        let m = Memory::default();
        assert_eq!(m.expansion_cost(U256::MAX, U256::zero()), Some(0));
    }

    #[test]
    fn absurd_ranges_are_unpayable() {
        let m = Memory::default();
        assert_eq!(m.expansion_cost(U256::MAX, U256::one()), None);
        assert_eq!(m.expansion_cost(U256::from(u64::MAX), U256::one()), None);
    }

    #[test]
    fn words_are_big_endian() {
        let mut m = Memory::default();
        m.grow(0, 64);
        m.store_word(0, U256::from(0x0102u64));
        assert_eq!(m.slice(30, 2), &[0x01, 0x02]);
        assert_eq!(m.load_word(0), U256::from(0x0102u64));
    }

    #[test]
    fn padded_copy_zero_fills() {
        let mut m = Memory::default();
        m.grow(0, 32);
        m.store_byte(3, 0xff);
        m.copy_padded(0, &[9, 8, 7], U256::from(1u64), 4);
        assert_eq!(m.slice(0, 4), &[8, 7, 0, 0]);
        m.copy_padded(0, &[9, 8, 7], U256::MAX, 2);
        assert_eq!(m.slice(0, 2), &[0, 0]);
    }
}
