//! Bitstream cursor
//!
//! A fixed-capacity byte buffer that packs and unpacks integer fields of
//! 0..=32 bits, most significant bit first. Writes append at the bit
//! count; reads use a separate byte/bit cursor that starts at the head of
//! the buffer, so a frame can be written and then read back (or rewound
//! and read again) without copying.

use crate::error::{CodecError, Result};

/// Default buffer capacity in bytes
pub const DEFAULT_CAPACITY: usize = 1000;

/// Bit-level packer/unpacker over a bounded byte buffer
#[derive(Debug, Clone)]
pub struct Bits {
    bytes: Vec<u8>,
    /// Total bits written
    nb_bits: usize,
    /// Read cursor: byte index
    byte_ptr: usize,
    /// Read cursor: bit index within `bytes[byte_ptr]`, always in 0..8
    bit_ptr: usize,
}

impl Default for Bits {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Bits {
    /// Create an empty buffer holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
            nb_bits: 0,
            byte_ptr: 0,
            bit_ptr: 0,
        }
    }

    /// Create a buffer for reading that holds all of `data`
    ///
    /// Capacity grows to fit, so nothing is truncated.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut bytes = data.to_vec();
        bytes.resize(data.len().max(DEFAULT_CAPACITY), 0);
        Self {
            bytes,
            nb_bits: data.len() * 8,
            byte_ptr: 0,
            bit_ptr: 0,
        }
    }

    /// Zero the buffer and both cursors
    pub fn reset(&mut self) {
        self.bytes.fill(0);
        self.nb_bits = 0;
        self.byte_ptr = 0;
        self.bit_ptr = 0;
    }

    /// Replace the content with `data` and rewind the read cursor
    pub fn read_from(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.bytes.len() {
            return Err(CodecError::BitstreamOverflow {
                requested: data.len() * 8,
                available: self.bytes.len() * 8,
            });
        }
        self.reset();
        self.bytes[..data.len()].copy_from_slice(data);
        self.nb_bits = data.len() * 8;
        Ok(())
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Total bits written
    pub fn bits_written(&self) -> usize {
        self.nb_bits
    }

    /// Bits that can still be packed before the buffer is full
    pub fn remaining_capacity(&self) -> usize {
        self.bytes.len() * 8 - self.nb_bits
    }

    /// Bits between the read cursor and the end of the written data
    pub fn remaining(&self) -> usize {
        self.nb_bits.saturating_sub(self.read_position())
    }

    fn read_position(&self) -> usize {
        self.byte_ptr * 8 + self.bit_ptr
    }

    /// Append the low `nbits` bits of `value`, MSB first
    ///
    /// Packing past the capacity fails without writing anything.
    pub fn pack(&mut self, value: u32, nbits: u32) -> Result<()> {
        if nbits > 32 {
            return Err(CodecError::InvalidBitWidth { nbits });
        }
        let nbits = nbits as usize;
        if nbits > self.remaining_capacity() {
            return Err(CodecError::BitstreamOverflow {
                requested: nbits,
                available: self.remaining_capacity(),
            });
        }

        for shift in (0..nbits).rev() {
            let bit = ((value >> shift) & 1) as u8;
            let byte = self.nb_bits / 8;
            let offset = 7 - self.nb_bits % 8;
            self.bytes[byte] = (self.bytes[byte] & !(1 << offset)) | (bit << offset);
            self.nb_bits += 1;
        }
        Ok(())
    }

    /// Read an unsigned field of `nbits` bits
    pub fn unpack_unsigned(&mut self, nbits: u32) -> Result<u32> {
        if nbits > 32 {
            return Err(CodecError::InvalidBitWidth { nbits });
        }
        let nbits = nbits as usize;
        if nbits > self.remaining() {
            return Err(CodecError::BitstreamUnderflow {
                requested: nbits,
                available: self.remaining(),
            });
        }

        let mut value: u32 = 0;
        for _ in 0..nbits {
            let bit = (self.bytes[self.byte_ptr] >> (7 - self.bit_ptr)) & 1;
            value = (value << 1) | u32::from(bit);
            self.bit_ptr += 1;
            if self.bit_ptr == 8 {
                self.bit_ptr = 0;
                self.byte_ptr += 1;
            }
        }
        Ok(value)
    }

    /// Read a two's-complement field of `nbits` bits, sign-extending bit `nbits - 1`
    pub fn unpack_signed(&mut self, nbits: u32) -> Result<i32> {
        let raw = self.unpack_unsigned(nbits)?;
        if nbits == 0 || nbits == 32 {
            return Ok(raw as i32);
        }
        let shift = 32 - nbits;
        Ok(((raw << shift) as i32) >> shift)
    }

    /// Skip `nbits` bits on the read side
    pub fn advance(&mut self, nbits: usize) -> Result<()> {
        if nbits > self.remaining() {
            return Err(CodecError::BitstreamUnderflow {
                requested: nbits,
                available: self.remaining(),
            });
        }
        let position = self.read_position() + nbits;
        self.byte_ptr = position / 8;
        self.bit_ptr = position % 8;
        Ok(())
    }

    /// Move the read cursor back to the start without erasing content
    pub fn rewind(&mut self) {
        self.byte_ptr = 0;
        self.bit_ptr = 0;
    }

    /// Drop the whole bytes already consumed and rebase both cursors
    pub fn flush(&mut self) {
        let consumed = self.byte_ptr;
        if consumed == 0 {
            return;
        }
        let used_bytes = self.nb_bits.div_ceil(8);
        self.bytes.copy_within(consumed..used_bytes, 0);
        self.bytes[used_bytes - consumed..].fill(0);
        self.nb_bits -= consumed * 8;
        self.byte_ptr = 0;
    }

    /// Pad to the byte boundary with a 0 followed by 1s
    ///
    /// A decoder reading the padding sees either fewer than five bits or
    /// the end-of-stream code.
    pub fn insert_terminator(&mut self) -> Result<()> {
        if self.nb_bits % 8 != 0 {
            self.pack(0, 1)?;
            while self.nb_bits % 8 != 0 {
                self.pack(1, 1)?;
            }
        }
        Ok(())
    }

    /// Written content, zero-padded to whole bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes[..self.nb_bits.div_ceil(8)].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_msb_first() {
        let mut bits = Bits::new(4);
        bits.pack(0b101, 3).unwrap();
        bits.pack(0b11111, 5).unwrap();
        bits.pack(0x1, 1).unwrap();
        assert_eq!(bits.bits_written(), 9);
        assert_eq!(bits.to_bytes(), vec![0b1011_1111, 0b1000_0000]);
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut bits = Bits::new(1);
        bits.pack(0x7f, 7).unwrap();
        let err = bits.pack(0x3, 2).unwrap_err();
        assert_eq!(
            err,
            CodecError::BitstreamOverflow {
                requested: 2,
                available: 1
            }
        );
        // Nothing was written by the failed call
        assert_eq!(bits.bits_written(), 7);
        assert!(bits.pack(1, 1).is_ok());
    }

    #[test]
    fn test_underflow_is_reported() {
        let mut bits = Bits::new(4);
        bits.pack(5, 4).unwrap();
        assert_eq!(bits.unpack_unsigned(3).unwrap(), 0b010);
        assert!(matches!(
            bits.unpack_unsigned(2),
            Err(CodecError::BitstreamUnderflow {
                requested: 2,
                available: 1
            })
        ));
        assert_eq!(bits.unpack_unsigned(1).unwrap(), 1);
    }

    #[test]
    fn test_invalid_width() {
        let mut bits = Bits::new(8);
        assert!(matches!(
            bits.pack(0, 33),
            Err(CodecError::InvalidBitWidth { nbits: 33 })
        ));
        assert!(bits.unpack_unsigned(40).is_err());
    }

    #[test]
    fn test_rewind_and_advance() {
        let mut bits = Bits::new(8);
        bits.pack(0xabcd, 16).unwrap();
        bits.advance(4).unwrap();
        assert_eq!(bits.unpack_unsigned(8).unwrap(), 0xbc);
        bits.rewind();
        assert_eq!(bits.unpack_unsigned(16).unwrap(), 0xabcd);
        assert!(bits.advance(1).is_err());
    }

    #[test]
    fn test_flush_rebases_cursors() {
        let mut bits = Bits::new(4);
        bits.pack(0x12, 8).unwrap();
        bits.pack(0x345, 12).unwrap();
        assert_eq!(bits.unpack_unsigned(10).unwrap(), 0x12 << 2);
        bits.flush();
        assert_eq!(bits.bits_written(), 12);
        assert_eq!(bits.remaining(), 10);
        assert_eq!(bits.unpack_unsigned(10).unwrap(), 0x345 & 0x3ff);
        // Capacity freed by the flush is writable again
        assert_eq!(bits.remaining_capacity(), 20);
    }

    #[test]
    fn test_terminator_reads_as_end_of_stream() {
        let mut bits = Bits::new(4);
        bits.pack(0b101, 3).unwrap();
        bits.insert_terminator().unwrap();
        assert_eq!(bits.bits_written(), 8);
        bits.advance(3).unwrap();
        assert_eq!(bits.unpack_unsigned(5).unwrap(), 0b01111);

        let mut aligned = Bits::new(4);
        aligned.pack(0xff, 8).unwrap();
        aligned.insert_terminator().unwrap();
        assert_eq!(aligned.bits_written(), 8);
    }

    #[test]
    fn test_read_from_bytes() {
        let mut bits = Bits::from_bytes(&[0xf0, 0x0f]);
        assert_eq!(bits.remaining(), 16);
        assert_eq!(bits.unpack_signed(4).unwrap(), -1);
        assert_eq!(bits.unpack_unsigned(8).unwrap(), 0);
        assert_eq!(bits.unpack_unsigned(4).unwrap(), 0xf);

        let mut small = Bits::new(1);
        assert!(small.read_from(&[1, 2]).is_err());
    }

    #[test]
    fn test_from_bytes_keeps_oversized_input() {
        let mut data = vec![0u8; DEFAULT_CAPACITY + 3];
        data[DEFAULT_CAPACITY + 2] = 0xa5;
        let mut bits = Bits::from_bytes(&data);
        assert_eq!(bits.capacity(), DEFAULT_CAPACITY + 3);
        assert_eq!(bits.remaining(), data.len() * 8);
        bits.advance((DEFAULT_CAPACITY + 2) * 8).unwrap();
        assert_eq!(bits.unpack_unsigned(8).unwrap(), 0xa5);
        assert_eq!(bits.remaining(), 0);
    }
}
