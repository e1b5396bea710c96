//! Little-endian cursor over an immutable byte slice.

use byteorder::{ByteOrder, LittleEndian};

pub struct Bytes<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Bytes<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    fn check_remaining(&self, count: usize) {
        assert!(
            self.remaining() >= count,
            "read buffer exhausted; remaining {} bytes, try read {count} bytes",
            self.remaining(),
        );
    }

    /// # Panics
    ///
    /// Will panic if not at least `count` bytes remain in the buffer
    #[inline]
    pub fn get_bytes(&mut self, count: usize) -> &'a [u8] {
        self.check_remaining(count);
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        bytes
    }

    #[inline]
    pub fn get_u8(&mut self) -> u8 {
        self.check_remaining(1);
        let val = self.data[self.pos];
        self.pos += 1;
        val
    }

    #[inline]
    pub fn get_i8(&mut self) -> i8 {
        self.get_u8() as i8
    }

    #[inline]
    pub fn get_u16_le(&mut self) -> u16 {
        LittleEndian::read_u16(self.get_bytes(2))
    }

    #[inline]
    pub fn get_i16_le(&mut self) -> i16 {
        LittleEndian::read_i16(self.get_bytes(2))
    }

    #[inline]
    pub fn get_u32_le(&mut self) -> u32 {
        LittleEndian::read_u32(self.get_bytes(4))
    }

    #[inline]
    pub fn get_i32_le(&mut self) -> i32 {
        LittleEndian::read_i32(self.get_bytes(4))
    }

    #[inline]
    pub fn get_u64_le(&mut self) -> u64 {
        LittleEndian::read_u64(self.get_bytes(8))
    }

    #[inline]
    pub fn get_i64_le(&mut self) -> i64 {
        LittleEndian::read_i64(self.get_bytes(8))
    }

    #[inline]
    pub fn get_f32_le(&mut self) -> f32 {
        LittleEndian::read_f32(self.get_bytes(4))
    }

    #[inline]
    pub fn get_f64_le(&mut self) -> f64 {
        LittleEndian::read_f64(self.get_bytes(8))
    }
}

#[cfg(test)]
mod tests {
    use super::Bytes;

    #[test]
    fn reads_little_endian_scalars() {
        let data = [0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0xFF];
        let mut bytes = Bytes::new(&data);
        assert_eq!(bytes.get_u8(), 0x01);
        assert_eq!(bytes.get_u16_le(), 0x1234);
        assert_eq!(bytes.get_u32_le(), 0x1234_5678);
        assert_eq!(bytes.get_i8(), -1);
        assert_eq!(bytes.remaining(), 0);
    }

    #[test]
    #[should_panic]
    fn panics_on_exhausted_buffer() {
        let data = [0u8; 2];
        let mut bytes = Bytes::new(&data);
        let _ = bytes.get_u32_le();
    }
}
