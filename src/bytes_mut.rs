//! Little-endian cursor over a mutable byte slice.

use byteorder::{ByteOrder, LittleEndian};

pub struct BytesMut<'a> {
    data: &'a mut [u8],
    len: usize,
}

impl<'a> BytesMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data, len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.len
    }

    #[inline]
    fn check_remaining(&self, count: usize) {
        assert!(
            self.remaining() >= count,
            "write buffer overflow; remaining {} bytes, try add {count} bytes",
            self.remaining(),
        );
    }

    /// # Panics
    ///
    /// Will panic if not enough space is remaining in the buffer to store the whole slice
    #[inline]
    pub fn put_slice(&mut self, src: &[u8]) {
        self.check_remaining(src.len());
        self.data[self.len..self.len + src.len()].copy_from_slice(src);
        self.len += src.len();
    }

    #[inline]
    pub fn put_u8(&mut self, val: u8) {
        self.check_remaining(1);
        self.data[self.len] = val;
        self.len += 1;
    }

    #[inline]
    pub fn put_i8(&mut self, val: i8) {
        self.put_u8(val as u8);
    }

    #[inline]
    pub fn put_u16_le(&mut self, val: u16) {
        self.check_remaining(2);
        LittleEndian::write_u16(&mut self.data[self.len..self.len + 2], val);
        self.len += 2;
    }

    #[inline]
    pub fn put_i16_le(&mut self, val: i16) {
        self.check_remaining(2);
        LittleEndian::write_i16(&mut self.data[self.len..self.len + 2], val);
        self.len += 2;
    }

    #[inline]
    pub fn put_u32_le(&mut self, val: u32) {
        self.check_remaining(4);
        LittleEndian::write_u32(&mut self.data[self.len..self.len + 4], val);
        self.len += 4;
    }

    #[inline]
    pub fn put_i32_le(&mut self, val: i32) {
        self.check_remaining(4);
        LittleEndian::write_i32(&mut self.data[self.len..self.len + 4], val);
        self.len += 4;
    }

    #[inline]
    pub fn put_u64_le(&mut self, val: u64) {
        self.check_remaining(8);
        LittleEndian::write_u64(&mut self.data[self.len..self.len + 8], val);
        self.len += 8;
    }

    #[inline]
    pub fn put_i64_le(&mut self, val: i64) {
        self.check_remaining(8);
        LittleEndian::write_i64(&mut self.data[self.len..self.len + 8], val);
        self.len += 8;
    }

    #[inline]
    pub fn put_f32_le(&mut self, val: f32) {
        self.check_remaining(4);
        LittleEndian::write_f32(&mut self.data[self.len..self.len + 4], val);
        self.len += 4;
    }

    #[inline]
    pub fn put_f64_le(&mut self, val: f64) {
        self.check_remaining(8);
        LittleEndian::write_f64(&mut self.data[self.len..self.len + 8], val);
        self.len += 8;
    }
}

#[cfg(test)]
mod tests {
    use super::BytesMut;

    #[test]
    fn writes_little_endian_scalars() {
        let mut buffer = [0u8; 7];
        let mut bytes = BytesMut::new(&mut buffer);
        bytes.put_u8(0x01);
        bytes.put_u16_le(0x1234);
        bytes.put_u32_le(0x1234_5678);
        assert_eq!(bytes.len(), 7);
        assert_eq!(buffer, [0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    #[should_panic]
    fn panics_on_overflow() {
        let mut buffer = [0u8; 2];
        let mut bytes = BytesMut::new(&mut buffer);
        bytes.put_u32_le(1);
    }
}
