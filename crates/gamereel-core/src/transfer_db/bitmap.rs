/// Committed multipart parts, one bit per chunk index (LSB of byte 0 is chunk 0).
///
/// Stored as a BLOB; missing trailing bytes read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartBitmap {
    bytes: Vec<u8>,
}

impl PartBitmap {
    pub fn new(count: u32) -> Self {
        Self {
            bytes: vec![0u8; (count as usize).div_ceil(8)],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn set(&mut self, index: u32) {
        let (byte, bit) = ((index / 8) as usize, index % 8);
        if byte >= self.bytes.len() {
            self.bytes.resize(byte + 1, 0);
        }
        self.bytes[byte] |= 1 << bit;
    }

    pub fn is_set(&self, index: u32) -> bool {
        let (byte, bit) = ((index / 8) as usize, index % 8);
        self.bytes
            .get(byte)
            .map(|b| b & (1 << bit) != 0)
            .unwrap_or(false)
    }

    /// Number of set bits among the first `count`.
    pub fn count_set(&self, count: u32) -> u32 {
        (0..count).filter(|&i| self.is_set(i)).count() as u32
    }

    pub fn all_set(&self, count: u32) -> bool {
        self.count_set(count) == count
    }

    pub fn clear(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_query() {
        let mut b = PartBitmap::new(10);
        assert!(!b.all_set(10));
        b.set(0);
        b.set(9);
        assert!(b.is_set(0));
        assert!(b.is_set(9));
        assert!(!b.is_set(5));
        assert_eq!(b.count_set(10), 2);
    }

    #[test]
    fn grows_and_survives_blob() {
        let mut b = PartBitmap::default();
        b.set(17);
        let back = PartBitmap::from_bytes(b.as_bytes());
        assert!(back.is_set(17));
        assert!(!back.is_set(16));
        // Index beyond the stored bytes reads as unset.
        assert!(!back.is_set(200));
    }

    #[test]
    fn all_set_and_clear() {
        let mut b = PartBitmap::new(3);
        (0..3).for_each(|i| b.set(i));
        assert!(b.all_set(3));
        assert!(b.all_set(0));
        b.clear();
        assert_eq!(b.count_set(3), 0);
    }
}
