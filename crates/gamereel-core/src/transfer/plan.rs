//! Fixed-size chunk planning.

/// One chunk: byte range `[start, end)`. `index` is 0-based; multipart part number is `index + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: u32,
    pub start: u64,
    pub end: u64,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn part_number(&self) -> u32 {
        self.index + 1
    }
}

/// Split `total` bytes into `chunk_size` pieces; the last one may be shorter.
pub fn plan_chunks(total: u64, chunk_size: u64) -> Vec<Chunk> {
    if total == 0 || chunk_size == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(total.div_ceil(chunk_size) as usize);
    let mut start = 0u64;
    let mut index = 0u32;
    while start < total {
        let end = (start + chunk_size).min(total);
        out.push(Chunk { index, start, end });
        start = end;
        index += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_split() {
        let c = plan_chunks(1000, 250);
        assert_eq!(c.len(), 4);
        assert!(c.iter().all(|c| c.len() == 250));
        assert_eq!(c[3].end, 1000);
        assert_eq!(c[3].part_number(), 4);
    }

    #[test]
    fn short_tail() {
        let c = plan_chunks(1001, 250);
        assert_eq!(c.len(), 5);
        assert_eq!(c[4], Chunk { index: 4, start: 1000, end: 1001 });
    }

    #[test]
    fn chunk_larger_than_total() {
        let c = plan_chunks(10, 1 << 20);
        assert_eq!(c, vec![Chunk { index: 0, start: 0, end: 10 }]);
    }

    #[test]
    fn empty_inputs() {
        assert!(plan_chunks(0, 100).is_empty());
        assert!(plan_chunks(100, 0).is_empty());
    }
}
