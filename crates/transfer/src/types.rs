/// One contiguous byte range of a payload, uploaded as a single part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartSpec {
    /// 1-based sequence number.
    pub part_number: u32,
    /// Byte offset within the payload.
    pub offset: u64,
    /// Size of this part in bytes.
    pub length: u64,
}

impl PartSpec {
    /// One past the last byte of this part.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_is_exclusive() {
        let p = PartSpec {
            part_number: 2,
            offset: 100,
            length: 50,
        };
        assert_eq!(p.end(), 150);
    }
}
