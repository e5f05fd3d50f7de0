/// One bit per slot. A set bit means "in use" for allocators and
/// "recently referenced" for replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    bitmap: Vec<u8>,
    len: usize,
}

impl Bitmap {
    /// How many bytes are required to store `len` bits
    pub fn size(len: usize) -> usize {
        len / 8 + if len % 8 == 0 { 0 } else { 1 }
    }

    pub fn new(len: usize) -> Bitmap {
        Bitmap {
            bitmap: vec![0; Self::size(len)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check(&self, bit: usize) {
        assert!(bit < self.len, "Bit {} out of range (len {})", bit, self.len);
    }

    pub fn mark(&mut self, bit: usize) {
        self.check(bit);
        self.bitmap[bit / 8] |= 1 << (bit % 8);
    }

    pub fn clear(&mut self, bit: usize) {
        self.check(bit);
        self.bitmap[bit / 8] &= !(1 << (bit % 8));
    }

    pub fn test(&self, bit: usize) -> bool {
        self.check(bit);
        self.bitmap[bit / 8] & (1 << (bit % 8)) != 0
    }

    /// Find the first clear bit, mark it and return it.
    pub fn find(&mut self) -> Option<usize> {
        for i in 0..self.bitmap.len() {
            if self.bitmap[i] == u8::MAX {
                continue;
            }
            for j in 0..8 {
                let bit = i * 8 + j;
                if bit >= self.len {
                    return None;
                }
                if self.bitmap[i] & (1 << j) == 0 {
                    self.bitmap[i] |= 1 << j;
                    return Some(bit);
                }
            }
        }
        None
    }

    pub fn num_clear(&self) -> usize {
        (0..self.len).filter(|bit| !self.test(*bit)).count()
    }

    pub fn clear_all(&mut self) {
        self.bitmap.fill(0);
    }
}
