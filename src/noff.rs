//! NOFF, the executable format of the simulated machine.
//!
//! The header is ten 32 bit words in the machine's little endian order:
//!
//! | magic | code: vaddr, file offset, size | init data: ... | uninit data: ... |
//!
//! Images written on a big endian host are accepted too; their header is
//! byte swapped on load.

use std::mem::size_of;

use log::debug;

use crate::{error::VmError, executable::Executable};

pub const NOFF_MAGIC: u32 = 0xbadfad;

const HEADER_WORDS: usize = 10;
pub const HEADER_SIZE: usize = HEADER_WORDS * size_of::<u32>();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Segment {
    pub virtual_addr: u32,
    pub in_file_addr: u32,
    pub size: u32,
}

impl Segment {
    fn from_words(words: &[u32]) -> Self {
        Self {
            virtual_addr: words[0],
            in_file_addr: words[1],
            size: words[2],
        }
    }

    fn words(&self) -> [u32; 3] {
        [self.virtual_addr, self.in_file_addr, self.size]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoffHeader {
    pub code: Segment,
    pub init_data: Segment,
    pub uninit_data: Segment,
}

impl NoffHeader {
    pub fn read<E: Executable + ?Sized>(executable: &E) -> Result<Self, VmError> {
        let mut raw = [0u8; HEADER_SIZE];
        if executable.read_at(&mut raw, 0) < HEADER_SIZE {
            return Err(VmError::Truncated);
        }
        Self::parse(&raw)
    }

    pub fn parse(raw: &[u8]) -> Result<Self, VmError> {
        if raw.len() < HEADER_SIZE {
            return Err(VmError::Truncated);
        }
        let mut words = [0u32; HEADER_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&raw[i * 4..i * 4 + 4]);
            *word = u32::from_le_bytes(bytes);
        }

        if words[0] != NOFF_MAGIC {
            if words[0].swap_bytes() != NOFF_MAGIC {
                return Err(VmError::BadMagic(words[0]));
            }
            debug!("NOFF header is byte swapped, normalizing");
            for word in words.iter_mut() {
                *word = word.swap_bytes();
            }
        }

        Ok(Self {
            code: Segment::from_words(&words[1..4]),
            init_data: Segment::from_words(&words[4..7]),
            uninit_data: Segment::from_words(&words[7..10]),
        })
    }
}

/// Assembles NOFF images: code, then initialized data, right after the
/// header.
#[derive(Debug, Clone, Default)]
pub struct NoffBuilder {
    code: Vec<u8>,
    init_data: Vec<u8>,
    uninit_size: u32,
    big_endian: bool,
}

impl NoffBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(mut self, code: &[u8]) -> Self {
        self.code = code.to_vec();
        self
    }

    pub fn init_data(mut self, data: &[u8]) -> Self {
        self.init_data = data.to_vec();
        self
    }

    pub fn uninit_data(mut self, size: u32) -> Self {
        self.uninit_size = size;
        self
    }

    /// Write the header in big endian order.
    pub fn big_endian(mut self, big_endian: bool) -> Self {
        self.big_endian = big_endian;
        self
    }

    pub fn header(&self) -> NoffHeader {
        let code_size = self.code.len() as u32;
        let data_size = self.init_data.len() as u32;
        NoffHeader {
            code: Segment {
                virtual_addr: 0,
                in_file_addr: HEADER_SIZE as u32,
                size: code_size,
            },
            init_data: Segment {
                virtual_addr: code_size,
                in_file_addr: HEADER_SIZE as u32 + code_size,
                size: data_size,
            },
            uninit_data: Segment {
                virtual_addr: code_size + data_size,
                in_file_addr: 0,
                size: self.uninit_size,
            },
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let header = self.header();
        let mut image = Vec::with_capacity(HEADER_SIZE + self.code.len() + self.init_data.len());
        let words = std::iter::once(NOFF_MAGIC)
            .chain(header.code.words())
            .chain(header.init_data.words())
            .chain(header.uninit_data.words());
        for word in words {
            if self.big_endian {
                image.extend_from_slice(&word.to_be_bytes());
            } else {
                image.extend_from_slice(&word.to_le_bytes());
            }
        }
        image.extend_from_slice(&self.code);
        image.extend_from_slice(&self.init_data);
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_native_header() {
        let image = NoffBuilder::new()
            .code(&[0x11; 200])
            .init_data(&[0x22; 10])
            .uninit_data(64)
            .build();
        let header = NoffHeader::read(&image).unwrap();
        assert_eq!(header.code.size, 200);
        assert_eq!(header.code.in_file_addr, HEADER_SIZE as u32);
        assert_eq!(header.init_data.size, 10);
        assert_eq!(header.init_data.in_file_addr, HEADER_SIZE as u32 + 200);
        assert_eq!(header.uninit_data.size, 64);
        assert_eq!(image.len(), HEADER_SIZE + 210);
    }

    #[test]
    fn byte_swapped_header_is_normalized() {
        let builder = NoffBuilder::new().code(&[1; 5]).uninit_data(300);
        let swapped = builder.clone().big_endian(true).build();
        let native = builder.build();
        assert_ne!(swapped[..HEADER_SIZE], native[..HEADER_SIZE]);
        assert_eq!(
            NoffHeader::read(&swapped).unwrap(),
            NoffHeader::read(&native).unwrap()
        );
    }

    #[test]
    fn bad_magic() {
        let mut image = NoffBuilder::new().build();
        image[0] = 0;
        assert!(matches!(NoffHeader::read(&image), Err(VmError::BadMagic(_))));
    }

    #[test]
    fn short_header() {
        let image = vec![0xadu8, 0xdf, 0xba, 0x00];
        assert_eq!(NoffHeader::read(&image), Err(VmError::Truncated));
    }
}
