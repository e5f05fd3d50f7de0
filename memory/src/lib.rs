use std::{
    fs::File,
    io::{Seek, SeekFrom, Write},
    mem::size_of,
};

use log::info;

#[derive(Debug, PartialEq)]
pub enum MemoryError {
    OverCapacity,
    NoSuchFrame,
}

/// Main memory of the simulated machine: `num_frames` frames of
/// `page_size` bytes each, addressed physically.
///
/// Multi-byte values are stored in the machine's little endian format.
#[derive(Debug, Clone)]
pub struct PhysicalMemory {
    page_size: usize,
    num_frames: usize,
    buffer: Vec<u8>,
}

pub fn make_name(name: &str) -> String {
    let name = name.replace("-", "_");
    let mut memory_name = String::from("MEMORY_FILE_");
    memory_name.push_str(&name);
    memory_name
}

fn write_header(file: &mut File, page_size: u32, num_frames: u32) -> Result<(), std::io::Error> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&page_size.to_be_bytes())?;
    file.seek(SeekFrom::Start(size_of::<u32>() as u64))?;
    file.write_all(&num_frames.to_be_bytes())?;
    Ok(())
}

impl PhysicalMemory {
    pub fn new(page_size: usize, num_frames: usize) -> Self {
        assert!(
            page_size.is_power_of_two(),
            "Page size {} is not a power of 2",
            page_size
        );
        Self {
            page_size,
            num_frames,
            buffer: vec![0; page_size * num_frames],
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn check_address(&self, address: usize, len: usize) -> Result<(), MemoryError> {
        match address.checked_add(len) {
            Some(end) if end <= self.capacity() => Ok(()),
            _ => Err(MemoryError::OverCapacity),
        }
    }

    pub fn read_u8(&self, address: usize) -> Result<u8, MemoryError> {
        self.check_address(address, 1)?;
        Ok(self.buffer[address])
    }

    pub fn write_u8(&mut self, address: usize, byte: u8) -> Result<(), MemoryError> {
        self.check_address(address, 1)?;
        self.buffer[address] = byte;
        Ok(())
    }

    pub fn read_u16(&self, address: usize) -> Result<u16, MemoryError> {
        self.check_address(address, size_of::<u16>())?;
        let mut bytes = [0; size_of::<u16>()];
        bytes.copy_from_slice(&self.buffer[address..address + size_of::<u16>()]);
        Ok(u16::from_le_bytes(bytes))
    }

    pub fn write_u16(&mut self, address: usize, half: u16) -> Result<(), MemoryError> {
        self.check_address(address, size_of::<u16>())?;
        self.buffer[address..address + size_of::<u16>()].copy_from_slice(&half.to_le_bytes());
        Ok(())
    }

    pub fn read_u32(&self, address: usize) -> Result<u32, MemoryError> {
        self.check_address(address, size_of::<u32>())?;
        let mut bytes = [0; size_of::<u32>()];
        bytes.copy_from_slice(&self.buffer[address..address + size_of::<u32>()]);
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn write_u32(&mut self, address: usize, word: u32) -> Result<(), MemoryError> {
        self.check_address(address, size_of::<u32>())?;
        self.buffer[address..address + size_of::<u32>()].copy_from_slice(&word.to_le_bytes());
        Ok(())
    }

    /// The bytes of one frame.
    pub fn frame(&self, frame: usize) -> Result<&[u8], MemoryError> {
        if frame >= self.num_frames {
            return Err(MemoryError::NoSuchFrame);
        }
        Ok(&self.buffer[frame * self.page_size..(frame + 1) * self.page_size])
    }

    pub fn frame_mut(&mut self, frame: usize) -> Result<&mut [u8], MemoryError> {
        if frame >= self.num_frames {
            return Err(MemoryError::NoSuchFrame);
        }
        Ok(&mut self.buffer[frame * self.page_size..(frame + 1) * self.page_size])
    }

    pub fn zero_frame(&mut self, frame: usize) -> Result<(), MemoryError> {
        self.frame_mut(frame)?.fill(0);
        Ok(())
    }

    /// Write the whole memory to `MEMORY_FILE_<name>`, preceded by a
    /// `| page size: u32 | frames: u32 |` big endian header.
    pub fn dump(&self, name: &str) -> Result<(), std::io::Error> {
        let mut file = File::options()
            .truncate(true)
            .write(true)
            .create(true)
            .open(make_name(name))?;
        write_header(&mut file, self.page_size as u32, self.num_frames as u32)?;
        file.seek(SeekFrom::Start(2 * size_of::<u32>() as u64))?;
        file.write_all(&self.buffer)?;
        info!("Dumped {} bytes of memory to {}", self.capacity(), make_name(name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{read, remove_file};

    #[test]
    fn test_new_is_zeroed() {
        let mem = PhysicalMemory::new(128, 4);
        assert_eq!(mem.capacity(), 512);
        assert!(mem.frame(3).unwrap().iter().all(|b| *b == 0));
    }

    #[test]
    #[should_panic]
    fn test_page_size_not_power_of_two() {
        let _ = PhysicalMemory::new(100, 4);
    }

    #[test]
    fn test_read_write() {
        let mut mem = PhysicalMemory::new(128, 8);
        mem.write_u8(0, 0x12).unwrap();
        assert_eq!(mem.read_u8(0).unwrap(), 0x12);
        mem.write_u16(2, 0xbeef).unwrap();
        assert_eq!(mem.read_u16(2).unwrap(), 0xbeef);
        mem.write_u32(4, 0xdeadbeef).unwrap();
        assert_eq!(mem.read_u32(4).unwrap(), 0xdeadbeef);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut mem = PhysicalMemory::new(128, 1);
        mem.write_u32(0, 0x11223344).unwrap();
        assert_eq!(mem.read_u8(0).unwrap(), 0x44);
        assert_eq!(mem.read_u8(3).unwrap(), 0x11);
        assert_eq!(mem.read_u16(2).unwrap(), 0x1122);
    }

    #[test]
    fn test_write_a_lot_of_data() {
        let mut mem = PhysicalMemory::new(256, 4);
        for i in 0..1024 {
            mem.write_u8(i, i as u8).unwrap();
        }
        for i in 0..1024 {
            assert_eq!(mem.read_u8(i).unwrap(), i as u8);
        }
    }

    #[test]
    fn test_write_invalid_address() {
        let mut mem = PhysicalMemory::new(128, 8);
        assert_eq!(mem.write_u8(1024, 0x12), Err(MemoryError::OverCapacity));
        assert_eq!(mem.read_u32(1022), Err(MemoryError::OverCapacity));
    }

    #[test]
    fn test_frames() {
        let mut mem = PhysicalMemory::new(128, 4);
        mem.frame_mut(2).unwrap().fill(0x22);
        assert_eq!(mem.read_u8(2 * 128).unwrap(), 0x22);
        assert_eq!(mem.read_u8(2 * 128 - 1).unwrap(), 0);
        assert_eq!(mem.read_u8(3 * 128).unwrap(), 0);
        mem.zero_frame(2).unwrap();
        assert!(mem.frame(2).unwrap().iter().all(|b| *b == 0));
        assert_eq!(mem.frame(4), Err(MemoryError::NoSuchFrame));
    }

    #[test]
    fn test_dump() {
        let name = "test_dump";
        let _ = remove_file(make_name(name));
        let mut mem = PhysicalMemory::new(128, 2);
        mem.write_u8(130, 0x7f).unwrap();
        mem.dump(name).unwrap();
        let bytes = read(make_name(name)).unwrap();
        assert_eq!(bytes.len(), 8 + 256);
        assert_eq!(&bytes[0..4], &128u32.to_be_bytes());
        assert_eq!(&bytes[4..8], &2u32.to_be_bytes());
        assert_eq!(bytes[8 + 130], 0x7f);
        let _ = remove_file(make_name(name));
    }
}
