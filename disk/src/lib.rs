use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    mem::size_of,
    sync::{Arc, Mutex},
};

use log::{info, warn};

#[derive(Debug, PartialEq)]
pub enum DiskError {
    IncorrectBlockSize,
    OverCapacity,
    /// The image header describes a different geometry.
    HeaderMismatch,
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for DiskError {
    fn from(e: std::io::Error) -> Self {
        DiskError::Io(e.kind())
    }
}

const HEADER_SIZE: usize = size_of::<u32>() * 2;

#[derive(Debug)]
enum Backing {
    Memory(Vec<u8>),
    Image(File),
}

/// A sector-addressed storage device. Every transfer moves exactly one
/// block of `block_size` bytes.
///
/// The contents either live in host memory or in an image file named
/// `DISK_IMAGE_<name>` that starts with a `| block size: u32 | blocks: u32 |`
/// big endian header. Clones share the same device.
#[derive(Debug, Clone)]
pub struct Disk {
    name: String,
    block_size: usize,
    num_blocks: usize,
    backing: Arc<Mutex<Backing>>,
}

pub fn make_name(name: &str) -> String {
    let name = name.replace("-", "_");
    let mut disk_name = String::from("DISK_IMAGE_");
    disk_name.push_str(&name);
    disk_name
}

fn write_header(file: &mut File, block_size: u32, num_blocks: u32) -> Result<(), std::io::Error> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&block_size.to_be_bytes())?;
    file.seek(SeekFrom::Start(size_of::<u32>() as u64))?;
    file.write_all(&num_blocks.to_be_bytes())?;
    Ok(())
}

fn read_header(file: &mut File) -> Result<(u32, u32), std::io::Error> {
    let mut block_size = [0; size_of::<u32>()];
    let mut num_blocks = [0; size_of::<u32>()];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut block_size)?;
    file.seek(SeekFrom::Start(size_of::<u32>() as u64))?;
    file.read_exact(&mut num_blocks)?;
    Ok((u32::from_be_bytes(block_size), u32::from_be_bytes(num_blocks)))
}

impl Disk {
    pub fn in_memory(name: &str, block_size: usize, num_blocks: usize) -> Self {
        assert!(block_size > 0, "Block size must be positive");
        Self {
            name: String::from(name),
            block_size,
            num_blocks,
            backing: Arc::new(Mutex::new(Backing::Memory(vec![0; block_size * num_blocks]))),
        }
    }

    pub fn create(name: &str, block_size: usize, num_blocks: usize) -> Result<Self, std::io::Error> {
        assert!(block_size > 0, "Block size must be positive");
        let mut file = File::options()
            .truncate(true)
            .write(true)
            .read(true)
            .create(true)
            .open(make_name(name))?;
        file.set_len((HEADER_SIZE + block_size * num_blocks) as u64)?;
        write_header(&mut file, block_size as u32, num_blocks as u32)?;
        info!("Created disk image {} ({} x {} bytes)", make_name(name), num_blocks, block_size);
        Ok(Self {
            name: String::from(name),
            block_size,
            num_blocks,
            backing: Arc::new(Mutex::new(Backing::Image(file))),
        })
    }

    /// Reopen an image made by `create`. Its header must match the geometry
    /// asked for.
    pub fn connect(name: &str, block_size: usize, num_blocks: usize) -> Result<Self, DiskError> {
        let mut file = File::options()
            .write(true)
            .read(true)
            .open(make_name(name))?;
        let (found_block_size, found_blocks) = read_header(&mut file)?;
        if found_block_size as usize != block_size || found_blocks as usize != num_blocks {
            warn!(
                "{} holds {} x {} bytes, expected {} x {}",
                make_name(name),
                found_blocks,
                found_block_size,
                num_blocks,
                block_size
            );
            return Err(DiskError::HeaderMismatch);
        }
        info!("Connected to disk image {}", make_name(name));
        Ok(Self {
            name: String::from(name),
            block_size,
            num_blocks,
            backing: Arc::new(Mutex::new(Backing::Image(file))),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    pub fn read_block_into(&self, block_number: usize, buf: &mut [u8]) -> Result<(), DiskError> {
        if buf.len() != self.block_size {
            return Err(DiskError::IncorrectBlockSize);
        } else if block_number >= self.num_blocks {
            return Err(DiskError::OverCapacity);
        }
        info!("Start reading block[{}] of {}", block_number, self.name);
        let mut backing = self.backing.lock().unwrap();
        match &mut *backing {
            Backing::Memory(data) => {
                let start = block_number * self.block_size;
                buf.copy_from_slice(&data[start..start + self.block_size]);
            }
            Backing::Image(file) => {
                file.seek(SeekFrom::Start(
                    (HEADER_SIZE + block_number * self.block_size) as u64,
                ))?;
                file.read_exact(buf)?;
            }
        }
        info!("Done reading block[{}] of {}", block_number, self.name);
        Ok(())
    }

    pub fn write_block(&self, block_number: usize, block: &[u8]) -> Result<(), DiskError> {
        if block.len() != self.block_size {
            return Err(DiskError::IncorrectBlockSize);
        } else if block_number >= self.num_blocks {
            return Err(DiskError::OverCapacity);
        }
        info!("Start writing block[{}] of {}", block_number, self.name);
        let mut backing = self.backing.lock().unwrap();
        match &mut *backing {
            Backing::Memory(data) => {
                let start = block_number * self.block_size;
                data[start..start + self.block_size].copy_from_slice(block);
            }
            Backing::Image(file) => {
                file.seek(SeekFrom::Start(
                    (HEADER_SIZE + block_number * self.block_size) as u64,
                ))?;
                file.write_all(block)?;
            }
        }
        info!("Done writing block[{}] of {}", block_number, self.name);
        Ok(())
    }
}
