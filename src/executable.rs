use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
    sync::Mutex,
};

use log::error;

/// A program image that can be read at arbitrary offsets.
pub trait Executable {
    /// Read up to `buf.len()` bytes starting at `offset`, returning how
    /// many were read. Fewer bytes means the image ended.
    fn read_at(&self, buf: &mut [u8], offset: usize) -> usize;
}

impl Executable for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        if offset >= self.len() {
            return 0;
        }
        let len = buf.len().min(self.len() - offset);
        buf[..len].copy_from_slice(&self[offset..offset + len]);
        len
    }
}

impl Executable for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        self.as_slice().read_at(buf, offset)
    }
}

/// Executable stored in a host file.
#[derive(Debug)]
pub struct ExecutableFile {
    file: Mutex<File>,
}

impl ExecutableFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        Ok(Self {
            file: Mutex::new(File::open(path)?),
        })
    }
}

impl Executable for ExecutableFile {
    fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        let mut file = self.file.lock().unwrap();
        if let Err(e) = file.seek(SeekFrom::Start(offset as u64)) {
            error!("Cannot seek executable to {}: {}", offset, e);
            return 0;
        }
        let mut read = 0;
        while read < buf.len() {
            match file.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Cannot read executable at {}: {}", offset + read, e);
                    break;
                }
            }
        }
        read
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::remove_file, io::Write};

    use serial_test::serial;

    use super::*;

    #[test]
    fn read_from_bytes() {
        let image = vec![1u8, 2, 3, 4, 5];
        let mut buf = [0u8; 3];
        assert_eq!(image.read_at(&mut buf, 1), 3);
        assert_eq!(buf, [2, 3, 4]);
        assert_eq!(image.read_at(&mut buf, 4), 1);
        assert_eq!(buf[0], 5);
        assert_eq!(image.read_at(&mut buf, 9), 0);
    }

    #[test]
    #[serial]
    fn read_from_file() {
        let path = "EXECUTABLE_test_read_from_file";
        {
            let mut file = File::create(path).unwrap();
            file.write_all(&[7u8; 10]).unwrap();
        }
        let executable = ExecutableFile::open(path).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(executable.read_at(&mut buf, 4), 6);
        assert_eq!(&buf[..6], &[7u8; 6]);
        remove_file(path).unwrap();
    }
}
