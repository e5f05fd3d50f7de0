use std::fmt;

use disk::DiskError;
use memory::MemoryError;

use crate::config::ConfigError;

/// Exceptions raised by a memory access. They are handed to the
/// machine's exception handler; none of them is retried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionType {
    /// Misaligned access, or a page number past the end of a linear table.
    AddressError,
    /// Linear translation hit a page that is not resident.
    PageFault,
    /// The translation state itself is broken.
    BusError,
    /// Write to a read-only page.
    ReadOnly,
}

impl fmt::Display for ExceptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExceptionType::AddressError => "address error",
            ExceptionType::PageFault => "page fault",
            ExceptionType::BusError => "bus error",
            ExceptionType::ReadOnly => "read-only violation",
        };
        f.write_str(name)
    }
}

/// Failures building, copying or tearing down address spaces.
#[derive(Debug, PartialEq)]
pub enum VmError {
    BadMagic(u32),
    Truncated,
    NoFreeFrame,
    NoFreeSector,
    NoSuchSpace(usize),
    NoCurrentSpace,
    BadAddress(u32),
    /// The space's stack top does not fit a 32 bit register.
    SpaceTooLarge(usize),
    Disk(DiskError),
    Memory(MemoryError),
    Config(ConfigError),
    Io(std::io::ErrorKind),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::BadMagic(magic) => write!(f, "not a NOFF executable (magic {:#x})", magic),
            VmError::Truncated => write!(f, "executable is shorter than its header"),
            VmError::NoFreeFrame => write!(f, "no free physical frame"),
            VmError::NoFreeSector => write!(f, "no free swap sector"),
            VmError::NoSuchSpace(id) => write!(f, "no address space {}", id),
            VmError::NoCurrentSpace => write!(f, "no address space is running"),
            VmError::BadAddress(vaddr) => write!(f, "address {:#x} is outside the address space", vaddr),
            VmError::SpaceTooLarge(pages) => {
                write!(f, "address space of {} pages does not fit 32 bit addresses", pages)
            }
            VmError::Disk(e) => write!(f, "swap device error: {:?}", e),
            VmError::Memory(e) => write!(f, "memory error: {:?}", e),
            VmError::Config(e) => write!(f, "invalid configuration: {}", e),
            VmError::Io(kind) => write!(f, "I/O error: {:?}", kind),
        }
    }
}

impl std::error::Error for VmError {}

impl From<DiskError> for VmError {
    fn from(e: DiskError) -> Self {
        VmError::Disk(e)
    }
}

impl From<MemoryError> for VmError {
    fn from(e: MemoryError) -> Self {
        VmError::Memory(e)
    }
}

impl From<ConfigError> for VmError {
    fn from(e: ConfigError) -> Self {
        VmError::Config(e)
    }
}

impl From<std::io::Error> for VmError {
    fn from(e: std::io::Error) -> Self {
        VmError::Io(e.kind())
    }
}
