mod linear;
mod tlb_translator;

pub use linear::LinearTranslator;
pub use tlb_translator::TlbTranslator;

use crate::{
    address_space::{SpaceId, SpaceTable},
    config::TranslationMode,
    error::{ExceptionType, VmError},
    memory_manager::MemoryManager,
    tlb::Tlb,
};

/// Width of one memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessSize {
    Byte,
    Half,
    Word,
}

impl AccessSize {
    pub fn bytes(&self) -> usize {
        match self {
            AccessSize::Byte => 1,
            AccessSize::Half => 2,
            AccessSize::Word => 4,
        }
    }

    pub fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            1 => Some(AccessSize::Byte),
            2 => Some(AccessSize::Half),
            4 => Some(AccessSize::Word),
            _ => None,
        }
    }

    pub fn is_aligned(&self, vaddr: u32) -> bool {
        vaddr as usize % self.bytes() == 0
    }
}

/// What a translator may touch while it works: the paging state, every
/// address space (an eviction can hit any of them) and which one is running.
pub struct Mmu<'a> {
    pub manager: &'a mut MemoryManager,
    pub spaces: &'a mut SpaceTable,
    pub current: Option<SpaceId>,
}

pub trait Translator: Send {
    fn mode(&self) -> TranslationMode;

    /// Turn `vaddr` into a physical address for an access of `size`,
    /// updating use and dirty bits on success.
    fn translate(
        &mut self,
        mmu: &mut Mmu<'_>,
        vaddr: u32,
        size: AccessSize,
        writing: bool,
    ) -> Result<usize, ExceptionType>;

    /// Called on a context switch, before the incoming space restores its
    /// own state.
    fn activate(&mut self, space: SpaceId) -> Result<(), VmError>;

    /// A page of the current space left memory.
    fn forget(&mut self, vpn: usize);

    /// Drop everything cached for the current space.
    fn flush(&mut self);

    fn tlb(&self) -> Option<&Tlb> {
        None
    }
}

pub fn split_address(vaddr: u32, page_size: usize) -> (usize, usize) {
    let vaddr = vaddr as usize;
    (vaddr / page_size, vaddr % page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_sizes() {
        assert_eq!(AccessSize::from_bytes(2), Some(AccessSize::Half));
        assert_eq!(AccessSize::from_bytes(3), None);
        assert_eq!(AccessSize::Word.bytes(), 4);
        assert!(AccessSize::Byte.is_aligned(7));
        assert!(AccessSize::Half.is_aligned(6));
        assert!(!AccessSize::Half.is_aligned(7));
        assert!(AccessSize::Word.is_aligned(8));
        assert!(!AccessSize::Word.is_aligned(6));
    }

    #[test]
    fn split() {
        assert_eq!(split_address(0, 128), (0, 0));
        assert_eq!(split_address(130, 128), (1, 2));
        assert_eq!(split_address(383, 128), (2, 127));
    }
}
