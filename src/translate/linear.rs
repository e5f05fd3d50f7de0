use log::trace;

use super::{split_address, AccessSize, Mmu, Translator};
use crate::{
    address_space::SpaceId,
    config::TranslationMode,
    error::{ExceptionType, VmError},
};

/// Translation straight through the current page table. A page that is
/// not resident is reported as a page fault for the caller to service.
#[derive(Debug, Default)]
pub struct LinearTranslator;

impl LinearTranslator {
    pub fn new() -> Self {
        Self
    }
}

impl Translator for LinearTranslator {
    fn mode(&self) -> TranslationMode {
        TranslationMode::Linear
    }

    fn translate(
        &mut self,
        mmu: &mut Mmu<'_>,
        vaddr: u32,
        size: AccessSize,
        writing: bool,
    ) -> Result<usize, ExceptionType> {
        if !size.is_aligned(vaddr) {
            return Err(ExceptionType::AddressError);
        }
        let page_size = mmu.manager.page_size();
        let num_frames = mmu.manager.num_frames();
        let (vpn, offset) = split_address(vaddr, page_size);

        let current = mmu.current.ok_or(ExceptionType::BusError)?;
        let space = mmu.spaces.get_mut(current).ok_or(ExceptionType::BusError)?;
        let entry = space
            .page_table_mut()
            .get_mut(vpn)
            .ok_or(ExceptionType::AddressError)?;
        if !entry.is_valid() {
            return Err(ExceptionType::PageFault);
        }
        if writing && entry.is_read_only() {
            return Err(ExceptionType::ReadOnly);
        }
        let frame = match entry.physical_page {
            Some(frame) if frame < num_frames => frame,
            _ => return Err(ExceptionType::BusError),
        };

        entry.touch(writing);
        mmu.manager.mark_referenced(frame);
        let physical = frame * page_size + offset;
        trace!("Translated {:#x} to {:#x}", vaddr, physical);
        Ok(physical)
    }

    fn activate(&mut self, _space: SpaceId) -> Result<(), VmError> {
        Ok(())
    }

    fn forget(&mut self, _vpn: usize) {}

    fn flush(&mut self) {}
}
