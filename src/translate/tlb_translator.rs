use free_space_manager::Bitmap;
use log::{debug, error, trace, warn};

use super::{split_address, AccessSize, Mmu, Translator};
use crate::{
    address_space::SpaceId,
    config::TranslationMode,
    error::{ExceptionType, VmError},
    replacement::Clock,
    stats::VmEvent,
    tlb::Tlb,
};

/// Translation through a software managed TLB backed by demand paging.
///
/// A miss is served from the current page table; a miss on a page that is
/// not resident first brings the page in, evicting another one if memory is
/// full. TLB slots are replaced with their own second chance clock.
#[derive(Debug)]
pub struct TlbTranslator {
    tlb: Tlb,
    refs: Bitmap,
    clock: Clock,
}

impl TlbTranslator {
    pub fn new(size: usize) -> Self {
        Self {
            tlb: Tlb::new(size),
            refs: Bitmap::new(size),
            clock: Clock::new(size),
        }
    }

    /// Bring the translation for `vpn` into the TLB and return its slot.
    fn handle_miss(&mut self, mmu: &mut Mmu<'_>, space: SpaceId, vpn: usize) -> Result<usize, ExceptionType> {
        let resident = match mmu.spaces.get(space).and_then(|s| s.page_table().get(vpn)) {
            Some(entry) => entry.is_valid(),
            None => {
                warn!("Page {} is outside space {}", vpn, space.0);
                return Err(ExceptionType::BusError);
            }
        };

        if !resident {
            mmu.manager.emit(VmEvent::PageFault { space, vpn });
            debug!("Page fault on page {} of space {}", vpn, space.0);
            match mmu.manager.page_in(space, vpn, mmu.spaces) {
                Ok(page_in) => {
                    if let Some(evicted) = page_in.evicted {
                        if evicted.space == space {
                            self.forget(evicted.vpn);
                        }
                    }
                }
                Err(e) => {
                    error!("Cannot bring in page {} of space {}: {}", vpn, space.0, e);
                    return Err(ExceptionType::BusError);
                }
            }
        }

        let entry = mmu
            .spaces
            .get(space)
            .and_then(|s| s.page_table().get(vpn))
            .copied()
            .ok_or(ExceptionType::BusError)?;
        let slot = self.clock.select(&mut self.refs).index;
        self.tlb.install(slot, entry);
        mmu.manager.emit(VmEvent::TlbFill { slot, vpn });
        debug!("TLB slot {} now maps page {}", slot, vpn);
        Ok(slot)
    }
}

impl Translator for TlbTranslator {
    fn mode(&self) -> TranslationMode {
        TranslationMode::Tlb
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
        let space = mmu.current.ok_or(ExceptionType::BusError)?;
        let page_size = mmu.manager.page_size();
        let (vpn, offset) = split_address(vaddr, page_size);

        let slot = match self.tlb.lookup(vpn) {
            Some(slot) => {
                self.refs.mark(slot);
                mmu.manager.emit(VmEvent::TlbHit { vpn });
                slot
            }
            None => {
                mmu.manager.emit(VmEvent::TlbMiss { vpn });
                self.handle_miss(mmu, space, vpn)?
            }
        };

        let entry = self.tlb.entry(slot);
        if writing && entry.is_read_only() {
            return Err(ExceptionType::ReadOnly);
        }
        let frame = match entry.physical_page {
            Some(frame) if frame < mmu.manager.num_frames() => frame,
            _ => return Err(ExceptionType::BusError),
        };

        // Keep the page table in step with the TLB so nothing is lost when
        // the slot is reused.
        self.tlb.entry_mut(slot).touch(writing);
        if let Some(entry) = mmu
            .spaces
            .get_mut(space)
            .and_then(|s| s.page_table_mut().get_mut(vpn))
        {
            entry.touch(writing);
        }
        mmu.manager.mark_referenced(frame);

        let physical = frame * page_size + offset;
        trace!("Translated {:#x} to {:#x} through slot {}", vaddr, physical, slot);
        Ok(physical)
    }

    fn activate(&mut self, space: SpaceId) -> Result<(), VmError> {
        debug!("Switching TLB to space {}", space.0);
        self.flush();
        Ok(())
    }

    fn forget(&mut self, vpn: usize) {
        if let Some(slot) = self.tlb.invalidate_page(vpn) {
            self.refs.clear(slot);
        }
    }

    fn flush(&mut self) {
        self.tlb.invalidate_all();
        self.refs.clear_all();
        self.clock.reset();
    }

    fn tlb(&self) -> Option<&Tlb> {
        Some(&self.tlb)
    }
}
