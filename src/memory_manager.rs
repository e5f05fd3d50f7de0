use free_space_manager::{Bitmap, FreeSpaceManager};
use log::{debug, error, info};
use memory::PhysicalMemory;

use crate::{
    address_space::{SpaceId, SpaceTable},
    config::MachineConfig,
    error::VmError,
    frame_table::{FrameOwner, FrameTable},
    page_table::{PageTable, TranslationEntry},
    replacement::Clock,
    stats::{Statistics, VmEvent, VmObserver},
    swap::SwapStore,
};

/// Result of bringing a page into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageIn {
    pub frame: usize,
    /// Page that was pushed out to make room, if any.
    pub evicted: Option<FrameOwner>,
}

/// Machine-wide paging state: main memory, the frame and swap allocators,
/// the frame reference bits with their clock, and the reverse frame index.
pub struct MemoryManager {
    memory: PhysicalMemory,
    frames: FreeSpaceManager,
    swap: SwapStore,
    mem_ref: Bitmap,
    clock: Clock,
    frame_table: FrameTable,
    stats: Statistics,
    observers: Vec<Box<dyn VmObserver + Send>>,
}

impl MemoryManager {
    pub fn new(config: &MachineConfig) -> Result<Self, VmError> {
        let swap = match &config.swap_image {
            Some(name) => SwapStore::image(name, config.page_size, config.swap_sectors)?,
            None => SwapStore::in_memory(config.page_size, config.swap_sectors),
        };
        info!(
            "Main memory: {} frames of {} bytes",
            config.num_frames, config.page_size
        );
        Ok(Self {
            memory: PhysicalMemory::new(config.page_size, config.num_frames),
            frames: FreeSpaceManager::init("frames", config.num_frames),
            swap,
            mem_ref: Bitmap::new(config.num_frames),
            clock: Clock::new(config.num_frames),
            frame_table: FrameTable::new(config.num_frames),
            stats: Statistics::default(),
            observers: Vec::new(),
        })
    }

    pub fn page_size(&self) -> usize {
        self.memory.page_size()
    }

    pub fn num_frames(&self) -> usize {
        self.memory.num_frames()
    }

    pub fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut PhysicalMemory {
        &mut self.memory
    }

    pub fn swap(&self) -> &SwapStore {
        &self.swap
    }

    pub fn free_frames(&self) -> usize {
        self.frames.free_count()
    }

    pub fn frame_table(&self) -> &FrameTable {
        &self.frame_table
    }

    pub fn is_referenced(&self, frame: usize) -> bool {
        self.mem_ref.test(frame)
    }

    pub fn mark_referenced(&mut self, frame: usize) {
        self.mem_ref.mark(frame);
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn add_observer(&mut self, observer: Box<dyn VmObserver + Send>) {
        self.observers.push(observer);
    }

    pub fn emit(&mut self, event: VmEvent) {
        self.stats.notify(&event);
        for observer in self.observers.iter_mut() {
            observer.notify(&event);
        }
    }

    /// A free frame, without evicting anything.
    pub fn allocate_frame(&mut self, owner: FrameOwner) -> Result<usize, VmError> {
        let frame = self.frames.allocate().map_err(|_| VmError::NoFreeFrame)?;
        self.frame_table.assign(frame, owner);
        Ok(frame)
    }

    pub fn release_frame(&mut self, frame: usize) {
        self.frame_table.release(frame);
        self.mem_ref.clear(frame);
        self.frames.deallocate(frame);
    }

    pub fn reserve_sector(&mut self) -> Result<usize, VmError> {
        self.swap.reserve()
    }

    pub fn release_sector(&mut self, sector: usize) {
        self.swap.release(sector);
    }

    pub fn read_sector(&mut self, sector: usize, buf: &mut [u8]) -> Result<(), VmError> {
        self.swap.read_into(sector, buf)?;
        self.emit(VmEvent::DiskRead { sector });
        Ok(())
    }

    pub fn write_sector(&mut self, sector: usize, buf: &[u8]) -> Result<(), VmError> {
        self.swap.write_from(sector, buf)?;
        self.emit(VmEvent::DiskWrite { sector });
        Ok(())
    }

    /// Current content of the page described by `entry`: the frame if it is
    /// resident, otherwise its sector. `None` means the page is all zeros.
    pub fn page_content(&mut self, entry: &TranslationEntry) -> Result<Option<Vec<u8>>, VmError> {
        if let (true, Some(frame)) = (entry.is_valid(), entry.physical_page) {
            return Ok(Some(self.memory.frame(frame)?.to_vec()));
        }
        match entry.swap_sector {
            Some(sector) if !entry.needs_zero_fill() => {
                let mut buf = vec![0; self.page_size()];
                self.read_sector(sector, &mut buf)?;
                Ok(Some(buf))
            }
            _ => Ok(None),
        }
    }

    /// Save a resident page to its sector if swap does not already hold its
    /// latest content. A page without a sector gets one here.
    fn save_page(&mut self, frame: usize, entry: &mut TranslationEntry) -> Result<(), VmError> {
        let sector = match entry.swap_sector {
            Some(_) if !entry.is_dirty() => return Ok(()),
            Some(sector) => sector,
            None => {
                let sector = self.reserve_sector()?;
                entry.swap_sector = Some(sector);
                sector
            }
        };
        self.swap.write_from(sector, self.memory.frame(frame)?)?;
        self.emit(VmEvent::DiskWrite { sector });
        self.emit(VmEvent::Writeback { sector });
        debug!(
            "Wrote back page {} from frame {} to sector {}",
            entry.virtual_page, frame, sector
        );
        entry.clear_dirty();
        entry.set_zero_fill(false);
        Ok(())
    }

    fn fill_from_swap(&mut self, frame: usize, sector: usize) -> Result<(), VmError> {
        let buf = self.memory.frame_mut(frame)?;
        self.swap.read_into(sector, buf)?;
        Ok(())
    }

    /// Give `owner` a frame, evicting another page when none is free.
    fn claim_frame(&mut self, owner: FrameOwner, spaces: &mut SpaceTable) -> Result<PageIn, VmError> {
        if let Ok(frame) = self.allocate_frame(owner) {
            return Ok(PageIn {
                frame,
                evicted: None,
            });
        }

        let frame = self.clock.select(&mut self.mem_ref).index;
        let evicted = self.frame_table.release(frame);
        if let Some(victim) = evicted {
            let entry = match spaces
                .get_mut(victim.space)
                .and_then(|space| space.page_table_mut().get_mut(victim.vpn))
            {
                Some(entry) => entry,
                None => {
                    self.frame_table.assign(frame, victim);
                    return Err(VmError::NoSuchSpace(victim.space.0));
                }
            };
            debug!(
                "Evicting page {} of space {} from frame {}",
                victim.vpn, victim.space.0, frame
            );
            if let Err(e) = self.save_page(frame, entry) {
                self.frame_table.assign(frame, victim);
                return Err(e);
            }
            entry.unmap();
            self.emit(VmEvent::Eviction {
                frame,
                owner: victim,
            });
        }
        self.frame_table.assign(frame, owner);
        Ok(PageIn { frame, evicted })
    }

    /// Make page `vpn` of `space` resident, filling its frame from swap or
    /// with zeros.
    pub fn page_in(&mut self, space: SpaceId, vpn: usize, spaces: &mut SpaceTable) -> Result<PageIn, VmError> {
        let entry = spaces
            .get(space)
            .and_then(|s| s.page_table().get(vpn))
            .copied()
            .ok_or(VmError::NoSuchSpace(space.0))?;
        debug_assert!(!entry.is_valid());

        let page_in = self.claim_frame(FrameOwner { space, vpn }, spaces)?;
        let frame = page_in.frame;
        let filled = match entry.swap_sector {
            Some(sector) if !entry.needs_zero_fill() => {
                self.fill_from_swap(frame, sector).map(|_| Some(sector))
            }
            _ => self.memory.zero_frame(frame).map(|_| None).map_err(VmError::from),
        };
        match filled {
            Ok(Some(sector)) => self.emit(VmEvent::DiskRead { sector }),
            Ok(None) => {}
            Err(e) => {
                error!("Cannot fill frame {} for page {}: {}", frame, vpn, e);
                self.release_frame(frame);
                return Err(e);
            }
        }

        if let Some(entry) = spaces
            .get_mut(space)
            .and_then(|s| s.page_table_mut().get_mut(vpn))
        {
            entry.map(frame);
        }
        debug!("Page {} of space {} is in frame {}", vpn, space.0, frame);
        Ok(page_in)
    }

    /// Push every resident page of `table` out to swap and free its frame.
    pub fn flush_table(&mut self, table: &mut PageTable) -> Result<(), VmError> {
        for entry in table.iter_mut() {
            if let (true, Some(frame)) = (entry.is_valid(), entry.physical_page) {
                self.save_page(frame, entry)?;
                self.release_frame(frame);
                entry.unmap();
            }
        }
        Ok(())
    }

    /// Free every frame and sector `table` holds.
    pub fn release_table(&mut self, table: &mut PageTable) {
        for entry in table.iter_mut() {
            if let (true, Some(frame)) = (entry.is_valid(), entry.physical_page) {
                self.release_frame(frame);
            }
            entry.unmap();
            if let Some(sector) = entry.swap_sector.take() {
                self.release_sector(sector);
            }
        }
    }
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("free_frames", &self.frames.free_count())
            .field("free_sectors", &self.swap.free_sectors())
            .field("clock", &self.clock)
            .field("stats", &self.stats)
            .finish()
    }
}
