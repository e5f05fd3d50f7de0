use log::{debug, info};

use crate::{
    config::{div_round_up, LoadingMode, MachineConfig, TranslationMode},
    error::VmError,
    executable::Executable,
    frame_table::FrameOwner,
    memory_manager::MemoryManager,
    noff::{NoffHeader, Segment},
    page_table::{PageTable, TranslationEntry},
    registers::{Registers, NEXT_PC_REG, NUM_TOTAL_REGS, PC_REG, STACK_REG},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(pub usize);

/// A run of consecutive virtual pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRange {
    pub start: usize,
    pub count: usize,
}

impl PageRange {
    pub fn end(&self) -> usize {
        self.start + self.count
    }

    pub fn contains(&self, vpn: usize) -> bool {
        vpn >= self.start && vpn < self.end()
    }
}

/// Where each segment lives. Every segment starts on a page boundary, in
/// the order code, initialized data, uninitialized data, stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentLayout {
    pub code: PageRange,
    pub init_data: PageRange,
    pub uninit_data: PageRange,
    pub stack: PageRange,
}

impl SegmentLayout {
    pub fn new(header: &NoffHeader, page_size: usize, stack_size: usize) -> Self {
        let code = PageRange {
            start: 0,
            count: div_round_up(header.code.size as usize, page_size),
        };
        let init_data = PageRange {
            start: code.end(),
            count: div_round_up(header.init_data.size as usize, page_size),
        };
        let uninit_data = PageRange {
            start: init_data.end(),
            count: div_round_up(header.uninit_data.size as usize, page_size),
        };
        let stack = PageRange {
            start: uninit_data.end(),
            count: div_round_up(stack_size, page_size),
        };
        Self {
            code,
            init_data,
            uninit_data,
            stack,
        }
    }

    pub fn num_pages(&self) -> usize {
        self.stack.end()
    }
}

/// One user program's memory image.
#[derive(Debug)]
pub struct AddressSpace {
    page_table: PageTable,
    layout: SegmentLayout,
}

/// Read page `page` of `segment` into `buf`; bytes past the end of the
/// segment stay zero.
fn read_segment_page<E: Executable + ?Sized>(
    executable: &E,
    segment: &Segment,
    page: usize,
    buf: &mut [u8],
) -> Result<(), VmError> {
    let page_size = buf.len();
    let offset = page * page_size;
    let len = page_size.min(segment.size as usize - offset);
    buf.fill(0);
    let read = executable.read_at(&mut buf[..len], segment.in_file_addr as usize + offset);
    if read < len {
        return Err(VmError::Truncated);
    }
    Ok(())
}

/// Give page `vpn` its backing: a frame under eager loading, a swap sector
/// under demand loading. `content` of `None` means zeros.
fn back_page(
    manager: &mut MemoryManager,
    table: &mut PageTable,
    owner: FrameOwner,
    content: Option<&[u8]>,
    loading: LoadingMode,
) -> Result<(), VmError> {
    let vpn = owner.vpn;
    match loading {
        LoadingMode::Eager => {
            let frame = manager.allocate_frame(owner)?;
            let filled = match content {
                Some(bytes) => manager
                    .memory_mut()
                    .frame_mut(frame)
                    .map(|buf| buf.copy_from_slice(bytes)),
                None => manager.memory_mut().zero_frame(frame),
            };
            if let Err(e) = filled {
                manager.release_frame(frame);
                return Err(e.into());
            }
            if let Some(entry) = table.get_mut(vpn) {
                entry.map(frame);
            }
        }
        LoadingMode::Demand => {
            let sector = manager.reserve_sector()?;
            if let Some(entry) = table.get_mut(vpn) {
                entry.swap_sector = Some(sector);
                entry.set_zero_fill(content.is_none());
            }
            if let Some(bytes) = content {
                manager.write_sector(sector, bytes)?;
            }
        }
    }
    Ok(())
}

/// Refuse a space of `pages` pages up front when the backing store cannot
/// hold it, before any table is built.
fn check_capacity(manager: &MemoryManager, pages: usize, loading: LoadingMode) -> Result<(), VmError> {
    match loading {
        LoadingMode::Eager if pages > manager.free_frames() => Err(VmError::NoFreeFrame),
        LoadingMode::Demand if pages > manager.swap().free_sectors() => Err(VmError::NoFreeSector),
        _ => Ok(()),
    }
}

impl AddressSpace {
    /// Build the address space for a NOFF `executable`.
    pub fn load<E: Executable + ?Sized>(
        id: SpaceId,
        executable: &E,
        manager: &mut MemoryManager,
        config: &MachineConfig,
    ) -> Result<Self, VmError> {
        let header = NoffHeader::read(executable)?;
        let layout = SegmentLayout::new(&header, config.page_size, config.user_stack_size);
        info!(
            "Loading space {}: {} pages (code {}, data {}, bss {}, stack {})",
            id.0,
            layout.num_pages(),
            layout.code.count,
            layout.init_data.count,
            layout.uninit_data.count,
            layout.stack.count
        );
        check_capacity(manager, layout.num_pages(), config.loading)?;

        let mut table = PageTable::init(layout.num_pages());
        if config.read_only_code {
            for vpn in layout.code.start..layout.code.end() {
                if let Some(entry) = table.get_mut(vpn) {
                    entry.set_read_only(true);
                }
            }
        }

        let mut buf = vec![0; config.page_size];
        for vpn in 0..layout.num_pages() {
            let segment = if layout.code.contains(vpn) {
                Some((&header.code, vpn - layout.code.start))
            } else if layout.init_data.contains(vpn) {
                Some((&header.init_data, vpn - layout.init_data.start))
            } else {
                None
            };
            let owner = FrameOwner { space: id, vpn };
            let result = match segment {
                Some((segment, page)) => read_segment_page(executable, segment, page, &mut buf)
                    .and_then(|_| back_page(manager, &mut table, owner, Some(buf.as_slice()), config.loading)),
                None => back_page(manager, &mut table, owner, None, config.loading),
            };
            if let Err(e) = result {
                debug!("Loading space {} failed at page {}: {}", id.0, vpn, e);
                manager.release_table(&mut table);
                return Err(e);
            }
        }

        Ok(Self {
            page_table: table,
            layout,
        })
    }

    /// Copy of `source` that shares no storage with it, plus a fresh stack.
    pub fn fork(
        id: SpaceId,
        source: &AddressSpace,
        manager: &mut MemoryManager,
        config: &MachineConfig,
    ) -> Result<Self, VmError> {
        let stack = PageRange {
            start: source.num_pages(),
            count: config.stack_pages(),
        };
        let layout = SegmentLayout {
            stack,
            ..source.layout
        };
        info!(
            "Forking space {} ({} pages) with a {} page stack",
            id.0,
            source.num_pages(),
            stack.count
        );
        check_capacity(manager, layout.num_pages(), config.loading)?;

        let mut table = PageTable::default();
        for entry in source.page_table.iter() {
            table.push(entry.detached());
        }
        for _ in 0..stack.count {
            table.push(TranslationEntry::new(0));
        }

        for vpn in 0..layout.num_pages() {
            let result = match source.page_table.get(vpn) {
                Some(entry) => manager.page_content(entry),
                None => Ok(None),
            }
            .and_then(|content| {
                back_page(
                    manager,
                    &mut table,
                    FrameOwner { space: id, vpn },
                    content.as_deref(),
                    config.loading,
                )
            });
            if let Err(e) = result {
                debug!("Forking space {} failed at page {}: {}", id.0, vpn, e);
                manager.release_table(&mut table);
                return Err(e);
            }
        }

        Ok(Self {
            page_table: table,
            layout,
        })
    }

    /// Release every frame and sector this space holds.
    pub fn destroy(mut self, manager: &mut MemoryManager) {
        manager.release_table(&mut self.page_table);
    }

    pub fn num_pages(&self) -> usize {
        self.page_table.len()
    }

    pub fn layout(&self) -> &SegmentLayout {
        &self.layout
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub fn page_table_mut(&mut self) -> &mut PageTable {
        &mut self.page_table
    }

    pub fn init_registers(&self, registers: &mut dyn Registers, page_size: usize) -> Result<(), VmError> {
        let stack_top = self
            .num_pages()
            .checked_mul(page_size)
            .and_then(|size| size.checked_sub(16))
            .ok_or(VmError::SpaceTooLarge(self.num_pages()))
            .and_then(|top| u32::try_from(top).map_err(|_| VmError::SpaceTooLarge(self.num_pages())))?;
        for num in 0..NUM_TOTAL_REGS {
            registers.write_register(num, 0);
        }
        registers.write_register(PC_REG, 0);
        // Branch delay slot.
        registers.write_register(NEXT_PC_REG, 4);
        registers.write_register(STACK_REG, stack_top);
        debug!("Initializing stack register to {}", stack_top);
        Ok(())
    }

    /// Context switch onto this space. Under TLB translation every page
    /// is pushed out so the first touch after the switch faults.
    pub fn restore_state(&mut self, manager: &mut MemoryManager, mode: TranslationMode) -> Result<(), VmError> {
        match mode {
            TranslationMode::Linear => Ok(()),
            TranslationMode::Tlb => manager.flush_table(&mut self.page_table),
        }
    }

    pub fn dump_page_table(&self) -> String {
        self.page_table.to_string()
    }
}

/// Live address spaces, indexed by id. Ids of destroyed spaces are reused.
#[derive(Debug, Default)]
pub struct SpaceTable {
    spaces: Vec<Option<AddressSpace>>,
}

impl SpaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next inserted space will get.
    pub fn next_id(&self) -> SpaceId {
        let index = self
            .spaces
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.spaces.len());
        SpaceId(index)
    }

    pub fn insert(&mut self, id: SpaceId, space: AddressSpace) {
        if id.0 >= self.spaces.len() {
            self.spaces.resize_with(id.0 + 1, || None);
        }
        assert!(self.spaces[id.0].is_none(), "Space {} already exists", id.0);
        self.spaces[id.0] = Some(space);
    }

    pub fn get(&self, id: SpaceId) -> Option<&AddressSpace> {
        self.spaces.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: SpaceId) -> Option<&mut AddressSpace> {
        self.spaces.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn remove(&mut self, id: SpaceId) -> Option<AddressSpace> {
        self.spaces.get_mut(id.0).and_then(Option::take)
    }

    pub fn len(&self) -> usize {
        self.spaces.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> impl Iterator<Item = SpaceId> + '_ {
        self.spaces
            .iter()
            .enumerate()
            .filter(|(_, space)| space.is_some())
            .map(|(index, _)| SpaceId(index))
    }
}

#[cfg(test)]
mod tests {
    use crate::{noff::NoffBuilder, registers::RegisterFile};

    use super::*;

    fn demand_config() -> MachineConfig {
        MachineConfig::default()
            .with_frames(4)
            .with_swap_sectors(16)
            .with_user_stack_size(256)
    }

    fn program() -> Vec<u8> {
        NoffBuilder::new()
            .code(&[0x11; 128])
            .init_data(&[0x22; 100])
            .uninit_data(128)
            .build()
    }

    #[test]
    fn layout_gives_each_segment_its_pages() {
        let header = NoffHeader::read(&program()).unwrap();
        let layout = SegmentLayout::new(&header, 128, 256);
        assert_eq!(layout.code, PageRange { start: 0, count: 1 });
        assert_eq!(layout.init_data, PageRange { start: 1, count: 1 });
        assert_eq!(layout.uninit_data, PageRange { start: 2, count: 1 });
        assert_eq!(layout.stack, PageRange { start: 3, count: 2 });
        assert_eq!(layout.num_pages(), 5);
    }

    #[test]
    fn demand_load_writes_swap_only() {
        let config = demand_config();
        let mut manager = MemoryManager::new(&config).unwrap();
        let space = AddressSpace::load(SpaceId(0), &program(), &mut manager, &config).unwrap();

        assert_eq!(space.num_pages(), 5);
        assert_eq!(manager.free_frames(), 4);
        assert_eq!(manager.swap().free_sectors(), 11);
        for entry in space.page_table().iter() {
            assert!(!entry.is_valid());
            assert!(entry.swap_sector.is_some());
        }
        let code = space.page_table().get(0).unwrap();
        assert!(!code.needs_zero_fill());
        let mut buf = vec![0; 128];
        manager
            .swap()
            .read_into(code.swap_sector.unwrap(), &mut buf)
            .unwrap();
        assert!(buf.iter().all(|b| *b == 0x11));

        // Only the first 100 bytes of the data page come from the file.
        let data = space.page_table().get(1).unwrap();
        manager
            .swap()
            .read_into(data.swap_sector.unwrap(), &mut buf)
            .unwrap();
        assert!(buf[..100].iter().all(|b| *b == 0x22));
        assert!(buf[100..].iter().all(|b| *b == 0));

        assert!(space.page_table().get(2).unwrap().needs_zero_fill());
        assert!(space.page_table().get(4).unwrap().needs_zero_fill());
        assert_eq!(manager.stats().num_disk_writes, 2);
    }

    #[test]
    fn eager_load_fills_frames() {
        let config = MachineConfig::linear().with_frames(8).with_user_stack_size(256);
        let mut manager = MemoryManager::new(&config).unwrap();
        let space = AddressSpace::load(SpaceId(0), &program(), &mut manager, &config).unwrap();

        assert_eq!(manager.free_frames(), 3);
        for entry in space.page_table().iter() {
            assert!(entry.is_valid());
            assert_eq!(entry.swap_sector, None);
        }
        let code_frame = space.page_table().get_frame(0).unwrap();
        assert!(manager.memory().frame(code_frame).unwrap().iter().all(|b| *b == 0x11));
        let stack_frame = space.page_table().get_frame(4).unwrap();
        assert!(manager.memory().frame(stack_frame).unwrap().iter().all(|b| *b == 0));
        assert_eq!(
            manager.frame_table().owner(code_frame),
            Some(FrameOwner {
                space: SpaceId(0),
                vpn: 0
            })
        );
    }

    #[test]
    fn eager_load_without_enough_frames_releases_everything() {
        let config = MachineConfig::linear().with_frames(4).with_user_stack_size(256);
        let mut manager = MemoryManager::new(&config).unwrap();
        let result = AddressSpace::load(SpaceId(0), &program(), &mut manager, &config);
        assert_eq!(result.err(), Some(VmError::NoFreeFrame));
        assert_eq!(manager.free_frames(), 4);
    }

    #[test]
    fn demand_load_without_enough_sectors_releases_everything() {
        let config = demand_config().with_swap_sectors(3);
        let mut manager = MemoryManager::new(&config).unwrap();
        let result = AddressSpace::load(SpaceId(0), &program(), &mut manager, &config);
        assert_eq!(result.err(), Some(VmError::NoFreeSector));
        assert_eq!(manager.swap().free_sectors(), 3);
    }

    #[test]
    fn truncated_executable() {
        let config = demand_config();
        let mut manager = MemoryManager::new(&config).unwrap();
        let mut image = program();
        image.truncate(image.len() - 10);
        let result = AddressSpace::load(SpaceId(0), &image, &mut manager, &config);
        assert_eq!(result.err(), Some(VmError::Truncated));
        assert_eq!(manager.swap().free_sectors(), 16);
    }

    #[test]
    fn read_only_code_pages() {
        let config = demand_config().with_read_only_code(true);
        let mut manager = MemoryManager::new(&config).unwrap();
        let space = AddressSpace::load(SpaceId(0), &program(), &mut manager, &config).unwrap();
        assert!(space.page_table().get(0).unwrap().is_read_only());
        assert!(!space.page_table().get(1).unwrap().is_read_only());
    }

    #[test]
    fn fork_copies_and_adds_stack() {
        let config = demand_config().with_swap_sectors(32);
        let mut manager = MemoryManager::new(&config).unwrap();
        let source = AddressSpace::load(SpaceId(0), &program(), &mut manager, &config).unwrap();
        let child = AddressSpace::fork(SpaceId(1), &source, &mut manager, &config).unwrap();

        assert_eq!(child.num_pages(), 7);
        assert_eq!(child.layout().stack, PageRange { start: 5, count: 2 });
        assert_eq!(manager.swap().free_sectors(), 32 - 12);
        for vpn in 0..source.num_pages() {
            let parent = source.page_table().get(vpn).unwrap();
            let copy = child.page_table().get(vpn).unwrap();
            assert_ne!(parent.swap_sector, copy.swap_sector);
            assert_eq!(parent.needs_zero_fill(), copy.needs_zero_fill());
        }
        let mut buf = vec![0; 128];
        let sector = child.page_table().get(0).unwrap().swap_sector.unwrap();
        manager.swap().read_into(sector, &mut buf).unwrap();
        assert!(buf.iter().all(|b| *b == 0x11));
    }

    #[test]
    fn destroy_releases_sectors() {
        let config = demand_config();
        let mut manager = MemoryManager::new(&config).unwrap();
        let space = AddressSpace::load(SpaceId(0), &program(), &mut manager, &config).unwrap();
        space.destroy(&mut manager);
        assert_eq!(manager.swap().free_sectors(), 16);
        assert_eq!(manager.free_frames(), 4);
    }

    #[test]
    fn registers_start_at_entry_point() {
        let config = demand_config();
        let mut manager = MemoryManager::new(&config).unwrap();
        let space = AddressSpace::load(SpaceId(0), &program(), &mut manager, &config).unwrap();
        let mut registers = RegisterFile::new();
        registers.write_register(7, 99);
        space.init_registers(&mut registers, config.page_size).unwrap();
        assert_eq!(registers.read_register(7), 0);
        assert_eq!(registers.read_register(PC_REG), 0);
        assert_eq!(registers.read_register(NEXT_PC_REG), 4);
        assert_eq!(registers.read_register(STACK_REG), 5 * 128 - 16);
    }

    #[test]
    fn registers_of_a_space_below_the_stack_frame() {
        // Built by hand: a validated config never produces such a space.
        let space = AddressSpace {
            page_table: PageTable::init(1),
            layout: SegmentLayout::default(),
        };
        let mut registers = RegisterFile::new();
        registers.write_register(7, 99);
        assert_eq!(
            space.init_registers(&mut registers, 8),
            Err(VmError::SpaceTooLarge(1))
        );
        assert_eq!(registers.read_register(7), 99);
    }

    #[test]
    fn stack_top_must_fit_a_register() {
        let space = AddressSpace {
            page_table: PageTable::init(2),
            layout: SegmentLayout::default(),
        };
        let mut registers = RegisterFile::new();
        assert_eq!(
            space.init_registers(&mut registers, usize::MAX),
            Err(VmError::SpaceTooLarge(2))
        );
    }

    #[test]
    fn oversized_segment_is_refused_before_building_the_table() {
        let image = NoffBuilder::new()
            .code(&[0x11; 128])
            .uninit_data(0xFFFF_FF00)
            .build();

        let config = demand_config();
        let mut manager = MemoryManager::new(&config).unwrap();
        let result = AddressSpace::load(SpaceId(0), &image, &mut manager, &config);
        assert_eq!(result.err(), Some(VmError::NoFreeSector));
        assert_eq!(manager.swap().free_sectors(), 16);
        assert_eq!(manager.stats().num_disk_writes, 0);

        let config = MachineConfig::linear().with_frames(8).with_user_stack_size(256);
        let mut manager = MemoryManager::new(&config).unwrap();
        let result = AddressSpace::load(SpaceId(0), &image, &mut manager, &config);
        assert_eq!(result.err(), Some(VmError::NoFreeFrame));
        assert_eq!(manager.free_frames(), 8);
    }

    #[test]
    fn fork_without_room_takes_nothing() {
        let config = demand_config();
        let mut manager = MemoryManager::new(&config).unwrap();
        let source = AddressSpace::load(SpaceId(0), &program(), &mut manager, &config).unwrap();
        // 11 sectors left, the child needs 7.
        let first = AddressSpace::fork(SpaceId(1), &source, &mut manager, &config).unwrap();
        assert_eq!(manager.swap().free_sectors(), 4);
        let result = AddressSpace::fork(SpaceId(2), &source, &mut manager, &config);
        assert_eq!(result.err(), Some(VmError::NoFreeSector));
        assert_eq!(manager.swap().free_sectors(), 4);
        first.destroy(&mut manager);
        assert_eq!(manager.swap().free_sectors(), 11);
    }

    #[test]
    fn space_ids_are_reused() {
        let config = demand_config();
        let mut manager = MemoryManager::new(&config).unwrap();
        let mut spaces = SpaceTable::new();
        assert_eq!(spaces.next_id(), SpaceId(0));
        for id in [SpaceId(0), SpaceId(1)] {
            let space = AddressSpace::load(id, &program(), &mut manager, &config).unwrap();
            spaces.insert(id, space);
        }
        assert_eq!(spaces.len(), 2);
        assert!(spaces.remove(SpaceId(0)).is_some());
        assert_eq!(spaces.next_id(), SpaceId(0));
        assert_eq!(spaces.ids().collect::<Vec<_>>(), vec![SpaceId(1)]);
    }
}
