use log::{info, warn};
use memory::PhysicalMemory;

use crate::{
    address_space::{AddressSpace, SpaceId, SpaceTable},
    config::{MachineConfig, TranslationMode},
    error::{ExceptionType, VmError},
    executable::Executable,
    memory_manager::MemoryManager,
    registers::{RegisterFile, Registers, BAD_VADDR_REG},
    stats::{Statistics, VmEvent, VmObserver},
    swap::SwapStore,
    tlb::Tlb,
    translate::{split_address, AccessSize, LinearTranslator, Mmu, TlbTranslator, Translator},
};

type ExceptionHandler = Box<dyn FnMut(ExceptionType, u32) + Send>;

/// The simulated machine as seen by the memory subsystem. Holding
/// `&mut Machine` is the critical section; share it across host threads
/// with `Arc<Mutex<Machine>>`.
pub struct Machine {
    config: MachineConfig,
    manager: MemoryManager,
    spaces: SpaceTable,
    current: Option<SpaceId>,
    translator: Box<dyn Translator>,
    registers: RegisterFile,
    handler: Option<ExceptionHandler>,
}

impl Machine {
    pub fn new(config: MachineConfig) -> Result<Self, VmError> {
        config.validate()?;
        let translator: Box<dyn Translator> = match config.translation {
            TranslationMode::Linear => Box::new(LinearTranslator::new()),
            TranslationMode::Tlb => Box::new(TlbTranslator::new(config.tlb_size)),
        };
        let manager = MemoryManager::new(&config)?;
        info!(
            "Machine up: {:?} translation, {:?} loading",
            config.translation, config.loading
        );
        Ok(Self {
            config,
            manager,
            spaces: SpaceTable::new(),
            current: None,
            translator,
            registers: RegisterFile::new(),
            handler: None,
        })
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn set_exception_handler<F>(&mut self, handler: F)
    where
        F: FnMut(ExceptionType, u32) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    pub fn add_observer(&mut self, observer: Box<dyn VmObserver + Send>) {
        self.manager.add_observer(observer);
    }

    pub fn load<E: Executable + ?Sized>(&mut self, executable: &E) -> Result<SpaceId, VmError> {
        let id = self.spaces.next_id();
        let space = AddressSpace::load(id, executable, &mut self.manager, &self.config)?;
        self.spaces.insert(id, space);
        Ok(id)
    }

    pub fn fork(&mut self, source: SpaceId) -> Result<SpaceId, VmError> {
        let id = self.spaces.next_id();
        let parent = self.spaces.get(source).ok_or(VmError::NoSuchSpace(source.0))?;
        let child = AddressSpace::fork(id, parent, &mut self.manager, &self.config)?;
        self.spaces.insert(id, child);
        Ok(id)
    }

    pub fn destroy(&mut self, id: SpaceId) -> Result<(), VmError> {
        let space = self.spaces.remove(id).ok_or(VmError::NoSuchSpace(id.0))?;
        if self.current == Some(id) {
            self.translator.flush();
            self.current = None;
        }
        space.destroy(&mut self.manager);
        info!("Destroyed space {}", id.0);
        Ok(())
    }

    /// Context switch onto `id`.
    pub fn switch_to(&mut self, id: SpaceId) -> Result<(), VmError> {
        let space = self.spaces.get_mut(id).ok_or(VmError::NoSuchSpace(id.0))?;
        self.translator.activate(id)?;
        space.restore_state(&mut self.manager, self.config.translation)?;
        self.current = Some(id);
        Ok(())
    }

    pub fn init_registers(&mut self, id: SpaceId) -> Result<(), VmError> {
        let space = self.spaces.get(id).ok_or(VmError::NoSuchSpace(id.0))?;
        space.init_registers(&mut self.registers, self.config.page_size)
    }

    pub fn current_space(&self) -> Option<SpaceId> {
        self.current
    }

    pub fn space(&self, id: SpaceId) -> Option<&AddressSpace> {
        self.spaces.get(id)
    }

    pub fn spaces(&self) -> &SpaceTable {
        &self.spaces
    }

    fn raise(&mut self, kind: ExceptionType, vaddr: u32) {
        warn!("{} at virtual address {:#x}", kind, vaddr);
        self.registers.write_register(BAD_VADDR_REG, vaddr);
        self.manager.emit(VmEvent::Exception {
            kind,
            address: vaddr,
        });
        if let Some(handler) = self.handler.as_mut() {
            handler(kind, vaddr);
        }
    }

    /// Translate an access of `size` at `vaddr` in the current space. On
    /// failure the exception is raised before it is returned.
    pub fn translate(&mut self, vaddr: u32, size: AccessSize, writing: bool) -> Result<usize, ExceptionType> {
        let mut mmu = Mmu {
            manager: &mut self.manager,
            spaces: &mut self.spaces,
            current: self.current,
        };
        let result = self.translator.translate(&mut mmu, vaddr, size, writing);
        if let Err(kind) = result {
            self.raise(kind, vaddr);
        }
        result
    }

    pub fn read_mem(&mut self, vaddr: u32, size: AccessSize) -> Result<u32, ExceptionType> {
        let physical = self.translate(vaddr, size, false)?;
        let memory = self.manager.memory();
        let value = match size {
            AccessSize::Byte => memory.read_u8(physical).map(u32::from),
            AccessSize::Half => memory.read_u16(physical).map(u32::from),
            AccessSize::Word => memory.read_u32(physical),
        };
        value.map_err(|_| ExceptionType::BusError)
    }

    pub fn write_mem(&mut self, vaddr: u32, size: AccessSize, value: u32) -> Result<(), ExceptionType> {
        let physical = self.translate(vaddr, size, true)?;
        let memory = self.manager.memory_mut();
        let written = match size {
            AccessSize::Byte => memory.write_u8(physical, value as u8),
            AccessSize::Half => memory.write_u16(physical, value as u16),
            AccessSize::Word => memory.write_u32(physical, value),
        };
        written.map_err(|_| ExceptionType::BusError)
    }

    /// Bring in the page holding `vaddr` after a linear translation
    /// reported a page fault.
    pub fn service_page_fault(&mut self, vaddr: u32) -> Result<(), VmError> {
        let id = self.current.ok_or(VmError::NoCurrentSpace)?;
        let (vpn, _) = split_address(vaddr, self.config.page_size);
        let resident = self
            .spaces
            .get(id)
            .and_then(|s| s.page_table().get(vpn))
            .map(|entry| entry.is_valid())
            .ok_or(VmError::BadAddress(vaddr))?;
        if resident {
            return Ok(());
        }
        self.manager.emit(VmEvent::PageFault { space: id, vpn });
        let page_in = self.manager.page_in(id, vpn, &mut self.spaces)?;
        if let Some(evicted) = page_in.evicted {
            if evicted.space == id {
                self.translator.forget(evicted.vpn);
            }
        }
        Ok(())
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    pub fn memory(&self) -> &PhysicalMemory {
        self.manager.memory()
    }

    pub fn memory_manager(&self) -> &MemoryManager {
        &self.manager
    }

    pub fn swap(&self) -> &SwapStore {
        self.manager.swap()
    }

    pub fn tlb(&self) -> Option<&Tlb> {
        self.translator.tlb()
    }

    pub fn stats(&self) -> &Statistics {
        self.manager.stats()
    }
}
