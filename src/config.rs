use std::fmt;

/// How virtual addresses are turned into physical ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationMode {
    /// The virtual page number indexes the current page table directly.
    Linear,
    /// A software managed TLB caches the current page table.
    Tlb,
}

/// When address space pages get physical frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingMode {
    /// Every page is given a frame and filled when the space is built.
    Eager,
    /// Pages live in swap until first touched.
    Demand,
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    ZeroCapacity(&'static str),
    PageSizeNotPowerOfTwo(usize),
    TlbNeedsDemandPaging,
    StackTooSmall(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroCapacity(what) => write!(f, "{} must be greater than zero", what),
            ConfigError::PageSizeNotPowerOfTwo(size) => {
                write!(f, "page size {} is not a power of two (minimum 4)", size)
            }
            ConfigError::TlbNeedsDemandPaging => {
                write!(f, "TLB translation requires demand loading (a swap backing store)")
            }
            ConfigError::StackTooSmall(size) => {
                write!(f, "user stack of {} bytes leaves no room below the stack top", size)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Machine geometry and paging policy. The defaults are those of the
/// classic teaching machine: 128 byte pages, 32 frames, a 4 entry TLB and
/// 64 swap sectors.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineConfig {
    pub page_size: usize,
    pub num_frames: usize,
    pub tlb_size: usize,
    pub swap_sectors: usize,
    pub user_stack_size: usize,
    pub translation: TranslationMode,
    pub loading: LoadingMode,
    /// Map pages holding only code read-only.
    pub read_only_code: bool,
    /// Back swap with the image file `DISK_IMAGE_<name>` instead of host memory.
    pub swap_image: Option<String>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            page_size: 128,
            num_frames: 32,
            tlb_size: 4,
            swap_sectors: 64,
            user_stack_size: 1024,
            translation: TranslationMode::Tlb,
            loading: LoadingMode::Demand,
            read_only_code: false,
            swap_image: None,
        }
    }
}

impl MachineConfig {
    /// A machine without virtual memory: linear page table, every page
    /// resident from the start.
    pub fn linear() -> Self {
        Self {
            translation: TranslationMode::Linear,
            loading: LoadingMode::Eager,
            ..Self::default()
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_frames(mut self, num_frames: usize) -> Self {
        self.num_frames = num_frames;
        self
    }

    pub fn with_tlb_size(mut self, tlb_size: usize) -> Self {
        self.tlb_size = tlb_size;
        self
    }

    pub fn with_swap_sectors(mut self, swap_sectors: usize) -> Self {
        self.swap_sectors = swap_sectors;
        self
    }

    pub fn with_user_stack_size(mut self, user_stack_size: usize) -> Self {
        self.user_stack_size = user_stack_size;
        self
    }

    pub fn with_translation(mut self, translation: TranslationMode) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_loading(mut self, loading: LoadingMode) -> Self {
        self.loading = loading;
        self
    }

    pub fn with_read_only_code(mut self, read_only_code: bool) -> Self {
        self.read_only_code = read_only_code;
        self
    }

    pub fn with_swap_image(mut self, name: &str) -> Self {
        self.swap_image = Some(String::from(name));
        self
    }

    pub fn stack_pages(&self) -> usize {
        div_round_up(self.user_stack_size, self.page_size)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size < 4 || !self.page_size.is_power_of_two() {
            return Err(ConfigError::PageSizeNotPowerOfTwo(self.page_size));
        }
        if self.user_stack_size == 0 {
            return Err(ConfigError::ZeroCapacity("user stack size"));
        }
        // The stack pointer starts 16 bytes below the top of the space.
        if self.stack_pages() * self.page_size < 16 {
            return Err(ConfigError::StackTooSmall(self.user_stack_size));
        }
        if self.num_frames == 0 {
            return Err(ConfigError::ZeroCapacity("number of frames"));
        }
        if self.translation == TranslationMode::Tlb && self.tlb_size == 0 {
            return Err(ConfigError::ZeroCapacity("TLB size"));
        }
        if self.loading == LoadingMode::Demand && self.swap_sectors == 0 {
            return Err(ConfigError::ZeroCapacity("number of swap sectors"));
        }
        if self.translation == TranslationMode::Tlb && self.loading == LoadingMode::Eager {
            return Err(ConfigError::TlbNeedsDemandPaging);
        }
        Ok(())
    }
}

pub fn div_round_up(n: usize, size: usize) -> usize {
    (n + size - 1) / size
}
