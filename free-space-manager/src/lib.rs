pub mod bitmap;

use log::{debug, trace};

pub use self::bitmap::Bitmap;

#[derive(Debug, PartialEq)]
pub enum FreeSpaceError {
    Full,
}

/// This struct is responsible for handing out fixed-size slots (physical
/// frames, swap sectors). It is implemented as a bitmap, where each bit
/// represents a slot; slots are handed out lowest index first.
#[derive(Debug, Clone)]
pub struct FreeSpaceManager {
    name: &'static str,
    bitmap: Bitmap,
}

impl FreeSpaceManager {
    pub fn init(name: &'static str, capacity: usize) -> FreeSpaceManager {
        FreeSpaceManager {
            name,
            bitmap: Bitmap::new(capacity),
        }
    }

    pub fn free_count(&self) -> usize {
        self.bitmap.num_clear()
    }

    pub fn is_allocated(&self, slot: usize) -> bool {
        slot < self.bitmap.len() && self.bitmap.test(slot)
    }

    pub fn allocate(&mut self) -> Result<usize, FreeSpaceError> {
        match self.bitmap.find() {
            Some(slot) => {
                trace!("{}: allocated slot {}", self.name, slot);
                Ok(slot)
            }
            None => {
                debug!("{}: no free slots", self.name);
                Err(FreeSpaceError::Full)
            }
        }
    }

    /// Panics if `slot` is not currently allocated: every slot has a single
    /// owner, so a second release is a bug in the caller.
    pub fn deallocate(&mut self, slot: usize) {
        if !self.is_allocated(slot) {
            panic!("{}: slot {} released while not in use", self.name, slot);
        }
        self.bitmap.clear(slot);
        trace!("{}: released slot {}", self.name, slot);
    }
}
