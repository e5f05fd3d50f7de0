use std::io::ErrorKind;

use disk::{Disk, DiskError};
use free_space_manager::{FreeSpaceError, FreeSpaceManager};
use log::{debug, info};

use crate::{error::VmError, sync::Semaphore};

/// Backing store for non-resident pages: one disk sector per page.
#[derive(Debug)]
pub struct SwapStore {
    disk: Disk,
    sectors: FreeSpaceManager,
    completion: Semaphore,
}

impl SwapStore {
    pub fn new(disk: Disk) -> Self {
        info!(
            "Swap on {}: {} sectors of {} bytes",
            disk.name(),
            disk.num_blocks(),
            disk.block_size()
        );
        let sectors = FreeSpaceManager::init("swap sectors", disk.num_blocks());
        Self {
            disk,
            sectors,
            completion: Semaphore::new(1),
        }
    }

    pub fn in_memory(sector_size: usize, num_sectors: usize) -> Self {
        Self::new(Disk::in_memory("swap", sector_size, num_sectors))
    }

    /// Swap kept in the image file `DISK_IMAGE_<name>`. An image of the same
    /// geometry is reused, anything else is replaced by a fresh one. Every
    /// sector starts out free either way.
    pub fn image(name: &str, sector_size: usize, num_sectors: usize) -> Result<Self, VmError> {
        let disk = match Disk::connect(name, sector_size, num_sectors) {
            Ok(disk) => disk,
            Err(DiskError::Io(ErrorKind::NotFound)) | Err(DiskError::HeaderMismatch) => {
                Disk::create(name, sector_size, num_sectors)?
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self::new(disk))
    }

    pub fn free_sectors(&self) -> usize {
        self.sectors.free_count()
    }

    pub fn is_reserved(&self, sector: usize) -> bool {
        self.sectors.is_allocated(sector)
    }

    pub fn reserve(&mut self) -> Result<usize, VmError> {
        self.sectors.allocate().map_err(|_: FreeSpaceError| {
            debug!("Swap is full");
            VmError::NoFreeSector
        })
    }

    pub fn release(&mut self, sector: usize) {
        self.sectors.deallocate(sector);
    }

    pub fn read_into(&self, sector: usize, buf: &mut [u8]) -> Result<(), DiskError> {
        self.completion.wait();
        let result = self.disk.read_block_into(sector, buf);
        self.completion.signal();
        result
    }

    pub fn write_from(&self, sector: usize, buf: &[u8]) -> Result<(), DiskError> {
        self.completion.wait();
        let result = self.disk.write_block(sector, buf);
        self.completion.signal();
        result
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{metadata, remove_file};

    use serial_test::serial;

    use super::*;

    #[test]
    fn reserve_until_full() {
        let mut swap = SwapStore::in_memory(16, 2);
        assert_eq!(swap.reserve(), Ok(0));
        assert_eq!(swap.reserve(), Ok(1));
        assert_eq!(swap.reserve(), Err(VmError::NoFreeSector));
        swap.release(0);
        assert_eq!(swap.free_sectors(), 1);
        assert!(!swap.is_reserved(0));
        assert_eq!(swap.reserve(), Ok(0));
    }

    #[test]
    #[serial]
    fn image_is_reused_or_replaced() {
        let path = disk::make_name("swap-store-image");
        let swap = SwapStore::image("swap-store-image", 8, 4).unwrap();
        swap.write_from(2, &[5; 8]).unwrap();
        drop(swap);

        // Same geometry: the old image is reattached.
        let mut swap = SwapStore::image("swap-store-image", 8, 4).unwrap();
        assert_eq!(swap.free_sectors(), 4);
        let mut buf = [0u8; 8];
        swap.read_into(2, &mut buf).unwrap();
        assert_eq!(buf, [5; 8]);
        assert_eq!(swap.reserve(), Ok(0));
        drop(swap);

        // Other geometry: a fresh image replaces it.
        let swap = SwapStore::image("swap-store-image", 16, 2).unwrap();
        assert_eq!(metadata(&path).unwrap().len(), 8 + 2 * 16);
        let mut buf = [1u8; 16];
        swap.read_into(0, &mut buf).unwrap();
        assert_eq!(buf, [0; 16]);
        drop(swap);
        remove_file(path).unwrap();
    }

    #[test]
    fn transfer_round_trip() {
        let swap = SwapStore::in_memory(8, 4);
        let page = [9u8; 8];
        swap.write_from(3, &page).unwrap();
        let mut buf = [0u8; 8];
        swap.read_into(3, &mut buf).unwrap();
        assert_eq!(buf, page);
        assert_eq!(swap.completion.value(), 1);
    }

    #[test]
    fn bad_transfers_are_reported() {
        let swap = SwapStore::in_memory(8, 1);
        assert_eq!(swap.write_from(1, &[0; 8]), Err(DiskError::OverCapacity));
        let mut short = [0u8; 4];
        assert_eq!(
            swap.read_into(0, &mut short),
            Err(DiskError::IncorrectBlockSize)
        );
        assert_eq!(swap.completion.value(), 1);
    }
}
