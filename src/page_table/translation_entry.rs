use bitflags::bitflags;

bitflags! {
    pub struct EntryFlags: u8 {
        const VALID = 1 << 0;
        const READ_ONLY = 1 << 1;
        const USE = 1 << 2;
        const DIRTY = 1 << 3;
        /// The backing sector holds nothing yet; bring the page in as zeros.
        const ZERO_FILL = 1 << 4;
    }
}

/// Maps one virtual page to a physical frame (while resident) and to the
/// swap sector holding its content (while not).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationEntry {
    pub virtual_page: usize,
    pub physical_page: Option<usize>,
    pub swap_sector: Option<usize>,
    pub flags: EntryFlags,
}

impl TranslationEntry {
    pub fn new(virtual_page: usize) -> Self {
        TranslationEntry {
            virtual_page,
            physical_page: None,
            swap_sector: None,
            flags: EntryFlags::empty(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.flags.contains(EntryFlags::VALID)
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(EntryFlags::READ_ONLY)
    }

    pub fn is_used(&self) -> bool {
        self.flags.contains(EntryFlags::USE)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(EntryFlags::DIRTY)
    }

    pub fn needs_zero_fill(&self) -> bool {
        self.flags.contains(EntryFlags::ZERO_FILL)
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.flags.set(EntryFlags::READ_ONLY, read_only);
    }

    pub fn set_zero_fill(&mut self, zero_fill: bool) {
        self.flags.set(EntryFlags::ZERO_FILL, zero_fill);
    }

    /// Record an access: sets the use bit, and the dirty bit on writes.
    pub fn touch(&mut self, writing: bool) {
        self.flags.insert(EntryFlags::USE);
        if writing {
            self.flags.insert(EntryFlags::DIRTY);
        }
    }

    pub fn clear_dirty(&mut self) {
        self.flags.remove(EntryFlags::DIRTY);
    }

    /// Make the page resident in `frame`.
    pub fn map(&mut self, frame: usize) {
        self.physical_page = Some(frame);
        self.flags.insert(EntryFlags::VALID);
        self.flags.remove(EntryFlags::USE | EntryFlags::DIRTY);
    }

    /// Mark the page not resident. The caller is responsible for having
    /// saved dirty content first.
    pub fn unmap(&mut self) {
        self.physical_page = None;
        self.flags
            .remove(EntryFlags::VALID | EntryFlags::USE | EntryFlags::DIRTY);
    }

    /// Copy of this entry with no frame and no sector, keeping protection.
    pub fn detached(&self) -> Self {
        let mut entry = TranslationEntry::new(self.virtual_page);
        entry.set_read_only(self.is_read_only());
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_is_not_resident() {
        let entry = TranslationEntry::new(3);
        assert_eq!(entry.virtual_page, 3);
        assert!(!entry.is_valid());
        assert_eq!(entry.physical_page, None);
        assert_eq!(entry.swap_sector, None);
    }

    #[test]
    fn map_touch_unmap() {
        let mut entry = TranslationEntry::new(0);
        entry.map(7);
        assert!(entry.is_valid());
        assert_eq!(entry.physical_page, Some(7));
        entry.touch(false);
        assert!(entry.is_used());
        assert!(!entry.is_dirty());
        entry.touch(true);
        assert!(entry.is_dirty());
        entry.unmap();
        assert!(!entry.is_valid());
        assert!(!entry.is_dirty());
        assert_eq!(entry.physical_page, None);
    }

    #[test]
    fn detached_keeps_protection_only() {
        let mut entry = TranslationEntry::new(2);
        entry.swap_sector = Some(9);
        entry.set_read_only(true);
        entry.map(1);
        let copy = entry.detached();
        assert_eq!(copy.virtual_page, 2);
        assert!(copy.is_read_only());
        assert!(!copy.is_valid());
        assert_eq!(copy.swap_sector, None);
    }
}
