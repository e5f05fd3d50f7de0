use crate::page_table::TranslationEntry;

/// Translation lookaside buffer. Caches entries of the current address
/// space only, so it is emptied on every context switch.
#[derive(Debug, Clone)]
pub struct Tlb {
    entries: Vec<TranslationEntry>,
}

impl Tlb {
    pub fn new(size: usize) -> Self {
        Self {
            entries: vec![TranslationEntry::new(0); size],
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Slot holding a valid translation for `vpn`.
    pub fn lookup(&self, vpn: usize) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.is_valid() && entry.virtual_page == vpn)
    }

    pub fn entry(&self, slot: usize) -> &TranslationEntry {
        &self.entries[slot]
    }

    pub fn entry_mut(&mut self, slot: usize) -> &mut TranslationEntry {
        &mut self.entries[slot]
    }

    pub fn install(&mut self, slot: usize, entry: TranslationEntry) {
        debug_assert!(entry.is_valid());
        self.entries[slot] = entry;
    }

    /// Drop the translation for `vpn`, returning the slot it occupied.
    pub fn invalidate_page(&mut self, vpn: usize) -> Option<usize> {
        let slot = self.lookup(vpn)?;
        self.entries[slot].unmap();
        Some(slot)
    }

    pub fn invalidate_all(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.unmap();
        }
    }

    pub fn entries(&self) -> &[TranslationEntry] {
        &self.entries
    }

    pub fn valid_entries(&self) -> impl Iterator<Item = &TranslationEntry> {
        self.entries.iter().filter(|entry| entry.is_valid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resident(vpn: usize, frame: usize) -> TranslationEntry {
        let mut entry = TranslationEntry::new(vpn);
        entry.map(frame);
        entry
    }

    #[test]
    fn empty_tlb_misses() {
        let tlb = Tlb::new(4);
        assert_eq!(tlb.size(), 4);
        assert_eq!(tlb.lookup(0), None);
        assert_eq!(tlb.valid_entries().count(), 0);
    }

    #[test]
    fn install_and_lookup() {
        let mut tlb = Tlb::new(2);
        tlb.install(1, resident(7, 3));
        assert_eq!(tlb.lookup(7), Some(1));
        assert_eq!(tlb.entry(1).physical_page, Some(3));
        assert_eq!(tlb.lookup(3), None);
    }

    #[test]
    fn invalidate() {
        let mut tlb = Tlb::new(2);
        tlb.install(0, resident(1, 0));
        tlb.install(1, resident(2, 1));
        assert_eq!(tlb.invalidate_page(1), Some(0));
        assert_eq!(tlb.invalidate_page(1), None);
        assert_eq!(tlb.lookup(2), Some(1));
        tlb.invalidate_all();
        assert_eq!(tlb.lookup(2), None);
    }
}
