mod iter;
mod translation_entry;

use std::fmt;

pub use translation_entry::{EntryFlags, TranslationEntry};

use self::iter::PageTableIterator;

/// Per address space table, indexed by virtual page number.
#[derive(Debug, Clone, Default)]
pub struct PageTable {
    entries: Vec<TranslationEntry>,
}

impl PageTable {
    pub fn init(num_pages: usize) -> Self {
        Self {
            entries: (0..num_pages).map(TranslationEntry::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, page_number: usize) -> Option<&TranslationEntry> {
        self.entries.get(page_number)
    }

    pub fn get_mut(&mut self, page_number: usize) -> Option<&mut TranslationEntry> {
        self.entries.get_mut(page_number)
    }

    pub fn get_frame(&self, page_number: usize) -> Option<usize> {
        let entry = self.get(page_number)?;
        if entry.is_valid() {
            entry.physical_page
        } else {
            None
        }
    }

    /// Append an entry for the next virtual page.
    pub fn push(&mut self, mut entry: TranslationEntry) {
        entry.virtual_page = self.entries.len();
        self.entries.push(entry);
    }

    pub fn resident_pages(&self) -> usize {
        self.entries.iter().filter(|e| e.is_valid()).count()
    }

    pub fn iter(&self) -> PageTableIterator<'_> {
        PageTableIterator::new(&self.entries)
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, TranslationEntry> {
        self.entries.iter_mut()
    }
}

fn or_dash(value: Option<usize>) -> String {
    value.map_or_else(|| String::from("-"), |v| v.to_string())
}

impl fmt::Display for PageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.iter() {
            writeln!(
                f,
                "[{}] VALID: {} DIRTY: {} USE: {} RO: {} |PP {}|SE {}|",
                entry.virtual_page,
                entry.is_valid() as u8,
                entry.is_dirty() as u8,
                entry.is_used() as u8,
                entry.is_read_only() as u8,
                or_dash(entry.physical_page),
                or_dash(entry.swap_sector),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::PageTable;

    #[test]
    fn create_mapping() {
        let mut table = PageTable::init(64);
        table.get_mut(12).unwrap().map(43);
        table.get_mut(4).unwrap().map(45);
        assert_eq!(table.get_frame(12), Some(43));
        assert_eq!(table.get_frame(4), Some(45));

        table.get_mut(12).unwrap().map(49);
        assert_eq!(table.get_frame(12), Some(49));
        assert_eq!(table.resident_pages(), 2);
    }

    #[test]
    fn invalid_entries_have_no_frame() {
        let mut table = PageTable::init(4);
        assert_eq!(table.get_frame(1), None);
        table.get_mut(1).unwrap().map(3);
        table.get_mut(1).unwrap().unmap();
        assert_eq!(table.get_frame(1), None);
        assert_eq!(table.get_frame(9), None);
    }

    #[test]
    fn entries_are_indexed_by_page() {
        let table = PageTable::init(5);
        for (i, entry) in table.iter().enumerate() {
            assert_eq!(entry.virtual_page, i);
        }
        assert_eq!(table.iter().count(), 5);
    }

    #[test]
    fn push_renumbers() {
        let mut table = PageTable::init(2);
        let entry = *table.get(0).unwrap();
        table.push(entry);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(2).unwrap().virtual_page, 2);
    }

    #[test]
    fn display_lists_every_entry() {
        let mut table = PageTable::init(2);
        table.get_mut(1).unwrap().map(6);
        table.get_mut(0).unwrap().swap_sector = Some(4);
        let dump = table.to_string();
        assert_eq!(dump.lines().count(), 2);
        assert!(dump.contains("[0] VALID: 0"));
        assert!(dump.contains("|PP -|SE 4|"));
        assert!(dump.contains("[1] VALID: 1"));
        assert!(dump.contains("|PP 6|SE -|"));
    }
}
