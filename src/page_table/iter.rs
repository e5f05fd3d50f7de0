use super::TranslationEntry;

pub struct PageTableIterator<'a> {
    current: usize,
    entries: &'a [TranslationEntry],
}

impl<'a> PageTableIterator<'a> {
    pub fn new(entries: &'a [TranslationEntry]) -> Self {
        Self {
            current: 0,
            entries,
        }
    }
}

impl<'a> Iterator for PageTableIterator<'a> {
    type Item = &'a TranslationEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.current)?;
        self.current += 1;
        Some(entry)
    }
}
