use free_space_manager::Bitmap;

/// Outcome of one sweep of the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Victim {
    pub index: usize,
    /// Where the next sweep starts.
    pub next: usize,
    pub steps: usize,
}

/// Second chance selection over the first `capacity` bits of `refs`.
///
/// Starting at `start`, a set reference bit is cleared and skipped; the first
/// clear bit is chosen and set again so the fresh occupant gets its own
/// second chance. With every bit set the sweep clears them all and picks
/// `start`, so it never takes more than `2 * capacity` steps.
pub fn select_victim(refs: &mut Bitmap, start: usize, capacity: usize) -> Victim {
    assert!(capacity > 0, "Clock over an empty set");
    assert!(capacity <= refs.len());

    let mut index = start % capacity;
    let mut steps = 0;
    loop {
        assert!(
            steps < 2 * capacity,
            "Clock failed to find a victim in {} steps",
            steps
        );
        steps += 1;
        if refs.test(index) {
            refs.clear(index);
            index = (index + 1) % capacity;
        } else {
            refs.mark(index);
            return Victim {
                index,
                next: (index + 1) % capacity,
                steps,
            };
        }
    }
}

/// Clock hand persisted between selections.
#[derive(Debug, Clone, PartialEq)]
pub struct Clock {
    next: usize,
    capacity: usize,
}

impl Clock {
    pub fn new(capacity: usize) -> Self {
        Self { next: 0, capacity }
    }

    pub fn select(&mut self, refs: &mut Bitmap) -> Victim {
        let victim = select_victim(refs, self.next, self.capacity);
        self.next = victim.next;
        victim
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}
