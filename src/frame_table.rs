use crate::address_space::SpaceId;

/// Who a resident frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOwner {
    pub space: SpaceId,
    pub vpn: usize,
}

/// Reverse index from physical frame to the page mapped into it.
#[derive(Debug, Clone)]
pub struct FrameTable {
    owners: Vec<Option<FrameOwner>>,
}

impl FrameTable {
    pub fn new(num_frames: usize) -> Self {
        Self {
            owners: vec![None; num_frames],
        }
    }

    pub fn owner(&self, frame: usize) -> Option<FrameOwner> {
        self.owners.get(frame).copied().flatten()
    }

    pub fn assign(&mut self, frame: usize, owner: FrameOwner) {
        assert!(
            self.owners[frame].is_none(),
            "Frame {} assigned twice",
            frame
        );
        self.owners[frame] = Some(owner);
    }

    pub fn release(&mut self, frame: usize) -> Option<FrameOwner> {
        self.owners[frame].take()
    }
}
