use std::fmt;

use crate::{address_space::SpaceId, error::ExceptionType, frame_table::FrameOwner};

/// Points in the paging pipeline worth counting or tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmEvent {
    TlbHit { vpn: usize },
    TlbMiss { vpn: usize },
    TlbFill { slot: usize, vpn: usize },
    PageFault { space: SpaceId, vpn: usize },
    Eviction { frame: usize, owner: FrameOwner },
    Writeback { sector: usize },
    DiskRead { sector: usize },
    DiskWrite { sector: usize },
    Exception { kind: ExceptionType, address: u32 },
}

pub trait VmObserver {
    fn notify(&mut self, event: &VmEvent);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub num_page_faults: usize,
    pub num_tlb_hits: usize,
    pub num_tlb_misses: usize,
    pub num_tlb_fills: usize,
    pub num_evictions: usize,
    pub num_writebacks: usize,
    pub num_disk_reads: usize,
    pub num_disk_writes: usize,
    pub num_exceptions: usize,
}

impl VmObserver for Statistics {
    fn notify(&mut self, event: &VmEvent) {
        match event {
            VmEvent::TlbHit { .. } => self.num_tlb_hits += 1,
            VmEvent::TlbMiss { .. } => self.num_tlb_misses += 1,
            VmEvent::TlbFill { .. } => self.num_tlb_fills += 1,
            VmEvent::PageFault { .. } => self.num_page_faults += 1,
            VmEvent::Eviction { .. } => self.num_evictions += 1,
            VmEvent::Writeback { .. } => self.num_writebacks += 1,
            VmEvent::DiskRead { .. } => self.num_disk_reads += 1,
            VmEvent::DiskWrite { .. } => self.num_disk_writes += 1,
            VmEvent::Exception { .. } => self.num_exceptions += 1,
        }
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Paging: faults {}, evictions {}, writebacks {}",
            self.num_page_faults, self.num_evictions, self.num_writebacks
        )?;
        writeln!(
            f,
            "TLB: hits {}, misses {}, fills {}",
            self.num_tlb_hits, self.num_tlb_misses, self.num_tlb_fills
        )?;
        writeln!(
            f,
            "Swap I/O: reads {}, writes {}",
            self.num_disk_reads, self.num_disk_writes
        )?;
        write!(f, "Exceptions: {}", self.num_exceptions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_events() {
        let mut stats = Statistics::default();
        stats.notify(&VmEvent::TlbMiss { vpn: 0 });
        stats.notify(&VmEvent::PageFault {
            space: SpaceId(0),
            vpn: 0,
        });
        stats.notify(&VmEvent::TlbFill { slot: 0, vpn: 0 });
        stats.notify(&VmEvent::TlbHit { vpn: 0 });
        stats.notify(&VmEvent::TlbHit { vpn: 0 });
        assert_eq!(stats.num_tlb_misses, 1);
        assert_eq!(stats.num_page_faults, 1);
        assert_eq!(stats.num_tlb_fills, 1);
        assert_eq!(stats.num_tlb_hits, 2);
        assert_eq!(stats.num_disk_reads, 0);
    }

    #[test]
    fn summary_mentions_every_counter() {
        let stats = Statistics {
            num_page_faults: 3,
            num_disk_writes: 7,
            ..Statistics::default()
        };
        let summary = stats.to_string();
        assert!(summary.contains("faults 3"));
        assert!(summary.contains("writes 7"));
        assert_eq!(summary.lines().count(), 4);
    }
}
