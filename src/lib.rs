//! Demand paged virtual memory for a simulated teaching machine: page
//! tables, a software managed TLB, second chance replacement and swap.

pub mod address_space;
pub mod config;
pub mod error;
pub mod executable;
pub mod frame_table;
pub mod machine;
pub mod memory_manager;
pub mod noff;
pub mod page_table;
pub mod registers;
pub mod replacement;
pub mod stats;
pub mod swap;
pub mod sync;
pub mod tlb;
pub mod trace;
pub mod translate;

pub use address_space::{AddressSpace, SpaceId};
pub use config::{LoadingMode, MachineConfig, TranslationMode};
pub use error::{ExceptionType, VmError};
pub use machine::Machine;
pub use translate::AccessSize;
