pub const NUM_GP_REGS: usize = 32;
pub const STACK_REG: usize = 29;
pub const RET_ADDR_REG: usize = 31;
pub const NUM_TOTAL_REGS: usize = 40;
pub const HI_REG: usize = 32;
pub const LO_REG: usize = 33;
pub const PC_REG: usize = 34;
pub const NEXT_PC_REG: usize = 35;
pub const PREV_PC_REG: usize = 36;
pub const LOAD_REG: usize = 37;
pub const LOAD_VALUE_REG: usize = 38;
/// Virtual address that caused the last exception.
pub const BAD_VADDR_REG: usize = 39;

/// Access to the CPU register file owned by the instruction emulator.
pub trait Registers {
    fn read_register(&self, num: usize) -> u32;
    fn write_register(&mut self, num: usize, value: u32);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    regs: [u32; NUM_TOTAL_REGS],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            regs: [0; NUM_TOTAL_REGS],
        }
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Registers for RegisterFile {
    fn read_register(&self, num: usize) -> u32 {
        assert!(num < NUM_TOTAL_REGS, "No register {}", num);
        self.regs[num]
    }

    fn write_register(&mut self, num: usize, value: u32) {
        assert!(num < NUM_TOTAL_REGS, "No register {}", num);
        self.regs[num] = value;
    }
}
