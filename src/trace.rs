//! Access traces for driving a machine from text.
//!
//! One access per line, numbers in decimal or `0x` hex:
//!
//! ```text
//! r <vaddr> <size>
//! w <vaddr> <size> <value>
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::fmt;

use log::{debug, error};

use crate::{
    config::TranslationMode,
    error::ExceptionType,
    machine::Machine,
    translate::AccessSize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read { vaddr: u32, size: AccessSize },
    Write { vaddr: u32, size: AccessSize, value: u32 },
}

#[derive(Debug, PartialEq)]
pub struct TraceError {
    pub line: usize,
    pub text: String,
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: cannot parse \"{}\"", self.line, self.text)
    }
}

impl std::error::Error for TraceError {}

fn parse_number(token: &str) -> Option<u32> {
    match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

fn parse_line(line: &str) -> Option<Access> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let size = AccessSize::from_bytes(parse_number(tokens.get(2)?)? as usize)?;
    let vaddr = parse_number(tokens[1])?;
    match (tokens[0], tokens.len()) {
        ("r", 3) => Some(Access::Read { vaddr, size }),
        ("w", 4) => Some(Access::Write {
            vaddr,
            size,
            value: parse_number(tokens[3])?,
        }),
        _ => None,
    }
}

pub fn parse_trace(text: &str) -> Result<Vec<Access>, TraceError> {
    let mut accesses = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Some(access) => accesses.push(access),
            None => {
                return Err(TraceError {
                    line: number + 1,
                    text: String::from(line),
                })
            }
        }
    }
    Ok(accesses)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub access: Access,
    /// Value read, or the value written.
    pub result: Result<u32, ExceptionType>,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.access {
            Access::Read { vaddr, size } => write!(f, "r {:#x} {} -> ", vaddr, size.bytes())?,
            Access::Write { vaddr, size, value } => {
                write!(f, "w {:#x} {} {:#x} -> ", vaddr, size.bytes(), value)?
            }
        }
        match self.result {
            Ok(value) => write!(f, "{:#x}", value),
            Err(kind) => write!(f, "{}", kind),
        }
    }
}

fn perform(machine: &mut Machine, access: Access) -> Result<u32, ExceptionType> {
    match access {
        Access::Read { vaddr, size } => machine.read_mem(vaddr, size),
        Access::Write { vaddr, size, value } => machine.write_mem(vaddr, size, value).map(|_| value),
    }
}

/// Run every access against the current space. Under linear translation a
/// page fault is serviced and the access retried once, as the instruction
/// emulator would.
pub fn run_trace(machine: &mut Machine, accesses: &[Access]) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(accesses.len());
    for access in accesses.iter().copied() {
        let mut result = perform(machine, access);
        if result == Err(ExceptionType::PageFault)
            && machine.config().translation == TranslationMode::Linear
        {
            let vaddr = match access {
                Access::Read { vaddr, .. } | Access::Write { vaddr, .. } => vaddr,
            };
            match machine.service_page_fault(vaddr) {
                Ok(()) => result = perform(machine, access),
                Err(e) => error!("Cannot service page fault at {:#x}: {}", vaddr, e),
            }
        }
        let outcome = Outcome { access, result };
        debug!("{}", outcome);
        outcomes.push(outcome);
    }
    outcomes
}
