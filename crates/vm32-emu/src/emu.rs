//! The top-level machine: owns a [`Cpu`], wires the loader into it, and drives the dispatch
//! loop to completion.

use tracing::info;

use crate::cpu::{Cpu, StopReason};
use crate::loader::{self, LoaderError};
use crate::mem::PhysicalMemory;
use crate::primitives::constants::FS_SZ;

pub use crate::cpu::StopReason as MachineStopReason;

/// A fully initialized virtual machine, ready to run from its image's entry point.
pub struct Machine {
    pub cpu: Cpu,
}

impl Machine {
    /// Allocate `memory_mb` megabytes of physical memory and construct an idle CPU over it.
    /// Call [`Machine::load`] before [`Machine::run`].
    pub fn new(memory_mb: u32) -> Self {
        let mem = PhysicalMemory::new(memory_mb * 1024 * 1024);
        Self { cpu: Cpu::new(mem) }
    }

    /// Parse `image` and install it (plus an optional RAM-filesystem blob) into physical
    /// memory, seeding PC from the header's entry point and SP from the top of memory.
    pub fn load(&mut self, image: &[u8], fs_image: Option<&[u8]>) -> Result<(), LoaderError> {
        let loaded = loader::load(self.cpu.memory_mut(), image, fs_image)?;
        self.cpu.pc = loaded.entry;
        self.cpu.sp = self.default_initial_sp();
        info!(entry = loaded.entry, sp = self.cpu.sp, "image loaded");
        Ok(())
    }

    /// The stack pointer a freshly loaded image starts with, in the absence of a loaded
    /// image: the top of memory minus the reserved filesystem window.
    pub fn default_initial_sp(&self) -> u32 {
        self.cpu.memory().len() - FS_SZ
    }

    /// Run until `HALT`, a fatal fault, or the console escape character, dispatching one
    /// instruction per iteration of [`Cpu::step`].
    pub fn run(&mut self) -> StopReason {
        loop {
            if let Some(reason) = self.cpu.step() {
                return reason;
            }
        }
    }

    /// Execute a single instruction (used by the debugger's single-step mode).
    pub fn step(&mut self) -> Option<StopReason> {
        self.cpu.step()
    }
}
