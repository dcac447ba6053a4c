//! Synchronous faults raised by the dispatcher, the MMU, and privileged instructions.

use crate::primitives::constants::USER_BIT;

/// A synchronous fault. Each variant carries the numeric trap code delivered to the guest
/// via the interrupt vector (see [`Fault::code`]); the `USER` bit is OR'd in separately by
/// the trap engine once it knows which mode the fault occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    /// A physical address produced by translation (or used directly with paging off) falls
    /// outside the configured memory.
    #[error("bad physical address")]
    BadPhysical,
    /// The software timer reached its timeout.
    #[error("timer interrupt")]
    Timer,
    /// A keystroke arrived and is being delivered as an interrupt.
    #[error("keyboard interrupt")]
    Keyboard,
    /// A privileged instruction was dispatched in user mode.
    #[error("privileged instruction in user mode")]
    Privileged,
    /// The opcode is not recognized.
    #[error("illegal instruction")]
    IllegalInstruction,
    /// Raised explicitly by the `TRAP` opcode.
    #[error("software trap")]
    Syscall,
    /// An arithmetic fault (integer or float division/modulo by zero).
    #[error("arithmetic fault")]
    Arithmetic,
    /// Page fault during instruction fetch.
    #[error("instruction page fault")]
    InstructionPage,
    /// Page fault during a store/write.
    #[error("write page fault")]
    WritePage,
    /// Page fault during a load/read.
    #[error("read page fault")]
    ReadPage,
}

impl Fault {
    /// The numeric trap code delivered to the guest (before the `USER` bit is applied).
    pub fn code(self) -> u32 {
        match self {
            Fault::BadPhysical => 1,
            Fault::Timer => 2,
            Fault::Keyboard => 3,
            Fault::Privileged => 4,
            Fault::IllegalInstruction => 5,
            Fault::Syscall => 6,
            Fault::Arithmetic => 7,
            Fault::InstructionPage => 8,
            Fault::WritePage => 9,
            Fault::ReadPage => 10,
        }
    }

    /// Whether this fault, by policy, can be delegated to a guest handler. All faults in
    /// this emulator are deliverable; the distinction the trap engine cares about is
    /// whether the *current* mode has interrupts enabled to receive it (see
    /// [`crate::cpu::Cpu::take_trap`]).
    pub fn code_with_user_bit(self, user_mode: bool) -> u32 {
        if user_mode {
            self.code() | USER_BIT
        } else {
            self.code()
        }
    }
}
