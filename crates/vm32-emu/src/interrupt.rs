//! Asynchronous interrupt sources, raised at tick points rather than mid-instruction.

/// An interrupt source polled by the device tick (see [`crate::devices`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Timer,
    Keyboard,
}

impl Interrupt {
    /// The bit this source sets in `ipend`, and the trap code it is delivered as once
    /// selected by priority.
    pub fn bit(self) -> u32 {
        match self {
            // Lower bit number = higher priority, per the `ipend & -ipend` selection rule.
            Interrupt::Timer => 1 << (crate::exception::Fault::Timer.code() - 1),
            Interrupt::Keyboard => 1 << (crate::exception::Fault::Keyboard.code() - 1),
        }
    }

    pub fn fault(self) -> crate::exception::Fault {
        match self {
            Interrupt::Timer => crate::exception::Fault::Timer,
            Interrupt::Keyboard => crate::exception::Fault::Keyboard,
        }
    }
}
