//! # Kernel Errors
//!
//! One error type covers both recoverable API failures and fatal faults.
//! Fatal variants latch the kernel into a halted state: a bare-metal
//! embedder parks the CPU on them, a hosted embedder observes them and
//! stops driving ticks.

/// Everything that can go wrong inside the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// The task table is full.
    TaskLimit,
    /// Periodic timing parameters violate `0 < capacity <= deadline <= period`.
    InvalidTiming,
    /// Guard size is out of range for inline storage.
    InvalidGuard,
    /// No task carries the requested id.
    NotFound,
    /// The operation is not legal in the target's current state.
    WrongState,
    /// A stack guard canary was overwritten. Fatal.
    GuardViolation,
    /// No task is ready to run; scheduling invariants are broken. Fatal.
    NoReadyTask,
    /// The kernel already halted on an earlier fault.
    Halted,
}

impl KernelError {
    /// Fatal errors halt the kernel; recoverable ones leave it running.
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            KernelError::GuardViolation | KernelError::NoReadyTask | KernelError::Halted
        )
    }
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            KernelError::TaskLimit => "task table full",
            KernelError::InvalidTiming => "invalid periodic timing",
            KernelError::InvalidGuard => "invalid guard size",
            KernelError::NotFound => "no such task",
            KernelError::WrongState => "operation not legal in current state",
            KernelError::GuardViolation => "stack guard check failed",
            KernelError::NoReadyTask => "no ready task",
            KernelError::Halted => "kernel halted",
        };
        f.write_str(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_classification() {
        assert!(KernelError::GuardViolation.is_fatal());
        assert!(KernelError::NoReadyTask.is_fatal());
        assert!(KernelError::Halted.is_fatal());
        assert!(!KernelError::TaskLimit.is_fatal());
        assert!(!KernelError::NotFound.is_fatal());
        assert!(!KernelError::WrongState.is_fatal());
    }
}
