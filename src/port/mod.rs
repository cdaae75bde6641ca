//! # Port Layer
//!
//! Hardware abstraction boundary for the kernel core. A port owns the
//! timer, the opaque execution contexts and the console; the scheduler
//! logic is independent of all three.
//!
//! ## Context model
//!
//! Contexts follow setjmp/longjmp semantics. [`Port::context_save`]
//! captures the caller's context and returns `false`; when a later
//! [`Port::context_restore`] resumes that context, the original save
//! returns a second time with `true`. On a preemptive port `restore`
//! therefore never returns to its caller. The hosted simulation port
//! models both as bookkeeping no-ops: `save` always reports the save
//! path, `restore` records the switch, and the dispatcher simply runs to
//! completion once per tick.

use core::fmt;

#[cfg(any(test, feature = "hosted"))]
pub mod hosted;

/// Platform hooks required by the kernel.
pub trait Port {
    /// Opaque saved execution context, one per task.
    type Context: Default;

    /// Start (or unmask) the tick timer. Also the exit of a critical
    /// section.
    fn timer_enable(&mut self);

    /// Stop (or mask) the tick timer. Also the entry of a critical
    /// section.
    fn timer_disable(&mut self);

    /// Acknowledge the timer interrupt at the end of a tick pass.
    fn tick_ack(&mut self);

    /// Capture the current context. Returns `false` on the save path and
    /// `true` when resumed via [`Port::context_restore`].
    fn context_save(&mut self, ctx: &mut Self::Context) -> bool;

    /// Resume a previously saved context. Diverges on preemptive ports.
    fn context_restore(&mut self, ctx: &mut Self::Context);

    /// Park until the next timer interrupt has been serviced. Returns
    /// `false` if the port has no asynchronous timer source, in which
    /// case callers must not keep waiting.
    fn wait_for_interrupt(&mut self) -> bool;

    /// Write human-readable scheduler output (deadline-miss lines and
    /// hyperperiod reports).
    fn console(&mut self, args: fmt::Arguments<'_>);

    /// Dump a memory region for guard-violation diagnostics. `base` is
    /// the address to label the first byte with.
    fn hexdump(&mut self, base: usize, data: &[u8]);
}
