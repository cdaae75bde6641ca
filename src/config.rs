//! # EdfOS Configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time — no dynamic allocation.

use static_assertions::const_assert;

/// Maximum number of tasks the system can manage simultaneously.
/// This bounds the static TCB table. Increase with care — each task
/// carries `MAX_GUARD_SIZE` bytes of canary storage.
pub const MAX_TASKS: usize = 16;

/// Timer tick frequency in Hz. The kernel core is agnostic to wall-clock
/// time; this is the rate a preemptive port is expected to program its
/// hardware timer to.
pub const TICK_HZ: u32 = 1000;

/// Guard region size (bytes) used when a task does not request its own.
pub const DEFAULT_GUARD_SIZE: usize = 64;

/// Upper bound on a task's guard region. Guards are stored inline in the
/// TCB, so this directly sizes the task table.
pub const MAX_GUARD_SIZE: usize = 256;

/// Fill pattern for the interior of a guard region.
pub const GUARD_FILL: u8 = 0x69;

/// Canary byte stamped over the first and last word of a guard region.
/// The guard check fails when either word no longer reads back as four
/// of these.
pub const GUARD_CANARY: u8 = 0x33;

/// Bytes covered by one canary word.
pub const GUARD_CANARY_LEN: usize = 4;

const_assert!(MAX_TASKS > 0);
const_assert!(DEFAULT_GUARD_SIZE <= MAX_GUARD_SIZE);
// A guard must at least hold the two canary words.
const_assert!(DEFAULT_GUARD_SIZE >= 2 * GUARD_CANARY_LEN);
