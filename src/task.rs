//! # Task Control Block
//!
//! Defines the task model for EdfOS. A task is either **periodic** — it
//! carries a period, a per-period capacity budget and a relative deadline,
//! and is scheduled earliest-deadline-first — or **aperiodic** — a
//! background task scheduled by the weighted round-robin fallback whenever
//! no periodic job is eligible.

use crate::config::{GUARD_CANARY, GUARD_CANARY_LEN, GUARD_FILL, MAX_GUARD_SIZE};

/// Stable task identifier, assigned monotonically at registration.
pub type TaskId = u16;

/// Task entry hook.
///
/// On a preemptive port this is the task body and never returns; the
/// hosted simulation port invokes it exactly once during startup
/// initialization. A `fn() -> !` coerces to this type.
pub type TaskEntry = fn();

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   ┌─────────┐  start() init   ┌────────┐   selector    ┌─────────┐
///   │ Stopped │ ──────────────► │ Ready  │ ────────────► │ Running │
///   └─────────┘                 └────────┘ ◄──────────── └─────────┘
///                                 ▲   ▲    tick / yield    │     │
///                    delay hits 0 │   │ resume()   delay() │     │ suspend()
///                            ┌────────┐             ┌───────────┐
///                            │ Blocked│             │ Suspended │
///                            └────────┘             └───────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Registered but not yet initialized by the startup pass.
    Stopped,
    /// Eligible for selection.
    Ready,
    /// Currently executing. Exactly one task is Running between ticks.
    Running,
    /// Waiting out a `delay()`; woken by the per-tick delay update.
    Blocked,
    /// Removed from scheduling by `suspend()` until `resume()`.
    Suspended,
}

// ---------------------------------------------------------------------------
// Round-robin priority
// ---------------------------------------------------------------------------

/// Priority level of an aperiodic task.
///
/// The level determines the reload weight of the round-robin countdown:
/// a task is selected when its countdown reaches zero, so a *larger*
/// weight means a *longer* gap between selections. `Idle` yields the
/// longest gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityLevel {
    Crit,
    High,
    Normal,
    Low,
    Idle,
}

impl PriorityLevel {
    /// Countdown reload weight for this level.
    pub const fn reload(self) -> u8 {
        match self {
            PriorityLevel::Crit => 0x01,
            PriorityLevel::High => 0x03,
            PriorityLevel::Normal => 0x07,
            PriorityLevel::Low => 0x0f,
            PriorityLevel::Idle => 0x1f,
        }
    }
}

/// Packed round-robin priority: high byte holds the reload weight, low
/// byte the current countdown. Only the RR selector reads this; periodic
/// tasks carry it untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority(u16);

impl Priority {
    pub const fn new(level: PriorityLevel) -> Self {
        let w = level.reload() as u16;
        Priority(w << 8 | w)
    }

    /// Raw encoded value.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// The reload weight (high byte).
    pub const fn weight(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// The current countdown (low byte).
    pub const fn countdown(self) -> u8 {
        self.0 as u8
    }

    /// One round-robin visit: decrement the countdown. Returns `true` when
    /// it reaches zero — the task is selected and the countdown reloads
    /// from the weight.
    pub fn visit(&mut self) -> bool {
        let low = (self.0 as u8).wrapping_sub(1);
        self.0 = self.0 & 0xff00 | low as u16;
        if low == 0 {
            self.0 |= self.0 >> 8 & 0xff;
            return true;
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Periodic timing state
// ---------------------------------------------------------------------------

/// Temporal state of a periodic task. All quantities are in ticks.
///
/// `remaining_period` and `remaining_deadline` are signed: within one tick
/// pass they may transiently go non-positive before the rollover branch
/// resets them. `remaining_capacity` saturates at zero and never exceeds
/// `capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Activation period.
    pub period: u32,
    /// Per-period execution budget.
    pub capacity: u32,
    /// Relative deadline, measured from the start of each period.
    pub deadline: u32,
    pub remaining_period: i32,
    pub remaining_deadline: i32,
    pub remaining_capacity: u32,
}

impl Timing {
    pub const fn new(period: u32, capacity: u32, deadline: u32) -> Self {
        Timing {
            period,
            capacity,
            deadline,
            remaining_period: period as i32,
            remaining_deadline: deadline as i32,
            remaining_capacity: capacity,
        }
    }

    /// Start a fresh period: reset the period, deadline and capacity
    /// counters together.
    pub fn rollover(&mut self) {
        self.remaining_period = self.period as i32;
        self.remaining_deadline = self.deadline as i32;
        self.remaining_capacity = self.capacity;
    }
}

// ---------------------------------------------------------------------------
// Stack guard region
// ---------------------------------------------------------------------------

/// Canary band checked on every dispatch to detect stack overflow.
///
/// The region lives inline in the TCB (a deterministic, long-lived
/// location), filled with [`GUARD_FILL`] and stamped with a canary word at
/// each end. A port places the band adjacent to the task stack; the
/// kernel only verifies the canaries.
#[derive(Debug, Clone, Copy)]
pub struct GuardRegion {
    data: [u8; MAX_GUARD_SIZE],
    len: usize,
}

impl GuardRegion {
    pub const fn new(len: usize) -> Self {
        GuardRegion {
            data: [0; MAX_GUARD_SIZE],
            len,
        }
    }

    /// Write the fill pattern and both canary words.
    pub fn install(&mut self) {
        let len = self.len;
        for b in &mut self.data[..len] {
            *b = GUARD_FILL;
        }
        for b in &mut self.data[..GUARD_CANARY_LEN] {
            *b = GUARD_CANARY;
        }
        for b in &mut self.data[len - GUARD_CANARY_LEN..len] {
            *b = GUARD_CANARY;
        }
    }

    /// Verify both canary words. `false` means the band was overwritten.
    pub fn check(&self) -> bool {
        let head = &self.data[..GUARD_CANARY_LEN];
        let tail = &self.data[self.len - GUARD_CANARY_LEN..self.len];
        head.iter().chain(tail).all(|&b| b == GUARD_CANARY)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block — per-task kernel state.
///
/// TCBs are stored inline in the task table; nothing is heap-allocated
/// and a TCB is never destroyed (task exit is not modeled). The saved
/// execution context is port-specific and lives in a parallel slot owned
/// by the kernel, not here.
#[derive(Debug, Clone, Copy)]
pub struct Tcb {
    pub id: TaskId,
    pub entry: TaskEntry,
    pub state: TaskState,
    /// Round-robin weight and countdown; unused by the EDF selector.
    pub priority: Priority,
    /// Remaining voluntary-delay ticks; decremented only while Blocked.
    pub delay: u32,
    /// Periodic timing state; `None` marks an aperiodic task.
    pub timing: Option<Timing>,
    /// Set when the task is dispatched; cleared at every hyperperiod
    /// report.
    pub has_run_in_lcm: bool,
    pub guard: GuardRegion,
}

impl Tcb {
    pub fn new(id: TaskId, entry: TaskEntry, guard_size: usize) -> Self {
        Tcb {
            id,
            entry,
            state: TaskState::Stopped,
            priority: Priority::new(PriorityLevel::Normal),
            delay: 0,
            timing: None,
            has_run_in_lcm: false,
            guard: GuardRegion::new(guard_size),
        }
    }

    #[inline]
    pub const fn is_periodic(&self) -> bool {
        self.timing.is_some()
    }

    /// Eligible for the EDF selector: a ready periodic task with budget
    /// left in the current period.
    #[inline]
    pub fn edf_eligible(&self) -> bool {
        match self.timing {
            Some(t) => self.state == TaskState::Ready && t.remaining_capacity > 0,
            None => false,
        }
    }

    /// Candidate for the round-robin fallback: a ready aperiodic task.
    #[inline]
    pub fn rr_candidate(&self) -> bool {
        !self.is_periodic() && self.state == TaskState::Ready
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
