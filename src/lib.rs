//! # EdfOS — a dual-policy real-time kernel core
//!
//! A tick-driven task scheduler combining two policies:
//!
//! - **Earliest Deadline First** for periodic hard-real-time tasks: every
//!   periodic task declares a period, a per-period capacity budget and a
//!   relative deadline; on each tick the eligible job with the nearest
//!   deadline runs, with equal deadlines served round-robin.
//! - **Weighted round-robin** for aperiodic background tasks: whenever no
//!   periodic job has budget left, the background tasks share the slack
//!   proportionally to their priority level.
//!
//! Jobs that miss their deadline are shed for the remainder of their
//! period — logged and counted, never fatal. Once per hyperperiod (the
//! LCM of all periodic periods) the kernel prints a report of deadline
//! misses and jobs run, then resets the counters.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   Application Tasks                      │
//! ├─────────────────────────────────────────────────────────┤
//! │                Kernel API (kernel.rs)                    │
//! │   add() · add_periodic() · start() · tick() · yield_now()│
//! │   delay() · suspend() · resume() · set_priority() · wfi()│
//! ├───────────────────────────┬─────────────────────────────┤
//! │  Scheduler (scheduler.rs) │    Task Table (table.rs)    │
//! │  ─ bookkeep()             │    circular TCB storage     │
//! │  ─ select_edf()           │    with scheduling cursor   │
//! │  ─ select_rr()            │                             │
//! │  ─ report_tick()          │                             │
//! ├───────────────────────────┴─────────────────────────────┤
//! │               Task Model (task.rs)                       │
//! │     Tcb · Timing · Priority · GuardRegion · TaskState    │
//! ├─────────────────────────────────────────────────────────┤
//! │                Port Layer (port/)                        │
//! │   timer · tick ack · context save/restore · console      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tick Sequence
//!
//! The dispatcher runs under the timer interrupt, so the sequence below
//! is atomic with respect to task code:
//!
//! 1. Save the outgoing context
//! 2. Hyperperiod report countdown
//! 3. Delay update (wake expired `delay()` calls)
//! 4. Stack-guard check for the outgoing task
//! 5. Periodic bookkeeping: period/deadline counters, rollover, miss
//!    detection and shedding
//! 6. Charge the outgoing running periodic task one tick of capacity
//! 7. EDF selection; weighted round-robin fallback
//! 8. Dispatch: mark running, acknowledge the timer, restore the chosen
//!    context
//!
//! ## Memory Model
//!
//! - **No heap**: the task table is a fixed-capacity [`heapless::Vec`]
//! - **No globals**: the kernel owns all state and is passed explicitly
//! - **Inline guard bands**: each TCB carries its canary region
//! - **Ports own the hardware**: timer, contexts and console live behind
//!   the [`port::Port`] trait; the kernel core is `no_std` and never
//!   touches an address it does not own

#![no_std]

#[cfg(any(test, feature = "hosted"))]
extern crate std;

pub mod config;
pub mod error;
pub mod kernel;
pub mod port;
pub mod scheduler;
pub mod table;
pub mod task;

pub use error::KernelError;
pub use kernel::Kernel;
pub use port::Port;
pub use task::{PriorityLevel, TaskId, TaskState};
