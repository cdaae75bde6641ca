//! # Kernel
//!
//! Public kernel API: task registration, startup, the tick dispatcher and
//! the per-task calls (`yield_now`, `delay`, `suspend`, `resume`, ...).
//!
//! The kernel owns the scheduler state and the port; there are no
//! globals. An embedder builds a [`Kernel`] over its port, registers
//! tasks, calls [`Kernel::start`], and then invokes [`Kernel::tick`] from
//! its timer interrupt (or, for a hosted simulation, from a plain loop).
//!
//! ## Startup Sequence
//!
//! ```text
//! Kernel::new(port)
//!   ├─► add() / add_periodic()   ← register tasks (×N)
//!   └─► start()
//!         ├─► inject idle task if no aperiodic task exists
//!         ├─► compute hyperperiod (LCM of periodic periods)
//!         ├─► per task: install guard, capture context, run entry hook
//!         ├─► dispatch the first task
//!         └─► enable the timer
//! ```
//!
//! Everything in [`Kernel::tick`] runs in interrupt context on a real
//! port: the timer is implicitly masked, so the scheduler itself needs no
//! locking. API calls made from task code that mutate shared state are
//! bracketed by [`Kernel::critical_enter`] / [`Kernel::critical_leave`],
//! which mask the timer.

use heapless::Vec;

use crate::config::{DEFAULT_GUARD_SIZE, MAX_TASKS};
use crate::error::KernelError;
use crate::port::Port;
use crate::scheduler::Scheduler;
use crate::task::{Priority, PriorityLevel, TaskEntry, TaskId, TaskState};

/// Entry hook of the injected idle task. A preemptive port's idle body
/// parks the CPU between ticks; the hook itself has nothing to set up.
fn idle_entry() {}

/// The kernel: scheduler state plus the platform port.
pub struct Kernel<P: Port> {
    pub sched: Scheduler,
    pub port: P,
    /// Saved execution contexts, one per task-table slot.
    contexts: Vec<P::Context, MAX_TASKS>,
}

impl<P: Port> Kernel<P> {
    pub fn new(port: P) -> Self {
        Kernel {
            sched: Scheduler::new(),
            port,
            contexts: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Registration (before start only)
    // -----------------------------------------------------------------------

    /// Register an aperiodic background task.
    pub fn add(&mut self, entry: TaskEntry, guard_size: usize) -> Result<TaskId, KernelError> {
        let id = self.sched.add(entry, guard_size)?;
        self.contexts
            .push(P::Context::default())
            .map_err(|_| KernelError::TaskLimit)?;
        Ok(id)
    }

    /// Register a periodic task with `period`, `capacity` and `deadline`
    /// in ticks.
    pub fn add_periodic(
        &mut self,
        entry: TaskEntry,
        period: u32,
        capacity: u32,
        deadline: u32,
        guard_size: usize,
    ) -> Result<TaskId, KernelError> {
        let id = self
            .sched
            .add_periodic(entry, period, capacity, deadline, guard_size)?;
        self.contexts
            .push(P::Context::default())
            .map_err(|_| KernelError::TaskLimit)?;
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Startup
    // -----------------------------------------------------------------------

    /// Initialize and launch the scheduler.
    ///
    /// Injects the idle task if no aperiodic task was registered (the
    /// round-robin fallback must never face an empty ready set), computes
    /// the hyperperiod, initializes every task in registration order and
    /// dispatches the first one. Returns its id.
    pub fn start(&mut self) -> Result<TaskId, KernelError> {
        if self.sched.started {
            return Err(KernelError::WrongState);
        }

        if !self.sched.table.iter().any(|t| !t.is_periodic()) {
            let id = self.add(idle_entry, DEFAULT_GUARD_SIZE)?;
            let slot = self.sched.table.by_id(id)?;
            self.sched.table.get_mut(slot).priority = Priority::new(PriorityLevel::Idle);
            self.sched.idle_task = Some(id);
            log::debug!("idle task injected as task {id}");
        }

        self.sched.compute_hyperperiod();

        // First-time init: guard canary, initial context, entry hook.
        for slot in 0..self.sched.table.len() {
            let tcb = self.sched.table.get_mut(slot);
            tcb.guard.install();
            let entry = tcb.entry;
            let id = tcb.id;
            let base = tcb.guard.as_bytes().as_ptr() as usize;
            let len = tcb.guard.len();
            log::debug!("task {id}, guard: {base:08x} - {:08x}", base + len);

            let _ = self.port.context_save(&mut self.contexts[slot]);
            entry();
            self.sched.table.get_mut(slot).state = TaskState::Ready;
        }

        self.sched.started = true;
        let first = self.sched.commit(0);
        self.port.timer_enable();
        log::info!(
            "edfos: {} tasks, hyperperiod {:?}, task {first} dispatched",
            self.sched.table.len(),
            self.sched.hyperperiod
        );
        Ok(first)
    }

    // -----------------------------------------------------------------------
    // Dispatcher
    // -----------------------------------------------------------------------

    /// The timer-tick dispatcher. Runs the full per-tick sequence: report
    /// countdown, delay update, guard check, periodic bookkeeping,
    /// outgoing charge, EDF selection with RR fallback, dispatch.
    ///
    /// Returns the id of the task now running, or the fault that halted
    /// the kernel.
    pub fn tick(&mut self) -> Result<TaskId, KernelError> {
        self.ensure_running()?;

        let outgoing = self.sched.table.current_slot();
        if self.port.context_save(&mut self.contexts[outgoing]) {
            // Resumed: a later tick restored this context.
            return Ok(self.sched.table.current().id);
        }

        self.sched.report_tick(&mut self.port);
        self.sched.delay_update();
        self.check_guard()?;
        self.sched.bookkeep(&mut self.port);
        self.sched.charge_outgoing();

        let slot = self.reschedule()?;
        let id = self.sched.commit(slot);

        self.port.tick_ack();
        self.port.context_restore(&mut self.contexts[slot]);
        Ok(id)
    }

    /// Voluntary reschedule from the current task. No time passes: the
    /// periodic counters are untouched and the outgoing task is not
    /// charged capacity.
    pub fn yield_now(&mut self) -> Result<TaskId, KernelError> {
        self.ensure_running()?;

        let outgoing = self.sched.table.current_slot();
        if self.port.context_save(&mut self.contexts[outgoing]) {
            return Ok(self.sched.table.current().id);
        }

        self.check_guard()?;

        let tcb = self.sched.table.current_mut();
        if tcb.state == TaskState::Running {
            tcb.state = TaskState::Ready;
        }

        let slot = self.reschedule()?;
        let id = self.sched.commit(slot);
        self.port.context_restore(&mut self.contexts[slot]);
        Ok(id)
    }

    /// Block the current task for `ticks` timer ticks. A zero delay
    /// degrades to a plain yield.
    pub fn delay(&mut self, ticks: u32) -> Result<TaskId, KernelError> {
        self.ensure_running()?;
        if ticks > 0 {
            let tcb = self.sched.table.current_mut();
            tcb.delay = ticks;
            tcb.state = TaskState::Blocked;
        }
        self.yield_now()
    }

    /// EDF first, weighted round-robin when no periodic job is eligible.
    /// An empty ready set is a broken invariant and halts the kernel.
    fn reschedule(&mut self) -> Result<usize, KernelError> {
        if let Some(slot) = self.sched.select_edf() {
            return Ok(slot);
        }
        match self.sched.select_rr() {
            Ok(slot) => Ok(slot),
            Err(e) => {
                log::error!("no ready task: scheduling invariant violated, halting");
                self.sched.halted = true;
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Task management API
    // -----------------------------------------------------------------------

    /// Suspend a ready or running task. Suspending the current task
    /// reschedules immediately.
    pub fn suspend(&mut self, id: TaskId) -> Result<(), KernelError> {
        self.critical_enter();
        let was_current = self.suspend_locked(id);
        self.critical_leave();

        if was_current? {
            self.yield_now()?;
        }
        Ok(())
    }

    fn suspend_locked(&mut self, id: TaskId) -> Result<bool, KernelError> {
        let slot = self.sched.table.by_id(id)?;
        let tcb = self.sched.table.get_mut(slot);
        match tcb.state {
            TaskState::Ready | TaskState::Running => {
                let was_current = tcb.state == TaskState::Running;
                tcb.state = TaskState::Suspended;
                log::debug!("task {id} suspended");
                Ok(was_current)
            }
            _ => Err(KernelError::WrongState),
        }
    }

    /// Return a suspended task to the ready set. It runs again when a
    /// selector picks it.
    pub fn resume(&mut self, id: TaskId) -> Result<(), KernelError> {
        self.critical_enter();
        let result = self.resume_locked(id);
        self.critical_leave();
        result
    }

    fn resume_locked(&mut self, id: TaskId) -> Result<(), KernelError> {
        let slot = self.sched.table.by_id(id)?;
        let tcb = self.sched.table.get_mut(slot);
        if tcb.state != TaskState::Suspended {
            return Err(KernelError::WrongState);
        }
        tcb.state = TaskState::Ready;
        log::debug!("task {id} resumed");
        Ok(())
    }

    /// Change a task's round-robin priority level. Takes effect at its
    /// next selection; the countdown restarts at the new weight.
    pub fn set_priority(&mut self, id: TaskId, level: PriorityLevel) -> Result<(), KernelError> {
        let slot = self.sched.table.by_id(id)?;
        self.sched.table.get_mut(slot).priority = Priority::new(level);
        Ok(())
    }

    /// Id of the currently running task; `None` before `start()`.
    pub fn current_id(&self) -> Option<TaskId> {
        if self.sched.started {
            Some(self.sched.table.current().id)
        } else {
            None
        }
    }

    /// Number of registered tasks (including an injected idle task).
    pub fn task_count(&self) -> usize {
        self.sched.table.len()
    }

    pub fn ctx_switches(&self) -> u32 {
        self.sched.ctx_switches
    }

    /// Spin until the context-switch counter advances. Only meaningful on
    /// ports with an asynchronous timer; the hosted simulation port has
    /// none and returns immediately.
    pub fn wfi(&mut self) {
        let seen = self.sched.ctx_switches;
        while self.sched.ctx_switches == seen {
            if !self.port.wait_for_interrupt() {
                break;
            }
        }
    }

    /// Mask the tick timer. Pairs with [`Kernel::critical_leave`].
    pub fn critical_enter(&mut self) {
        self.port.timer_disable();
    }

    /// Unmask the tick timer.
    pub fn critical_leave(&mut self) {
        self.port.timer_enable();
    }

    // -----------------------------------------------------------------------
    // Faults
    // -----------------------------------------------------------------------

    fn ensure_running(&self) -> Result<(), KernelError> {
        if !self.sched.started {
            return Err(KernelError::WrongState);
        }
        if self.sched.halted {
            return Err(KernelError::Halted);
        }
        Ok(())
    }

    /// Verify the outgoing task's guard. A violation means its stack
    /// overflowed into the canary band: dump the band, announce the halt
    /// and latch the kernel. Memory is corrupt; there is no recovery.
    fn check_guard(&mut self) -> Result<(), KernelError> {
        if self.sched.guard_check().is_ok() {
            return Ok(());
        }

        let tcb = self.sched.table.current();
        let id = tcb.id;
        let bytes = tcb.guard.as_bytes();
        let base = bytes.as_ptr() as usize;
        self.port.hexdump(base, bytes);
        self.port
            .console(format_args!("*** HALT - task {id}, guard check failed\n"));
        log::error!("task {id} guard check failed, halting");
        self.sched.halted = true;
        Err(KernelError::GuardViolation)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
