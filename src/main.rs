//! # EdfOS Demo
//!
//! Drives the scheduler through one of three task groups on the hosted
//! simulation port and prints the hyperperiod reports:
//!
//! | Group | Task set `(period, capacity, deadline)` | Expectation |
//! |-------|------------------------------------------|-------------|
//! | `1` | 2 × (100,30,100) + two background tasks | no misses, 40 slack ticks per period shared round-robin |
//! | `2` | (120,20,90) (200,40,60) (100,20,80) (200,30,140) (100,10,100) | utilization 0.817, no misses over the 600-tick hyperperiod |
//! | `3` | 2 × (100,60,80) | utilization 1.2, both jobs shed every period (`dm:` lines) |
//!
//! Usage: `edfos [group] [ticks]` — defaults to group 2 for three
//! hyperperiods.

use std::env;

use edfos::config::DEFAULT_GUARD_SIZE;
use edfos::kernel::Kernel;
use edfos::port::hosted::StdoutPort;

// ---------------------------------------------------------------------------
// Task entry hooks
// ---------------------------------------------------------------------------

fn control_loop() {
    log::debug!("control loop online");
}

fn telemetry() {
    log::debug!("telemetry online");
}

fn background_worker() {
    log::debug!("background worker online");
}

fn housekeeping() {
    log::debug!("housekeeping online");
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

// ---------------------------------------------------------------------------
// Demo driver
// ---------------------------------------------------------------------------

fn main() {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Info);

    let group: u32 = env::args()
        .nth(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or(2);
    let ticks: u64 = env::args()
        .nth(2)
        .and_then(|a| a.parse().ok())
        .unwrap_or(1800);

    let mut kernel = Kernel::new(StdoutPort::default());

    let registered = match group {
        1 => {
            kernel
                .add_periodic(control_loop, 100, 30, 100, DEFAULT_GUARD_SIZE)
                .and_then(|_| kernel.add_periodic(telemetry, 100, 30, 100, DEFAULT_GUARD_SIZE))
                .and_then(|_| kernel.add(background_worker, DEFAULT_GUARD_SIZE))
                .and_then(|_| kernel.add(housekeeping, DEFAULT_GUARD_SIZE))
        }
        2 => kernel
            .add_periodic(control_loop, 120, 20, 90, DEFAULT_GUARD_SIZE)
            .and_then(|_| kernel.add_periodic(telemetry, 200, 40, 60, DEFAULT_GUARD_SIZE))
            .and_then(|_| kernel.add_periodic(background_worker, 100, 20, 80, DEFAULT_GUARD_SIZE))
            .and_then(|_| kernel.add_periodic(housekeeping, 200, 30, 140, DEFAULT_GUARD_SIZE))
            .and_then(|_| kernel.add_periodic(control_loop, 100, 10, 100, DEFAULT_GUARD_SIZE)),
        3 => kernel
            .add_periodic(control_loop, 100, 60, 80, DEFAULT_GUARD_SIZE)
            .and_then(|_| kernel.add_periodic(telemetry, 100, 60, 80, DEFAULT_GUARD_SIZE)),
        _ => {
            eprintln!("unknown group {group} (expected 1, 2 or 3)");
            std::process::exit(2);
        }
    };

    if let Err(e) = registered {
        eprintln!("task registration failed: {e}");
        std::process::exit(1);
    }

    if let Err(e) = kernel.start() {
        eprintln!("scheduler start failed: {e}");
        std::process::exit(1);
    }

    for _ in 0..ticks {
        if let Err(e) = kernel.tick() {
            eprintln!("kernel halted: {e}");
            std::process::exit(1);
        }
    }

    log::info!(
        "done: {} ticks, {} context switches",
        ticks,
        kernel.ctx_switches()
    );
}
