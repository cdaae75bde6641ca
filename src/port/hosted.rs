//! # Hosted Ports
//!
//! Simulation ports for running the kernel in a normal process: the
//! scheduler's decisions are real, the context switches are bookkeeping.
//! [`StdoutPort`] backs the demo binary; [`CapturePort`] records
//! everything for assertions in tests.

use core::fmt;

use std::string::String;
use std::vec::Vec;
use std::{print, println};

use super::Port;

/// Saved "context" of a simulated task: just a resume counter, useful
/// when eyeballing traces.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimContext {
    pub saves: u32,
    pub resumes: u32,
}

// ---------------------------------------------------------------------------
// StdoutPort
// ---------------------------------------------------------------------------

/// Hosted port that prints console output to stdout. The simulation has
/// no hardware timer; ticks come from whoever drives the kernel.
#[derive(Debug, Default)]
pub struct StdoutPort;

impl Port for StdoutPort {
    type Context = SimContext;

    fn timer_enable(&mut self) {}

    fn timer_disable(&mut self) {}

    fn tick_ack(&mut self) {}

    fn context_save(&mut self, ctx: &mut SimContext) -> bool {
        ctx.saves += 1;
        false
    }

    fn context_restore(&mut self, ctx: &mut SimContext) {
        ctx.resumes += 1;
    }

    fn wait_for_interrupt(&mut self) -> bool {
        false
    }

    fn console(&mut self, args: fmt::Arguments<'_>) {
        print!("{args}");
    }

    fn hexdump(&mut self, base: usize, data: &[u8]) {
        for (row, chunk) in data.chunks(16).enumerate() {
            print!("{:08x} ", base + row * 16);
            for byte in chunk {
                print!(" {byte:02x}");
            }
            println!();
        }
    }
}

// ---------------------------------------------------------------------------
// CapturePort
// ---------------------------------------------------------------------------

/// Hosted port that records all observable kernel output.
#[derive(Debug, Default)]
pub struct CapturePort {
    /// Everything written through [`Port::console`].
    pub console: String,
    /// One `(base, length)` entry per hexdump.
    pub hexdumps: Vec<(usize, usize)>,
    pub timer_enables: u32,
    pub timer_disables: u32,
    pub tick_acks: u32,
    pub restores: u32,
}

impl CapturePort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines of captured console output.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.console.lines()
    }

    /// Count console lines equal to `line`.
    pub fn count_lines(&self, line: &str) -> usize {
        self.lines().filter(|l| *l == line).count()
    }
}

impl Port for CapturePort {
    type Context = SimContext;

    fn timer_enable(&mut self) {
        self.timer_enables += 1;
    }

    fn timer_disable(&mut self) {
        self.timer_disables += 1;
    }

    fn tick_ack(&mut self) {
        self.tick_acks += 1;
    }

    fn context_save(&mut self, ctx: &mut SimContext) -> bool {
        ctx.saves += 1;
        false
    }

    fn context_restore(&mut self, ctx: &mut SimContext) {
        ctx.resumes += 1;
        self.restores += 1;
    }

    fn wait_for_interrupt(&mut self) -> bool {
        false
    }

    fn console(&mut self, args: fmt::Arguments<'_>) {
        // Writing into a String cannot fail.
        let _ = fmt::write(&mut self.console, args);
    }

    fn hexdump(&mut self, base: usize, data: &[u8]) {
        self.hexdumps.push((base, data.len()));
    }
}
