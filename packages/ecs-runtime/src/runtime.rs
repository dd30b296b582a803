//! Runtime loop with tick phases and timing enforcement.
//!
//! Grounded on the reference engine's `Runtime` (`tick_duration`,
//! `sleep_remaining`, an incoming-request queue with capacity-bound
//! dropping), generalized from a fixed Api/Procedures/Persistence
//! percentage-budgeted split into whatever phase sequence the host's
//! [`PhaseConfig`] declares (§4.9's Rust realization). The reference
//! engine's per-procedure transaction isolation has no counterpart here —
//! systems share one `&mut Repository` and cannot be rolled back
//! independently — so panic recovery degrades from "abort this
//! transaction" to "log and skip this system", the same degradation the
//! event bus and command buffer already apply elsewhere in this kernel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ecs_core::{PhaseConfig, Repository, Result};
use tokio::sync::mpsc;

use crate::commands::Command;
use crate::procedure::{SystemFn, SystemRegistry};
use crate::tick_phases::PhaseProcessor;

/// Drives one [`Repository`] through a fixed cycle of named phases, once per
/// tick, sleeping off whatever's left of the configured tick duration.
pub struct Runtime {
    repo: Repository,
    phase_order: Vec<String>,
    /// Commands are drained and applied during this phase, ahead of its
    /// systems — the generalization of the reference engine's "Api" stage.
    ingest_phase: String,
    tick_duration: Duration,
    systems: SystemRegistry,
    command_rx: mpsc::Receiver<Command>,
    command_queue: VecDeque<Command>,
    commands_processed_this_tick: AtomicU32,
    dropped_commands: AtomicU64,
    queue_size: AtomicU64,
    queue_capacity: usize,
    tick_count: u64,
}

impl Runtime {
    /// Builds a runtime over `repo`, configuring it with `phase_config` and
    /// cycling through `phase_order` once per tick (the first name doubles
    /// as the ingest phase). Returns the paired [`mpsc::Sender`] callers
    /// submit [`Command`]s through.
    pub fn new(
        mut repo: Repository,
        phase_config: PhaseConfig,
        phase_order: Vec<String>,
        command_capacity: usize,
    ) -> Result<(Self, mpsc::Sender<Command>)> {
        let ingest_phase = phase_order
            .first()
            .cloned()
            .expect("phase_order must name at least one phase");
        repo.set_phase_config(phase_config)?;
        repo.set_phase(&ingest_phase)?;
        let tick_duration = repo.config().tick_duration();
        let (tx, rx) = mpsc::channel(command_capacity.max(1));

        let runtime = Self {
            repo,
            phase_order,
            ingest_phase,
            tick_duration,
            systems: SystemRegistry::new(),
            command_rx: rx,
            command_queue: VecDeque::new(),
            commands_processed_this_tick: AtomicU32::new(0),
            dropped_commands: AtomicU64::new(0),
            queue_size: AtomicU64::new(0),
            queue_capacity: command_capacity,
            tick_count: 0,
        };
        Ok((runtime, tx))
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn repo_mut(&mut self) -> &mut Repository {
        &mut self.repo
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn dropped_commands(&self) -> u64 {
        self.dropped_commands.load(Ordering::Relaxed)
    }

    /// Registers a system to run whenever `phase` is active.
    pub fn register_system(&mut self, phase: impl Into<String>, name: impl Into<String>, func: SystemFn) {
        self.systems.register(phase, name, func);
    }

    /// Queue depth and lifetime-dropped-command count, for testing and
    /// monitoring.
    pub fn queue_sizes(&self) -> (usize, u64) {
        (self.command_queue.len(), self.dropped_commands.load(Ordering::Relaxed))
    }

    /// Drains the incoming channel into the local queue, dropping commands
    /// past `queue_capacity` the same way the reference engine's API phase
    /// drops requests past its own queue cap.
    fn drain_command_channel(&mut self) {
        while let Ok(cmd) = self.command_rx.try_recv() {
            if self.queue_size.load(Ordering::Relaxed) >= self.queue_capacity as u64 {
                self.dropped_commands.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            self.command_queue.push_back(cmd);
            self.queue_size.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Applies every queued command against the live repository, in arrival
    /// order.
    fn process_queued_commands(&mut self) {
        let mut processed = 0u32;
        while let Some(cmd) = self.command_queue.pop_front() {
            self.queue_size.fetch_sub(1, Ordering::Relaxed);
            cmd.apply(&mut self.repo);
            processed += 1;
        }
        self.commands_processed_this_tick.store(processed, Ordering::Relaxed);
    }

    /// Runs every system registered under `phase`, in registration order,
    /// each wrapped in `catch_unwind` so one system panicking doesn't take
    /// the tick down with it.
    fn run_systems_for_phase(&mut self, phase: &str) {
        let systems: Vec<_> = self
            .systems
            .for_phase(phase)
            .map(|(name, f)| (name.to_string(), f.clone()))
            .collect();
        for (name, func) in systems {
            let repo = &mut self.repo;
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| func(repo)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(system = %name, error = %e, "system returned an error"),
                Err(panic) => tracing::error!(system = %name, panic = %panic_message(&panic), "system panicked"),
            }
        }
    }

    /// Transitions into `phase`, drains and applies queued commands if it's
    /// the ingest phase, then runs every system registered under it.
    pub(crate) fn enter_phase(&mut self, phase: &str) -> Result<()> {
        self.repo.set_phase(phase)?;
        tracing::debug!(phase, tick = self.tick_count, "entering phase");
        if phase == self.ingest_phase {
            self.drain_command_channel();
            self.process_queued_commands();
        }
        self.run_systems_for_phase(phase);
        Ok(())
    }

    /// Executes one tick: advances the global version, cycles through every
    /// configured phase once, then sleeps off whatever's left of
    /// `tick_duration`.
    pub fn tick(&mut self) -> Result<()> {
        let tick_start = Instant::now();
        self.repo.tick();

        let phases = self.phase_order.clone();
        for phase in &phases {
            self.process_named_phase(phase)?;
        }

        self.tick_count += 1;
        self.sleep_remaining(tick_start);
        Ok(())
    }

    /// Runs the tick loop until `should_continue` returns `false`, checked
    /// once per tick (blocking).
    pub fn run(&mut self, should_continue: impl Fn() -> bool) -> Result<()> {
        while should_continue() {
            self.tick()?;
        }
        Ok(())
    }

    fn sleep_remaining(&self, tick_start: Instant) {
        if let Some(remaining) = self.tick_duration.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
