//! Per-phase tick processing, factored out of [`crate::Runtime::tick`] into a
//! trait the same way the reference engine separated `TickPhaseProcessor`
//! from its fixed `TickPhase::{Api, Procedures, Persistence}` enum —
//! generalized here from three hard-coded variants to whatever phase name
//! the host's `PhaseConfig` declares.

use ecs_core::Result;

/// Processes one named phase of a tick.
pub trait PhaseProcessor {
    fn process_named_phase(&mut self, phase: &str) -> Result<()>;
}

impl PhaseProcessor for crate::Runtime {
    fn process_named_phase(&mut self, phase: &str) -> Result<()> {
        self.enter_phase(phase)
    }
}
