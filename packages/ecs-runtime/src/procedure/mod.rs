//! System registry: named per-phase mutating functions run once per tick
//! while their phase is active.
//!
//! Generalizes the reference engine's procedure registry — JSON-RPC
//! callables validated against a declared parameter schema before dispatch —
//! into plain Rust closures over a live [`Repository`]. There is no
//! over-the-wire parameter list to validate anymore, so the schema-checking
//! half of the reference registry has no counterpart here; what survives is
//! the name-keyed lookup and the "registered once at startup, looked up
//! every tick" shape.

use ecs_core::{Repository, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// A system: one named unit of per-tick logic bound to a phase.
pub type SystemFn = Arc<dyn Fn(&mut Repository) -> Result<()> + Send + Sync>;

struct SystemEntry {
    name: String,
    phase: String,
    func: SystemFn,
}

/// Ordered registry of systems, grouped by the phase they run under.
/// Execution order within a phase is registration order: the kernel's
/// determinism guarantee extends to system scheduling, not just entity
/// iteration (§1 P3).
#[derive(Default)]
pub struct SystemRegistry {
    entries: Vec<SystemEntry>,
    by_name: HashMap<String, usize>,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `func` under `name`, to run whenever `phase` is active.
    pub fn register(&mut self, phase: impl Into<String>, name: impl Into<String>, func: SystemFn) {
        let name = name.into();
        let idx = self.entries.len();
        self.entries.push(SystemEntry {
            name: name.clone(),
            phase: phase.into(),
            func,
        });
        self.by_name.insert(name, idx);
    }

    /// Looks up a previously registered system by name, regardless of phase.
    pub fn get(&self, name: &str) -> Option<SystemFn> {
        self.by_name.get(name).map(|&i| self.entries[i].func.clone())
    }

    /// Every system registered under `phase`, in registration order.
    pub fn for_phase<'a>(&'a self, phase: &'a str) -> impl Iterator<Item = (&'a str, &'a SystemFn)> {
        self.entries
            .iter()
            .filter(move |e| e.phase == phase)
            .map(|e| (e.name.as_str(), &e.func))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
