//! Tick-based runtime that drives an [`ecs_core::Repository`] through a
//! configurable named-phase graph, once per tick, on the reference engine's
//! own tick-budget/sleep-remainder loop shape.

mod commands;
mod procedure;
mod runtime;
mod tick_phases;

pub use commands::Command;
pub use procedure::{SystemFn, SystemRegistry};
pub use runtime::Runtime;
pub use tick_phases::PhaseProcessor;

/// Result type for runtime operations.
pub type Result<T> = ecs_core::Result<T>;
