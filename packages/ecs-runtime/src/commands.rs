//! Commands accepted by the runtime between ticks.
//!
//! The reference engine split incoming work into DDL requests (schema
//! changes), DML requests (CRUD), and RPC calls, each carrying its own
//! `ResponseSender`. This kernel has no schema-definition phase distinct
//! from its structural entity mutations — both go through the same
//! [`ecs_core::CommandBuffer`] discipline (§4.10) — so the three-way split
//! collapses into two command kinds: a structural batch, or an arbitrary
//! mutation closure for anything a command buffer can't express (authority
//! handoffs, DIS-type tagging, phase reconfiguration).

use ecs_core::{CommandBuffer, Repository};

/// One unit of work submitted to the runtime from outside the tick loop.
pub enum Command {
    /// A batch of deferred structural changes, played back in one call.
    Structural(CommandBuffer),
    /// An arbitrary mutation against the live repository.
    Mutate(Box<dyn FnOnce(&mut Repository) + Send>),
}

impl Command {
    pub fn structural(buffer: CommandBuffer) -> Self {
        Command::Structural(buffer)
    }

    pub fn mutate(f: impl FnOnce(&mut Repository) + Send + 'static) -> Self {
        Command::Mutate(Box::new(f))
    }

    /// Applies this command to `repo`.
    pub(crate) fn apply(self, repo: &mut Repository) {
        match self {
            Command::Structural(mut buffer) => buffer.playback(repo),
            Command::Mutate(f) => f(repo),
        }
    }
}
