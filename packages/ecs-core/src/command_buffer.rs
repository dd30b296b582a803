//! Command buffer: per-thread deferred structural changes (§4.10).
//!
//! Grounded on `in-mem-db-core::transaction::{StagingBuffer, Transaction,
//! TransactionHandle}` (staged changes replayed in insertion order,
//! abort-on-drop discipline). The reference engine stages raw byte diffs for
//! one table; this kernel generalizes that to heterogeneous structural
//! commands across every registered table by boxing each deferred op as a
//! closure over [`crate::repository::Repository`] — the "generate one
//! monomorphized dispatch table" realization §9's Design Notes calls for, so
//! no virtual dispatch sits on the per-type hot path, only at playback.

use crate::chunk_table::ByteComponent;
use crate::entity_index::EntityHandle;
use crate::error::EcsError;
use crate::ref_table::ReferenceComponent;
use crate::repository::Repository;
use std::collections::HashMap;
use std::sync::Arc;

/// A buffer-local placeholder for an entity created earlier in the same
/// buffer, resolved to a real [`EntityHandle`] during [`CommandBuffer::playback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempHandle(u32);

#[derive(Debug, Clone, Copy)]
enum Target {
    Real(EntityHandle),
    Temp(TempHandle),
}

impl From<EntityHandle> for Target {
    fn from(h: EntityHandle) -> Self {
        Target::Real(h)
    }
}

impl From<TempHandle> for Target {
    fn from(h: TempHandle) -> Self {
        Target::Temp(h)
    }
}

fn resolve(target: Target, temp_map: &HashMap<u32, EntityHandle>) -> Option<EntityHandle> {
    match target {
        Target::Real(h) => Some(h),
        Target::Temp(t) => temp_map.get(&t.0).copied(),
    }
}

type DeferredOp = Box<dyn FnOnce(&mut Repository, &HashMap<u32, EntityHandle>) -> Result<(), EcsError>>;

enum Command {
    CreateEntity(TempHandle),
    DestroyEntity(Target),
    Op(DeferredOp),
}

/// Per-thread queue of deferred structural changes. Playback is
/// single-threaded, in insertion order; multiple buffers are replayed in
/// submission order by the caller.
#[derive(Default)]
pub struct CommandBuffer {
    next_temp_id: u32,
    commands: Vec<Command>,
    /// Playback errors, collected but never panicking (§4.10 Failure).
    errors: Vec<EcsError>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_entity(&mut self) -> TempHandle {
        let id = self.next_temp_id;
        self.next_temp_id += 1;
        let temp = TempHandle(id);
        self.commands.push(Command::CreateEntity(temp));
        temp
    }

    pub fn destroy_entity(&mut self, target: impl Into<Target>) {
        self.commands.push(Command::DestroyEntity(target.into()));
    }

    pub fn add_component<T: ByteComponent>(&mut self, target: impl Into<Target>, value: T) {
        let target = target.into();
        self.commands.push(Command::Op(Box::new(move |repo, temp_map| {
            let h = resolve(target, temp_map).ok_or(EcsError::StaleHandle {
                handle_generation: 0,
                slot_generation: 0,
            })?;
            repo.add(h, value)
        })));
    }

    pub fn remove_component<T: ByteComponent>(&mut self, target: impl Into<Target>) {
        let target = target.into();
        self.commands.push(Command::Op(Box::new(move |repo, temp_map| {
            let h = resolve(target, temp_map).ok_or(EcsError::StaleHandle {
                handle_generation: 0,
                slot_generation: 0,
            })?;
            repo.remove::<T>(h)
        })));
    }

    /// Reference-typed variant. The caller hands over sole ownership of
    /// `value`; sharing the same `Arc` across multiple buffer entries is the
    /// caller's responsibility to avoid (§4.10).
    pub fn add_component_ref<T>(&mut self, target: impl Into<Target>, value: Arc<T>)
    where
        T: ReferenceComponent + serde::Serialize + serde::de::DeserializeOwned,
    {
        let target = target.into();
        self.commands.push(Command::Op(Box::new(move |repo, temp_map| {
            let h = resolve(target, temp_map).ok_or(EcsError::StaleHandle {
                handle_generation: 0,
                slot_generation: 0,
            })?;
            repo.add_ref(h, value)
        })));
    }

    pub fn add_part<T: Send + Sync + 'static>(&mut self, target: impl Into<Target>, value: T) {
        let target = target.into();
        self.commands.push(Command::Op(Box::new(move |repo, temp_map| {
            let h = resolve(target, temp_map).ok_or(EcsError::StaleHandle {
                handle_generation: 0,
                slot_generation: 0,
            })?;
            repo.add_part(h, value)
        })));
    }

    pub fn remove_part<T: Send + Sync + 'static>(&mut self, target: impl Into<Target>, i: usize) {
        let target = target.into();
        self.commands.push(Command::Op(Box::new(move |repo, temp_map| {
            let h = resolve(target, temp_map).ok_or(EcsError::StaleHandle {
                handle_generation: 0,
                slot_generation: 0,
            })?;
            repo.remove_part::<T>(h, i);
            Ok(())
        })));
    }

    pub fn set_dis_type(&mut self, target: impl Into<Target>, w: u64) {
        let target = target.into();
        self.commands.push(Command::Op(Box::new(move |repo, temp_map| {
            let h = resolve(target, temp_map).ok_or(EcsError::StaleHandle {
                handle_generation: 0,
                slot_generation: 0,
            })?;
            repo.set_dis_type(h, w)
        })));
    }

    /// Replays every queued command against `repo`, in insertion order.
    /// A command against a stale handle is a no-op; errors are collected,
    /// never panicked (§4.10).
    pub fn playback(&mut self, repo: &mut Repository) {
        let mut temp_map: HashMap<u32, EntityHandle> = HashMap::new();
        for cmd in self.commands.drain(..) {
            match cmd {
                Command::CreateEntity(temp) => {
                    let h = repo.create_entity();
                    temp_map.insert(temp.0, h);
                }
                Command::DestroyEntity(target) => {
                    if let Some(h) = resolve(target, &temp_map) {
                        repo.destroy_entity(h);
                    }
                }
                Command::Op(op) => {
                    if let Err(e) = op(repo, &temp_map) {
                        self.errors.push(e);
                    }
                }
            }
        }
    }

    pub fn errors(&self) -> &[EcsError] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }
}
