//! Entity Repository: the facade that owns every table, the entity index,
//! the phase state, the event bus, and the global version tick (§4.7).
//!
//! Grounded on `ecsdb::db::Database` (`register_component`, `create_entity`,
//! `insert`/`update`/`delete`/`get`, `commit`) for the overall facade shape,
//! and `in-mem-db-core::database::Database`'s `get_table`/`get_table_mut`
//! guard-wrapper pattern for safely routing a dense `u8` id to the right
//! concrete table without virtual dispatch on the per-type hot path: every
//! accessor resolves `TypeId -> u8` once via the registry, then reaches the
//! concrete `ChunkTable<T>`/`RefTable<T>` through a `HashMap<TypeId, Arc<dyn
//! Any>>` downcast, exactly as `EventBus` already does for event streams.

use crate::chunk_table::{ByteComponent, ChunkTable, RawChunkTable};
use crate::entity_index::{EntityHandle, EntityIndex, HEADER_PSEUDO_TYPE_ID};
use crate::error::{EcsError, Result};
use crate::event_bus::{EventBus, EventComponent, ManagedEventComponent};
use crate::heap::MultiPartHeap;
use crate::mask::Mask256;
use crate::phase::{PhaseConfig, PhaseState};
use crate::query::{ParallelHint, QueryDesc, TimeSliceMetric, TimeSliceState};
use crate::ref_table::{RawRefTable, RefTable, ReferenceComponent};
use crate::registry::{ComponentKind, ComponentRegistry};
use crate::config::EcsConfig;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Owns every table, the entity index, phase state, the event bus, and the
/// global version tick. The sole owner of mutable kernel state (§3
/// "Ownership"); handles are value copies, never borrows into the
/// repository.
pub struct Repository {
    config: EcsConfig,
    registry: ComponentRegistry,
    index: EntityIndex,
    bus: EventBus,
    phase_config: Option<PhaseConfig>,
    phase: Option<PhaseState>,
    global_version: u32,

    byte_typed: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    byte_by_id: HashMap<u8, Arc<dyn RawChunkTable>>,
    ref_typed: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    ref_by_id: HashMap<u8, Arc<dyn RawRefTable>>,
    multi_part: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    multi_part_ids: HashMap<TypeId, u8>,
}

impl Repository {
    pub fn new(config: EcsConfig) -> Result<Self> {
        Ok(Self {
            index: EntityIndex::new(config.max_entities)?,
            config,
            registry: ComponentRegistry::new(),
            bus: EventBus::new(),
            phase_config: None,
            phase: None,
            global_version: 0,
            byte_typed: HashMap::new(),
            byte_by_id: HashMap::new(),
            ref_typed: HashMap::new(),
            ref_by_id: HashMap::new(),
            multi_part: HashMap::new(),
            multi_part_ids: HashMap::new(),
        })
    }

    pub fn config(&self) -> &EcsConfig {
        &self.config
    }

    pub fn global_version(&self) -> u32 {
        self.global_version
    }

    // --- Registration (§4.6, §6 "Registration API") ----------------------

    pub fn register_byte_packed<T: ByteComponent>(&mut self) -> Result<u8> {
        let id = self
            .registry
            .register::<T>(ComponentKind::ByteValue, std::mem::size_of::<T>())?;
        let type_id = TypeId::of::<T>();
        if !self.byte_typed.contains_key(&type_id) {
            let table = Arc::new(ChunkTable::<T>::new(self.config.max_entities)?);
            self.byte_typed.insert(type_id, Box::new(table.clone()));
            self.byte_by_id.insert(id, table);
        }
        Ok(id)
    }

    pub fn register_reference<T>(&mut self) -> Result<u8>
    where
        T: ReferenceComponent + Serialize + DeserializeOwned,
    {
        let id = self.registry.register::<T>(ComponentKind::ReferenceValue, 0)?;
        let type_id = TypeId::of::<T>();
        if !self.ref_typed.contains_key(&type_id) {
            let chunk_capacity = self.index.chunk_capacity();
            let table = Arc::new(RefTable::<T>::new(self.config.max_entities, chunk_capacity));
            self.ref_typed.insert(type_id, Box::new(table.clone()));
            self.ref_by_id.insert(id, table);
        }
        Ok(id)
    }

    /// Tags are size-1 markers: presence is recorded purely via the entity
    /// header's component mask bit, with no backing table (§4.6).
    pub fn register_tag<T: 'static>(&mut self) -> Result<u8> {
        self.registry.register::<T>(ComponentKind::Tag, 1)
    }

    pub fn register_multi_part<T: Send + Sync + 'static>(&mut self) -> Result<u8> {
        let id = self.registry.register::<T>(ComponentKind::MultiPart, 0)?;
        let type_id = TypeId::of::<T>();
        self.multi_part
            .entry(type_id)
            .or_insert_with(|| Box::new(MultiPartHeap::<T>::new()));
        self.multi_part_ids.insert(type_id, id);
        Ok(id)
    }

    pub fn register_event<T: EventComponent>(&mut self, stable_id: u32) -> Result<()> {
        self.bus.register_event::<T>(stable_id)
    }

    pub fn register_managed_event<T>(&mut self, stable_id: u32) -> Result<()>
    where
        T: ManagedEventComponent + Serialize + DeserializeOwned,
    {
        self.bus.register_managed_event::<T>(stable_id)
    }

    fn id_of<T: 'static>(&self) -> Result<u8> {
        self.registry.id_of::<T>()
    }

    fn byte_table<T: ByteComponent>(&self) -> Result<&Arc<ChunkTable<T>>> {
        self.byte_typed
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref::<Arc<ChunkTable<T>>>())
            .ok_or(EcsError::NotRegistered)
    }

    fn ref_table<T>(&self) -> Result<&Arc<RefTable<T>>>
    where
        T: ReferenceComponent + Serialize + DeserializeOwned,
    {
        self.ref_typed
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref::<Arc<RefTable<T>>>())
            .ok_or(EcsError::NotRegistered)
    }

    fn multi_part_heap<T: Send + Sync + 'static>(&self) -> Result<&MultiPartHeap<T>> {
        self.multi_part
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref::<MultiPartHeap<T>>())
            .ok_or(EcsError::NotRegistered)
    }

    fn multi_part_heap_mut<T: Send + Sync + 'static>(&mut self) -> Result<&mut MultiPartHeap<T>> {
        self.multi_part
            .get_mut(&TypeId::of::<T>())
            .and_then(|b| b.downcast_mut::<MultiPartHeap<T>>())
            .ok_or(EcsError::NotRegistered)
    }

    // --- Phase system (§4.9) ----------------------------------------------

    pub fn set_phase_config(&mut self, config: PhaseConfig) -> Result<()> {
        self.phase_config = Some(config);
        self.phase = None;
        Ok(())
    }

    /// Enters `name`. The very first call after `set_phase_config` seeds the
    /// phase state directly (no prior phase to validate a transition edge
    /// from); subsequent calls validate against the configured graph.
    pub fn set_phase(&mut self, name: &str) -> Result<()> {
        match self.phase.as_mut() {
            Some(state) => state.transition(name),
            None => {
                let config = self
                    .phase_config
                    .clone()
                    .ok_or_else(|| EcsError::InvalidTransitionTarget(name.to_string()))?;
                self.phase = Some(PhaseState::new(config, name)?);
                Ok(())
            }
        }
    }

    pub fn current_phase(&self) -> Option<&str> {
        self.phase.as_ref().map(|p| p.current_name())
    }

    fn check_write(&self, component_id: u8, owns: bool) -> Result<()> {
        let _ = component_id;
        match &self.phase {
            Some(state) => state.check_write(owns),
            // No phase configured at all: treat as unrestricted (matches
            // `PhaseConfig::relaxed`'s everywhere-`ReadWriteAll` semantics).
            None => Ok(()),
        }
    }

    // --- Tick / lifecycle (§4.7) -------------------------------------------

    pub fn tick(&mut self) -> u32 {
        self.global_version += 1;
        self.global_version
    }

    /// Forces the global version counter to `v`, used by the Playback
    /// Engine after restoring a frame so the next live `tick()` continues
    /// from the recorded point rather than from zero (§4.14).
    pub fn set_global_version(&mut self, v: u32) {
        self.global_version = v;
    }

    pub fn create_entity(&mut self) -> EntityHandle {
        self.index.create(self.global_version)
    }

    pub fn destroy_entity(&mut self, h: EntityHandle) -> bool {
        self.index.destroy(h, self.global_version)
    }

    pub fn is_alive(&self, h: EntityHandle) -> bool {
        self.index.is_alive(h)
    }

    pub fn active_count(&self) -> u32 {
        self.index.active_count()
    }

    fn require_alive(&self, h: EntityHandle) -> Result<()> {
        if self.index.is_alive(h) {
            Ok(())
        } else {
            Err(EcsError::StaleHandle {
                handle_generation: h.generation,
                slot_generation: self.index.header(h.index).generation,
            })
        }
    }

    // --- Byte-packed components (§4.2, §4.7) ------------------------------

    pub fn add<T: ByteComponent>(&mut self, h: EntityHandle, value: T) -> Result<()> {
        self.require_alive(h)?;
        let id = self.id_of::<T>()?;
        let owns = self.index.header(h.index).authority_mask.test(id);
        self.check_write(id, owns)?;
        self.byte_table::<T>()?.write(h.index, value, self.global_version)?;
        self.index.with_header_mut(h.index, self.global_version, |hd| {
            hd.component_mask.set(id);
            hd.last_change_tick = self.global_version;
        });
        Ok(())
    }

    pub fn remove<T: ByteComponent>(&mut self, h: EntityHandle) -> Result<()> {
        self.require_alive(h)?;
        let id = self.id_of::<T>()?;
        let owns = self.index.header(h.index).authority_mask.test(id);
        self.check_write(id, owns)?;
        self.index.with_header_mut(h.index, self.global_version, |hd| {
            hd.component_mask.clear(id);
            hd.last_change_tick = self.global_version;
        });
        Ok(())
    }

    pub fn get<T>(&self, h: EntityHandle) -> Result<T>
    where
        T: ByteComponent + Default,
    {
        self.require_alive(h)?;
        self.id_of::<T>()?;
        Ok(self.byte_table::<T>()?.read(h.index))
    }

    /// Mutates the component in place via a short-lived scope token, the
    /// idiomatic realization of `get_mut<T>(h) -> &mut T` noted in §9's
    /// Design Notes.
    pub fn get_mut<T, R>(&mut self, h: EntityHandle, f: impl FnOnce(&mut T) -> R) -> Result<R>
    where
        T: ByteComponent,
    {
        self.require_alive(h)?;
        let id = self.id_of::<T>()?;
        let owns = self.index.header(h.index).authority_mask.test(id);
        self.check_write(id, owns)?;
        let r = self.byte_table::<T>()?.with_mut(h.index, self.global_version, f)?;
        self.index.with_header_mut(h.index, self.global_version, |hd| {
            hd.last_change_tick = self.global_version;
        });
        Ok(r)
    }

    pub fn has<T: 'static>(&self, h: EntityHandle) -> Result<bool> {
        let id = self.id_of::<T>()?;
        Ok(self.index.header(h.index).component_mask.test(id))
    }

    // --- Tags ---------------------------------------------------------------

    pub fn add_tag<T: 'static>(&mut self, h: EntityHandle) -> Result<()> {
        self.require_alive(h)?;
        let id = self.id_of::<T>()?;
        self.index.with_header_mut(h.index, self.global_version, |hd| {
            hd.component_mask.set(id);
            hd.last_change_tick = self.global_version;
        });
        Ok(())
    }

    pub fn remove_tag<T: 'static>(&mut self, h: EntityHandle) -> Result<()> {
        self.require_alive(h)?;
        let id = self.id_of::<T>()?;
        self.index.with_header_mut(h.index, self.global_version, |hd| {
            hd.component_mask.clear(id);
            hd.last_change_tick = self.global_version;
        });
        Ok(())
    }

    // --- Reference-typed components (§4.3) --------------------------------

    pub fn add_ref<T>(&mut self, h: EntityHandle, value: Arc<T>) -> Result<()>
    where
        T: ReferenceComponent + Serialize + DeserializeOwned,
    {
        self.require_alive(h)?;
        let id = self.id_of::<T>()?;
        let owns = self.index.header(h.index).authority_mask.test(id);
        self.check_write(id, owns)?;
        self.ref_table::<T>()?.write(h.index, value, self.global_version);
        self.index.with_header_mut(h.index, self.global_version, |hd| {
            hd.component_mask.set(id);
            hd.last_change_tick = self.global_version;
        });
        Ok(())
    }

    pub fn remove_ref<T>(&mut self, h: EntityHandle) -> Result<()>
    where
        T: ReferenceComponent + Serialize + DeserializeOwned,
    {
        self.require_alive(h)?;
        let id = self.id_of::<T>()?;
        let owns = self.index.header(h.index).authority_mask.test(id);
        self.check_write(id, owns)?;
        self.ref_table::<T>()?.clear_slot(h.index, self.global_version);
        self.index.with_header_mut(h.index, self.global_version, |hd| {
            hd.component_mask.clear(id);
            hd.last_change_tick = self.global_version;
        });
        Ok(())
    }

    pub fn get_managed<T>(&self, h: EntityHandle) -> Result<Option<Arc<T>>>
    where
        T: ReferenceComponent + Serialize + DeserializeOwned,
    {
        self.require_alive(h)?;
        self.id_of::<T>()?;
        Ok(self.ref_table::<T>()?.read(h.index))
    }

    // --- Authority (replication gating, §3/§4.9) --------------------------

    /// Sets (or clears) the aggregate authority bit for `T` on `h`. The core
    /// exposes only this aggregate bit; any richer per-descriptor ownership
    /// map is the host's concern (§9 Open Questions).
    pub fn set_authority<T: 'static>(&mut self, h: EntityHandle, owned: bool) -> Result<()> {
        self.require_alive(h)?;
        let id = self.id_of::<T>()?;
        self.index.with_header_mut(h.index, self.global_version, |hd| {
            if owned {
                hd.authority_mask.set(id);
            } else {
                hd.authority_mask.clear(id);
            }
        });
        Ok(())
    }

    // --- Multi-part subcomponents (§4.5) ----------------------------------

    pub fn parts<T: Send + Sync + 'static>(&self, h: EntityHandle) -> Result<&[T]> {
        self.require_alive(h)?;
        Ok(self.multi_part_heap::<T>()?.get(h.index))
    }

    pub fn add_part<T: Send + Sync + 'static>(&mut self, h: EntityHandle, value: T) -> Result<()> {
        self.require_alive(h)?;
        let id = *self
            .multi_part_ids
            .get(&TypeId::of::<T>())
            .ok_or(EcsError::NotRegistered)?;
        self.multi_part_heap_mut::<T>()?.add(h.index, value);
        self.index.with_header_mut(h.index, self.global_version, |hd| {
            hd.component_mask.set(id);
            hd.last_change_tick = self.global_version;
        });
        Ok(())
    }

    /// Removes part `i` via swap-with-last (§4.5). A no-op on a stale handle
    /// or out-of-range index, matching the command buffer's no-panic
    /// playback contract.
    pub fn remove_part<T: Send + Sync + 'static>(&mut self, h: EntityHandle, i: usize) {
        if !self.index.is_alive(h) {
            return;
        }
        let Some(id) = self.multi_part_ids.get(&TypeId::of::<T>()).copied() else {
            return;
        };
        let Ok(heap) = self.multi_part_heap_mut::<T>() else {
            return;
        };
        heap.remove(h.index, i);
        let now_empty = heap.get(h.index).is_empty();
        self.index.with_header_mut(h.index, self.global_version, |hd| {
            if now_empty {
                hd.component_mask.clear(id);
            }
            hd.last_change_tick = self.global_version;
        });
    }

    // --- DIS type (broad-phase filter, §3) --------------------------------

    pub fn set_dis_type(&mut self, h: EntityHandle, w: u64) -> Result<()> {
        self.require_alive(h)?;
        self.index.with_header_mut(h.index, self.global_version, |hd| {
            hd.dis_type = w;
            hd.last_change_tick = self.global_version;
        });
        Ok(())
    }

    // --- Query engine access (§4.8) ---------------------------------------

    pub fn query(&self) -> QueryBuilder<'_> {
        QueryBuilder {
            repo: self,
            desc: QueryDesc::new(),
        }
    }

    /// Resolves the dense id for `T`, for building a [`QueryDesc`] by hand
    /// (e.g. inside [`QueryBuilder`]).
    pub fn component_id<T: 'static>(&self) -> Result<u8> {
        self.id_of::<T>()
    }

    pub fn index(&self) -> &EntityIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut EntityIndex {
        &mut self.index
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    // --- Snapshot codec plumbing (§4.7 `get_raw_table`, §4.12) ------------

    pub fn byte_table_ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.byte_by_id.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn ref_table_ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.ref_by_id.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn get_raw_table(&self, id: u8) -> Option<&Arc<dyn RawChunkTable>> {
        self.byte_by_id.get(&id)
    }

    pub fn get_raw_ref_table(&self, id: u8) -> Option<&Arc<dyn RawRefTable>> {
        self.ref_by_id.get(&id)
    }

    /// The version of the header chunk addressed at the spec's pseudo id -1
    /// (§4.4, §4.12), or any other registered table by its real id.
    pub fn chunk_version_for(&self, type_id: i32, chunk_idx: usize) -> u32 {
        if type_id == HEADER_PSEUDO_TYPE_ID {
            self.index.chunk_version(chunk_idx)
        } else {
            let id = type_id as u8;
            self.byte_by_id
                .get(&id)
                .map(|t| t.chunk_version(chunk_idx))
                .or_else(|| self.ref_by_id.get(&id).map(|t| t.chunk_version(chunk_idx)))
                .unwrap_or(0)
        }
    }

    /// Sets (or clears) the component-mask bit for `slot`, used by the
    /// playback engine's mask repair after reference-typed restoration
    /// (§4.14).
    pub fn set_mask_bit(&mut self, slot: u32, component_id: u8, present: bool) {
        self.index.with_header_mut(slot, self.global_version, |hd| {
            if present {
                hd.component_mask.set(component_id);
            } else {
                hd.component_mask.clear(component_id);
            }
        });
    }

    /// Resets the repository to empty: index, destruction log, every table's
    /// contents are zeroed, but committed pages stay resident for reuse
    /// (§4.7).
    pub fn clear(&mut self) {
        self.index.clear();
        for t in self.byte_by_id.values() {
            t.clear_contents();
        }
        for t in self.ref_by_id.values() {
            t.clear_contents();
        }
        self.bus.clear_current();
    }

    pub fn drain_destruction_log(&mut self) -> Vec<(u32, u16)> {
        self.index.drain_destruction_log()
    }
}

/// Fluent query construction over a [`Repository`] (§4.8, §6).
pub struct QueryBuilder<'a> {
    repo: &'a Repository,
    desc: QueryDesc,
}

impl<'a> QueryBuilder<'a> {
    pub fn with<T: 'static>(mut self) -> Result<Self> {
        let id = self.repo.component_id::<T>()?;
        self.desc = self.desc.include_bit(id);
        Ok(self)
    }

    pub fn without<T: 'static>(mut self) -> Result<Self> {
        let id = self.repo.component_id::<T>()?;
        self.desc = self.desc.exclude_bit(id);
        Ok(self)
    }

    pub fn owned<T: 'static>(mut self) -> Result<Self> {
        let id = self.repo.component_id::<T>()?;
        self.desc = self.desc.owned(Mask256::single(id));
        Ok(self)
    }

    pub fn dis(mut self, target: u64, mask: u64) -> Self {
        self.desc = self.desc.dis(target, mask);
        self
    }

    pub fn desc(&self) -> QueryDesc {
        self.desc
    }

    pub fn for_each(&self, mut visit: impl FnMut(EntityHandle)) {
        crate::query::query_full(&self.repo.index, &self.desc, |h, _| visit(h));
    }

    pub fn count(&self) -> usize {
        let mut n = 0usize;
        self.for_each(|_| n += 1);
        n
    }

    pub fn collect_handles(&self) -> Vec<EntityHandle> {
        let mut out = Vec::new();
        self.for_each(|h| out.push(h));
        out
    }

    /// Delta iteration: a slot is a candidate if its own header changed
    /// since `baseline`, or any table touched by this query's include mask
    /// changed a chunk since `baseline` (§4.8).
    pub fn for_each_delta(&self, baseline: u32, mut visit: impl FnMut(EntityHandle)) {
        let include = self.desc.include_mask();
        let touched_tables: Vec<u8> = (0..=255u8).filter(|&id| include.test(id)).collect();
        crate::query::query_delta(
            &self.repo.index,
            &self.desc,
            baseline,
            |chunk_idx| {
                touched_tables
                    .iter()
                    .map(|&id| {
                        self.repo
                            .byte_by_id
                            .get(&id)
                            .map(|t| t.chunk_version(chunk_idx))
                            .or_else(|| self.repo.ref_by_id.get(&id).map(|t| t.chunk_version(chunk_idx)))
                            .unwrap_or(0)
                    })
                    .max()
                    .unwrap_or(0)
            },
            |h, _| visit(h),
        );
    }

    pub fn time_sliced(
        &self,
        state: &mut TimeSliceState,
        budget: TimeSliceMetric,
        mut visit: impl FnMut(EntityHandle),
    ) {
        crate::query::query_time_sliced(&self.repo.index, &self.desc, state, budget, |h, _| visit(h));
    }

    pub fn parallel(&self, hint: ParallelHint, handler: impl Fn(EntityHandle) + Sync) {
        crate::query::query_parallel(&self.repo.index, &self.desc, hint, |h, _| handler(h));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    unsafe impl ByteComponent for Position {}

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Velocity {
        dx: f32,
    }
    unsafe impl ByteComponent for Velocity {}

    fn repo() -> Repository {
        let mut r = Repository::new(EcsConfig {
            max_entities: 256,
            ..EcsConfig::default()
        })
        .unwrap();
        r.register_byte_packed::<Position>().unwrap();
        r.register_byte_packed::<Velocity>().unwrap();
        r
    }

    #[test]
    fn create_add_read() {
        let mut r = repo();
        let h = r.create_entity();
        assert!(r.is_alive(h));
        r.add(h, Position { x: 1.0, y: 2.0 }).unwrap();
        assert_eq!(r.get::<Position>(h).unwrap(), Position { x: 1.0, y: 2.0 });
        assert_eq!(r.query().with::<Position>().unwrap().count(), 1);
    }

    #[test]
    fn destroy_and_slot_reuse() {
        let mut r = repo();
        let h1 = r.create_entity();
        r.destroy_entity(h1);
        let h2 = r.create_entity();
        assert_eq!(h1.index, h2.index);
        assert_ne!(h1.generation, h2.generation);
        assert!(!r.is_alive(h1));
        assert!(r.is_alive(h2));
    }

    #[test]
    fn delta_detection_only_yields_mutated_entities() {
        let mut r = repo();
        let h = r.create_entity();
        r.add(h, Position { x: 0.0, y: 0.0 }).unwrap();
        r.tick();
        let baseline = r.global_version();
        r.get_mut::<Position, _>(h, |p| p.x = 10.0).unwrap();
        r.tick();
        let h2 = r.create_entity();
        r.add(h2, Position { x: 5.0, y: 5.0 }).unwrap();

        let q = r.query().with::<Position>().unwrap();
        let mut seen = Vec::new();
        q.for_each_delta(baseline, |h| seen.push(h));
        assert!(seen.contains(&h));
        assert!(seen.contains(&h2));
    }

    #[test]
    fn access_to_unregistered_component_fails() {
        let mut r = repo();
        #[derive(Clone, Copy, Default)]
        struct Unregistered;
        unsafe impl ByteComponent for Unregistered {}
        let h = r.create_entity();
        assert!(matches!(r.get::<Unregistered>(h), Err(EcsError::NotRegistered)));
    }

    #[test]
    fn authority_enforcement_gates_writes_by_phase() {
        let mut r = repo();
        r.set_phase_config(PhaseConfig::default_sim_loop()).unwrap();
        r.set_phase("NetworkReceive").unwrap();
        let h = r.create_entity();
        r.set_authority::<Position>(h, true).unwrap();
        // Owned components may not be mutated during NetworkReceive.
        assert!(matches!(r.add(h, Position::default()), Err(EcsError::WrongPhase { .. })));

        r.set_phase("Simulation").unwrap();
        assert!(r.add(h, Position { x: 1.0, y: 1.0 }).is_ok());
    }

    #[test]
    fn multi_part_swap_remove_and_clear() {
        let mut r = repo();
        r.register_multi_part::<u32>().unwrap();
        let h = r.create_entity();
        r.add_part(h, 10u32).unwrap();
        r.add_part(h, 20u32).unwrap();
        r.add_part(h, 30u32).unwrap();
        r.remove_part::<u32>(h, 0);
        assert_eq!(r.parts::<u32>(h).unwrap(), &[30, 20]);
    }

    #[test]
    fn clear_empties_everything() {
        let mut r = repo();
        let h = r.create_entity();
        r.add(h, Position { x: 1.0, y: 1.0 }).unwrap();
        r.clear();
        assert_eq!(r.active_count(), 0);
        assert!(!r.is_alive(h));
        let h2 = r.create_entity();
        assert_eq!(h2.index, 0, "slot 0 reusable after clear");
        assert_eq!(r.get::<Position>(h2).unwrap(), Position::default(), "table contents were zeroed");
    }
}
