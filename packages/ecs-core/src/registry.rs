//! Component type registry: static types → dense 0..255 ids (§4.6).
//!
//! Grounded on `in-mem-db-core::types::type_registry::TypeRegistry`
//! (`RwLock<HashMap<String, TypeLayout>>`, `register`/`get`/`validate_type`)
//! keyed by `std::any::TypeId` instead of a string, per §9's note that a
//! Rust realization of "static generic type → dense id" uses the language's
//! own type-system primitive as the registry key.

use crate::error::{EcsError, Result};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::RwLock;

/// Storage tier a registered component belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    /// Tier 1: fixed-size, blittable, stored in a [`crate::chunk_table::ChunkTable`].
    ByteValue,
    /// Tier 2: reference-typed, stored in a [`crate::ref_table::RefTable`].
    ReferenceValue,
    /// Size-1 marker with no payload.
    Tag,
    /// Variable-length 1-to-N subcomponent, stored in a [`crate::heap::MultiPartHeap`].
    MultiPart,
}

/// Metadata recorded for one registered component type.
#[derive(Debug, Clone)]
pub struct ComponentDescriptor {
    pub id: u8,
    pub kind: ComponentKind,
    pub size: usize,
    pub type_name: &'static str,
}

/// Maps `TypeId` to a dense, assignment-order-stable `u8` id.
///
/// Explicit registration is mandatory: every accessor that needs a
/// component id fails with [`EcsError::NotRegistered`] rather than
/// registering implicitly, matching the spec's "no runtime type discovery"
/// Non-goal.
#[derive(Default)]
pub struct ComponentRegistry {
    by_type: RwLock<HashMap<TypeId, u8>>,
    descriptors: RwLock<Vec<ComponentDescriptor>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T`, or returns its existing id if already registered
    /// (idempotent registration, per §4.6).
    pub fn register<T: 'static>(&self, kind: ComponentKind, size: usize) -> Result<u8> {
        let type_id = TypeId::of::<T>();
        {
            let map = self.by_type.read().unwrap();
            if let Some(&id) = map.get(&type_id) {
                return Ok(id);
            }
        }
        let mut map = self.by_type.write().unwrap();
        if let Some(&id) = map.get(&type_id) {
            return Ok(id);
        }
        let mut descriptors = self.descriptors.write().unwrap();
        let next_id = descriptors.len();
        if next_id > u8::MAX as usize {
            return Err(EcsError::Overrun {
                size: next_id,
                page_size: u8::MAX as usize,
            });
        }
        let id = next_id as u8;
        descriptors.push(ComponentDescriptor {
            id,
            kind,
            size,
            type_name: std::any::type_name::<T>(),
        });
        map.insert(type_id, id);
        Ok(id)
    }

    /// Looks up the dense id for `T`. `NotRegistered` if it was never
    /// registered — this is the hot-path accessor every `get`/`add`/`remove`
    /// call routes through.
    pub fn id_of<T: 'static>(&self) -> Result<u8> {
        let type_id = TypeId::of::<T>();
        self.by_type
            .read()
            .unwrap()
            .get(&type_id)
            .copied()
            .ok_or(EcsError::NotRegistered)
    }

    pub fn descriptor(&self, id: u8) -> Option<ComponentDescriptor> {
        self.descriptors.read().unwrap().get(id as usize).cloned()
    }

    pub fn kind_of(&self, id: u8) -> Option<ComponentKind> {
        self.descriptor(id).map(|d| d.kind)
    }

    pub fn len(&self) -> usize {
        self.descriptors.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Type names in registration order, for save-file companion embedding
    /// (§4.6, §6 "Persisted state layout").
    pub fn snapshot_order(&self) -> Vec<String> {
        self.descriptors
            .read()
            .unwrap()
            .iter()
            .map(|d| d.type_name.to_string())
            .collect()
    }
}
