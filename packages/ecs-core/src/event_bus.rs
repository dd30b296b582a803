//! Event bus: double-buffered per-type transient event streams (§4.11).
//!
//! Grounded on `in-mem-db-core::atomic_buffer::AtomicBuffer`'s copy-on-write
//! swap idiom: the front (read) buffer is held behind `ArcSwap<Vec<T>>`, so
//! `consume` is a single atomic load with no lock, and the "graveyard"
//! retirement the reference engine hand-rolls (old buffer freed only once no
//! reader can observe it) falls out of `Arc`'s own refcount — the previous
//! front buffer is simply dropped once every clone `consume` handed out has
//! gone out of scope. The back (write) buffer stays behind a
//! `parking_lot::Mutex<Vec<T>>`: publish contends only with other publishers
//! and with the swap at phase boundary, never with a reader.

use crate::error::{EcsError, Result};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Marker for byte-packed (auto-expanding) event payloads.
///
/// # Safety
/// Implementors assert `Self` is blittable, identical to [`crate::chunk_table::ByteComponent`].
pub unsafe trait EventComponent: Copy + Send + Sync + 'static {}

/// Marker for reference-typed event payloads.
pub trait ManagedEventComponent: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> ManagedEventComponent for T {}

/// Maps event types to explicit, stable `u32` ids (§4.11: "Registration
/// without an id is rejected").
#[derive(Default)]
struct EventIdRegistry {
    by_type: HashMap<TypeId, u32>,
    owners: HashMap<u32, TypeId>,
}

impl EventIdRegistry {
    fn register<T: 'static>(&mut self, stable_id: u32) -> Result<()> {
        let type_id = TypeId::of::<T>();
        if let Some(&owner) = self.owners.get(&stable_id) {
            if owner != type_id {
                return Err(EcsError::RegistryConflict { stable_id });
            }
            return Ok(());
        }
        self.owners.insert(stable_id, type_id);
        self.by_type.insert(type_id, stable_id);
        Ok(())
    }
}

struct ByteEventStream<T: EventComponent> {
    front: ArcSwap<Vec<T>>,
    back: Mutex<Vec<T>>,
}

impl<T: EventComponent> ByteEventStream<T> {
    fn new() -> Self {
        Self {
            front: ArcSwap::from_pointee(Vec::new()),
            back: Mutex::new(Vec::new()),
        }
    }
}

struct RefEventStream<T: ManagedEventComponent> {
    front: ArcSwap<Vec<Arc<T>>>,
    back: Mutex<Vec<Arc<T>>>,
}

impl<T: ManagedEventComponent> RefEventStream<T> {
    fn new() -> Self {
        Self {
            front: ArcSwap::from_pointee(Vec::new()),
            back: Mutex::new(Vec::new()),
        }
    }
}

/// Type-erased byte-packed stream, used by the recorder/playback codec path
/// and by `get_all_pending_streams`.
trait RawByteStream: Send + Sync {
    fn elem_size(&self) -> usize;
    fn swap_buffers(&self);
    fn clear_current(&self);
    fn front_len(&self) -> usize;
    fn front_bytes(&self) -> Vec<u8>;
    fn inject_bytes(&self, bytes: &[u8]);
}

impl<T: EventComponent> RawByteStream for ByteEventStream<T> {
    fn elem_size(&self) -> usize {
        std::mem::size_of::<T>()
    }
    fn swap_buffers(&self) {
        let drained = std::mem::take(&mut *self.back.lock());
        self.front.store(Arc::new(drained));
    }
    fn clear_current(&self) {
        self.front.store(Arc::new(Vec::new()));
    }
    fn front_len(&self) -> usize {
        self.front.load().len()
    }
    fn front_bytes(&self) -> Vec<u8> {
        let front = self.front.load();
        let byte_len = std::mem::size_of_val(front.as_slice());
        let mut out = Vec::with_capacity(byte_len);
        // Safety: `T: EventComponent` asserts a blittable, padding-free layout.
        unsafe {
            let src = front.as_ptr() as *const u8;
            out.extend_from_slice(std::slice::from_raw_parts(src, byte_len));
        }
        out
    }
    fn inject_bytes(&self, bytes: &[u8]) {
        let elem_size = self.elem_size().max(1);
        let count = bytes.len() / elem_size;
        let mut appended: Vec<T> = Vec::with_capacity(count);
        for i in 0..count {
            let start = i * elem_size;
            // Safety: `elem_size` matches `T`'s layout by construction.
            let value = unsafe { std::ptr::read_unaligned(bytes[start..].as_ptr() as *const T) };
            appended.push(value);
        }
        let mut next = (**self.front.load()).clone();
        next.extend(appended);
        self.front.store(Arc::new(next));
    }
}

/// Type-erased reference-typed stream.
trait RawRefStream: Send + Sync {
    fn swap_buffers(&self);
    fn clear_current(&self);
    fn front_len(&self) -> usize;
    fn serialize_front(&self) -> Result<Vec<u8>>;
    fn inject_serialized(&self, bytes: &[u8]) -> Result<()>;
}

impl<T> RawRefStream for RefEventStream<T>
where
    T: ManagedEventComponent + Serialize + DeserializeOwned,
{
    fn swap_buffers(&self) {
        let drained = std::mem::take(&mut *self.back.lock());
        self.front.store(Arc::new(drained));
    }
    fn clear_current(&self) {
        self.front.store(Arc::new(Vec::new()));
    }
    fn front_len(&self) -> usize {
        self.front.load().len()
    }
    fn serialize_front(&self) -> Result<Vec<u8>> {
        let front = self.front.load();
        let values: Vec<&T> = front.iter().map(|a| a.as_ref()).collect();
        bincode::serialize(&values).map_err(|e| EcsError::Serialization(e.to_string()))
    }
    fn inject_serialized(&self, bytes: &[u8]) -> Result<()> {
        let values: Vec<T> =
            bincode::deserialize(bytes).map_err(|e| EcsError::Serialization(e.to_string()))?;
        let mut next = (**self.front.load()).clone();
        next.extend(values.into_iter().map(Arc::new));
        self.front.store(Arc::new(next));
        Ok(())
    }
}

/// One pending stream entry, surfaced to the recorder via
/// `get_all_pending_streams` (§4.11, §4.12 writer step 2).
pub struct PendingStream {
    pub stable_id: u32,
    pub elem_size: u32,
    pub payload: Vec<u8>,
    pub count: u32,
}

/// Double-buffered event bus owning every registered event type's stream.
#[derive(Default)]
pub struct EventBus {
    ids: Mutex<EventIdRegistry>,
    byte_typed: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    ref_typed: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    byte_by_id: Mutex<HashMap<u32, Arc<dyn RawByteStream>>>,
    ref_by_id: Mutex<HashMap<u32, Arc<dyn RawRefStream>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_event<T: EventComponent>(&self, stable_id: u32) -> Result<()> {
        self.ids.lock().register::<T>(stable_id)?;
        let type_id = TypeId::of::<T>();
        let mut typed = self.byte_typed.lock();
        if typed.contains_key(&type_id) {
            return Ok(());
        }
        let stream = Arc::new(ByteEventStream::<T>::new());
        typed.insert(type_id, Box::new(stream.clone()));
        self.byte_by_id.lock().insert(stable_id, stream);
        Ok(())
    }

    pub fn register_managed_event<T>(&self, stable_id: u32) -> Result<()>
    where
        T: ManagedEventComponent + Serialize + DeserializeOwned,
    {
        self.ids.lock().register::<T>(stable_id)?;
        let type_id = TypeId::of::<T>();
        let mut typed = self.ref_typed.lock();
        if typed.contains_key(&type_id) {
            return Ok(());
        }
        let stream = Arc::new(RefEventStream::<T>::new());
        typed.insert(type_id, Box::new(stream.clone()));
        self.ref_by_id.lock().insert(stable_id, stream);
        Ok(())
    }

    fn byte_stream<T: EventComponent>(&self) -> Result<Arc<ByteEventStream<T>>> {
        self.byte_typed
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref::<Arc<ByteEventStream<T>>>())
            .cloned()
            .ok_or(EcsError::NotRegistered)
    }

    fn ref_stream<T: ManagedEventComponent + Serialize + DeserializeOwned>(
        &self,
    ) -> Result<Arc<RefEventStream<T>>> {
        self.ref_typed
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref::<Arc<RefEventStream<T>>>())
            .cloned()
            .ok_or(EcsError::NotRegistered)
    }

    pub fn publish<T: EventComponent>(&self, value: T) -> Result<()> {
        self.byte_stream::<T>()?.back.lock().push(value);
        Ok(())
    }

    pub fn publish_managed<T>(&self, value: T) -> Result<()>
    where
        T: ManagedEventComponent + Serialize + DeserializeOwned,
    {
        self.ref_stream::<T>()?.back.lock().push(Arc::new(value));
        Ok(())
    }

    /// Reads the front (previous-frame) buffer. Returns a cloned `Arc`
    /// deref'd to an owned `Vec` rather than `&[T]`, so no guard escapes the
    /// public API; the underlying load itself is a single atomic pointer
    /// read, matching §4.11's "readers never block on a swap" guarantee.
    pub fn consume<T: EventComponent>(&self) -> Result<Vec<T>> {
        Ok((**self.byte_stream::<T>()?.front.load()).clone())
    }

    pub fn consume_managed<T>(&self) -> Result<Vec<Arc<T>>>
    where
        T: ManagedEventComponent + Serialize + DeserializeOwned,
    {
        Ok((**self.ref_stream::<T>()?.front.load()).clone())
    }

    /// Swaps every registered stream's front/back buffers (called at phase
    /// boundary, §4.11/§5.5).
    pub fn swap_buffers(&self) {
        for s in self.byte_by_id.lock().values() {
            s.swap_buffers();
        }
        for s in self.ref_by_id.lock().values() {
            s.swap_buffers();
        }
    }

    pub fn clear_current(&self) {
        for s in self.byte_by_id.lock().values() {
            s.clear_current();
        }
        for s in self.ref_by_id.lock().values() {
            s.clear_current();
        }
    }

    /// Populates the *current* (front) buffer directly, bypassing `publish`,
    /// for playback to repopulate reads without re-publishing (§4.12 reader
    /// step 2).
    pub fn inject_into_current(&self, stable_id: u32, bytes: &[u8]) {
        if let Some(s) = self.byte_by_id.lock().get(&stable_id) {
            s.inject_bytes(bytes);
        }
    }

    pub fn inject_managed_into_current(&self, stable_id: u32, bytes: &[u8]) -> Result<()> {
        if let Some(s) = self.ref_by_id.lock().get(&stable_id) {
            s.inject_serialized(bytes)?;
        }
        Ok(())
    }

    /// All streams with a non-empty front buffer, as the recorder's event
    /// block wants them (§4.12 writer step 2): byte-packed payloads copied
    /// raw, reference-typed payloads via the generated (`serde`) writer.
    pub fn get_all_pending_streams(&self) -> Vec<PendingStream> {
        let mut out = Vec::new();
        for (&stable_id, s) in self.byte_by_id.lock().iter() {
            if s.front_len() == 0 {
                continue;
            }
            out.push(PendingStream {
                stable_id,
                elem_size: s.elem_size() as u32,
                payload: s.front_bytes(),
                count: s.front_len() as u32,
            });
        }
        for (&stable_id, s) in self.ref_by_id.lock().iter() {
            if s.front_len() == 0 {
                continue;
            }
            if let Ok(payload) = s.serialize_front() {
                out.push(PendingStream {
                    stable_id,
                    elem_size: 0, // 0 marks reference-typed per §4.12
                    count: s.front_len() as u32,
                    payload,
                });
            }
        }
        out
    }

    pub fn inject_raw_block(&self, stable_id: u32, elem_size: u32, bytes: &[u8]) -> Result<()> {
        if elem_size == 0 {
            self.inject_managed_into_current(stable_id, bytes)
        } else {
            self.inject_into_current(stable_id, bytes);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Explosion {
        power: u32,
    }
    unsafe impl EventComponent for Explosion {}

    #[test]
    fn publish_is_invisible_until_swap() {
        let bus = EventBus::new();
        bus.register_event::<Explosion>(42).unwrap();
        bus.publish(Explosion { power: 10 }).unwrap();
        assert!(bus.consume::<Explosion>().unwrap().is_empty());
        bus.swap_buffers();
        assert_eq!(bus.consume::<Explosion>().unwrap(), vec![Explosion { power: 10 }]);
    }

    #[test]
    fn swap_with_no_publishes_leaves_bus_empty() {
        let bus = EventBus::new();
        bus.register_event::<Explosion>(42).unwrap();
        bus.publish(Explosion { power: 1 }).unwrap();
        bus.swap_buffers();
        bus.swap_buffers();
        assert!(bus.consume::<Explosion>().unwrap().is_empty());
    }

    #[test]
    fn conflicting_stable_id_is_rejected() {
        #[derive(Clone, Copy)]
        struct Other;
        unsafe impl EventComponent for Other {}
        let bus = EventBus::new();
        bus.register_event::<Explosion>(42).unwrap();
        assert!(matches!(
            bus.register_event::<Other>(42),
            Err(EcsError::RegistryConflict { .. })
        ));
    }

    #[test]
    fn inject_into_current_is_pure() {
        let bus = EventBus::new();
        bus.register_event::<Explosion>(42).unwrap();
        let bytes = {
            let v = Explosion { power: 99 };
            v.power.to_ne_bytes().to_vec()
        };
        bus.inject_into_current(42, &bytes);
        assert_eq!(bus.consume::<Explosion>().unwrap(), vec![Explosion { power: 99 }]);
    }
}
