//! Delta-compressed snapshotting and replay (§4.12-§4.16): the on-disk
//! `.fdp` frame layout, the Flight Recorder that appends it, the Playback
//! Engine that replays it, the Seek/Scrub Controller that indexes and jumps
//! within it, and the Snapshot Provider read-only view strategies built on
//! top of a live [`crate::repository::Repository`].

pub mod codec;
pub mod provider;
pub mod recorder;
pub mod seek;

pub mod playback;

pub use codec::{ChunkEntry, DecodedFrame, EventStreamEntry, FrameKind, WorldHeader, FORMAT_VERSION, MAGIC};
pub use playback::Session;
pub use provider::{PooledReplica, SnapshotProvider, SnapshotView, ViewStrategy};
pub use recorder::FlightRecorder;
pub use seek::SeekController;
