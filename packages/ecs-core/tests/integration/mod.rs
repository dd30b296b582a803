//! End-to-end integration tests exercising the kernel's public facade
//! across entity lifecycle, queries, snapshots, and events together,
//! rather than one module in isolation.

mod entity_lifecycle;
mod query_consistency;
mod snapshot_playback;
mod events_and_authority;
mod boundary_behaviors;
