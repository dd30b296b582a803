//! Error taxonomy for the kernel (§7 of the specification).
//!
//! Every fallible core API returns `Result<T, EcsError>`. The repository never
//! panics on user-input errors; hot-path accessors return `NotRegistered` or
//! `WrongPhase` instead of asserting unless the `unchecked-fast-path` feature is
//! enabled, in which case these preconditions are assumed already validated by
//! the host.

use thiserror::Error;

/// Kernel operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Component or event type used without prior registration.
    #[error("component or event type used without prior registration")]
    NotRegistered,

    /// Handle generation does not match the slot's current generation.
    #[error("stale handle: expected generation {slot_generation}, got {handle_generation}")]
    StaleHandle {
        handle_generation: u16,
        slot_generation: u16,
    },

    /// Mutation attempted outside a phase whose permission allows it.
    #[error("mutation not permitted under phase permission {permission}")]
    WrongPhase { permission: String },

    /// `set_phase(to)` is not in the allowed set for the current phase.
    #[error("phase transition from '{from}' to '{to}' is not permitted")]
    WrongPhaseTransition { from: String, to: String },

    /// Phase name unknown in the active configuration.
    #[error("unknown phase name '{0}' in active configuration")]
    InvalidTransitionTarget(String),

    /// Allocator could not back the requested range with physical memory.
    #[error("allocator could not commit {bytes} bytes")]
    OutOfMemory { bytes: usize },

    /// Allocator has no address space left to reserve the requested range.
    #[error("allocator could not reserve {bytes} bytes of address space")]
    OutOfAddressSpace { bytes: usize },

    /// Component too large for a single page.
    #[error("component of size {size} exceeds a single chunk page of {page_size} bytes")]
    Overrun { size: usize, page_size: usize },

    /// Save file written by an incompatible codec version.
    #[error("snapshot format version {found} is incompatible with expected {expected}")]
    FormatVersionMismatch { found: u32, expected: u32 },

    /// EOF in the middle of a frame.
    #[error("snapshot stream truncated while reading a frame")]
    TruncatedFrame,

    /// Type id in file not present in current registry; caller may skip it.
    #[error("component type id {0} present in file is not registered in this process")]
    UnknownComponentId(u32),

    /// Two registrations for the same stable id of different types.
    #[error("stable id {stable_id} already registered to a different type")]
    RegistryConflict { stable_id: u32 },

    /// Background writer is busy; next frame will be promoted to keyframe.
    #[error("recorder background writer is still busy; next frame promoted to keyframe")]
    RecorderBackpressure,

    /// Snapshot checksum does not match the stored value.
    #[error("snapshot checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    /// Underlying I/O failure while reading or writing a snapshot stream.
    #[error("I/O error: {0}")]
    Io(String),

    /// Payload failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration file or environment override was malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for EcsError {
    fn from(e: std::io::Error) -> Self {
        EcsError::Io(e.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for EcsError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        EcsError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EcsError>;
