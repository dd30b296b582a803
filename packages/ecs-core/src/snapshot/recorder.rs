//! Flight Recorder: a continuously appended `.fdp` delta/keyframe stream (§4.13).
//!
//! Grounded on `ecsdb::persistence::snapshot::DatabaseSnapshot::write_to_file_async`
//! (header + CRC32-checked data, zstd compression pushed onto a
//! `tokio::task::spawn_blocking` so the CPU-bound work never stalls the async
//! task) generalized from a one-shot whole-database snapshot into a
//! continuously appended frame stream. The reference engine's writer is
//! always idle when called; this one is on a tick's hot path, so it adds the
//! backpressure handling the one-shot writer never needed (§4.13 "Recorder
//! never blocks the simulation tick").

use crate::config::EcsConfig;
use crate::error::{EcsError, Result};
use crate::repository::Repository;
use crate::snapshot::codec::{self, FrameKind, WorldHeader};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

fn now_unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Continuously appends frames to one `.fdp` file. Each captured frame's
/// encode happens inline (cheap relative to compression); the zstd pass and
/// disk write happen on a background blocking task so `capture_frame` never
/// stalls the caller's tick (§4.13, §5.7).
pub struct FlightRecorder {
    config: EcsConfig,
    path: PathBuf,
    file: Arc<std::sync::Mutex<File>>,
    in_flight: Arc<AtomicBool>,
    dropped_frames: Arc<AtomicU64>,
    pending: Option<JoinHandle<()>>,
    force_next_keyframe: bool,
    baseline_tick: u32,
    last_keyframe_tick: u64,
}

impl FlightRecorder {
    /// Creates (truncating) `path` and writes the world header.
    pub fn create(config: EcsConfig, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        let mut header_bytes = Vec::new();
        WorldHeader::new(now_unix_timestamp()).write(&mut header_bytes);
        file.write_all(&header_bytes)?;

        Ok(Self {
            config,
            path,
            file: Arc::new(std::sync::Mutex::new(file)),
            in_flight: Arc::new(AtomicBool::new(false)),
            dropped_frames: Arc::new(AtomicU64::new(0)),
            pending: None,
            force_next_keyframe: true,
            baseline_tick: 0,
            last_keyframe_tick: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Captures one frame at `tick`. A keyframe is emitted on the configured
    /// cadence, when `force_keyframe` is requested by the caller, or when the
    /// previous frame was dropped under backpressure (§4.13).
    ///
    /// Never blocks on compression/disk I/O: if the background writer from
    /// the previous frame is still busy, this frame is dropped, the *next*
    /// frame is promoted to a keyframe to recover consistency, and
    /// [`EcsError::RecorderBackpressure`] is returned so the caller can log
    /// it (§4.13 Failure).
    pub async fn capture_frame(&mut self, repo: &mut Repository, tick: u64, force_keyframe: bool) -> Result<()> {
        let due_for_keyframe =
            tick.saturating_sub(self.last_keyframe_tick) >= self.config.keyframe_interval_ticks as u64;
        let kind = if force_keyframe || self.force_next_keyframe || (tick == 0 && self.last_keyframe_tick == 0)
            || due_for_keyframe
        {
            FrameKind::Keyframe
        } else {
            FrameKind::Delta
        };

        let destructions = repo.drain_destruction_log();
        let mut frame_bytes = Vec::new();
        codec::write_frame(repo, repo.bus(), tick, kind, self.baseline_tick, &destructions, &mut frame_bytes)?;
        repo.bus().swap_buffers();

        if kind == FrameKind::Keyframe {
            self.last_keyframe_tick = tick;
        }
        self.baseline_tick = repo.global_version();

        if self.in_flight.load(Ordering::Acquire) {
            self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            self.force_next_keyframe = true;
            return Err(EcsError::RecorderBackpressure);
        }
        self.force_next_keyframe = false;

        self.in_flight.store(true, Ordering::Release);
        let file = self.file.clone();
        let in_flight = self.in_flight.clone();
        let compress = self.config.compress_snapshots;
        let level = self.config.snapshot_compression_level;
        let handle = tokio::task::spawn_blocking(move || {
            let payload = if compress {
                match zstd::encode_all(frame_bytes.as_slice(), level) {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(error = %e, "flight recorder compression failed, writing frame uncompressed");
                        frame_bytes
                    }
                }
            } else {
                frame_bytes
            };
            let mut guard = file.lock().expect("recorder file mutex poisoned");
            if let Err(e) = write_block(&mut guard, compress, &payload) {
                tracing::error!(error = %e, "flight recorder write failed");
            }
            in_flight.store(false, Ordering::Release);
        });
        self.pending = Some(handle);
        Ok(())
    }

    /// Awaits the last spawned background write and flushes the file.
    pub async fn flush_and_close(mut self) -> Result<()> {
        if let Some(handle) = self.pending.take() {
            let _ = handle.await;
        }
        self.file.lock().expect("recorder file mutex poisoned").flush()?;
        Ok(())
    }
}

/// One on-disk block: `compressed: u8, len: u32, bytes`.
fn write_block(file: &mut File, compressed: bool, bytes: &[u8]) -> Result<()> {
    file.write_all(&[compressed as u8])?;
    file.write_all(&(bytes.len() as u32).to_le_bytes())?;
    file.write_all(bytes)?;
    Ok(())
}
