//! Playback Engine: stateful consumer of a `.fdp` stream (§4.14).
//!
//! Grounded on `ecsdb::persistence::snapshot::DatabaseSnapshot::from_file`'s
//! header-validate-then-checksum-then-decompress pipeline, generalized from
//! "decode the one snapshot this file holds" into "decode the next frame in
//! an ordered stream and apply it to a live [`Repository`]" — the stateful
//! half the codec deliberately leaves out (§9 Design Notes: codec stays a
//! pure layout module, playback owns all side effects).

use crate::error::{EcsError, Result};
use crate::repository::Repository;
use crate::snapshot::codec::{self, DecodedFrame, FrameKind, WorldHeader};
use std::path::{Path, PathBuf};

/// Reads and applies `.fdp` frames in order against a live [`Repository`].
pub struct Session {
    path: PathBuf,
    header: WorldHeader,
    data: Vec<u8>,
    cursor: usize,
    current_tick: Option<u64>,
}

impl Session {
    /// Opens `path`, validating the world header up front.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = std::fs::read(&path)?;
        let (header, consumed) = WorldHeader::read(&data)?;
        Ok(Self {
            path,
            header,
            data,
            cursor: consumed,
            current_tick: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn world_header(&self) -> WorldHeader {
        self.header
    }

    pub fn current_tick(&self) -> Option<u64> {
        self.current_tick
    }

    pub fn has_more(&self) -> bool {
        self.cursor < self.data.len()
    }

    /// Reads, decompresses, decodes, and applies the next frame to `repo`.
    /// Returns `None` once the stream is exhausted.
    pub fn step_forward(&mut self, repo: &mut Repository) -> Result<Option<u64>> {
        self.step_forward_inner(repo, true)
    }

    /// As [`Session::step_forward`], but with event injection muted — the
    /// roll-forward behavior the Seek/Scrub Controller uses while replaying
    /// intermediate frames toward a target tick (§4.15).
    pub fn step_forward_muted(&mut self, repo: &mut Repository) -> Result<Option<u64>> {
        self.step_forward_inner(repo, false)
    }

    fn step_forward_inner(&mut self, repo: &mut Repository, process_events: bool) -> Result<Option<u64>> {
        if !self.has_more() {
            return Ok(None);
        }
        let (compressed, body, consumed) = read_block(&self.data[self.cursor..])?;
        self.cursor += consumed;
        let raw = if compressed {
            zstd::decode_all(body.as_slice()).map_err(|e| EcsError::Serialization(e.to_string()))?
        } else {
            body
        };
        let (frame, _) = codec::decode_frame(&raw, process_events)?;
        apply_frame(repo, &frame)?;
        self.current_tick = Some(frame.tick);
        Ok(Some(frame.tick))
    }

    /// Rewinds to just after the world header, so the next `step_forward`
    /// re-reads the first frame. Used by the Seek/Scrub Controller when
    /// seeking backward past its cached keyframe index (§4.15).
    pub fn rewind_to_start(&mut self) {
        let (_, consumed) = WorldHeader::read(&self.data).expect("already validated in open()");
        self.cursor = consumed;
        self.current_tick = None;
    }

    /// Jumps the read cursor to an arbitrary byte offset (past the world
    /// header), as recorded by the Seek/Scrub Controller's keyframe index.
    pub fn seek_to_offset(&mut self, offset: usize) {
        self.cursor = offset;
        self.current_tick = None;
    }

    pub fn cursor_offset(&self) -> usize {
        self.cursor
    }

    /// Peeks the next frame's `(tick, kind)` without consuming it, for the
    /// Seek/Scrub Controller's keyframe index scan (§4.15).
    pub fn peek_next(&self) -> Result<Option<(u64, FrameKind)>> {
        if !self.has_more() {
            return Ok(None);
        }
        let (compressed, body, _consumed) = read_block(&self.data[self.cursor..])?;
        let (tick, kind, _) = if compressed {
            let decompressed = zstd::decode_all(body.as_slice()).map_err(|e| EcsError::Serialization(e.to_string()))?;
            codec::peek_frame_header(&decompressed)?
        } else {
            codec::peek_frame_header(&body)?
        };
        Ok(Some((tick, kind)))
    }

    /// Advances past the next frame without applying it, returning
    /// `(tick, kind, offset_before_this_frame)`. Used to build the
    /// Seek/Scrub Controller's keyframe index without touching a live
    /// [`Repository`] (§4.15).
    pub fn skip_next(&mut self) -> Result<Option<(u64, FrameKind, usize)>> {
        if !self.has_more() {
            return Ok(None);
        }
        let offset = self.cursor;
        let (tick, kind) = self.peek_next()?.expect("has_more checked above");
        let (_compressed, _body, consumed) = read_block(&self.data[self.cursor..])?;
        self.cursor += consumed;
        Ok(Some((tick, kind, offset)))
    }
}

/// One on-disk block: `compressed: u8, len: u32, bytes`. Mirrors
/// `snapshot::recorder::write_block`.
fn read_block(bytes: &[u8]) -> Result<(bool, Vec<u8>, usize)> {
    if bytes.len() < 5 {
        return Err(EcsError::TruncatedFrame);
    }
    let compressed = bytes[0] != 0;
    let len = u32::from_le_bytes(bytes[1..5].try_into().unwrap()) as usize;
    if bytes.len() < 5 + len {
        return Err(EcsError::TruncatedFrame);
    }
    Ok((compressed, bytes[5..5 + len].to_vec(), 5 + len))
}

/// Applies one decoded frame to `repo`: clears state on a keyframe, forces
/// destroyed slots, injects events (when not muted), writes raw component
/// chunk bytes, then repairs entity-index metadata and reference-typed
/// component masks (§4.14).
pub fn apply_frame(repo: &mut Repository, frame: &DecodedFrame) -> Result<()> {
    if frame.kind == FrameKind::Keyframe {
        repo.clear();
    }

    for &(index, gen) in &frame.destroys {
        repo.index_mut().force_restore(index, gen, 0, frame.tick as u32);
    }

    if let Some(events) = &frame.events {
        repo.bus().clear_current();
        for e in events {
            repo.bus().inject_raw_block(e.type_id, e.elem_size, &e.payload)?;
        }
    }

    let mut touched_header = false;
    for chunk in &frame.chunks {
        if chunk.component_type_id == codec::HEADER_PSEUDO_TYPE_ID {
            repo.index().set_raw_header_chunk(chunk.chunk_index as usize, &chunk.payload)?;
            touched_header = true;
            continue;
        }

        let id = chunk.component_type_id as u8;
        if let Some(table) = repo.get_raw_table(id).cloned() {
            table.set_raw_chunk_bytes(chunk.chunk_index as usize, &chunk.payload)?;
        } else if let Some(table) = repo.get_raw_ref_table(id).cloned() {
            let touched = table.apply_delta(chunk.chunk_index as usize, &chunk.payload, frame.tick as u32)?;
            for (slot, present) in touched {
                repo.set_mask_bit(slot, id, present);
            }
        } else {
            tracing::warn!(component_type_id = id, "skipping chunk for component id not registered in this process");
        }
    }

    if touched_header || frame.kind == FrameKind::Keyframe {
        repo.index_mut().rebuild_metadata();
    }

    repo.set_global_version(frame.tick as u32);
    Ok(())
}
