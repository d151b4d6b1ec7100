// Playback registry - thread-safe store of active playback records
//
// Maps opaque playback handles to the state the engine keeps for every sound
// it started. The registry knows nothing about threads or devices; callers
// run their backend work inside `update`/`remove_with` so mutations on one
// handle serialize while different handles proceed concurrently.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use crate::engine::backend::VoiceId;
use crate::error::EngineError;

/// Process-wide source of handle ids; handles are never reused.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier returned by `play`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PlaybackHandle(u64);

impl PlaybackHandle {
    fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// Rebuild a handle from its numeric id (e.g. one received over FFI).
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlaybackHandle({})", self.0)
    }
}

/// State of a playback as inferred from its record and the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    Playing,
    Paused,
    /// Non-looping sound whose duration has elapsed; the voice is still
    /// allocated until `stop`.
    Finished,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Finished => "finished",
        };
        f.write_str(label)
    }
}

/// Fields of a record about to be inserted; the registry mints the handle.
#[derive(Debug, Clone)]
pub struct NewPlayback {
    pub voice: VoiceId,
    pub started_at: Instant,
    pub duration: Duration,
    pub looping: bool,
    pub volume: f32,
    pub pan: f32,
}

/// Everything the engine tracks about one playback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackRecord {
    pub handle: PlaybackHandle,
    #[serde(skip)]
    pub voice: VoiceId,
    #[serde(skip)]
    pub started_at: Instant,
    pub duration: Duration,
    pub looping: bool,
    pub volume: f32,
    pub pan: f32,
    #[serde(skip)]
    paused_since: Option<Instant>,
    paused_total: Duration,
}

impl PlaybackRecord {
    fn new(handle: PlaybackHandle, new: NewPlayback) -> Self {
        Self {
            handle,
            voice: new.voice,
            started_at: new.started_at,
            duration: new.duration,
            looping: new.looping,
            volume: new.volume,
            pan: new.pan,
            paused_since: None,
            paused_total: Duration::ZERO,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_since.is_some()
    }

    /// Total time spent paused, including a pause still in progress.
    pub fn paused_total(&self, now: Instant) -> Duration {
        let ongoing = self
            .paused_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or(Duration::ZERO);
        self.paused_total + ongoing
    }

    /// Wall time since start minus time spent paused.
    pub fn active_elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
            .saturating_sub(self.paused_total(now))
    }

    /// Looping sounds play until stopped; others until their duration has
    /// elapsed in active time. A paused sound that has time left counts as
    /// playing.
    pub fn is_playing(&self, now: Instant) -> bool {
        self.looping || self.active_elapsed(now) < self.duration
    }

    pub fn state(&self, now: Instant) -> PlaybackState {
        if !self.is_playing(now) {
            PlaybackState::Finished
        } else if self.is_paused() {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        }
    }

    pub(crate) fn mark_paused(&mut self, now: Instant) {
        if self.paused_since.is_none() {
            self.paused_since = Some(now);
        }
    }

    pub(crate) fn mark_resumed(&mut self, now: Instant) {
        if let Some(since) = self.paused_since.take() {
            self.paused_total += now.saturating_duration_since(since);
        }
    }
}

struct Entry {
    /// Held for the whole of a mutation, backend call included.
    op_lock: Mutex<()>,
    /// Committed state; only ever locked briefly.
    record: Mutex<PlaybackRecord>,
    retired: AtomicBool,
}

/// Thread-safe handle → record map.
///
/// Lock order: the map lock is never held while waiting on an entry's
/// operation lock.
#[derive(Default)]
pub struct PlaybackRegistry {
    entries: RwLock<HashMap<PlaybackHandle, Arc<Entry>>>,
}

impl PlaybackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new record under a freshly minted handle.
    pub fn insert(&self, new: NewPlayback) -> Result<PlaybackHandle, EngineError> {
        let handle = PlaybackHandle::next();
        let entry = Arc::new(Entry {
            op_lock: Mutex::new(()),
            record: Mutex::new(PlaybackRecord::new(handle, new)),
            retired: AtomicBool::new(false),
        });
        self.write_entries()?.insert(handle, entry);
        Ok(handle)
    }

    /// Snapshot of the committed record.
    ///
    /// Does not wait for an in-flight mutation on the same handle.
    pub fn get(&self, handle: PlaybackHandle) -> Result<PlaybackRecord, EngineError> {
        let entry = self.entry(handle)?;
        let record = lock(&entry.record, "playback record")?;
        Ok(record.clone())
    }

    /// Atomic read-modify-write of one record.
    ///
    /// `mutate` works on a copy; the copy is committed only when it returns
    /// `Ok`, so a failed backend call leaves the record untouched.
    ///
    /// # Returns
    /// * `Ok(R)` - Value produced by `mutate`
    /// * `Err(EngineError::PlaybackNotFound)` - Unknown or removed handle
    /// * `Err(e)` - Error returned by `mutate`
    pub fn update<R>(
        &self,
        handle: PlaybackHandle,
        mutate: impl FnOnce(&mut PlaybackRecord) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let entry = self.entry(handle)?;
        let _op = lock(&entry.op_lock, "playback operation")?;
        if entry.retired.load(Ordering::Acquire) {
            return Err(EngineError::PlaybackNotFound { handle });
        }

        let mut draft = lock(&entry.record, "playback record")?.clone();
        let out = mutate(&mut draft)?;
        *lock(&entry.record, "playback record")? = draft;
        Ok(out)
    }

    /// Remove a record once `finalize` succeeds.
    ///
    /// Runs `finalize` under the record's operation lock. On error the
    /// record stays registered and the error is returned.
    pub fn remove_with<R>(
        &self,
        handle: PlaybackHandle,
        finalize: impl FnOnce(&PlaybackRecord) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let entry = self.entry(handle)?;
        let _op = lock(&entry.op_lock, "playback operation")?;
        if entry.retired.load(Ordering::Acquire) {
            return Err(EngineError::PlaybackNotFound { handle });
        }

        let snapshot = lock(&entry.record, "playback record")?.clone();
        let out = finalize(&snapshot)?;
        entry.retired.store(true, Ordering::Release);
        self.write_entries()?.remove(&handle);
        Ok(out)
    }

    pub fn remove(&self, handle: PlaybackHandle) -> Result<PlaybackRecord, EngineError> {
        self.remove_with(handle, |record| Ok(record.clone()))
    }

    /// Handles of every registered record, in creation order.
    pub fn list_active(&self) -> Result<Vec<PlaybackHandle>, EngineError> {
        let mut handles: Vec<_> = self.read_entries()?.keys().copied().collect();
        handles.sort();
        Ok(handles)
    }

    pub fn contains(&self, handle: PlaybackHandle) -> bool {
        self.read_entries()
            .map(|entries| entries.contains_key(&handle))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.read_entries().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every record at once, returning the last committed state.
    pub fn drain_all(&self) -> Result<Vec<PlaybackRecord>, EngineError> {
        let drained: Vec<_> = self.write_entries()?.drain().collect();
        let mut records = Vec::with_capacity(drained.len());
        for (_, entry) in drained {
            entry.retired.store(true, Ordering::Release);
            records.push(lock(&entry.record, "playback record")?.clone());
        }
        records.sort_by_key(|r| r.handle);
        Ok(records)
    }

    fn entry(&self, handle: PlaybackHandle) -> Result<Arc<Entry>, EngineError> {
        self.read_entries()?
            .get(&handle)
            .cloned()
            .ok_or(EngineError::PlaybackNotFound { handle })
    }

    // ========================================================================
    // Lock helpers
    // ========================================================================

    fn read_entries(
        &self,
    ) -> Result<RwLockReadGuard<'_, HashMap<PlaybackHandle, Arc<Entry>>>, EngineError> {
        self.entries.read().map_err(|_| EngineError::LockPoisoned {
            component: "playback registry".to_string(),
        })
    }

    fn write_entries(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<PlaybackHandle, Arc<Entry>>>, EngineError> {
        self.entries.write().map_err(|_| EngineError::LockPoisoned {
            component: "playback registry".to_string(),
        })
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, component: &str) -> Result<MutexGuard<'a, T>, EngineError> {
    mutex.lock().map_err(|_| EngineError::LockPoisoned {
        component: component.to_string(),
    })
}
