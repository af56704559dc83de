//! Image Decode Cache
//!
//! Decoded pixmaps memoized by image id with LRU eviction over a byte
//! budget. Concurrent requests for one image collapse into a single decode.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tiny_skia::Pixmap;

use super::{PaintImage, PaintImageId};
use crate::error::RasterError;
use crate::raster::ImageDecodeTask;

/// One image's decode, run at most once.
pub(crate) struct DecodeSlot {
    image: PaintImage,
    decoded: OnceLock<Result<Arc<Pixmap>, String>>,
}

impl DecodeSlot {
    fn new(image: PaintImage) -> Self {
        Self { image, decoded: OnceLock::new() }
    }

    pub(crate) fn image(&self) -> &PaintImage {
        &self.image
    }

    pub(crate) fn is_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }

    /// Decode on first call; later and concurrent calls share the result.
    pub(crate) fn decode(&self) -> Result<Arc<Pixmap>, RasterError> {
        self.decoded
            .get_or_init(|| {
                tracing::trace!(image = self.image.id(), "decoding image");
                self.image.decode().map(Arc::new).map_err(|err| err.to_string())
            })
            .clone()
            .map_err(RasterError::ImageDecode)
    }
}

struct CacheEntry {
    slot: Arc<DecodeSlot>,
    task: Option<Arc<ImageDecodeTask>>,
    ref_count: usize,
    last_access: u64,
    bytes: usize,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<PaintImageId, CacheEntry>,
    current_bytes: usize,
    access_counter: u64,
    hits: u64,
    misses: u64,
}

impl CacheInner {
    fn touch(&mut self, image: &PaintImage) -> &mut CacheEntry {
        self.access_counter += 1;
        let access = self.access_counter;
        match self.entries.entry(image.id()) {
            Entry::Occupied(occupied) => {
                self.hits += 1;
                let entry = occupied.into_mut();
                entry.last_access = access;
                entry
            }
            Entry::Vacant(vacant) => {
                self.misses += 1;
                let bytes = usize::try_from(image.decoded_size_bytes()).unwrap_or(usize::MAX);
                self.current_bytes = self.current_bytes.saturating_add(bytes);
                vacant.insert(CacheEntry {
                    slot: Arc::new(DecodeSlot::new(image.clone())),
                    task: None,
                    ref_count: 0,
                    last_access: access,
                    bytes,
                })
            }
        }
    }

    /// Evict unlocked, idle entries in LRU order until under `max_bytes`.
    fn evict(&mut self, max_bytes: usize) {
        while self.current_bytes > max_bytes {
            let victim = self
                .entries
                .iter()
                .filter(|(_, entry)| entry.ref_count == 0 && !entry_in_flight(entry))
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(id, _)| *id);
            let Some(id) = victim else {
                break;
            };
            if let Some(entry) = self.entries.remove(&id) {
                self.current_bytes = self.current_bytes.saturating_sub(entry.bytes);
                tracing::trace!(image = id, bytes = entry.bytes, "evicted decoded image");
            }
        }
    }
}

fn entry_in_flight(entry: &CacheEntry) -> bool {
    entry
        .task
        .as_ref()
        .map(|task| !fos_tasks::Task::state(task.as_ref()).is_done())
        .unwrap_or(false)
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct DecodeCacheStats {
    pub entries: usize,
    pub locked: usize,
    pub bytes: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Shared cache of decoded images
pub struct ImageDecodeCache {
    inner: Mutex<CacheInner>,
    max_bytes: usize,
}

impl ImageDecodeCache {
    pub fn new(max_bytes: usize) -> Self {
        Self { inner: Mutex::new(CacheInner::default()), max_bytes }
    }

    /// 64MB budget
    pub fn with_default_budget() -> Self {
        Self::new(64 * 1024 * 1024)
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fits_budget(&self, image: &PaintImage) -> bool {
        image.decoded_size_bytes() <= self.max_bytes as u64
    }

    /// Decode task for `image`, taking a reference on it.
    ///
    /// Returns `None` when the image is already decoded or is too large for
    /// the budget (it is then decoded during raster). While a decode is in
    /// flight the same task is returned again.
    pub fn get_task_for_image(&self, image: &PaintImage) -> Option<Arc<ImageDecodeTask>> {
        if !self.fits_budget(image) {
            tracing::debug!(image = image.id(), bytes = image.decoded_size_bytes(), "image over decode budget");
            return None;
        }
        let mut inner = self.lock();
        let entry = inner.touch(image);
        entry.ref_count += 1;
        if entry.slot.is_decoded() {
            return None;
        }
        let task = entry
            .task
            .get_or_insert_with(|| ImageDecodeTask::new(Arc::clone(&entry.slot)));
        Some(Arc::clone(task))
    }

    /// Drop a reference taken by [`get_task_for_image`](Self::get_task_for_image).
    pub fn unref_image(&self, id: PaintImageId) {
        let mut inner = self.lock();
        if let Some(entry) = inner.entries.get_mut(&id) {
            debug_assert!(entry.ref_count > 0, "unbalanced unref of image {id}");
            entry.ref_count = entry.ref_count.saturating_sub(1);
        }
        inner.evict(self.max_bytes);
    }

    /// Decoded pixels for `image`, decoding now if needed. Safe from any
    /// thread; the lock is not held while decoding.
    pub fn get_decoded(&self, image: &PaintImage) -> Result<Arc<Pixmap>, RasterError> {
        if !self.fits_budget(image) {
            return image.decode().map(Arc::new);
        }
        let slot = {
            let mut inner = self.lock();
            Arc::clone(&inner.touch(image).slot)
        };
        let decoded = slot.decode();
        self.lock().evict(self.max_bytes);
        decoded
    }

    pub fn is_decoded(&self, id: PaintImageId) -> bool {
        self.lock().entries.get(&id).map(|entry| entry.slot.is_decoded()).unwrap_or(false)
    }

    pub fn ref_count(&self, id: PaintImageId) -> usize {
        self.lock().entries.get(&id).map(|entry| entry.ref_count).unwrap_or(0)
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.retain(|_, entry| entry.ref_count > 0 || entry_in_flight(entry));
        inner.current_bytes = inner.entries.values().map(|entry| entry.bytes).sum();
    }

    pub fn stats(&self) -> DecodeCacheStats {
        let inner = self.lock();
        DecodeCacheStats {
            entries: inner.entries.len(),
            locked: inner.entries.values().filter(|entry| entry.ref_count > 0).count(),
            bytes: inner.current_bytes,
            max_bytes: self.max_bytes,
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

impl Default for ImageDecodeCache {
    fn default() -> Self {
        Self::with_default_budget()
    }
}

impl std::fmt::Debug for ImageDecodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageDecodeCache").field("stats", &self.stats()).finish()
    }
}
