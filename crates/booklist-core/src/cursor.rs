use crate::database::{BooklistError, Result};
use crate::list::BuiltList;
use crate::row::BooklistRow;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorConfig {
    /// Visible rows fetched per window (default: 20).
    pub batch_size: usize,
    /// Recently used windows that are never purged (default: 8).
    pub mru_size: usize,
    /// Windows further than this many windows from the current one are purged
    /// unless recently used (default: 3).
    pub eviction_distance: usize,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            mru_size: 8,
            eviction_distance: 3,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CursorStats {
    pub window_hits: u64,
    pub window_misses: u64,
    pub windows_loaded: u64,
    pub windows_evicted: u64,
}

type Window = Arc<Vec<BooklistRow>>;

struct Inner {
    /// List generation the cached data belongs to.
    generation: u64,
    count: Option<i64>,
    windows: HashMap<i64, Window>,
    mru: LruCache<i64, ()>,
    stats: CursorStats,
}

/// Windowed, cached access to the visible rows of a [`BuiltList`].
///
/// Rows are addressed by visible position. A window of `batch_size` rows is
/// fetched with one bounded query the first time any of its positions is
/// requested. Cached windows and the row count are dropped whenever the list
/// is rebuilt or a node changes state.
pub struct BooklistCursor<'a> {
    list: &'a BuiltList,
    config: CursorConfig,
    inner: Mutex<Inner>,
}

impl<'a> BooklistCursor<'a> {
    pub fn new(list: &'a BuiltList, mut config: CursorConfig) -> Self {
        config.batch_size = config.batch_size.max(1);
        config.mru_size = config.mru_size.max(1);
        let cap = NonZeroUsize::new(config.mru_size).expect("mru_size is non-zero");
        let inner = Inner {
            generation: list.generation(),
            count: None,
            windows: HashMap::new(),
            mru: LruCache::new(cap),
            stats: CursorStats::default(),
        };
        Self {
            list,
            config,
            inner: Mutex::new(inner),
        }
    }

    pub fn list(&self) -> &'a BuiltList {
        self.list
    }

    pub fn config(&self) -> &CursorConfig {
        &self.config
    }

    /// Number of visible rows.
    pub fn count(&self) -> Result<i64> {
        let mut inner = self.inner.lock().expect("cursor mutex poisoned");
        self.sync_generation_locked(&mut inner);
        if let Some(count) = inner.count {
            return Ok(count);
        }
        let count = self.list.visible_count()?;
        inner.count = Some(count);
        Ok(count)
    }

    pub fn book_count(&self) -> Result<i64> {
        self.list.book_count()
    }

    pub fn unique_book_count(&self) -> Result<i64> {
        self.list.unique_book_count()
    }

    /// Row at a visible position. Positions outside `0..count()` are an error.
    pub fn row_at(&self, position: i64) -> Result<BooklistRow> {
        let count = self.count()?;
        let out_of_range = BooklistError::PositionOutOfRange { position, count };
        if position < 0 || position >= count {
            return Err(out_of_range);
        }
        let batch = self.batch_size_i64();
        let window_id = position / batch;
        let window = self.window(window_id)?;
        let offset = usize::try_from(position - window_id * batch).unwrap_or(usize::MAX);
        window.get(offset).cloned().ok_or(out_of_range)
    }

    /// Drop every cached window and the cached count.
    pub fn requery(&self) {
        let mut inner = self.inner.lock().expect("cursor mutex poisoned");
        let generation = self.list.generation();
        Self::reset_locked(&mut inner, generation);
    }

    pub fn stats(&self) -> CursorStats {
        self.inner.lock().expect("cursor mutex poisoned").stats
    }

    pub fn cached_window_count(&self) -> usize {
        self.inner
            .lock()
            .expect("cursor mutex poisoned")
            .windows
            .len()
    }

    pub fn cached_window_ids(&self) -> Vec<i64> {
        let inner = self.inner.lock().expect("cursor mutex poisoned");
        let mut ids: Vec<i64> = inner.windows.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn batch_size_i64(&self) -> i64 {
        i64::try_from(self.config.batch_size).unwrap_or(i64::MAX)
    }

    fn window(&self, window_id: i64) -> Result<Window> {
        {
            let mut inner = self.inner.lock().expect("cursor mutex poisoned");
            self.sync_generation_locked(&mut inner);
            if let Some(window) = inner.windows.get(&window_id).cloned() {
                inner.stats.window_hits = inner.stats.window_hits.saturating_add(1);
                self.touch_locked(&mut inner, window_id);
                return Ok(window);
            }
            inner.stats.window_misses = inner.stats.window_misses.saturating_add(1);
        }

        let generation = self.list.generation();
        let batch = self.batch_size_i64();
        let rows = self.list.fetch_window(window_id * batch, batch)?;
        log::trace!(
            "{}: loaded window {window_id} ({} rows)",
            self.list.tables().list(),
            rows.len()
        );

        let mut inner = self.inner.lock().expect("cursor mutex poisoned");
        self.sync_generation_locked(&mut inner);
        if inner.generation != generation {
            // The list changed while the window was loading; serve the rows
            // but do not cache them.
            return Ok(Arc::new(rows));
        }
        inner.stats.windows_loaded = inner.stats.windows_loaded.saturating_add(1);
        let window = inner
            .windows
            .entry(window_id)
            .or_insert_with(|| Arc::new(rows))
            .clone();
        self.touch_locked(&mut inner, window_id);
        Ok(window)
    }

    /// Make `window_id` current: move it to the head of the MRU ring and purge
    /// far-away windows that are not in the ring.
    fn touch_locked(&self, inner: &mut Inner, window_id: i64) {
        inner.mru.put(window_id, ());
        let distance = i64::try_from(self.config.eviction_distance).unwrap_or(i64::MAX);
        let stale: Vec<i64> = inner
            .windows
            .keys()
            .copied()
            .filter(|id| (id - window_id).abs() > distance && !inner.mru.contains(id))
            .collect();
        for id in stale {
            inner.windows.remove(&id);
            inner.stats.windows_evicted = inner.stats.windows_evicted.saturating_add(1);
            log::trace!("{}: evicted window {id}", self.list.tables().list());
        }
    }

    fn sync_generation_locked(&self, inner: &mut Inner) {
        let generation = self.list.generation();
        if inner.generation != generation {
            Self::reset_locked(inner, generation);
        }
    }

    fn reset_locked(inner: &mut Inner, generation: u64) {
        inner.generation = generation;
        inner.count = None;
        inner.windows.clear();
        inner.mru.clear();
    }
}
